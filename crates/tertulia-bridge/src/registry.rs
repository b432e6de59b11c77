//! Slot registry and connection graph.
//!
//! Ports live in a dense slot-indexed table; slot 0 is the master clock
//! port. Connections are kept as a per-sink inbound edge list with a
//! per-source outbound mirror, so mix-time iteration is O(degree) over flat
//! arrays and removal never traces ownership cycles.
//!
//! The registry itself is guarded by the bridge's group lock. The pieces the
//! mixer touches while the lock is released are reference-counted: the
//! lock-free control surface ([`PortControls`]) and the per-port media path
//! ([`PortCore`]) behind its own mutex, which doubles as the pull-once-per-
//! tick latch.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use tertulia_core::{
    Frame, LevelAdj, ResampleQuality, Resampler, SampleRing, SignalMeter,
};

use crate::port::{AudioFormat, Port, PortInfo};
use crate::{Error, Result};

/// Integer handle identifying a port inside the bridge.
///
/// Slot IDs are allocated from the lowest free index and may be reused after
/// the slot is retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    /// The master clock slot, occupied for the bridge's lifetime.
    pub const MASTER: SlotId = SlotId(0);

    /// Returns the raw slot index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A directed connection into a sink.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Edge {
    pub src: SlotId,
    pub adj: LevelAdj,
}

/// Lock-free control surface shared between the registry and in-flight
/// tick jobs. Level adjustments and enable flags take effect immediately.
pub(crate) struct PortControls {
    /// Port may transmit into the bridge (gates pulling).
    pub tx_enabled: AtomicBool,
    /// Port may receive the mix (gates pushing).
    pub rx_enabled: AtomicBool,
    /// Gain on audio received from the port.
    pub rx_adj: AtomicI32,
    /// Gain on audio transmitted to the port.
    pub tx_adj: AtomicI32,
    /// Meter of the signal received from the port, 0..=255.
    pub rx_level: AtomicU32,
    /// Meter of the signal transmitted to the port, 0..=255.
    pub tx_level: AtomicU32,
}

impl PortControls {
    fn new() -> Self {
        Self {
            tx_enabled: AtomicBool::new(true),
            rx_enabled: AtomicBool::new(true),
            rx_adj: AtomicI32::new(LevelAdj::UNITY.value()),
            tx_adj: AtomicI32::new(LevelAdj::UNITY.value()),
            rx_level: AtomicU32::new(0),
            tx_level: AtomicU32::new(0),
        }
    }

    pub fn rx_adj(&self) -> LevelAdj {
        LevelAdj::new(self.rx_adj.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn tx_adj(&self) -> LevelAdj {
        LevelAdj::new(self.tx_adj.load(Ordering::Acquire)).unwrap_or_default()
    }
}

/// Port-to-bridge path: pull scratch, rate/ptime adaptation, and the
/// once-per-tick frame cache.
pub(crate) struct PullPath {
    /// Port rate to bridge rate conversion, absent when rates match.
    pub resampler: Option<Resampler>,
    /// Bridge-rate samples awaiting a full bridge frame.
    pub ring: SampleRing,
    /// Scratch frame in the port's native format.
    pub scratch: Frame,
    /// Scratch for rate-converted samples.
    pub resampled: Vec<i16>,
    /// One bridge frame of cached samples for the current tick.
    pub cache: Vec<i16>,
    /// Whether `cache` holds real media (false mixes as silence).
    pub have_media: bool,
    /// Tick sequence the cache was materialized for.
    pub tick: u64,
    /// Meter state for the rx direction.
    pub meter: SignalMeter,
}

/// Bridge-to-port path: push scratch and outbound adaptation.
pub(crate) struct PushPath {
    /// Bridge rate to port rate conversion, absent when rates match.
    pub resampler: Option<Resampler>,
    /// Port-rate samples awaiting full port frames.
    pub ring: SampleRing,
    /// Scratch for rate-converted samples.
    pub resampled: Vec<i16>,
    /// Scratch frame in the port's native format.
    pub scratch: Frame,
    /// Next push timestamp, in port samples per channel.
    pub timestamp: u64,
    /// Meter state for the tx direction.
    pub meter: SignalMeter,
}

/// The mutable media state of one port. The mutex around it is the
/// per-source latch: the first executor that needs the port this tick pulls
/// and caches its frame, later executors reuse the cache.
pub(crate) struct PortCore {
    pub port: Box<dyn Port + Send>,
    pub pull: PullPath,
    pub push: PushPath,
}

/// One occupied slot in the registry.
pub(crate) struct PortSlot {
    pub name: String,
    /// Snapshot of the port's info taken at add time.
    pub info: PortInfo,
    /// Set when the AddPort operation has been applied; inactive slots are
    /// invisible to the mixer.
    pub active: bool,
    pub controls: Arc<PortControls>,
    pub core: Arc<Mutex<PortCore>>,
    /// Inbound edges: who transmits to this sink.
    pub rx_edges: Vec<Edge>,
    /// Outbound mirror: sinks this port transmits to.
    pub tx_sinks: Vec<SlotId>,
    /// Run after the tick that removed the port completes.
    pub destroy_handlers: Vec<Box<dyn FnOnce() + Send>>,
}

impl PortSlot {
    pub(crate) fn new(
        name: String,
        info: PortInfo,
        port: Box<dyn Port + Send>,
        bridge_format: AudioFormat,
        quality: ResampleQuality,
    ) -> Self {
        let port_format = info.format;
        let channels = usize::from(bridge_format.channel_count.max(1));
        let bridge_spf = bridge_format.samples_per_frame as usize;
        let port_spf = port_format.samples_per_frame as usize;

        let make_resampler = |from: u32, to: u32| {
            (from != to).then(|| Resampler::new(from, to, channels, quality))
        };

        let pull_resampler = make_resampler(port_format.clock_rate, bridge_format.clock_rate);
        let per_pull = pull_resampler
            .as_ref()
            .map_or(port_spf, |r| r.output_len(port_spf))
            .max(1);
        let pull_ring = SampleRing::with_capacity((bridge_spf + per_pull) * 2);

        let push_resampler = make_resampler(bridge_format.clock_rate, port_format.clock_rate);
        let per_push = push_resampler
            .as_ref()
            .map_or(bridge_spf, |r| r.output_len(bridge_spf))
            .max(1);
        let push_ring = SampleRing::with_capacity((port_spf + per_push) * 2);

        Self {
            name,
            info,
            active: false,
            controls: Arc::new(PortControls::new()),
            core: Arc::new(Mutex::new(PortCore {
                port,
                pull: PullPath {
                    resampler: pull_resampler,
                    ring: pull_ring,
                    scratch: Frame::audio(port_spf),
                    resampled: Vec::with_capacity(per_pull),
                    cache: vec![0; bridge_spf],
                    have_media: false,
                    tick: 0,
                    meter: SignalMeter::new(),
                },
                push: PushPath {
                    resampler: push_resampler,
                    ring: push_ring,
                    resampled: Vec::with_capacity(per_push),
                    scratch: Frame::audio(port_spf),
                    timestamp: 0,
                    meter: SignalMeter::new(),
                },
            })),
            rx_edges: Vec::new(),
            tx_sinks: Vec::new(),
            destroy_handlers: Vec::new(),
        }
    }
}

/// Read-only snapshot of a port, as returned by `Bridge::get_port_info`.
#[derive(Clone, Debug)]
pub struct PortSnapshot {
    /// The port's slot.
    pub slot: SlotId,
    /// Port name.
    pub name: String,
    /// Native PCM format.
    pub format: AudioFormat,
    /// Whether the port may transmit into the bridge.
    pub tx_enabled: bool,
    /// Whether the port may receive the mix.
    pub rx_enabled: bool,
    /// Gain on audio received from the port.
    pub rx_adj: i32,
    /// Gain on audio transmitted to the port.
    pub tx_adj: i32,
    /// Sinks this port transmits to, with the per-connection gain.
    pub listeners: Vec<(SlotId, i32)>,
    /// Number of ports transmitting into this one.
    pub transmitter_count: usize,
}

/// Dense slot table plus the connection graph.
pub(crate) struct Registry {
    slots: Vec<Option<PortSlot>>,
    connect_count: usize,
}

impl Registry {
    pub fn new(max_slots: usize) -> Self {
        let mut slots = Vec::with_capacity(max_slots);
        slots.resize_with(max_slots, || None);
        Self {
            slots,
            connect_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocates the lowest free slot.
    pub fn alloc(&mut self, slot_data: PortSlot) -> Result<SlotId> {
        let free = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::CapacityExceeded)?;
        self.slots[free] = Some(slot_data);
        Ok(SlotId(free as u32))
    }

    pub fn get(&self, slot: SlotId) -> Option<&PortSlot> {
        self.slots.get(slot.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut PortSlot> {
        self.slots.get_mut(slot.0 as usize)?.as_mut()
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        self.get(slot).is_some()
    }

    /// Occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &PortSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SlotId(i as u32), s)))
    }

    pub fn port_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count
    }

    /// Adds or updates the edge `src -> sink`. Returns true when a new edge
    /// was created (false for a gain update on an existing edge).
    pub fn add_edge(&mut self, src: SlotId, sink: SlotId, adj: LevelAdj) -> Result<bool> {
        if !self.contains(src) || !self.contains(sink) {
            return Err(Error::NotFound);
        }

        let sink_slot = self.get_mut(sink).ok_or(Error::NotFound)?;
        if let Some(edge) = sink_slot.rx_edges.iter_mut().find(|e| e.src == src) {
            edge.adj = adj;
            return Ok(false);
        }
        sink_slot.rx_edges.push(Edge { src, adj });

        let src_slot = self.get_mut(src).ok_or(Error::NotFound)?;
        src_slot.tx_sinks.push(sink);
        self.connect_count += 1;
        Ok(true)
    }

    /// Removes the edge `src -> sink`. Returns true when an edge existed.
    pub fn remove_edge(&mut self, src: SlotId, sink: SlotId) -> bool {
        let Some(sink_slot) = self.get_mut(sink) else {
            return false;
        };
        let before = sink_slot.rx_edges.len();
        sink_slot.rx_edges.retain(|e| e.src != src);
        if sink_slot.rx_edges.len() == before {
            return false;
        }

        if let Some(src_slot) = self.get_mut(src) {
            if let Some(pos) = src_slot.tx_sinks.iter().position(|&s| s == sink) {
                src_slot.tx_sinks.remove(pos);
            }
        }
        self.connect_count -= 1;
        true
    }

    /// Removes edges matching the (source, sink) filter; `None` matches all.
    /// Returns the number of edges removed.
    pub fn remove_matching_edges(&mut self, src: Option<SlotId>, sink: Option<SlotId>) -> usize {
        let mut pairs = Vec::new();
        for (sink_id, slot) in self.iter() {
            if sink.is_some_and(|s| s != sink_id) {
                continue;
            }
            for edge in &slot.rx_edges {
                if src.is_some_and(|s| s != edge.src) {
                    continue;
                }
                pairs.push((edge.src, sink_id));
            }
        }
        for &(s, t) in &pairs {
            self.remove_edge(s, t);
        }
        pairs.len()
    }

    /// Updates the gain of an existing edge.
    pub fn set_edge_level(&mut self, src: SlotId, sink: SlotId, adj: LevelAdj) -> Result<()> {
        let sink_slot = self.get_mut(sink).ok_or(Error::NotFound)?;
        let edge = sink_slot
            .rx_edges
            .iter_mut()
            .find(|e| e.src == src)
            .ok_or(Error::NotFound)?;
        edge.adj = adj;
        Ok(())
    }

    /// Retires a slot: unlinks every touching edge and returns the record.
    pub fn remove(&mut self, slot: SlotId) -> Option<PortSlot> {
        self.get(slot)?;
        self.remove_matching_edges(Some(slot), None);
        self.remove_matching_edges(None, Some(slot));
        self.slots[slot.0 as usize].take()
    }

    /// Builds the public snapshot for one slot.
    pub fn snapshot(&self, slot: SlotId) -> Option<PortSnapshot> {
        let record = self.get(slot)?;
        let listeners = record
            .tx_sinks
            .iter()
            .map(|&sink| {
                let adj = self
                    .get(sink)
                    .and_then(|s| s.rx_edges.iter().find(|e| e.src == slot))
                    .map_or(0, |e| e.adj.value());
                (sink, adj)
            })
            .collect();
        Some(PortSnapshot {
            slot,
            name: record.name.clone(),
            format: record.info.format,
            tx_enabled: record.controls.tx_enabled.load(Ordering::Acquire),
            rx_enabled: record.controls.rx_enabled.load(Ordering::Acquire),
            rx_adj: record.controls.rx_adj.load(Ordering::Acquire),
            tx_adj: record.controls.tx_adj.load(Ordering::Acquire),
            listeners,
            transmitter_count: record.rx_edges.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SilencePort;

    fn fmt() -> AudioFormat {
        AudioFormat::new(8000, 1, 160)
    }

    fn slot_data(name: &str) -> PortSlot {
        let port = SilencePort::new(name, fmt());
        let info = port.info().clone();
        PortSlot::new(
            name.to_string(),
            info,
            Box::new(port),
            fmt(),
            ResampleQuality::default(),
        )
    }

    #[test]
    fn alloc_uses_lowest_free_index() {
        let mut reg = Registry::new(4);
        assert_eq!(reg.alloc(slot_data("a")).unwrap(), SlotId(0));
        assert_eq!(reg.alloc(slot_data("b")).unwrap(), SlotId(1));
        reg.remove(SlotId(0));
        assert_eq!(reg.alloc(slot_data("c")).unwrap(), SlotId(0));
    }

    #[test]
    fn alloc_fails_when_full() {
        let mut reg = Registry::new(2);
        reg.alloc(slot_data("a")).unwrap();
        reg.alloc(slot_data("b")).unwrap();
        assert!(matches!(
            reg.alloc(slot_data("c")),
            Err(Error::CapacityExceeded)
        ));
    }

    #[test]
    fn edges_track_both_directions() {
        let mut reg = Registry::new(4);
        let a = reg.alloc(slot_data("a")).unwrap();
        let b = reg.alloc(slot_data("b")).unwrap();

        assert!(reg.add_edge(a, b, LevelAdj::UNITY).unwrap());
        assert_eq!(reg.connect_count(), 1);
        assert_eq!(reg.get(b).unwrap().rx_edges.len(), 1);
        assert_eq!(reg.get(a).unwrap().tx_sinks, vec![b]);

        // Re-connect updates the gain instead of duplicating the edge.
        assert!(!reg.add_edge(a, b, LevelAdj::MUTE).unwrap());
        assert_eq!(reg.connect_count(), 1);
        assert!(reg.get(b).unwrap().rx_edges[0].adj.is_mute());

        assert!(reg.remove_edge(a, b));
        assert_eq!(reg.connect_count(), 0);
        assert!(reg.get(a).unwrap().tx_sinks.is_empty());
    }

    #[test]
    fn remove_slot_unlinks_edges() {
        let mut reg = Registry::new(4);
        let a = reg.alloc(slot_data("a")).unwrap();
        let b = reg.alloc(slot_data("b")).unwrap();
        let c = reg.alloc(slot_data("c")).unwrap();
        reg.add_edge(a, b, LevelAdj::UNITY).unwrap();
        reg.add_edge(b, a, LevelAdj::UNITY).unwrap();
        reg.add_edge(c, b, LevelAdj::UNITY).unwrap();

        reg.remove(b);
        assert_eq!(reg.connect_count(), 0);
        assert!(reg.get(a).unwrap().rx_edges.is_empty());
        assert!(reg.get(c).unwrap().tx_sinks.is_empty());
    }

    #[test]
    fn bulk_edge_removal_with_sentinels() {
        let mut reg = Registry::new(4);
        let a = reg.alloc(slot_data("a")).unwrap();
        let b = reg.alloc(slot_data("b")).unwrap();
        let c = reg.alloc(slot_data("c")).unwrap();
        reg.add_edge(a, b, LevelAdj::UNITY).unwrap();
        reg.add_edge(a, c, LevelAdj::UNITY).unwrap();
        reg.add_edge(b, c, LevelAdj::UNITY).unwrap();

        // All edges out of `a`.
        assert_eq!(reg.remove_matching_edges(Some(a), None), 2);
        assert_eq!(reg.connect_count(), 1);

        // All edges into `c`.
        assert_eq!(reg.remove_matching_edges(None, Some(c)), 1);
        assert_eq!(reg.connect_count(), 0);
    }

    #[test]
    fn transmitter_sum_matches_connect_count() {
        let mut reg = Registry::new(4);
        let a = reg.alloc(slot_data("a")).unwrap();
        let b = reg.alloc(slot_data("b")).unwrap();
        let c = reg.alloc(slot_data("c")).unwrap();
        reg.add_edge(a, b, LevelAdj::UNITY).unwrap();
        reg.add_edge(a, c, LevelAdj::UNITY).unwrap();
        reg.add_edge(b, c, LevelAdj::UNITY).unwrap();

        let total: usize = reg
            .iter()
            .map(|(id, _)| reg.snapshot(id).unwrap().transmitter_count)
            .sum();
        assert_eq!(total, reg.connect_count());
    }
}
