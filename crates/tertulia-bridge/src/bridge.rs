//! The conference bridge.
//!
//! [`Bridge`] owns the slot registry, the connection graph, the operation
//! queue, and (optionally) the mixing worker pool. The caller owns the
//! clock: every call to [`Bridge::tick`] advances logical time by one frame,
//! drains pending operations at the safe point, mixes, and delivers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use tertulia_core::{LevelAdj, ResampleQuality};

use crate::mix::{SinkJob, SourceRef, TickContext, run_sink_job};
use crate::ops::{OpCallback, OpInfo, OpKind, OpParam, OpQueue, OpStatus};
use crate::parallel::WorkerPool;
use crate::port::{AudioFormat, MediaKind, Port, PortInfo, PortOp, SilencePort};
use crate::registry::{PortCore, PortSlot, PortSnapshot, Registry, SlotId};
use crate::{Error, Result};

/// Creation options for the bridge.
///
/// `small_filter` and `use_linear` select the resampling quality used for
/// every rate-converted port; `no_mic` keeps the master slot's transmit side
/// permanently silent while leaving its receive side live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeOptions {
    /// Never pull audio from the master slot.
    #[serde(default)]
    pub no_mic: bool,
    /// Use the compact resampling filter table.
    #[serde(default)]
    pub small_filter: bool,
    /// Use linear resampling instead of the windowed-sinc filter.
    #[serde(default)]
    pub use_linear: bool,
}

impl BridgeOptions {
    pub(crate) fn quality(self) -> ResampleQuality {
        if self.use_linear {
            ResampleQuality::Linear
        } else {
            ResampleQuality::Sinc {
                small: self.small_filter,
            }
        }
    }
}

/// Bridge creation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BridgeParams {
    /// Maximum number of slots, including the master slot.
    pub max_slots: usize,
    /// Bridge sampling rate in Hz.
    pub clock_rate: u32,
    /// Number of interleaved channels; every port must match.
    pub channel_count: u16,
    /// Interleaved samples per bridge frame.
    pub samples_per_frame: u32,
    /// Bits per sample. Only 16 is supported.
    pub bits_per_sample: u16,
    /// Creation options.
    #[serde(default)]
    pub options: BridgeOptions,
    /// Mixing worker threads. Zero selects the sequential tick.
    #[serde(default)]
    pub worker_threads: usize,
}

impl Default for BridgeParams {
    /// 8 kHz mono, 20 ms frames, 32 slots, sequential.
    fn default() -> Self {
        Self {
            max_slots: 32,
            clock_rate: 8000,
            channel_count: 1,
            samples_per_frame: 160,
            bits_per_sample: 16,
            options: BridgeOptions::default(),
            worker_threads: 0,
        }
    }
}

struct TickState {
    tick: u64,
    acc: Vec<i32>,
    mixed: Vec<i16>,
}

struct Retired {
    slot: SlotId,
    name: String,
    core: Arc<Mutex<PortCore>>,
    handlers: Vec<Box<dyn FnOnce() + Send>>,
}

/// The audio conference bridge.
///
/// All methods take `&self`; the bridge is `Send + Sync` and may be ticked
/// from one thread while control calls arrive from others.
pub struct Bridge {
    params: BridgeParams,
    format: AudioFormat,
    registry: Mutex<Registry>,
    ops: OpQueue,
    op_cb: Mutex<Option<OpCallback>>,
    pool: Mutex<Option<WorkerPool>>,
    tick_state: Mutex<TickState>,
    destroyed: AtomicBool,
}

impl Bridge {
    /// Creates a bridge with a silent master port on slot 0.
    pub fn create(params: BridgeParams) -> Result<Arc<Self>> {
        let format = Self::validate_params(&params)?;
        let master = SilencePort::new("Master", format);
        Self::build(params, format, Box::new(master))
    }

    /// Creates a bridge with an application-supplied master port.
    ///
    /// The master port is validated like any other port and occupies slot 0
    /// for the bridge's lifetime.
    pub fn create_with_master(
        params: BridgeParams,
        master: Box<dyn Port + Send>,
    ) -> Result<Arc<Self>> {
        let format = Self::validate_params(&params)?;
        Self::validate_port(&format, master.info())?;
        Self::build(params, format, master)
    }

    fn validate_params(params: &BridgeParams) -> Result<AudioFormat> {
        if params.bits_per_sample != 16 {
            return Err(Error::InvalidConfig(format!(
                "only 16 bits per sample is supported, got {}",
                params.bits_per_sample
            )));
        }
        if params.max_slots == 0 {
            return Err(Error::InvalidArgument("max_slots must be at least 1"));
        }
        if params.clock_rate == 0 || params.samples_per_frame == 0 || params.channel_count == 0 {
            return Err(Error::InvalidArgument("format fields must be non-zero"));
        }
        if params.samples_per_frame % u32::from(params.channel_count) != 0 {
            return Err(Error::InvalidConfig(
                "samples_per_frame must be a multiple of channel_count".into(),
            ));
        }
        Ok(AudioFormat::new(
            params.clock_rate,
            params.channel_count,
            params.samples_per_frame,
        ))
    }

    fn build(
        params: BridgeParams,
        format: AudioFormat,
        master: Box<dyn Port + Send>,
    ) -> Result<Arc<Self>> {
        let mut registry = Registry::new(params.max_slots);
        let name = master.info().name.clone();
        let info = master.info().clone();
        let mut slot = PortSlot::new(name, info, master, format, params.options.quality());
        slot.active = true;
        let master_slot = registry.alloc(slot)?;
        debug_assert_eq!(master_slot, SlotId::MASTER);

        let pool = (params.worker_threads > 0).then(|| WorkerPool::new(params.worker_threads));

        debug!(
            clock_rate = format.clock_rate,
            channels = format.channel_count,
            samples_per_frame = format.samples_per_frame,
            max_slots = params.max_slots,
            worker_threads = params.worker_threads,
            "conference bridge created"
        );

        Ok(Arc::new(Self {
            params,
            format,
            registry: Mutex::new(registry),
            ops: OpQueue::new(),
            op_cb: Mutex::new(None),
            pool: Mutex::new(pool),
            tick_state: Mutex::new(TickState {
                tick: 0,
                acc: Vec::new(),
                mixed: Vec::new(),
            }),
            destroyed: AtomicBool::new(false),
        }))
    }

    fn validate_port(bridge: &AudioFormat, info: &PortInfo) -> Result<()> {
        if info.kind != MediaKind::Audio {
            return Err(Error::InvalidMediaType);
        }
        let fmt = info.format;
        if fmt.bits_per_sample != 16 {
            return Err(Error::InvalidConfig(format!(
                "only 16 bits per sample is supported, got {}",
                fmt.bits_per_sample
            )));
        }
        if fmt.channel_count != bridge.channel_count {
            return Err(Error::InvalidConfig(format!(
                "port has {} channels, bridge has {}",
                fmt.channel_count, bridge.channel_count
            )));
        }
        if fmt.clock_rate == 0 || fmt.samples_per_frame == 0 {
            return Err(Error::InvalidConfig("format fields must be non-zero".into()));
        }
        if fmt.samples_per_frame % u32::from(fmt.channel_count) != 0 {
            return Err(Error::InvalidConfig(
                "samples_per_frame must be a multiple of channel_count".into(),
            ));
        }

        // Both conversion directions must yield whole sample counts per
        // frame, otherwise samples would be lost at every tick boundary.
        let port_spc = u64::from(fmt.samples_per_channel());
        let bridge_spc = u64::from(bridge.samples_per_channel());
        if (port_spc * u64::from(bridge.clock_rate)) % u64::from(fmt.clock_rate) != 0
            || (bridge_spc * u64::from(fmt.clock_rate)) % u64::from(bridge.clock_rate) != 0
        {
            return Err(Error::InvalidConfig(format!(
                "fractional samples per frame: {} Hz / {} samples against a {} Hz bridge",
                fmt.clock_rate, fmt.samples_per_frame, bridge.clock_rate
            )));
        }
        Ok(())
    }

    /// The bridge's creation parameters.
    pub fn params(&self) -> &BridgeParams {
        &self.params
    }

    /// The bridge's PCM format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Registers the operation-completion callback.
    ///
    /// The callback runs on the tick thread and must not block.
    pub fn set_op_cb(&self, cb: impl FnMut(&OpInfo) + Send + 'static) {
        *self.op_cb.lock() = Some(Box::new(cb));
    }

    /// Removes the operation-completion callback.
    pub fn clear_op_cb(&self) {
        *self.op_cb.lock() = None;
    }

    /// Renames the master slot.
    pub fn set_master_name(&self, name: impl Into<String>) {
        if let Some(slot) = self.registry.lock().get_mut(SlotId::MASTER) {
            slot.name = name.into();
        }
    }

    /// Attaches a port and returns its slot.
    ///
    /// The slot is allocated synchronously (capacity and format errors are
    /// reported here, with no callback); the port starts mixing after the
    /// queued operation applies on the next tick.
    pub fn add_port(&self, port: Box<dyn Port + Send>, name: Option<&str>) -> Result<SlotId> {
        Self::validate_port(&self.format, port.info())?;
        let info = port.info().clone();
        let name = name.map_or_else(|| info.name.clone(), str::to_string);

        let slot = {
            let mut reg = self.registry.lock();
            reg.alloc(PortSlot::new(
                name.clone(),
                info,
                port,
                self.format,
                self.params.options.quality(),
            ))?
        };
        self.ops.enqueue(OpParam::AddPort { slot });
        debug!(%slot, %name, "port queued for add");
        Ok(slot)
    }

    /// Detaches the port at `slot`.
    ///
    /// Asynchronous and idempotent: removing an already-vacant slot is a
    /// no-op, and the port is released only after the tick that applies the
    /// removal completes and its destroy handlers have run.
    pub fn remove_port(&self, slot: SlotId) -> Result<()> {
        self.check_slot_index(slot)?;
        if slot == SlotId::MASTER {
            return Err(Error::InvalidArgument("the master slot cannot be removed"));
        }
        if !self.registry.lock().contains(slot) {
            return Ok(());
        }
        self.ops.enqueue(OpParam::RemovePort { slot });
        Ok(())
    }

    /// Enables unidirectional audio from `src` to `sink`.
    ///
    /// `adj` is the per-connection level adjustment (`>= -128`);
    /// re-connecting an existing edge updates its gain.
    pub fn connect_port(&self, src: SlotId, sink: SlotId, adj: i32) -> Result<()> {
        LevelAdj::new(adj).ok_or(Error::InvalidArgument("adj_level below -128"))?;
        self.check_slot_index(src)?;
        self.check_slot_index(sink)?;
        {
            let reg = self.registry.lock();
            if !reg.contains(src) || !reg.contains(sink) {
                return Err(Error::NotFound);
            }
        }
        self.ops.enqueue(OpParam::Connect { src, sink, adj });
        Ok(())
    }

    /// Removes the connection from `src` to `sink`.
    pub fn disconnect_port(&self, src: SlotId, sink: SlotId) -> Result<()> {
        self.check_slot_index(src)?;
        self.check_slot_index(sink)?;
        self.ops.enqueue(OpParam::Disconnect {
            src: Some(src),
            sink: Some(sink),
        });
        Ok(())
    }

    /// Removes every connection into `sink`.
    pub fn disconnect_port_from_sources(&self, sink: SlotId) -> Result<()> {
        self.check_slot_index(sink)?;
        self.ops.enqueue(OpParam::Disconnect {
            src: None,
            sink: Some(sink),
        });
        Ok(())
    }

    /// Removes every connection out of `src`.
    pub fn disconnect_port_from_sinks(&self, src: SlotId) -> Result<()> {
        self.check_slot_index(src)?;
        self.ops.enqueue(OpParam::Disconnect {
            src: Some(src),
            sink: None,
        });
        Ok(())
    }

    /// Changes the port's direction enables. Takes effect immediately.
    ///
    /// `tx` governs the port-to-bridge direction (the port transmits), `rx`
    /// the bridge-to-port direction (the port receives the mix).
    pub fn configure_port(&self, slot: SlotId, tx: PortOp, rx: PortOp) -> Result<()> {
        let reg = self.registry.lock();
        let record = reg.get(slot).ok_or(Error::NotFound)?;
        match tx {
            PortOp::NoChange => {}
            PortOp::Enable => record.controls.tx_enabled.store(true, Ordering::Release),
            PortOp::Disable => record.controls.tx_enabled.store(false, Ordering::Release),
        }
        match rx {
            PortOp::NoChange => {}
            PortOp::Enable => record.controls.rx_enabled.store(true, Ordering::Release),
            PortOp::Disable => record.controls.rx_enabled.store(false, Ordering::Release),
        }
        Ok(())
    }

    /// Adjusts the level of audio received from the port. Immediate.
    pub fn adjust_rx_level(&self, slot: SlotId, adj: i32) -> Result<()> {
        let adj = LevelAdj::new(adj).ok_or(Error::InvalidArgument("adj_level below -128"))?;
        let reg = self.registry.lock();
        let record = reg.get(slot).ok_or(Error::NotFound)?;
        record.controls.rx_adj.store(adj.value(), Ordering::Release);
        Ok(())
    }

    /// Adjusts the level of audio transmitted to the port. Immediate.
    pub fn adjust_tx_level(&self, slot: SlotId, adj: i32) -> Result<()> {
        let adj = LevelAdj::new(adj).ok_or(Error::InvalidArgument("adj_level below -128"))?;
        let reg = self.registry.lock();
        let record = reg.get(slot).ok_or(Error::NotFound)?;
        record.controls.tx_adj.store(adj.value(), Ordering::Release);
        Ok(())
    }

    /// Adjusts the level of an existing connection. Immediate.
    pub fn adjust_conn_level(&self, src: SlotId, sink: SlotId, adj: i32) -> Result<()> {
        let adj = LevelAdj::new(adj).ok_or(Error::InvalidArgument("adj_level below -128"))?;
        self.registry.lock().set_edge_level(src, sink, adj)
    }

    /// Read-only snapshot of one port.
    pub fn get_port_info(&self, slot: SlotId) -> Result<PortSnapshot> {
        self.registry.lock().snapshot(slot).ok_or(Error::NotFound)
    }

    /// Read-only snapshots of every occupied slot.
    pub fn get_ports_info(&self) -> Vec<PortSnapshot> {
        let reg = self.registry.lock();
        reg.iter().filter_map(|(id, _)| reg.snapshot(id)).collect()
    }

    /// Last signal levels for the port as `(tx, rx)`, each `0..=255`.
    ///
    /// `tx` is the level transmitted to the port (its received mix), `rx`
    /// the level received from it.
    pub fn get_signal_level(&self, slot: SlotId) -> Result<(u8, u8)> {
        let reg = self.registry.lock();
        let record = reg.get(slot).ok_or(Error::NotFound)?;
        Ok((
            record.controls.tx_level.load(Ordering::Acquire) as u8,
            record.controls.rx_level.load(Ordering::Acquire) as u8,
        ))
    }

    /// Number of occupied slots, the master included.
    pub fn port_count(&self) -> usize {
        self.registry.lock().port_count()
    }

    /// Total number of connections.
    pub fn connect_count(&self) -> usize {
        self.registry.lock().connect_count()
    }

    /// Occupied slots in ascending order.
    pub fn enum_ports(&self) -> Vec<SlotId> {
        self.registry.lock().iter().map(|(id, _)| id).collect()
    }

    /// Schedules `handler` to run after the port's removal tick completes.
    pub fn add_destroy_handler(
        &self,
        slot: SlotId,
        handler: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let mut reg = self.registry.lock();
        let record = reg.get_mut(slot).ok_or(Error::NotFound)?;
        record.destroy_handlers.push(Box::new(handler));
        Ok(())
    }

    /// Runs one bridge tick: drains the operation queue at the safe point,
    /// snapshots the graph, mixes every active sink, and delivers.
    pub fn tick(&self) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        let mut ts = self.tick_state.lock();
        ts.tick += 1;
        let ctx = TickContext {
            tick: ts.tick,
            bridge_spf: self.format.samples_per_frame as usize,
        };

        let (completed, retired) = self.apply_pending_ops();
        self.fire_callbacks(&completed);

        let jobs = {
            let reg = self.registry.lock();
            self.build_jobs(&reg)
        };

        if !jobs.is_empty() {
            let pool = self.pool.lock();
            let ts = &mut *ts;
            match pool.as_ref() {
                Some(pool) => pool.run(jobs, ctx, &mut ts.acc, &mut ts.mixed),
                None => {
                    for job in &jobs {
                        run_sink_job(job, &ctx, &mut ts.acc, &mut ts.mixed);
                    }
                }
            }
        }

        // Ports removed this tick are finalized only now, after every
        // executor is past the barrier.
        self.finalize_retired(retired);
    }

    /// Quiesces the bridge: applies pending operations, removes every port
    /// (completion callbacks included), and joins the worker pool.
    ///
    /// Also called on drop; repeated calls are no-ops.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Holding the tick lock serializes against an in-flight tick.
        let _ts = self.tick_state.lock();

        let (mut completed, mut retired) = self.apply_pending_ops();
        {
            let mut reg = self.registry.lock();
            let slots: Vec<SlotId> = reg.iter().map(|(id, _)| id).collect();
            for slot in slots {
                if let Some(record) = reg.remove(slot) {
                    completed.push(OpInfo {
                        kind: OpKind::RemovePort,
                        status: OpStatus::Ok,
                        param: OpParam::RemovePort { slot },
                    });
                    retired.push(Retired {
                        slot,
                        name: record.name,
                        core: record.core,
                        handlers: record.destroy_handlers,
                    });
                }
            }
        }
        self.fire_callbacks(&completed);
        self.finalize_retired(retired);
        *self.pool.lock() = None;
        debug!("conference bridge destroyed");
    }

    fn check_slot_index(&self, slot: SlotId) -> Result<()> {
        if (slot.index() as usize) < self.params.max_slots {
            Ok(())
        } else {
            Err(Error::InvalidArgument("slot index out of range"))
        }
    }

    fn apply_pending_ops(&self) -> (Vec<OpInfo>, Vec<Retired>) {
        let pending = self.ops.drain();
        let mut completed = Vec::with_capacity(pending.len());
        let mut retired = Vec::new();
        if pending.is_empty() {
            return (completed, retired);
        }

        let mut reg = self.registry.lock();
        for param in pending {
            let status = match param {
                OpParam::AddPort { slot } => match reg.get_mut(slot) {
                    Some(record) => {
                        record.active = true;
                        debug!(%slot, name = %record.name, "port added");
                        OpStatus::Ok
                    }
                    None => OpStatus::PortGone,
                },
                OpParam::RemovePort { slot } => match reg.remove(slot) {
                    Some(record) => {
                        debug!(%slot, name = %record.name, "port removed");
                        retired.push(Retired {
                            slot,
                            name: record.name,
                            core: record.core,
                            handlers: record.destroy_handlers,
                        });
                        OpStatus::Ok
                    }
                    None => OpStatus::PortGone,
                },
                OpParam::Connect { src, sink, adj } => {
                    let adj = LevelAdj::new(adj).unwrap_or_default();
                    match reg.add_edge(src, sink, adj) {
                        Ok(created) => {
                            debug!(%src, %sink, adj = adj.value(), created, "ports connected");
                            OpStatus::Ok
                        }
                        Err(_) => OpStatus::PortGone,
                    }
                }
                OpParam::Disconnect { src, sink } => {
                    let src_gone = src.is_some_and(|s| !reg.contains(s));
                    let sink_gone = sink.is_some_and(|s| !reg.contains(s));
                    if src_gone || sink_gone {
                        OpStatus::PortGone
                    } else {
                        let removed = reg.remove_matching_edges(src, sink);
                        debug!(?src, ?sink, removed, "ports disconnected");
                        OpStatus::Ok
                    }
                }
            };
            completed.push(OpInfo {
                kind: param.kind(),
                status,
                param,
            });
        }
        (completed, retired)
    }

    fn fire_callbacks(&self, completed: &[OpInfo]) {
        if completed.is_empty() {
            return;
        }
        let mut guard = self.op_cb.lock();
        if let Some(cb) = guard.as_mut() {
            for info in completed {
                cb(info);
            }
        }
    }

    fn build_jobs(&self, reg: &Registry) -> Vec<SinkJob> {
        let no_mic = self.params.options.no_mic;
        let mut jobs = Vec::new();
        for (sink_id, record) in reg.iter() {
            if !record.active
                || !record.controls.rx_enabled.load(Ordering::Acquire)
                || record.rx_edges.is_empty()
            {
                continue;
            }
            let mut sources = Vec::with_capacity(record.rx_edges.len());
            for edge in &record.rx_edges {
                if no_mic && edge.src == SlotId::MASTER {
                    continue;
                }
                let Some(src_record) = reg.get(edge.src) else {
                    continue;
                };
                if !src_record.active {
                    continue;
                }
                sources.push(SourceRef {
                    slot: edge.src,
                    core: Arc::clone(&src_record.core),
                    controls: Arc::clone(&src_record.controls),
                    edge_adj: edge.adj,
                });
            }
            // An empty source list (everything filtered by no_mic or
            // pending activation) still yields a job: the sink keeps
            // receiving its heartbeat silence frame each tick.
            jobs.push(SinkJob {
                slot: sink_id,
                core: Arc::clone(&record.core),
                controls: Arc::clone(&record.controls),
                sources,
            });
        }
        jobs
    }

    fn finalize_retired(&self, retired: Vec<Retired>) {
        for port in retired {
            {
                let mut core = port.core.lock();
                core.port.on_destroy();
            }
            for handler in port.handlers {
                handler();
            }
            debug!(slot = %port.slot, name = %port.name, "port released");
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MemoryPort;

    fn params() -> BridgeParams {
        BridgeParams {
            max_slots: 4,
            ..BridgeParams::default()
        }
    }

    #[test]
    fn create_rejects_non_16_bit() {
        let bad = BridgeParams {
            bits_per_sample: 8,
            ..params()
        };
        assert!(matches!(
            Bridge::create(bad).map(|_| ()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn master_occupies_slot_zero() {
        let bridge = Bridge::create(params()).unwrap();
        assert_eq!(bridge.port_count(), 1);
        assert_eq!(bridge.enum_ports(), vec![SlotId::MASTER]);
        let info = bridge.get_port_info(SlotId::MASTER).unwrap();
        assert_eq!(info.name, "Master");
    }

    #[test]
    fn add_port_rejects_fractional_samples_per_frame() {
        let bridge = Bridge::create(params()).unwrap();
        // 22050 Hz against an 8 kHz/20 ms bridge: 160 * 22050 / 8000 = 441,
        // but 220 samples of port audio become 220 * 8000 / 22050 = 79.8.
        let port = MemoryPort::new("odd", AudioFormat::new(22050, 1, 220));
        assert!(matches!(
            bridge.add_port(Box::new(port), None),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn add_port_rejects_channel_mismatch() {
        let bridge = Bridge::create(params()).unwrap();
        let port = MemoryPort::new("stereo", AudioFormat::new(8000, 2, 320));
        assert!(matches!(
            bridge.add_port(Box::new(port), None),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn capacity_exhaustion_is_synchronous() {
        let bridge = Bridge::create(BridgeParams {
            max_slots: 2,
            ..params()
        })
        .unwrap();
        let fmt = AudioFormat::new(8000, 1, 160);
        bridge
            .add_port(Box::new(MemoryPort::new("a", fmt)), None)
            .unwrap();
        assert!(matches!(
            bridge.add_port(Box::new(MemoryPort::new("b", fmt)), None),
            Err(Error::CapacityExceeded)
        ));
    }

    #[test]
    fn remove_port_is_idempotent() {
        let bridge = Bridge::create(params()).unwrap();
        let fmt = AudioFormat::new(8000, 1, 160);
        let slot = bridge
            .add_port(Box::new(MemoryPort::new("a", fmt)), None)
            .unwrap();
        bridge.tick();
        bridge.remove_port(slot).unwrap();
        bridge.tick();
        // Slot already vacant: still Ok, nothing enqueued.
        bridge.remove_port(slot).unwrap();
        assert!(matches!(
            bridge.remove_port(SlotId::MASTER),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn connect_requires_live_slots() {
        let bridge = Bridge::create(params()).unwrap();
        assert!(matches!(
            bridge.connect_port(SlotId(2), SlotId::MASTER, 0),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            bridge.connect_port(SlotId::MASTER, SlotId::MASTER, -129),
            Err(Error::InvalidArgument(_))
        ));
    }
}
