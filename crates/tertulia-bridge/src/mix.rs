//! The per-tick mixing pipeline.
//!
//! For every sink with receive enabled and at least one transmitter the tick
//! pulls each source's frame (at most once per tick across all executors),
//! composes receive, connection, and transmit gains in a wide accumulator,
//! normalizes by the number of contributing transmitters (arithmetic mean,
//! preserving headroom when many speak at once), saturates to 16-bit, and
//! delivers the result in the sink's native format.
//!
//! Everything here runs with the group lock released: jobs reference the
//! shared per-port state directly, and each source's mutex is both its frame
//! cache guard and the pull-once latch. A sink's own lock is only taken for
//! final delivery, never while a source lock is held, so executors cannot
//! deadlock however the graph is shaped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

use tertulia_core::{FrameKind, LevelAdj, avg_signal, saturate16};

use crate::registry::{PortControls, PortCore, SlotId};

/// A source edge captured in the tick snapshot.
pub(crate) struct SourceRef {
    pub slot: SlotId,
    pub core: Arc<Mutex<PortCore>>,
    pub controls: Arc<PortControls>,
    pub edge_adj: LevelAdj,
}

/// Mixing work for one sink, self-contained once snapshotted.
pub(crate) struct SinkJob {
    pub slot: SlotId,
    pub core: Arc<Mutex<PortCore>>,
    pub controls: Arc<PortControls>,
    pub sources: Vec<SourceRef>,
}

/// Per-tick constants shared by every executor.
#[derive(Clone, Copy)]
pub(crate) struct TickContext {
    /// Tick sequence number, starting at 1.
    pub tick: u64,
    /// Interleaved samples per bridge frame.
    pub bridge_spf: usize,
}

/// Fills the source's bridge-format frame cache for this tick, pulling from
/// the port at most once per frame of native data. Re-entry within the same
/// tick is a no-op; the caller holds the port's mutex, which makes the tick
/// check a race-free latch.
fn materialize_source(core: &mut PortCore, controls: &PortControls, slot: SlotId, ctx: &TickContext) {
    if core.pull.tick == ctx.tick {
        return;
    }
    let PortCore { port, pull, .. } = core;
    pull.tick = ctx.tick;
    pull.have_media = false;

    let port_spf = (port.info().format.samples_per_frame as usize).max(1);
    let per_pull = pull
        .resampler
        .as_ref()
        .map_or(port_spf, |r| r.output_len(port_spf))
        .max(1);
    // A port whose frames are smaller than the bridge's needs several pulls
    // per tick; cap the loop so a misbehaving port cannot stall the mix.
    let max_pulls = ctx.bridge_spf / per_pull + 2;

    let mut pulls = 0;
    while pull.ring.len() < ctx.bridge_spf && pulls < max_pulls {
        pulls += 1;
        pull.scratch.samples.resize(port_spf, 0);
        pull.scratch.kind = FrameKind::Audio;
        match port.pull_frame(&mut pull.scratch) {
            Ok(()) if pull.scratch.kind == FrameKind::Audio => {
                let dropped = match &mut pull.resampler {
                    Some(rs) => {
                        rs.resample(&pull.scratch.samples, &mut pull.resampled);
                        pull.ring.push(&pull.resampled)
                    }
                    None => pull.ring.push(&pull.scratch.samples),
                };
                if dropped > 0 {
                    trace!(%slot, dropped, "source ring overflow");
                }
            }
            // No media this tick: mix silence, keep the port.
            Ok(()) => break,
            Err(err) => {
                debug!(%slot, error = %err, "pull_frame failed; mixing silence");
                break;
            }
        }
    }

    if pull.ring.len() >= ctx.bridge_spf {
        pull.cache.resize(ctx.bridge_spf, 0);
        if pull.ring.pop(&mut pull.cache) {
            pull.have_media = true;
        }
    }

    if pull.have_media {
        let adjusted = saturate16(controls.rx_adj().apply(i32::from(avg_signal(&pull.cache))));
        let level = pull.meter.update_avg(adjusted);
        controls.rx_level.store(u32::from(level), Ordering::Release);
    } else {
        pull.meter.silent();
        controls.rx_level.store(0, Ordering::Release);
    }
}

/// Mixes and delivers one sink. `acc` and `mixed` are executor-local scratch
/// buffers reused across jobs.
pub(crate) fn run_sink_job(
    job: &SinkJob,
    ctx: &TickContext,
    acc: &mut Vec<i32>,
    mixed: &mut Vec<i16>,
) {
    acc.clear();
    acc.resize(ctx.bridge_spf, 0);
    let mut contributors = 0usize;

    for src in &job.sources {
        if !src.controls.tx_enabled.load(Ordering::Acquire) {
            continue;
        }
        let rx_adj = src.controls.rx_adj();
        // Muted edges add nothing and do not dilute the mean.
        if src.edge_adj.is_mute() || rx_adj.is_mute() {
            continue;
        }

        let mut core = src.core.lock();
        materialize_source(&mut core, &src.controls, src.slot, ctx);
        if !core.pull.have_media {
            continue;
        }

        contributors += 1;
        if rx_adj.is_unity() && src.edge_adj.is_unity() {
            for (a, &s) in acc.iter_mut().zip(core.pull.cache.iter()) {
                *a += i32::from(s);
            }
        } else {
            for (a, &s) in acc.iter_mut().zip(core.pull.cache.iter()) {
                *a += src.edge_adj.apply(rx_adj.apply(i32::from(s)));
            }
        }
    }

    if contributors == 0 {
        // Every transmitter was silent: deliver a heartbeat silence frame so
        // the sink keeps observing the clock.
        let mut core = job.core.lock();
        core.push.meter.silent();
        job.controls.tx_level.store(0, Ordering::Release);
        deliver_silence(&mut core, job.slot);
        return;
    }

    let tx_adj = job.controls.tx_adj();
    let divisor = contributors as i32;
    mixed.clear();
    mixed.resize(ctx.bridge_spf, 0);
    for (m, &a) in mixed.iter_mut().zip(acc.iter()) {
        let mut v = tx_adj.apply(a);
        if divisor > 1 {
            v /= divisor;
        }
        *m = saturate16(v);
    }

    let mut core = job.core.lock();
    let level = core.push.meter.update(mixed);
    job.controls.tx_level.store(u32::from(level), Ordering::Release);
    deliver_sink(&mut core, job.slot, mixed);
}

/// Converts a mixed bridge frame to the sink's native format and pushes it.
fn deliver_sink(core: &mut PortCore, slot: SlotId, mixed: &[i16]) {
    let PortCore { port, push, .. } = core;
    let fmt = port.info().format;
    let port_spf = (fmt.samples_per_frame as usize).max(1);
    let channels = u64::from(fmt.channel_count.max(1));

    let data: &[i16] = match &mut push.resampler {
        Some(rs) => {
            rs.resample(mixed, &mut push.resampled);
            &push.resampled
        }
        None => mixed,
    };

    // Matching frame sizes skip the ring entirely.
    if push.ring.is_empty() && data.len() == port_spf {
        push.scratch.kind = FrameKind::Audio;
        push.scratch.samples.clear();
        push.scratch.samples.extend_from_slice(data);
        push.scratch.timestamp = push.timestamp;
        push.timestamp += port_spf as u64 / channels;
        if let Err(err) = port.push_frame(&push.scratch) {
            debug!(%slot, error = %err, "push_frame failed; frame dropped");
        }
        return;
    }

    let dropped = push.ring.push(data);
    if dropped > 0 {
        trace!(%slot, dropped, "sink ring overflow");
    }
    while push.ring.len() >= port_spf {
        push.scratch.kind = FrameKind::Audio;
        push.scratch.samples.resize(port_spf, 0);
        if !push.ring.pop(&mut push.scratch.samples) {
            break;
        }
        push.scratch.timestamp = push.timestamp;
        push.timestamp += port_spf as u64 / channels;
        if let Err(err) = port.push_frame(&push.scratch) {
            debug!(%slot, error = %err, "push_frame failed; frame dropped");
        }
    }
}

fn deliver_silence(core: &mut PortCore, slot: SlotId) {
    let PortCore { port, push, .. } = core;
    let fmt = port.info().format;
    let port_spf = (fmt.samples_per_frame as usize).max(1);
    let channels = u64::from(fmt.channel_count.max(1));

    push.scratch.samples.resize(port_spf, 0);
    push.scratch.make_silence();
    push.scratch.timestamp = push.timestamp;
    push.timestamp += port_spf as u64 / channels;
    if let Err(err) = port.push_frame(&push.scratch) {
        debug!(%slot, error = %err, "push_frame failed; frame dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{AudioFormat, MemoryPort, Port, PortInfo, SilencePort};
    use crate::registry::PortSlot;
    use tertulia_core::{Frame, ResampleQuality};

    fn fmt() -> AudioFormat {
        AudioFormat::new(8000, 1, 160)
    }

    fn make_slot(port: Box<dyn Port + Send>, name: &str) -> PortSlot {
        let info = port.info().clone();
        PortSlot::new(
            name.to_string(),
            info,
            port,
            fmt(),
            ResampleQuality::default(),
        )
    }

    fn job_from(sink: &PortSlot, sources: Vec<(&PortSlot, SlotId, LevelAdj)>) -> SinkJob {
        SinkJob {
            slot: SlotId(0),
            core: Arc::clone(&sink.core),
            controls: Arc::clone(&sink.controls),
            sources: sources
                .into_iter()
                .map(|(slot_data, slot, adj)| SourceRef {
                    slot,
                    core: Arc::clone(&slot_data.core),
                    controls: Arc::clone(&slot_data.controls),
                    edge_adj: adj,
                })
                .collect(),
        }
    }

    #[test]
    fn two_sources_mix_to_mean() {
        let a = make_slot(
            Box::new(MemoryPort::with_playback("a", fmt(), vec![6000; 160], true)),
            "a",
        );
        let b = make_slot(
            Box::new(MemoryPort::with_playback("b", fmt(), vec![2000; 160], true)),
            "b",
        );
        let sink_port = MemoryPort::new("sink", fmt());
        let captured = sink_port.capture_buffer();
        let sink = make_slot(Box::new(sink_port), "sink");

        let job = job_from(
            &sink,
            vec![
                (&a, SlotId(1), LevelAdj::UNITY),
                (&b, SlotId(2), LevelAdj::UNITY),
            ],
        );
        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        run_sink_job(&job, &ctx, &mut acc, &mut mixed);

        let data = captured.lock();
        assert_eq!(data.len(), 160);
        assert!(data.iter().all(|&s| s == 4000), "expected mean of 6000/2000");
    }

    #[test]
    fn muted_edge_does_not_dilute_mean() {
        let a = make_slot(
            Box::new(MemoryPort::with_playback("a", fmt(), vec![6000; 160], true)),
            "a",
        );
        let b = make_slot(
            Box::new(MemoryPort::with_playback("b", fmt(), vec![2000; 160], true)),
            "b",
        );
        let sink_port = MemoryPort::new("sink", fmt());
        let captured = sink_port.capture_buffer();
        let sink = make_slot(Box::new(sink_port), "sink");

        let job = job_from(
            &sink,
            vec![
                (&a, SlotId(1), LevelAdj::UNITY),
                (&b, SlotId(2), LevelAdj::MUTE),
            ],
        );
        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        run_sink_job(&job, &ctx, &mut acc, &mut mixed);

        let data = captured.lock();
        assert!(data.iter().all(|&s| s == 6000), "mute must not halve the mix");
    }

    #[test]
    fn source_pulled_once_across_two_sinks() {
        struct CountingPort {
            info: PortInfo,
            pulls: u32,
        }
        impl Port for CountingPort {
            fn info(&self) -> &PortInfo {
                &self.info
            }
            fn pull_frame(&mut self, frame: &mut Frame) -> crate::Result<()> {
                self.pulls += 1;
                frame.kind = FrameKind::Audio;
                frame.samples.resize(160, 0);
                frame.samples.fill(self.pulls as i16);
                Ok(())
            }
        }

        let src = make_slot(
            Box::new(CountingPort {
                info: PortInfo::audio("count", fmt()),
                pulls: 0,
            }),
            "count",
        );
        let sink1 = make_slot(Box::new(SilencePort::new("s1", fmt())), "s1");
        let sink2 = make_slot(Box::new(SilencePort::new("s2", fmt())), "s2");

        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        let job1 = job_from(&sink1, vec![(&src, SlotId(1), LevelAdj::UNITY)]);
        let job2 = job_from(&sink2, vec![(&src, SlotId(1), LevelAdj::UNITY)]);
        run_sink_job(&job1, &ctx, &mut acc, &mut mixed);
        run_sink_job(&job2, &ctx, &mut acc, &mut mixed);

        // Both sinks saw the same (single) pull.
        let core = src.core.lock();
        assert!(core.pull.have_media);
        assert_eq!(core.pull.cache[0], 1);
    }

    #[test]
    fn saturation_bounds_delivered_samples() {
        let a = make_slot(
            Box::new(MemoryPort::with_playback("a", fmt(), vec![30000; 160], true)),
            "a",
        );
        let sink_port = MemoryPort::new("sink", fmt());
        let captured = sink_port.capture_buffer();
        let sink = make_slot(Box::new(sink_port), "sink");
        // +128 doubles: 60000 must clamp to 32767.
        let job = job_from(&sink, vec![(&a, SlotId(1), LevelAdj::new(128).unwrap())]);

        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        run_sink_job(&job, &ctx, &mut acc, &mut mixed);

        let data = captured.lock();
        assert!(data.iter().all(|&s| s == 32767));
    }

    #[test]
    fn silent_tick_delivers_heartbeat() {
        let a = make_slot(Box::new(SilencePort::new("a", fmt())), "a");
        let sink_port = MemoryPort::new("sink", fmt());
        let captured = sink_port.capture_buffer();
        let sink = make_slot(Box::new(sink_port), "sink");
        let job = job_from(&sink, vec![(&a, SlotId(1), LevelAdj::UNITY)]);

        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        run_sink_job(&job, &ctx, &mut acc, &mut mixed);

        // MemoryPort records silence frames as zeros, keeping the timeline.
        let data = captured.lock();
        assert_eq!(data.len(), 160);
        assert!(data.iter().all(|&s| s == 0));
    }
}
