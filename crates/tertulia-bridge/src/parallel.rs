//! Worker pool for the parallel tick.
//!
//! With `worker_threads = N > 0` the tick partitions its sink jobs across
//! N + 1 executors: the caller thread is executor 0, the pool provides the
//! rest. Dispatch and the per-tick barrier both ride crossbeam channels; a
//! worker signals done once per batch and the tick thread collects N signals
//! before returning. Workers exit when the job channel closes.
//!
//! Partitioning never affects the mix: each sink's sources are accumulated
//! in edge order by exactly one executor, so worker counts 0, 1, and N
//! produce bit-identical output.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::thread::JoinHandle;
use tracing::trace;

use crate::mix::{SinkJob, TickContext, run_sink_job};

struct Batch {
    jobs: Vec<SinkJob>,
    ctx: TickContext,
}

pub(crate) struct WorkerPool {
    job_tx: Option<Sender<Batch>>,
    done_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` mixing workers.
    pub fn new(threads: usize) -> Self {
        let (job_tx, job_rx) = unbounded::<Batch>();
        let (done_tx, done_rx) = unbounded::<()>();

        let handles = (0..threads)
            .map(|i| {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                std::thread::Builder::new()
                    .name(format!("tertulia-mix-{i}"))
                    .spawn(move || {
                        let mut acc = Vec::new();
                        let mut mixed = Vec::new();
                        while let Ok(batch) = job_rx.recv() {
                            for job in &batch.jobs {
                                run_sink_job(job, &batch.ctx, &mut acc, &mut mixed);
                            }
                            if done_tx.send(()).is_err() {
                                break;
                            }
                        }
                        trace!("mix worker exiting");
                    })
                    .expect("failed to spawn mix worker")
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            done_rx,
            handles,
        }
    }

    /// Number of pool workers (executors minus the caller thread).
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Runs one tick's jobs across the pool plus the caller thread.
    ///
    /// Jobs are dealt round-robin; the caller mixes its own share while the
    /// workers run theirs, then blocks until every worker reports done.
    pub fn run(
        &self,
        jobs: Vec<SinkJob>,
        ctx: TickContext,
        acc: &mut Vec<i32>,
        mixed: &mut Vec<i16>,
    ) {
        let executors = self.workers() + 1;
        let mut batches: Vec<Vec<SinkJob>> = (0..executors).map(|_| Vec::new()).collect();
        for (i, job) in jobs.into_iter().enumerate() {
            batches[i % executors].push(job);
        }

        let own = batches.remove(0);
        let tx = self.job_tx.as_ref().expect("pool already shut down");
        let dispatched = batches.len();
        for jobs in batches {
            let _ = tx.send(Batch { jobs, ctx });
        }

        for job in &own {
            run_sink_job(job, &ctx, acc, mixed);
        }

        for _ in 0..dispatched {
            let _ = self.done_rx.recv();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel wakes every worker out of recv.
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{AudioFormat, MemoryPort, Port};
    use crate::registry::{PortSlot, SlotId};
    use std::sync::Arc;
    use tertulia_core::{LevelAdj, ResampleQuality};

    fn fmt() -> AudioFormat {
        AudioFormat::new(8000, 1, 160)
    }

    #[test]
    fn pool_runs_all_jobs_and_barriers() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.workers(), 3);

        // Ten independent source -> sink pairs. The jobs hold `Arc` clones of
        // the port state, so the slot records themselves can drop.
        let mut captures = Vec::new();
        let mut jobs = Vec::new();
        for i in 0..10usize {
            let value = 100 * (i as i16 + 1);
            let src_port = MemoryPort::with_playback("src", fmt(), vec![value; 160], true);
            let src = PortSlot::new(
                "src".into(),
                src_port.info().clone(),
                Box::new(src_port),
                fmt(),
                ResampleQuality::default(),
            );
            let sink_port = MemoryPort::new("sink", fmt());
            captures.push(sink_port.capture_buffer());
            let sink = PortSlot::new(
                "sink".into(),
                sink_port.info().clone(),
                Box::new(sink_port),
                fmt(),
                ResampleQuality::default(),
            );
            jobs.push(crate::mix::SinkJob {
                slot: SlotId(i as u32 + 1),
                core: Arc::clone(&sink.core),
                controls: Arc::clone(&sink.controls),
                sources: vec![crate::mix::SourceRef {
                    slot: SlotId(0),
                    core: Arc::clone(&src.core),
                    controls: Arc::clone(&src.controls),
                    edge_adj: LevelAdj::UNITY,
                }],
            });
        }

        let ctx = TickContext {
            tick: 1,
            bridge_spf: 160,
        };
        let mut acc = Vec::new();
        let mut mixed = Vec::new();
        pool.run(jobs, ctx, &mut acc, &mut mixed);

        // The barrier guarantees every sink is delivered on return.
        for (i, cap) in captures.iter().enumerate() {
            let data = cap.lock();
            assert_eq!(data.len(), 160, "sink {i} not delivered");
            assert!(data.iter().all(|&s| s == 100 * (i as i16 + 1)));
        }
    }
}
