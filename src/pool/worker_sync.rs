//! C10: the sync-worker thread, driving one [`SyncChunk`] per pass and
//! coordinating job-queue enqueue through the baton (§4.9).
//!
//! Grounded on `pool/worker_sync.hpp`'s work loop: warmup, baton-barrier
//! startup, then repeatedly search-buffer-enqueue until shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::dsp::resampler::RESAMPLER_PARAM_SYNC;
use crate::mac_iface::{Job, TimeReport};
use crate::pacer::{LocalBufferMode, Pacer};
use crate::pool::baton::Baton;
use crate::pool::job_queue::JobQueueProducer;
use crate::ring::rx_ring::RxRing;
use crate::sample::SampleTime;
use crate::sync::sync_chunk::SyncChunk;
use crate::sync::sync_report::SyncReport;

/// Source of upper-MAC-scheduled irregular callbacks (§3 "Job" variant
/// `irregular`, §4.9 "Before joining the job queue..."). A sync worker
/// drains every callback whose deadline falls within the chunk interval it
/// just processed.
pub trait IrregularCallbackSource: Send + Sync {
    /// Removes and returns every `(callback_id, deadline)` with
    /// `deadline <= until`.
    fn drain_due(&self, until: SampleTime) -> Vec<(u64, SampleTime)>;
}

/// Simple in-memory callback source a `TerminationPoint` implementation can
/// push scheduled callbacks into.
#[derive(Default)]
pub struct ScheduledCallbacks {
    pending: parking_lot::Mutex<Vec<(u64, SampleTime)>>,
}

impl ScheduledCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, callback_id: u64, deadline: SampleTime) {
        self.pending.lock().push((callback_id, deadline));
    }
}

impl IrregularCallbackSource for ScheduledCallbacks {
    fn drain_due(&self, until: SampleTime) -> Vec<(u64, SampleTime)> {
        let mut pending = self.pending.lock();
        let (due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|&(_, d)| d <= until);
        *pending = rest;
        due
    }
}

/// Per-worker chunk geometry (§4.6): `chunk_stride = chunk_length ×
/// nof_sync_workers`, `chunk_offset = chunk_length × worker_id`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGeometry {
    pub chunk_length: SampleTime,
    pub chunk_stride: SampleTime,
    pub chunk_offset: SampleTime,
}

impl ChunkGeometry {
    pub fn new(worker_id: u32, nof_sync_workers: u32, chunk_length: SampleTime) -> Self {
        Self {
            chunk_length,
            chunk_stride: chunk_length * nof_sync_workers as SampleTime,
            chunk_offset: chunk_length * worker_id as SampleTime,
        }
    }

    /// Snaps `t_start` to the next multiple of `chunk_stride` plus
    /// `chunk_offset` (§4.6 `wait_for_first_chunk`).
    pub fn wait_for_first_chunk(&self, t_start: SampleTime) -> SampleTime {
        let base = (t_start - self.chunk_offset).div_euclid(self.chunk_stride) * self.chunk_stride;
        let candidate = base + self.chunk_offset;
        if candidate >= t_start {
            candidate
        } else {
            candidate + self.chunk_stride
        }
    }
}

/// Parameters for one sync worker (§6 `worker_pool_config` subset).
pub struct SyncWorkerConfig {
    pub id: u32,
    pub geometry: ChunkGeometry,
    pub max_bufferable_syncs: usize,
    pub warmup_samples: SampleTime,
    /// Radio device class's minimum oversampling factor (§6
    /// `worker_pool_config.os_min`): the ratio of the ring's hardware
    /// sample rate to the DECT nominal rate this PHY instance's sync
    /// pipeline operates at. Drives the pacer's (L=1, M=os_min) rational
    /// resampling (§4.1/§4.2); `1` means the ring is already at nominal
    /// rate and the pacer resamples as a no-op pass-through.
    pub os_min: u32,
}

/// Runs the §4.9 work loop on the calling thread. Spawned by
/// [`crate::pool::worker_pool::WorkerPool`].
pub fn run_sync_worker<R: RxRing + ?Sized>(
    cfg: SyncWorkerConfig,
    mut chunk: SyncChunk,
    ring: Arc<R>,
    baton: Arc<Baton>,
    job_tx: JobQueueProducer,
    callbacks: Arc<dyn IrregularCallbackSource>,
    on_start: Arc<dyn Fn(SampleTime) + Send + Sync>,
    keep_running: Arc<AtomicBool>,
) {
    // (1) Warmup: absorb the radio's initial burst with dummy searches.
    if cfg.warmup_samples > 0 {
        let _ = ring.wait_until(cfg.warmup_samples);
    }

    // (2) Establish the common start time across the pool. The last worker
    // to arrive invokes `work_start_imminent` exactly once (§4.7).
    let now = ring.current_time();
    let start = baton.register_and_wait_for_others(now, |chosen| on_start(chosen));

    let mut chunk_start = cfg.geometry.wait_for_first_chunk(start);

    let mut buffered: Vec<SyncReport> = Vec::with_capacity(cfg.max_bufferable_syncs);
    let mut holding_baton = false;

    // §4.2: the detection/peak-refinement stages run on the resampled
    // local buffer at the DECT nominal rate, not on raw ring samples —
    // the pacer sits between the two exactly as it does in
    // `rx_synced::process_pdc`'s preparation stage.
    let nof_ant = ring.nof_antennas().max(1);
    let mut pacer = Pacer::new(nof_ant, 1, cfg.os_min.max(1), RESAMPLER_PARAM_SYNC);

    while keep_running.load(Ordering::Relaxed) {
        let chunk_end = chunk_start + cfg.geometry.chunk_length;
        let chunk_length = cfg.geometry.chunk_length as usize;

        pacer.reset_localbuffer(LocalBufferMode::Resample, chunk_start);
        pacer.resample_until(ring.as_ref(), chunk_length);
        let ant_samples: Vec<Vec<crate::sample::Sample>> = (0..nof_ant)
            .map(|ant| {
                let buf = pacer.antenna(ant);
                buf[..buf.len().min(chunk_length)].to_vec()
            })
            .collect();

        // §4.9: run `chunk.search()` in a loop, buffering up to
        // `max_bufferable_syncs` reports per chunk rather than stopping at
        // the first packet found — a chunk's overlap region can straddle
        // more than one packet.
        chunk.reset(ant_samples.len());
        let mut any_packet_found = false;
        loop {
            let report = chunk.process(&ant_samples, chunk_start);
            if !report.is_found() {
                break;
            }
            any_packet_found = true;
            if buffered.len() < cfg.max_bufferable_syncs && !holding_baton {
                buffered.push(report);
            } else {
                if !holding_baton {
                    holding_baton = baton.wait_to(cfg.id, &keep_running);
                }
                if holding_baton {
                    drain_buffered(&mut buffered, &baton, &job_tx);
                    enqueue_if_unique(&report, &baton, &job_tx);
                } else {
                    // Shutdown requested while waiting for the baton: stop
                    // draining this chunk, the outer loop exits next check.
                    break;
                }
            }
        }

        if !any_packet_found && baton.is_job_regular_due() {
            if !holding_baton {
                holding_baton = baton.wait_to(cfg.id, &keep_running);
            }
            if holding_baton {
                drain_buffered(&mut buffered, &baton, &job_tx);
                let tr = TimeReport::new(chunk_end, baton.sync_time_last());
                let _ = job_tx.enqueue(Job::Regular(tr));
            }
        }

        if holding_baton {
            for (callback_id, deadline) in callbacks.drain_due(chunk_end) {
                let _ = job_tx.enqueue(Job::Irregular { callback_id, deadline });
            }
            baton.pass_on(cfg.id);
            holding_baton = false;
        }

        chunk_start += cfg.geometry.chunk_stride;
    }
}

fn drain_buffered(buffered: &mut Vec<SyncReport>, baton: &Baton, job_tx: &JobQueueProducer) {
    for report in buffered.drain(..) {
        enqueue_if_unique(&report, baton, job_tx);
    }
}

fn enqueue_if_unique(report: &SyncReport, baton: &Baton, job_tx: &JobQueueProducer) {
    if let SyncReport::Found { fine, .. } = report {
        if baton.is_sync_time_unique(fine.time_64) {
            let _ = job_tx.enqueue(Job::Packet(report.clone()));
        }
    }
}

/// Spawns [`run_sync_worker`] on a new OS thread, returning its join handle
/// (§5 "Scheduling model": preemptive OS threads, no coroutines).
pub fn spawn_sync_worker<R: RxRing + ?Sized + 'static>(
    cfg: SyncWorkerConfig,
    chunk: SyncChunk,
    ring: Arc<R>,
    baton: Arc<Baton>,
    job_tx: JobQueueProducer,
    callbacks: Arc<dyn IrregularCallbackSource>,
    on_start: Arc<dyn Fn(SampleTime) + Send + Sync>,
    keep_running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("dectnrp-sync-{}", cfg.id))
        .spawn(move || run_sync_worker(cfg, chunk, ring, baton, job_tx, callbacks, on_start, keep_running))
        .expect("failed to spawn sync worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_geometry_offsets_are_disjoint() {
        let g0 = ChunkGeometry::new(0, 2, 1000);
        let g1 = ChunkGeometry::new(1, 2, 1000);
        assert_eq!(g0.chunk_stride, 2000);
        assert_eq!(g1.chunk_offset, 1000);
    }

    #[test]
    fn wait_for_first_chunk_snaps_forward() {
        let g = ChunkGeometry::new(1, 2, 1000);
        let snapped = g.wait_for_first_chunk(1500);
        assert!(snapped >= 1500);
        assert_eq!((snapped - g.chunk_offset) % g.chunk_stride, 0);
    }

    #[test]
    fn scheduled_callbacks_drain_only_due_ones() {
        let callbacks = ScheduledCallbacks::new();
        callbacks.schedule(1, 500);
        callbacks.schedule(2, 1500);
        let due = callbacks.drain_due(1000);
        assert_eq!(due, vec![(1, 500)]);
        let due2 = callbacks.drain_due(2000);
        assert_eq!(due2, vec![(2, 1500)]);
    }
}
