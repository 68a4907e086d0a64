//! Top-level worker-pool orchestrator (§2 C7-C11, §5): owns the baton,
//! token, and job queue, and spawns the sync and TX/RX worker threads.
//!
//! Grounded on the teacher's `engine::router::Router` (start/stop/Drop
//! around a background thread, `AtomicU64` metrics bundle) generalized from
//! one thread to a whole pool of them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::WorkerPoolConfig;
use crate::mac_iface::TerminationPoint;
use crate::pool::baton::Baton;
use crate::pool::job_queue::job_queue;
use crate::pool::token::Token;
use crate::pool::worker_sync::{spawn_sync_worker, ChunkGeometry, IrregularCallbackSource, SyncWorkerConfig};
use crate::pool::worker_tx_rx::{spawn_tx_rx_worker, SyncedRxProcessor, TxRenderer, TxRxWorkerConfig};
use crate::ring::rx_ring::RxRing;
use crate::ring::tx_ring::TxBufferPool;
use crate::sync::sync_chunk::SyncChunk;

/// Pool-wide counters, mirroring the teacher's `RouterMetrics` bundle.
#[derive(Default)]
pub struct WorkerPoolMetrics {
    pub chunks_processed: AtomicU64,
    pub packets_found: AtomicU64,
    pub regular_jobs_emitted: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Owns every background thread for one logical PHY instance: `N`
/// baton-serialized sync workers feeding a bounded job queue drained by `M`
/// token-serialized TX/RX workers (§5).
pub struct WorkerPool {
    keep_running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    pub baton: Arc<Baton>,
    pub token: Arc<Token>,
    pub metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    /// Spawns `cfg.nof_worker_sync` sync workers and `cfg.nof_worker_tx_rx`
    /// TX/RX workers, wiring them through a freshly created baton, token,
    /// and job queue.
    ///
    /// `make_chunk` builds the per-worker synchronization pipeline (each
    /// sync worker owns its own detector/peak/crosscorrelator state, so a
    /// factory is used rather than sharing one `SyncChunk`).
    #[allow(clippy::too_many_arguments)]
    pub fn start<R>(
        cfg: &WorkerPoolConfig,
        ring: Arc<R>,
        make_chunk: impl Fn(u32) -> SyncChunk,
        termination_point: Arc<dyn TerminationPoint>,
        synced_rx: Arc<dyn SyncedRxProcessor>,
        tx_renderer: Arc<dyn TxRenderer>,
        tx_buffers: Arc<TxBufferPool>,
        callbacks: Arc<dyn IrregularCallbackSource>,
    ) -> Self
    where
        R: RxRing + ?Sized + 'static,
    {
        let keep_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(WorkerPoolMetrics::new());

        // sync_time_unique_limit uses one chunk's length as the overlap
        // window two adjacent sync workers can both report the same packet
        // start within (§4.7).
        let sync_time_unique_limit = cfg.rx_chunk_length_u8subslot as i64;
        let baton = Arc::new(Baton::new(
            cfg.nof_worker_sync,
            sync_time_unique_limit.max(1),
            cfg.rx_job_regular_period,
        ));
        let token = Arc::new(Token::new(cfg.nof_worker_tx_rx as usize));
        let (job_tx, job_rx) = job_queue(cfg.nof_jobs);

        let mut handles = Vec::with_capacity((cfg.nof_worker_sync + cfg.nof_worker_tx_rx) as usize);

        let on_start: Arc<dyn Fn(crate::sample::SampleTime) + Send + Sync> = {
            let termination_point = Arc::clone(&termination_point);
            Arc::new(move |start_time| termination_point.work_start_imminent(start_time))
        };

        for id in 0..cfg.nof_worker_sync {
            let geometry = ChunkGeometry::new(id, cfg.nof_worker_sync, cfg.rx_chunk_length_u8subslot as i64);
            let sync_cfg = SyncWorkerConfig {
                id,
                geometry,
                max_bufferable_syncs: cfg.max_bufferable_syncs,
                warmup_samples: 0,
                os_min: cfg.os_min,
            };
            let handle = spawn_sync_worker(
                sync_cfg,
                make_chunk(id),
                Arc::clone(&ring),
                Arc::clone(&baton),
                job_tx.clone(),
                Arc::clone(&callbacks),
                Arc::clone(&on_start),
                Arc::clone(&keep_running),
            );
            handles.push(handle);
        }

        for id in 0..cfg.nof_worker_tx_rx {
            let handle = spawn_tx_rx_worker(
                TxRxWorkerConfig { id, token_caller_id: id },
                Arc::clone(&ring),
                job_rx.clone(),
                Arc::clone(&token),
                Arc::clone(&termination_point),
                Arc::clone(&synced_rx),
                Arc::clone(&tx_renderer),
                Arc::clone(&tx_buffers),
                Arc::clone(&keep_running),
            );
            handles.push(handle);
        }
        drop(job_tx);
        drop(job_rx);

        Self { keep_running, handles, baton, token, metrics }
    }

    /// Signals shutdown and joins every worker thread.
    pub fn stop(mut self) -> std::thread::Result<()> {
        self.keep_running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            handle.join()?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_start_at_zero() {
        let metrics = WorkerPoolMetrics::new();
        assert_eq!(metrics.chunks_processed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.packets_found.load(Ordering::Relaxed), 0);
    }
}
