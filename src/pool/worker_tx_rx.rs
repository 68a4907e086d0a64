//! C11: the TX/RX worker thread, draining the job queue and dispatching
//! into the upper-MAC under the token (§4.10).
//!
//! Grounded on `pool/worker_tx_rx.hpp`'s dispatch loop: pop a job, acquire
//! the token in FIFO order, call the matching `TerminationPoint` method,
//! act on any returned TX descriptors, release the token.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::mac_iface::{Job, MacHighPhy, PdcDecision, PccReport, PdcReport, TerminationPoint, TxDescriptor};
use crate::pool::job_queue::JobQueueConsumer;
use crate::pool::token::Token;
use crate::ring::rx_ring::RxRing;
use crate::ring::tx_ring::TxBufferPool;
use crate::sample::SampleTime;
use crate::sync::sync_report::SyncReport;

/// Produces PCC/PDC reports for a found packet, bridging a `SyncReport`
/// into the synchronized-RX pipeline (C13). Implemented by
/// [`crate::rx_synced::RxSynced`].
pub trait SyncedRxProcessor: Send + Sync {
    fn process_pcc(&self, ring: &dyn RxRing, sync_report: &SyncReport) -> PccReport;
    fn process_pdc(&self, ring: &dyn RxRing, sync_report: &SyncReport, decision: &PdcDecision) -> PdcReport;
}

/// Renders one TX descriptor into a claimed TX buffer. Implemented by
/// [`crate::tx::TxPipeline`].
pub trait TxRenderer: Send + Sync {
    fn render(&self, descriptor: &TxDescriptor, tx_time_hint: SampleTime, tx_buffers: &TxBufferPool);
}

/// Parameters for one TX/RX worker (§6 `worker_pool_config` subset).
pub struct TxRxWorkerConfig {
    pub id: u32,
    /// This worker's index into the token's per-caller FIFO counter array.
    pub token_caller_id: u32,
}

/// Runs the §4.10 dispatch loop on the calling thread.
pub fn run_tx_rx_worker<R: RxRing + ?Sized>(
    cfg: TxRxWorkerConfig,
    ring: Arc<R>,
    jobs: JobQueueConsumer,
    token: Arc<Token>,
    termination_point: Arc<dyn TerminationPoint>,
    synced_rx: Arc<dyn SyncedRxProcessor>,
    tx_renderer: Arc<dyn TxRenderer>,
    tx_buffers: Arc<TxBufferPool>,
    keep_running: Arc<AtomicBool>,
) {
    let mut expected_cnt: u64 = 0;

    loop {
        // `dequeue` only returns `None` once shutdown has been requested or
        // every producer has dropped — either way there is no more work.
        let job = match jobs.dequeue(&keep_running) {
            Some(job) => job,
            None => break,
        };

        if !token.lock_fifo(cfg.token_caller_id, expected_cnt, &keep_running) {
            break;
        }

        let mac = dispatch(&job, ring.as_ref(), termination_point.as_ref(), synced_rx.as_ref());
        act_on_tx_descriptors(&mac, tx_renderer.as_ref(), tx_buffers.as_ref());

        token.unlock();
        expected_cnt += 1;
    }
}

fn dispatch<R: RxRing + ?Sized>(
    job: &Job,
    ring: &R,
    termination_point: &dyn TerminationPoint,
    synced_rx: &dyn SyncedRxProcessor,
) -> MacHighPhy {
    match job {
        Job::Regular(report) => termination_point.work_regular(*report),
        Job::Irregular { callback_id, .. } => termination_point.work_irregular(*callback_id),
        Job::Packet(sync_report) => {
            let pcc_report: PccReport = synced_rx.process_pcc(ring, sync_report);
            let (decision, mut mac) = termination_point.work_pcc(pcc_report);
            if let PdcDecision::DecidePdc { .. } = &decision {
                let pdc_report: PdcReport = synced_rx.process_pdc(ring, sync_report, &decision);
                let pdc_mac = termination_point.work_pdc(pdc_report);
                mac.tx_descriptors.extend(pdc_mac.tx_descriptors);
            }
            mac
        }
    }
}

fn act_on_tx_descriptors(mac: &MacHighPhy, tx_renderer: &dyn TxRenderer, tx_buffers: &TxBufferPool) {
    for descriptor in &mac.tx_descriptors {
        // No tx_time hint is known at this layer yet; the renderer derives
        // the schedule from `descriptor` plus its own pacing state (§4.13).
        tx_renderer.render(descriptor, 0, tx_buffers);
    }
}

/// Spawns [`run_tx_rx_worker`] on a new OS thread.
#[allow(clippy::too_many_arguments)]
pub fn spawn_tx_rx_worker<R: RxRing + ?Sized + 'static>(
    cfg: TxRxWorkerConfig,
    ring: Arc<R>,
    jobs: JobQueueConsumer,
    token: Arc<Token>,
    termination_point: Arc<dyn TerminationPoint>,
    synced_rx: Arc<dyn SyncedRxProcessor>,
    tx_renderer: Arc<dyn TxRenderer>,
    tx_buffers: Arc<TxBufferPool>,
    keep_running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("dectnrp-txrx-{}", cfg.id))
        .spawn(move || {
            run_tx_rx_worker(cfg, ring, jobs, token, termination_point, synced_rx, tx_renderer, tx_buffers, keep_running)
        })
        .expect("failed to spawn tx/rx worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_iface::{MimoReport, TimeReport};
    use crate::pool::job_queue::job_queue;
    use crate::ring::rx_ring::InMemoryRxRing;
    use crate::sync::time_report::FinePeak;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct CountingTerminationPoint {
        regular_calls: AtomicU32,
    }

    impl TerminationPoint for CountingTerminationPoint {
        fn work_start_imminent(&self, _start_time: SampleTime) {}

        fn work_regular(&self, _report: TimeReport) -> MacHighPhy {
            self.regular_calls.fetch_add(1, Ordering::SeqCst);
            MacHighPhy::empty()
        }

        fn work_pcc(&self, _report: PccReport) -> (PdcDecision, MacHighPhy) {
            (PdcDecision::Drop, MacHighPhy::empty())
        }

        fn work_pdc(&self, _report: PdcReport) -> MacHighPhy {
            MacHighPhy::empty()
        }

        fn work_irregular(&self, _callback_id: u64) -> MacHighPhy {
            MacHighPhy::empty()
        }
    }

    struct StubSyncedRx;
    impl SyncedRxProcessor for StubSyncedRx {
        fn process_pcc(&self, _ring: &dyn RxRing, _sync_report: &SyncReport) -> PccReport {
            PccReport {
                fine_peak: FinePeak { time_64: 0, n_eff_tx_template_idx: 0, correlation_peak: 0.0 },
                candidates: Vec::new(),
                snr_db: 0.0,
            }
        }

        fn process_pdc(&self, _ring: &dyn RxRing, _sync_report: &SyncReport, _decision: &PdcDecision) -> PdcReport {
            PdcReport { tb_bytes: Vec::new(), crc_ok: false, snr_db: 0.0, mimo: MimoReport::default() }
        }
    }

    struct NoopRenderer {
        calls: StdMutex<u32>,
    }
    impl TxRenderer for NoopRenderer {
        fn render(&self, _descriptor: &TxDescriptor, _tx_time_hint: SampleTime, _tx_buffers: &TxBufferPool) {
            *self.calls.lock().unwrap() += 1;
        }
    }

    #[test]
    fn regular_job_invokes_work_regular_and_releases_token() {
        let ring = Arc::new(InMemoryRxRing::new(1, 64, 1_000_000));
        let (tx, rx) = job_queue(4);
        let token = Arc::new(Token::new(1));
        let tp = Arc::new(CountingTerminationPoint { regular_calls: AtomicU32::new(0) });
        let synced_rx = Arc::new(StubSyncedRx);
        let renderer = Arc::new(NoopRenderer { calls: StdMutex::new(0) });
        let tx_buffers = Arc::new(TxBufferPool::new(1, 1, 16));
        let keep_running = Arc::new(AtomicBool::new(true));

        tx.enqueue(Job::Regular(TimeReport::new(100, 0))).unwrap();
        drop(tx);

        let kr = Arc::clone(&keep_running);
        run_tx_rx_worker(
            TxRxWorkerConfig { id: 0, token_caller_id: 0 },
            ring,
            rx,
            token,
            tp.clone(),
            synced_rx,
            renderer,
            tx_buffers,
            kr,
        );

        assert_eq!(tp.regular_calls.load(Ordering::SeqCst), 1);
    }
}
