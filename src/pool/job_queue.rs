//! C9: the job queue, an MPSC bounded queue carrying jobs from sync workers
//! to TX/RX workers (§3 "Job", §4.9, §4.10).
//!
//! Grounded on `pool/job_queue.hpp` (named in the original source index;
//! the interface is reconstructed from spec.md §3/§4.9) and the teacher's
//! `crossbeam::queue::ArrayQueue` usage in `engine/router.rs`. Producers
//! (sync workers) coordinate via the baton to avoid order inversion (§5
//! "Shared-resource policy"); the channel itself only needs to be
//! multi-producer/multi-consumer-safe, which `crossbeam::channel` is.

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender};

use crate::mac_iface::Job;

const DEQUEUE_POLL: Duration = Duration::from_millis(100);

/// Producer handle, cloned once per sync worker.
#[derive(Clone)]
pub struct JobQueueProducer {
    tx: Sender<Job>,
}

impl JobQueueProducer {
    /// Enqueues a job, blocking if the bounded queue is full (backpressure
    /// from a TX/RX worker pool that is not keeping up).
    pub fn enqueue(&self, job: Job) -> Result<(), SendError<Job>> {
        self.tx.send(job)
    }
}

/// Consumer handle, cloned once per TX/RX worker.
#[derive(Clone)]
pub struct JobQueueConsumer {
    rx: Receiver<Job>,
}

impl JobQueueConsumer {
    /// Pops the next job, polling for shutdown every 100ms (§5 "Suspension
    /// points"). Returns `None` on a poll timeout (caller re-checks
    /// `keep_running`) or when every producer has dropped (queue closed).
    pub fn dequeue(&self, keep_running: &std::sync::atomic::AtomicBool) -> Option<Job> {
        loop {
            match self.rx.recv_timeout(DEQUEUE_POLL) {
                Ok(job) => return Some(job),
                Err(RecvTimeoutError::Timeout) => {
                    if !keep_running.load(std::sync::atomic::Ordering::Relaxed) {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Constructs a bounded job queue with `capacity` slots (§6
/// `worker_pool_config.nof_jobs`).
pub fn job_queue(capacity: usize) -> (JobQueueProducer, JobQueueConsumer) {
    let (tx, rx) = bounded(capacity);
    (JobQueueProducer { tx }, JobQueueConsumer { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_iface::TimeReport;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn fifo_order_preserved() {
        let (tx, rx) = job_queue(8);
        let keep_running = AtomicBool::new(true);
        for i in 0..4 {
            tx.enqueue(Job::Regular(TimeReport::new(i, i))).unwrap();
        }
        for i in 0..4 {
            let job = rx.dequeue(&keep_running).expect("job present");
            match job {
                Job::Regular(tr) => assert_eq!(tr.chunk_time_end, i),
                _ => panic!("wrong job variant"),
            }
        }
    }

    #[test]
    fn dequeue_returns_none_after_shutdown_with_no_producers() {
        let (tx, rx) = job_queue(1);
        drop(tx);
        let keep_running = AtomicBool::new(true);
        assert!(rx.dequeue(&keep_running).is_none());
    }

    #[test]
    fn multiple_producers_can_enqueue() {
        let (tx, rx) = job_queue(16);
        let tx2 = tx.clone();
        tx.enqueue(Job::Irregular { callback_id: 1, deadline: 10 }).unwrap();
        tx2.enqueue(Job::Irregular { callback_id: 2, deadline: 20 }).unwrap();
        let keep_running = AtomicBool::new(true);
        assert!(rx.dequeue(&keep_running).is_some());
        assert!(rx.dequeue(&keep_running).is_some());
    }
}
