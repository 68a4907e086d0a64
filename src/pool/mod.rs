//! The worker-pool concurrency core (§2 C7-C11, §5): baton-serialized sync
//! workers feeding a job queue drained by token-serialized TX/RX workers.

pub mod baton;
pub mod job_queue;
pub mod token;
pub mod worker_pool;
pub mod worker_sync;
pub mod worker_tx_rx;
