//! C5a-c/C6: time synchronization — autocorrelation detection, autocorrelation
//! peak refinement (coarse timing, β/CFO estimate), crosscorrelation fine-peak
//! search against the known STF template, and the `SyncChunk` state machine
//! that drives the three stages per worker (§4.7-§4.10).

pub mod autocorrelator_detection;
pub mod autocorrelator_peak;
pub mod crosscorrelator;
pub mod stf_template;
pub mod sync_chunk;
pub mod sync_report;
pub mod time_report;

pub use sync_chunk::SyncChunk;
pub use sync_report::SyncReport;
