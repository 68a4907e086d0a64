//! C6 report: the outcome of one full synchronization attempt, handed from
//! sync workers to the MAC layer and to the RX-synced pipeline (§4.6, §6).

use crate::sample::SampleTime;
use crate::sync::time_report::FinePeak;

/// Outcome of a synchronization attempt over one chunk of RX samples.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    /// No packet was found in this chunk.
    NotFound,
    /// A packet start was found at `fine.time_64`, ready to be handed to the
    /// synchronized-RX pipeline.
    Found {
        fine: FinePeak,
        antenna_index: usize,
        chunk_start_time: SampleTime,
        /// β estimated by the coarse-peak frequency-domain sweep (§4.4),
        /// carried through so the RX-synced pipeline (§4.12) derives the
        /// packet's actual numerology instead of assuming β=1.
        beta: u32,
    },
}

impl SyncReport {
    pub fn is_found(&self) -> bool {
        matches!(self, SyncReport::Found { .. })
    }
}
