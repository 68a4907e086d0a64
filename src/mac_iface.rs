//! Upper-MAC boundary: the `TerminationPoint` callback interface, TX
//! descriptors, the job stream, HARQ buffers, and the PCC/PDC/MIMO reports
//! (§3 "TX descriptor"/"Job"/"HARQ buffer", §4.9-§4.12, §6
//! "Termination-point interface").
//!
//! Grounded on spec.md §6 directly; `upper/tpoint.hpp` is named in the
//! original source index but its body was not retrieved, so the trait here
//! is reconstructed from the five call sites enumerated in §6 and §4.10.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::sample::SampleTime;
use crate::sections_part3::packet_sizes::PacketSizes;
use crate::sync::sync_report::SyncReport;
use crate::sync::time_report::FinePeak;

/// Per-HARQ-process pair of decoded payload bytes and per-symbol LLRs, with
/// a write cursor tracking how much of `d_softbits` has been filled so far
/// this round (§3 "HARQ buffer"). Owned by the upper-MAC and handed to the
/// PHY through `PdcDecision::DecidePdc` so soft bits survive across
/// retransmissions of the same transport block (§7 "TB CRC failure...HARQ
/// state preserved for retransmission"): `rx_synced::process_pdc` combines
/// into it every round and only clears it once the TB's CRC passes.
#[derive(Debug, Clone, Default)]
pub struct HarqBuffer {
    pub a_bits: Vec<u8>,
    pub d_softbits: Vec<i8>,
    pub write_cursor: usize,
}

impl HarqBuffer {
    pub fn new(a_bits_capacity: usize, d_softbits_capacity: usize) -> Self {
        Self {
            a_bits: vec![0u8; a_bits_capacity],
            d_softbits: vec![0i8; d_softbits_capacity],
            write_cursor: 0,
        }
    }

    pub fn reset(&mut self) {
        self.a_bits.iter_mut().for_each(|b| *b = 0);
        self.d_softbits.iter_mut().for_each(|b| *b = 0);
        self.write_cursor = 0;
    }

    /// Appends soft bits at the current cursor, advancing it, overwriting
    /// whatever was there (first round, or any buffer never shared across
    /// retransmissions).
    pub fn push_softbits(&mut self, llrs: &[i8]) {
        let end = (self.write_cursor + llrs.len()).min(self.d_softbits.len());
        let n = end - self.write_cursor;
        self.d_softbits[self.write_cursor..end].copy_from_slice(&llrs[..n]);
        self.write_cursor = end;
    }

    /// Soft-combines newly demodulated LLRs into the buffer at the current
    /// cursor, adding into whatever a prior HARQ round already left there,
    /// then advances the cursor. This is chase combining: a retransmission
    /// is assumed to repeat the same coded-bit positions.
    pub fn combine_softbits(&mut self, llrs: &[i8]) {
        let end = (self.write_cursor + llrs.len()).min(self.d_softbits.len());
        let n = end - self.write_cursor;
        for (slot, &llr) in self.d_softbits[self.write_cursor..end].iter_mut().zip(llrs[..n].iter()) {
            *slot = slot.saturating_add(llr);
        }
        self.write_cursor = end;
    }

    /// Rewinds the cursor to the start without clearing the accumulated
    /// combine, so the next HARQ round re-walks the same positions.
    pub fn rewind(&mut self) {
        self.write_cursor = 0;
    }

    pub fn is_full(&self) -> bool {
        self.write_cursor >= self.d_softbits.len()
    }
}

/// PLCF type, blind-decoded from PCC (glossary "PLCF").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlcfType {
    Type1,
    Type2,
}

/// A successfully CRC-checked PLCF candidate.
#[derive(Debug, Clone)]
pub struct PlcfCandidate {
    pub plcf_type: PlcfType,
    pub bytes: Vec<u8>,
}

/// Supplied by upper-MAC: everything the TX pipeline (C12) needs to turn a
/// MAC transport block into samples (§3 "TX descriptor").
#[derive(Debug, Clone)]
pub struct TxDescriptor {
    pub packet_sizes: PacketSizes,
    pub codebook_index: u32,
    pub redundancy_version: u8,
    pub network_id: u32,
    pub plcf_type: PlcfType,
    pub tb_bytes: Vec<u8>,
    pub plcf_bytes: Vec<u8>,
    pub dac_scale: f32,
    pub optimal_scaling: bool,
    pub gi_percentage: u8,
    pub initial_iq_phase: f32,
    pub phase_increment_per_sample: f32,
}

/// A tagged union of the three job kinds flowing from sync workers to
/// TX/RX workers (§3 "Job", §4.9).
#[derive(Debug, Clone)]
pub enum Job {
    /// Emitted once per chunk that completes without a packet.
    Regular(TimeReport),
    /// A packet was found; carries the full sync report.
    Packet(SyncReport),
    /// An upper-MAC-scheduled callback whose deadline fell within the
    /// chunk just processed.
    Irregular { callback_id: u64, deadline: SampleTime },
}

/// Emitted whenever a chunk completes without yielding a packet (§3 "Time
/// report"). `barrier_time = max(chunk_time_end, sync_time_last)` — no
/// packet with a fine-peak time earlier than `barrier_time` will ever
/// arrive after this report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeReport {
    pub chunk_time_end: SampleTime,
    pub sync_time_last: SampleTime,
    pub barrier_time: SampleTime,
}

impl TimeReport {
    pub fn new(chunk_time_end: SampleTime, sync_time_last: SampleTime) -> Self {
        Self {
            chunk_time_end,
            sync_time_last,
            barrier_time: chunk_time_end.max(sync_time_last),
        }
    }
}

/// Returned by `work_pcc`: the MAC's decision on whether to continue to
/// PDC, and if so with which HARQ context (§4.12 "PDC decode"). The
/// upper-MAC has already parsed the winning PLCF candidate by this point,
/// so `packet_sizes` carries the transport block's actual negotiated
/// numerology/MCS/packet-length record rather than leaving PDC to assume a
/// fixed nominal configuration, and `harq_buffer` is the process's own
/// persistent soft-combine state (§4.12 "it supplies a maclow_phy
/// containing the packet-sizes record, the HARQ buffer, redundancy
/// version, and network id").
#[derive(Debug, Clone)]
pub enum PdcDecision {
    Drop,
    DecidePdc {
        redundancy_version: u8,
        network_id: u32,
        packet_sizes: PacketSizes,
        harq_buffer: Arc<Mutex<HarqBuffer>>,
    },
}

/// Result of PCC demodulation + blind PLCF decode, handed to `work_pcc`
/// (§4.12 "PLCF blind decode").
#[derive(Debug, Clone)]
pub struct PccReport {
    pub fine_peak: FinePeak,
    pub candidates: Vec<PlcfCandidate>,
    pub snr_db: f32,
}

impl PccReport {
    pub fn has_valid_plcf(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// MIMO channel-quality report computed from the latest-packet-end DRS
/// channel estimates across all transmit streams (§4.12 "Reports").
#[derive(Debug, Clone, Default)]
pub struct MimoReport {
    pub n_eff_tx: u32,
    pub per_stream_power: Vec<f32>,
    pub condition_number_estimate: f32,
}

/// Outcome of MAC-PDU / transport-block decoding (§4.12).
#[derive(Debug, Clone)]
pub struct PdcReport {
    pub tb_bytes: Vec<u8>,
    pub crc_ok: bool,
    pub snr_db: f32,
    pub mimo: MimoReport,
}

/// TX descriptors the upper-MAC wants transmitted as a side effect of a
/// `work_*` callback (§4.10 "act on the returned TX descriptors").
#[derive(Debug, Clone, Default)]
pub struct MacHighPhy {
    pub tx_descriptors: Vec<TxDescriptor>,
}

impl MacHighPhy {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The upper-MAC / termination-point callback surface (§6). Invoked from
/// TX/RX workers (C11) under the token (C8), serializing entry for one
/// logical PHY–radio pair.
pub trait TerminationPoint: Send + Sync {
    /// Called exactly once, by the last worker to arrive at the baton's
    /// startup barrier (§4.7 `register_and_wait_for_others`).
    fn work_start_imminent(&self, start_time: SampleTime);

    fn work_regular(&self, report: TimeReport) -> MacHighPhy;

    fn work_pcc(&self, report: PccReport) -> (PdcDecision, MacHighPhy);

    fn work_pdc(&self, report: PdcReport) -> MacHighPhy;

    fn work_irregular(&self, callback_id: u64) -> MacHighPhy;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_report_barrier_is_max_of_the_two() {
        let tr = TimeReport::new(100, 150);
        assert_eq!(tr.barrier_time, 150);
        let tr2 = TimeReport::new(200, 50);
        assert_eq!(tr2.barrier_time, 200);
    }

    #[test]
    fn harq_buffer_push_softbits_advances_cursor() {
        let mut harq = HarqBuffer::new(4, 8);
        harq.push_softbits(&[1, 2, 3]);
        assert_eq!(harq.write_cursor, 3);
        harq.push_softbits(&[4, 5, 6]);
        assert_eq!(harq.write_cursor, 6);
        assert!(!harq.is_full());
    }

    #[test]
    fn harq_buffer_combine_softbits_accumulates_across_rounds() {
        let mut harq = HarqBuffer::new(0, 4);
        harq.combine_softbits(&[1, -2, 3, -4]);
        assert_eq!(harq.d_softbits, vec![1, -2, 3, -4]);
        harq.rewind();
        assert_eq!(harq.write_cursor, 0);
        harq.combine_softbits(&[1, -2, 3, -4]);
        assert_eq!(harq.d_softbits, vec![2, -4, 6, -8], "a second identical round should double the confidence");
    }

    #[test]
    fn pcc_report_without_candidates_has_no_valid_plcf() {
        let report = PccReport {
            fine_peak: FinePeak { time_64: 0, n_eff_tx_template_idx: 0, correlation_peak: 0.0 },
            candidates: Vec::new(),
            snr_db: 10.0,
        };
        assert!(!report.has_valid_plcf());
    }
}
