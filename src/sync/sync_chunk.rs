//! C6: synchronization over one RX chunk, chaining the coarse detector, peak
//! refiner, and crosscorrelator into a resumable stream of `SyncReport`s
//! (§4.6).
//!
//! Grounded on `sync_chunk.hpp/.cpp`, which owns one `AutocorrelatorDetection`
//! / `AutocorrelatorPeak` / `Crosscorrelator` triple per antenna and per
//! candidate packet-size hypothesis. Per §4.6, a chunk covers
//! `[chunk_time_start, chunk_time_start+A)` with detector search extending to
//! `A+B` (the overlap region), coarse-peak refinement to `A+B+C`, and the
//! crosscorrelator to `A+B+C+D`; since this pipeline is handed one flat,
//! already-overlap-inclusive sample buffer per chunk (no separate
//! localbuffer modes), `refine_window`/`xcorr_window` bound the
//! coarse-detection scan so every accepted index still has `C+D` worth of
//! trailing samples for the later stages to search.
//!
//! Per §2/§4.9 a chunk can hold more than one packet: [`Self::reset`] rearms
//! the detectors and the scan cursor for a new `chunk_start_time`, and each
//! [`Self::process`] call resumes from the cursor, returning `Found` as soon
//! as a packet turns up (leaving the cursor just past it so the next call
//! continues the same chunk) and `NotFound` once the cursor reaches the end
//! of the scan — the caller loops `process` until `NotFound` to drain every
//! packet buffered in one chunk.

use crate::sample::{Sample, SampleTime};
use crate::sync::autocorrelator_detection::AutocorrelatorDetection;
use crate::sync::autocorrelator_peak::AutocorrelatorPeak;
use crate::sync::crosscorrelator::Crosscorrelator;
use crate::sync::sync_report::SyncReport;

pub struct SyncChunk {
    /// One detector instance per antenna, cloned from a shared prototype so
    /// each antenna's sliding sums evolve independently (§4.3/§4.6).
    detectors: Vec<AutocorrelatorDetection>,
    peak: AutocorrelatorPeak,
    crosscorr: Crosscorrelator,
    refine_window: usize,
    xcorr_window: usize,
    /// Index into the current chunk's sample buffer the scan will resume
    /// from on the next `process` call (§4.9 "drain the remainder of the
    /// chunk").
    next_index: usize,
}

impl SyncChunk {
    pub fn new(
        detector: AutocorrelatorDetection,
        peak: AutocorrelatorPeak,
        crosscorr: Crosscorrelator,
        refine_window: usize,
        xcorr_window: usize,
    ) -> Self {
        Self {
            detectors: vec![detector],
            peak,
            crosscorr,
            refine_window,
            xcorr_window,
            next_index: 0,
        }
    }

    /// Like [`Self::new`] but pre-seeds one detector clone per antenna so
    /// `process` can run genuinely independent per-antenna sliding sums.
    pub fn with_nof_antennas(
        detector: AutocorrelatorDetection,
        peak: AutocorrelatorPeak,
        crosscorr: Crosscorrelator,
        refine_window: usize,
        xcorr_window: usize,
        nof_antennas: usize,
    ) -> Self {
        let detectors = vec![detector; nof_antennas.max(1)];
        Self { detectors, peak, crosscorr, refine_window, xcorr_window, next_index: 0 }
    }

    fn ensure_antenna_count(&mut self, n: usize) {
        if self.detectors.len() < n {
            let proto = self.detectors[0].clone();
            self.detectors.resize(n, proto);
        }
    }

    /// Rearms the chunk for a new `chunk_start_time`: resets every
    /// per-antenna detector's sliding state and rewinds the scan cursor to
    /// the start of the buffer. Must be called once before the first
    /// `process` call for each new chunk of samples.
    pub fn reset(&mut self, nof_ant: usize) {
        self.ensure_antenna_count(nof_ant);
        for d in self.detectors.iter_mut().take(nof_ant) {
            d.reset();
        }
        self.next_index = 0;
    }

    /// Runs the three-stage pipeline over every antenna's chunk of samples
    /// (`chunk_start_time` is the absolute time of `ant_samples[*][0]`),
    /// combining per-antenna coarse detections by metric-weighted averaging
    /// over the antennas that fired ("valid" antennas) and selecting the
    /// N_eff_TX template by the largest summed crosscorrelation magnitude
    /// across antennas (§4.5 "Template selection", §4.6).
    ///
    /// Resumes from wherever the previous call left off (call [`Self::reset`]
    /// once per new `chunk_start_time`/`ant_samples` buffer first). Returns
    /// `Found` as soon as one packet is located, with the cursor advanced
    /// past it so the next call continues scanning the same buffer; returns
    /// `NotFound` once the cursor reaches the end of the scan, and stays
    /// `NotFound` on every subsequent call until `reset` runs again.
    pub fn process(&mut self, ant_samples: &[Vec<Sample>], chunk_start_time: SampleTime) -> SyncReport {
        let nof_ant = ant_samples.len();
        if nof_ant == 0 {
            return SyncReport::NotFound;
        }
        self.ensure_antenna_count(nof_ant);

        let len = ant_samples[0].len();
        let margin = self.refine_window + self.xcorr_window;
        let search_end = len.saturating_sub(margin);

        while self.next_index < search_end {
            let i = self.next_index;
            self.next_index += 1;
            let mut coarse_mags = vec![0.0f32; nof_ant];
            let mut coarse_times = vec![0i64; nof_ant];
            let mut valid = Vec::new();

            for ant in 0..nof_ant {
                if let Some(c) = self.detectors[ant].push(ant_samples[ant][i]) {
                    coarse_mags[ant] = c.correlation_sum;
                    coarse_times[ant] = c.time_with_jump_back;
                    valid.push(ant);
                }
            }

            if valid.is_empty() {
                continue;
            }

            let total_weight: f32 = valid.iter().map(|&a| coarse_mags[a]).sum();
            if total_weight <= 0.0 {
                continue;
            }
            let avg_time_offset = valid
                .iter()
                .map(|&a| coarse_times[a] as f64 * coarse_mags[a] as f64)
                .sum::<f64>()
                / total_weight as f64;
            let abs_coarse_time = chunk_start_time + avg_time_offset.round() as SampleTime;

            // Refine on the first valid antenna's stream; the fractional CFO
            // and β estimate are shared across antennas for this candidate.
            let refine_ant = valid[0];
            let refined = match self.peak.refine(&ant_samples[refine_ant], chunk_start_time, abs_coarse_time) {
                Some(r) => r,
                None => continue,
            };

            // Crosscorrelate every valid antenna against every template;
            // group by the antenna's own best template, then pick the
            // template with the largest summed peak magnitude across
            // antennas (§4.5 "Template selection").
            let mut per_template_weight: Vec<(usize, f32)> = Vec::new();
            let mut per_ant_fine = Vec::new();
            for &ant in &valid {
                if let Some(fine) = self.crosscorr.refine(&ant_samples[ant], chunk_start_time, refined.time_64) {
                    if let Some(entry) = per_template_weight
                        .iter_mut()
                        .find(|(idx, _)| *idx == fine.n_eff_tx_template_idx)
                    {
                        entry.1 += fine.correlation_peak;
                    } else {
                        per_template_weight.push((fine.n_eff_tx_template_idx, fine.correlation_peak));
                    }
                    per_ant_fine.push((ant, fine));
                }
            }

            if per_ant_fine.is_empty() {
                continue;
            }

            let winning_template = per_template_weight
                .iter()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| *idx)
                .unwrap_or(0);

            let contributing: Vec<_> = per_ant_fine
                .iter()
                .filter(|(_, fine)| fine.n_eff_tx_template_idx == winning_template)
                .collect();
            if contributing.is_empty() {
                continue;
            }
            let weight_sum: f32 = contributing.iter().map(|(_, f)| f.correlation_peak).sum();
            let best_antenna = contributing
                .iter()
                .max_by(|a, b| a.1.correlation_peak.partial_cmp(&b.1.correlation_peak).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(a, _)| *a)
                .unwrap_or(refine_ant);
            let fine_time = if weight_sum > 0.0 {
                contributing
                    .iter()
                    .map(|(_, f)| f.time_64 as f64 * f.correlation_peak as f64)
                    .sum::<f64>()
                    / weight_sum as f64
            } else {
                contributing[0].1.time_64 as f64
            };

            let fine = crate::sync::time_report::FinePeak {
                time_64: fine_time.round() as SampleTime,
                n_eff_tx_template_idx: winning_template,
                correlation_peak: weight_sum / contributing.len().max(1) as f32,
            };

            // `refined.beta_estimate` is already one of the admissible β
            // values (§4.4 sweep only ever lands on a candidate), carried
            // as f32 only so `RefinedPeak` stays a plain value type.
            let beta = refined.beta_estimate.round().max(1.0) as u32;

            return SyncReport::Found { fine, antenna_index: best_antenna, chunk_start_time, beta };
        }

        SyncReport::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn clean_noise_chunk_reports_not_found() {
        let detector = AutocorrelatorDetection::new(8, 4, 50.0);
        let peak = AutocorrelatorPeak::new(8, 4, 1_000_000);
        let template = vec![Complex32::new(1.0, 0.0); 8];
        let crosscorr = Crosscorrelator::new(vec![template], 2);
        let mut chunk = SyncChunk::new(detector, peak, crosscorr, 4, 2);
        chunk.reset(1);

        let samples: Vec<Sample> = (0..256).map(|i| Complex32::new((i as f32 * 0.37).sin() * 0.01, 0.0)).collect();
        let report = chunk.process(&[samples], 0);
        assert_eq!(report, SyncReport::NotFound);
    }

    #[test]
    fn empty_antenna_list_reports_not_found() {
        let detector = AutocorrelatorDetection::new(8, 4, 50.0);
        let peak = AutocorrelatorPeak::new(8, 4, 1_000_000);
        let template = vec![Complex32::new(1.0, 0.0); 8];
        let crosscorr = Crosscorrelator::new(vec![template], 2);
        let mut chunk = SyncChunk::new(detector, peak, crosscorr, 4, 2);
        let report = chunk.process(&[], 0);
        assert_eq!(report, SyncReport::NotFound);
    }

    #[test]
    fn with_nof_antennas_seeds_independent_detectors() {
        let detector = AutocorrelatorDetection::new(8, 4, 50.0);
        let peak = AutocorrelatorPeak::new(8, 4, 1_000_000);
        let template = vec![Complex32::new(1.0, 0.0); 8];
        let crosscorr = Crosscorrelator::new(vec![template], 2);
        let chunk = SyncChunk::with_nof_antennas(detector, peak, crosscorr, 4, 2, 4);
        assert_eq!(chunk.detectors.len(), 4);
    }

    fn repeating_burst(n_patterns: usize, lag: usize) -> Vec<Sample> {
        let cover = crate::sync::stf_template::cover_sequence(n_patterns);
        let mut samples = Vec::with_capacity(n_patterns * lag);
        for &c in &cover {
            for _ in 0..lag {
                samples.push(Complex32::new(c, 0.0));
            }
        }
        samples
    }

    /// Two genuine STF-like bursts inside one chunk buffer, spaced well past
    /// `skip_after_peak_stfs` worth of samples apart: `process` must surface
    /// both as separate `Found` reports before finally reporting
    /// `NotFound`, draining the chunk the way §4.9 requires instead of
    /// stopping at the first packet.
    #[test]
    fn process_drains_two_packets_from_one_chunk() {
        use crate::sync::autocorrelator_detection::DetectionThresholds;

        let lag = 16;
        let n_patterns = 7;
        let thresholds = DetectionThresholds {
            rms_min: 0.01,
            front_back_ratio: 0.0,
            m_min: 0.05,
            metric_streak: 1,
            streak_eps: 0.0,
            skip_after_peak_stfs: 1,
            jump_back_patterns: 1,
        };
        let detector = AutocorrelatorDetection::with_thresholds(lag, n_patterns - 1, thresholds);
        let peak = AutocorrelatorPeak::new(lag, 4, 1_000_000);
        let template = repeating_burst(n_patterns, lag);
        let crosscorr = Crosscorrelator::new(vec![template], 2);
        let mut chunk = SyncChunk::new(detector, peak, crosscorr, 4, 2);
        chunk.reset(1);

        let burst = repeating_burst(n_patterns, lag);
        let gap = vec![Sample::default(); 200];
        let tail = vec![Sample::default(); 10];
        let mut samples = Vec::new();
        samples.extend_from_slice(&burst);
        samples.extend_from_slice(&gap);
        samples.extend_from_slice(&burst);
        samples.extend_from_slice(&tail);

        let mut found = 0;
        loop {
            match chunk.process(&[samples.clone()], 0) {
                SyncReport::Found { .. } => found += 1,
                SyncReport::NotFound => break,
            }
        }
        assert_eq!(found, 2, "expected both separated bursts to be reported before the chunk drains dry");
    }
}
