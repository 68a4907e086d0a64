//! Lookup table of precomputed `WienerFilter`s, keyed by quantized SNR and
//! Doppler, with near-duplicate weight-vector deduplication (§4.13
//! "Wiener-filter LUTs"), plus the per-subcarrier pilot/weight-index tables
//! §4.13 names for interpolating the channel across frequency.
//!
//! Grounded on `chestim_lut.hpp/.cpp`'s table-of-precomputed-filters idea:
//! building a filter by solving the Wiener-Hopf system is too expensive to
//! do per packet, so filters are solved once per (quantized SNR, Doppler)
//! pair and reused. The frequency-axis counterpart
//! (`SubcarrierInterpolationTable`) is scoped to one (β, transmit-stream
//! slot, symbol-within-stage) combination built on demand, rather than a
//! fully precomputed table across every combination ahead of time — there is
//! no startup/config-load phase in this crate to precompute such a table
//! offline (`DESIGN.md` records this as a deliberate scope decision).

use num_complex::Complex32;

use crate::channel_est::wiener::{freq_correlation, solve_complex_linear_system, WienerFilter};

/// Below this L-infinity distance, two requested filters are considered
/// the same and the already-cached one is returned instead of solving and
/// storing a near-duplicate.
const DEDUP_LINF_THRESHOLD: f32 = 1e-4;

struct Entry {
    snr_linear: f32,
    nu_max_norm: f32,
    filter: WienerFilter,
}

/// Caches solved `WienerFilter`s, quantizing SNR to a configurable step so
/// nearby requests hit the same entry.
pub struct ChannelLut {
    t_stride: usize,
    snr_step_db: f32,
    entries: Vec<Entry>,
}

impl ChannelLut {
    pub fn new(t_stride: usize, snr_step_db: f32) -> Self {
        Self { t_stride, snr_step_db, entries: Vec::new() }
    }

    fn quantize_snr(&self, snr_linear: f32) -> f32 {
        let snr_db = 10.0 * snr_linear.max(1e-6).log10();
        let step = self.snr_step_db.max(0.1);
        let quantized_db = (snr_db / step).round() * step;
        10f32.powf(quantized_db / 10.0)
    }

    /// Returns the cached filter for `(snr_linear, nu_max_norm)`, solving
    /// and inserting one if no existing entry is close enough. Candidate
    /// filters within [`DEDUP_LINF_THRESHOLD`] of an already-cached filter
    /// are folded into that entry rather than stored separately.
    pub fn get_or_solve(&mut self, snr_linear: f32, nu_max_norm: f32) -> Option<&WienerFilter> {
        let q_snr = self.quantize_snr(snr_linear);

        if let Some(idx) = self.entries.iter().position(|e| {
            (e.snr_linear - q_snr).abs() < f32::EPSILON && (e.nu_max_norm - nu_max_norm).abs() < f32::EPSILON
        }) {
            return Some(&self.entries[idx].filter);
        }

        let candidate = WienerFilter::solve(self.t_stride, q_snr, nu_max_norm)?;

        if let Some(idx) = self
            .entries
            .iter()
            .position(|e| e.filter.linf_distance(&candidate) < DEDUP_LINF_THRESHOLD)
        {
            return Some(&self.entries[idx].filter);
        }

        self.entries.push(Entry { snr_linear: q_snr, nu_max_norm, filter: candidate });
        self.entries.last().map(|e| &e.filter)
    }

    /// The time-smoothing window width this LUT's filters are solved for.
    pub fn t_stride(&self) -> usize {
        self.t_stride
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Swaps the per-transmit-stream pilot offset assignment used by
/// `PacketLayout::drs_subcarriers` between processing stages, keeping TX and
/// RX in agreement about which stream occupies which pilot slot on a given
/// repetition of the DRS pattern (§4.13 "stream-index permutation").
pub fn permute_stream_index(ts: u32, stage_parity: u32, nof_ts: u32) -> u32 {
    if stage_parity == 0 {
        ts
    } else {
        (ts + nof_ts / 2) % nof_ts.max(1)
    }
}

/// Per-subcarrier pilot-index / weight-index interpolation table for one
/// (β, transmit-stream slot, symbol-within-stage) combination (§4.13): for
/// every occupied subcarrier `k`, `pilot_index(k)` names the two nearest DRS
/// pilot subcarriers (spaced `pilot_stride` apart, matching
/// `PacketLayout::drs_subcarriers`'s stride of 4) that anchor the
/// interpolation, and `weight_index(k)` looks up the two-tap weight pair a
/// Wiener-Hopf solve over [`freq_correlation`] produced for that offset.
/// Built once per decoded symbol's (SNR, delay-spread) estimate and reused
/// across every subcarrier on that symbol.
pub struct SubcarrierInterpolationTable {
    n_b_occ: usize,
    pilot_stride: usize,
    weights: Vec<(f32, f32)>,
}

impl SubcarrierInterpolationTable {
    pub fn build(n_b_occ: usize, pilot_stride: usize, tau_rms_norm: f32, snr_linear: f32) -> Self {
        let pilot_stride = pilot_stride.max(1);
        let noise = 1.0 / snr_linear.max(1e-6);
        let weights = (0..n_b_occ)
            .map(|k| Self::solve_weights(k, n_b_occ, pilot_stride, tau_rms_norm, noise))
            .collect();
        Self { n_b_occ, pilot_stride, weights }
    }

    fn solve_weights(k: usize, n_b_occ: usize, pilot_stride: usize, tau_rms_norm: f32, noise: f32) -> (f32, f32) {
        let (left, right) = Self::pilot_index_for(k, n_b_occ, pilot_stride);
        if left == right {
            return (1.0, 0.0);
        }
        let r_l = freq_correlation(tau_rms_norm, (k - left) as i32);
        let r_r = freq_correlation(tau_rms_norm, (right as i32 - k as i32).abs());
        let r_lr = freq_correlation(tau_rms_norm, (right - left) as i32);
        let a = vec![
            vec![Complex32::new(1.0 + noise, 0.0), Complex32::new(r_lr, 0.0)],
            vec![Complex32::new(r_lr, 0.0), Complex32::new(1.0 + noise, 0.0)],
        ];
        let b = vec![Complex32::new(r_l, 0.0), Complex32::new(r_r, 0.0)];
        solve_complex_linear_system(&a, &b).map(|w| (w[0].re, w[1].re)).unwrap_or((0.5, 0.5))
    }

    fn pilot_index_for(k: usize, n_b_occ: usize, pilot_stride: usize) -> (usize, usize) {
        let left = (k / pilot_stride) * pilot_stride;
        let right = (left + pilot_stride).min(n_b_occ.saturating_sub(1));
        (left, right)
    }

    /// The two nearest DRS pilot subcarriers bracketing `k`.
    pub fn pilot_index(&self, k: usize) -> (usize, usize) {
        Self::pilot_index_for(k, self.n_b_occ, self.pilot_stride)
    }

    /// The `(left, right)` interpolation weight pair for subcarrier `k`.
    pub fn weight_index(&self, k: usize) -> (f32, f32) {
        self.weights[k]
    }

    /// Interpolates the channel at subcarrier `k` from the two bracketing
    /// pilot estimates `pilot_at(left)`/`pilot_at(right)`.
    pub fn interpolate(&self, k: usize, pilot_at: impl Fn(usize) -> Complex32) -> Complex32 {
        let (left, right) = self.pilot_index(k);
        let (w_left, w_right) = self.weight_index(k);
        pilot_at(left) * w_left + pilot_at(right) * w_right
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookup_reuses_cached_filter() {
        let mut lut = ChannelLut::new(5, 1.0);
        let a = lut.get_or_solve(100.0, 0.98).unwrap().clone();
        assert_eq!(lut.len(), 1);
        let b = lut.get_or_solve(100.0, 0.98).unwrap().clone();
        assert_eq!(lut.len(), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_snr_quantizes_to_distinct_entries() {
        let mut lut = ChannelLut::new(5, 1.0);
        lut.get_or_solve(10.0, 0.98).unwrap();
        lut.get_or_solve(1000.0, 0.98).unwrap();
        assert_eq!(lut.len(), 2);
    }

    #[test]
    fn stage_parity_one_swaps_by_half_the_streams() {
        assert_eq!(permute_stream_index(0, 0, 4), 0);
        assert_eq!(permute_stream_index(0, 1, 4), 2);
        assert_eq!(permute_stream_index(3, 1, 4), 1);
    }

    #[test]
    fn pilot_index_brackets_every_subcarrier() {
        let table = SubcarrierInterpolationTable::build(16, 4, 0.3, 100.0);
        for k in 0..16 {
            let (left, right) = table.pilot_index(k);
            assert!(left <= k && k <= right.max(k));
            assert_eq!(left % 4, 0);
        }
    }

    #[test]
    fn interpolation_reproduces_constant_channel() {
        let table = SubcarrierInterpolationTable::build(16, 4, 0.1, 1000.0);
        let constant = Complex32::new(1.5, -0.5);
        for k in 0..16 {
            let est = table.interpolate(k, |_| constant);
            assert!((est - constant).norm() < 0.05, "k={k} est={est:?}");
        }
    }

    #[test]
    fn pilot_subcarrier_weight_is_exact() {
        let table = SubcarrierInterpolationTable::build(16, 4, 0.3, 100.0);
        let (w_left, w_right) = table.weight_index(0);
        assert!((w_left - 1.0).abs() < 1e-6);
        assert!(w_right.abs() < 1e-6);
    }
}
