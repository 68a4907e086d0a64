//! Wiener-Hopf equation solver and the smoothing filter it produces (§4.12
//! "Channel estimation", §4.13 "Wiener-filter LUTs").
//!
//! Grounded on `chestim_wiener.hpp/.cpp`'s pilot-correlation-matrix inversion;
//! no linear-algebra crate is part of the dependency stack, so the small
//! (`t_stride`-sized) complex system is solved with a hand-rolled
//! Gauss-Jordan elimination with partial pivoting, same as a teacher module
//! would reach for only stdlib numerics on a problem this small. The
//! correlation model plugged into that system is spec.md §4.13's own:
//! `r_f(Δf) = sinc(π·τ_rms·Δf)` across subcarriers and `r_t(Δt) =
//! J_0(2π·ν_max·Δt)` across time steps; neither a Bessel-function nor a
//! special-function crate is in the dependency stack, so both are hand-
//! rolled (`sinc` directly, `J_0` via its convergent power series).

use num_complex::Complex32;

/// `sinc(x) = sin(x)/x`, with `sinc(0) = 1`.
fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Bessel function of the first kind, order 0, via its power series. The
/// arguments this module ever calls it with (`2π·ν_max·Δt` for normalized
/// Doppler and small lag counts) stay well within the series' fast-converging
/// range, so a fixed 20-term truncation is exact to `f32` precision.
fn bessel_j0(x: f32) -> f32 {
    let x2 = (x * x) / 4.0;
    let mut term = 1.0f32;
    let mut sum = 1.0f32;
    for k in 1..20 {
        term *= -x2 / (k as f32 * k as f32);
        sum += term;
        if term.abs() < 1e-8 {
            break;
        }
    }
    sum
}

/// Frequency-domain channel correlation over `delta_f` subcarrier spacings
/// at normalized RMS delay spread `tau_rms_norm` (§4.13): `r_f(Δf) =
/// sinc(π·τ_rms·Δf)`.
pub fn freq_correlation(tau_rms_norm: f32, delta_f: i32) -> f32 {
    sinc(std::f32::consts::PI * tau_rms_norm * delta_f as f32)
}

/// Time-domain channel correlation over `delta_t` symbol steps at
/// normalized max Doppler `nu_max_norm` (§4.13): `r_t(Δt) =
/// J_0(2π·ν_max·Δt)`.
pub fn time_correlation(nu_max_norm: f32, delta_t: i32) -> f32 {
    bessel_j0(2.0 * std::f32::consts::PI * nu_max_norm * delta_t as f32)
}

/// Solves `a · x = b` for a square complex system via Gauss-Jordan
/// elimination with partial pivoting. Returns `None` if `a` is singular to
/// working precision.
pub fn solve_complex_linear_system(a: &[Vec<Complex32>], b: &[Complex32]) -> Option<Vec<Complex32>> {
    let n = b.len();
    assert_eq!(a.len(), n, "matrix must be square and match rhs length");
    assert!(a.iter().all(|row| row.len() == n));

    let mut m: Vec<Vec<Complex32>> = a.to_vec();
    let mut rhs: Vec<Complex32> = b.to_vec();

    for col in 0..n {
        let (pivot_row, _) = (col..n)
            .map(|r| (r, m[r][col].norm()))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())?;
        if m[pivot_row][col].norm() < 1e-9 {
            return None;
        }
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        for k in col..n {
            m[col][k] /= pivot;
        }
        rhs[col] /= pivot;

        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = m[r][col];
            if factor.norm() == 0.0 {
                continue;
            }
            for k in col..n {
                m[r][k] -= factor * m[col][k];
            }
            rhs[r] -= factor * rhs[col];
        }
    }

    Some(rhs)
}

/// A precomputed smoothing filter over `t_stride` adjacent DRS pilot
/// estimates (spaced one DRS repetition, i.e. `n_step` OFDM symbols, apart
/// in time), solved from spec.md §4.13's Bessel time-correlation model
/// parameterized by SNR and normalized max Doppler.
#[derive(Debug, Clone, PartialEq)]
pub struct WienerFilter {
    pub t_stride: usize,
    pub weights: Vec<Complex32>,
}

impl WienerFilter {
    /// Builds `R_pp · w = r_dp` where `R_pp[i][j] = r_t(i-j) + (1/snr)·δ_ij`
    /// (pilot autocorrelation plus noise) and `r_dp[i] = r_t(i - center)`
    /// (cross-correlation with the data position at the window center),
    /// with `r_t` the Bessel time-correlation model (§4.13).
    pub fn solve(t_stride: usize, snr_linear: f32, nu_max_norm: f32) -> Option<Self> {
        assert!(t_stride > 0, "t_stride must be positive");
        let noise_inv = 1.0 / snr_linear.max(1e-6);
        let center = (t_stride - 1) as f32 / 2.0;

        let mut r_pp = vec![vec![Complex32::default(); t_stride]; t_stride];
        for i in 0..t_stride {
            for j in 0..t_stride {
                let corr = time_correlation(nu_max_norm, i as i32 - j as i32);
                r_pp[i][j] = Complex32::new(corr + if i == j { noise_inv } else { 0.0 }, 0.0);
            }
        }
        let r_dp: Vec<Complex32> = (0..t_stride)
            .map(|i| Complex32::new(time_correlation(nu_max_norm, (i as f32 - center).round() as i32), 0.0))
            .collect();

        let weights = solve_complex_linear_system(&r_pp, &r_dp)?;
        Some(Self { t_stride, weights })
    }

    /// Applies the filter to `pilots` (must have length `t_stride`),
    /// producing the smoothed channel estimate at the window center.
    pub fn apply(&self, pilots: &[Complex32]) -> Complex32 {
        assert_eq!(pilots.len(), self.t_stride);
        pilots.iter().zip(self.weights.iter()).map(|(&p, &w)| p * w).sum()
    }

    /// L-infinity distance between two filters' weight vectors, used by
    /// `ChannelLut` to deduplicate near-identical (SNR, Doppler) lookups.
    pub fn linf_distance(&self, other: &WienerFilter) -> f32 {
        self.weights
            .iter()
            .zip(other.weights.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_identity_system() {
        let a = vec![
            vec![Complex32::new(1.0, 0.0), Complex32::new(0.0, 0.0)],
            vec![Complex32::new(0.0, 0.0), Complex32::new(1.0, 0.0)],
        ];
        let b = vec![Complex32::new(3.0, 1.0), Complex32::new(-2.0, 0.5)];
        let x = solve_complex_linear_system(&a, &b).unwrap();
        assert!((x[0] - b[0]).norm() < 1e-5);
        assert!((x[1] - b[1]).norm() < 1e-5);
    }

    #[test]
    fn singular_system_returns_none() {
        let a = vec![
            vec![Complex32::new(1.0, 0.0), Complex32::new(1.0, 0.0)],
            vec![Complex32::new(1.0, 0.0), Complex32::new(1.0, 0.0)],
        ];
        let b = vec![Complex32::new(1.0, 0.0), Complex32::new(1.0, 0.0)];
        assert!(solve_complex_linear_system(&a, &b).is_none());
    }

    #[test]
    fn wiener_filter_recovers_constant_channel() {
        // Slow-fading (small normalized Doppler): r_t stays near 1 over the
        // whole window, so the filter should reproduce a static channel.
        let filter = WienerFilter::solve(5, 100.0, 0.01).expect("solvable");
        let pilots = vec![Complex32::new(2.0, -1.0); 5];
        let est = filter.apply(&pilots);
        assert!((est - Complex32::new(2.0, -1.0)).norm() < 0.2);
    }

    #[test]
    fn freq_correlation_is_one_at_zero_lag() {
        assert!((freq_correlation(0.3, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn time_correlation_is_one_at_zero_lag() {
        assert!((time_correlation(0.05, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn time_correlation_decays_with_larger_doppler() {
        let slow = time_correlation(0.01, 3);
        let fast = time_correlation(0.2, 3);
        assert!(fast.abs() < slow.abs());
    }
}
