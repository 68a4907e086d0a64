//! Kaiser-window FIR low-pass prototype design (§4.1), grounded on the
//! Kaiser-window LPF prose in `resampler.hpp`.

/// Modified Bessel function of the first kind, order 0, via its power series.
/// Used both by the Kaiser window and by the Wiener time-correlation model
/// (§4.13's `r_t(Δt) = J_0(2π·ν_max·Δt)`).
pub fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0f64;
    let mut term = 1.0f64;
    let half_x = x / 2.0;
    for k in 1..=32 {
        term *= (half_x * half_x) / (k as f64 * k as f64);
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
    }
    sum
}

/// Bessel function of the first kind, order 0 (real argument), used by the
/// Wiener time-domain correlation model `J_0(2π·ν_max·Δt)`.
pub fn bessel_j0(x: f64) -> f64 {
    // Series expansion, adequate for the small-to-moderate arguments that
    // arise from `2π·ν_max·Δt` with realistic Doppler/time-offset products.
    let mut sum = 0.0f64;
    let half_x = x / 2.0;
    for k in 0..32 {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        let kf = k as f64;
        let num = half_x.powi(2 * k as i32);
        let den = factorial(k) * factorial(k);
        let term = sign * num / den;
        sum += term;
        if term.abs() < 1e-16 && kf > 4.0 {
            break;
        }
    }
    sum
}

fn factorial(n: u32) -> f64 {
    (1..=n as u64).product::<u64>() as f64
}

/// Computes the Kaiser window of `length` samples with shape parameter `beta`.
pub fn kaiser_window(length: usize, beta: f64) -> Vec<f64> {
    if length == 0 {
        return Vec::new();
    }
    if length == 1 {
        return vec![1.0];
    }
    let m = (length - 1) as f64;
    let denom = bessel_i0(beta);
    (0..length)
        .map(|n| {
            let x = 2.0 * n as f64 / m - 1.0;
            let arg = beta * (1.0 - x * x).max(0.0).sqrt();
            bessel_i0(arg) / denom
        })
        .collect()
}

/// Kaiser-window beta parameter from the desired stopband attenuation (dB),
/// per the standard Kaiser design formula.
pub fn kaiser_beta_from_attenuation(attenuation_db: f64) -> f64 {
    if attenuation_db > 50.0 {
        0.1102 * (attenuation_db - 8.7)
    } else if attenuation_db >= 21.0 {
        0.5842 * (attenuation_db - 21.0).powf(0.4) + 0.07886 * (attenuation_db - 21.0)
    } else {
        0.0
    }
}

/// Designs a windowed-sinc low-pass FIR prototype filter.
///
/// `f_pass`/`f_stop` are normalized to the Nyquist rate of the *output*
/// (post-interpolation, pre-decimation) sample rate, i.e. in `[0, 1]` where
/// `1` is `fs/2` at the intermediate rate `fs·L`. `length` must be odd for
/// a Type-I linear-phase design; the caller rounds up as needed.
pub fn design_lowpass_prototype(
    length: usize,
    cutoff_normalized: f64,
    attenuation_db: f64,
) -> Vec<f32> {
    assert!(length > 0, "prototype filter length must be positive");
    let beta = kaiser_beta_from_attenuation(attenuation_db);
    let window = kaiser_window(length, beta);
    let m = (length - 1) as f64 / 2.0;

    (0..length)
        .map(|n| {
            let t = n as f64 - m;
            let sinc = if t.abs() < 1e-12 {
                cutoff_normalized
            } else {
                (std::f64::consts::PI * cutoff_normalized * t).sin() / (std::f64::consts::PI * t)
            };
            (sinc * window[n]) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kaiser_window_is_symmetric_and_peaks_at_one() {
        let w = kaiser_window(65, 6.0);
        assert_eq!(w.len(), 65);
        assert!((w[32] - 1.0).abs() < 1e-9);
        for i in 0..32 {
            assert!((w[i] - w[64 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn bessel_i0_matches_known_value_at_zero() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bessel_j0_matches_known_value_at_zero() {
        assert!((bessel_j0(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lowpass_prototype_has_unity_ish_dc_gain_after_normalization() {
        let h = design_lowpass_prototype(63, 0.5, 60.0);
        let dc_gain: f32 = h.iter().sum();
        assert!(dc_gain > 0.0);
    }
}
