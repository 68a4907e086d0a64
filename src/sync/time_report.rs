//! Value types returned by the synchronization pipeline (§4.3-§4.6).

use crate::sample::SampleTime;

/// Coarse result of the autocorrelation detector (C5-a): a candidate start
/// time plus the correlation-sum peak value used for threshold decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarsePeak {
    pub time_64: SampleTime,
    /// `detection_time_local − jump_back_patterns·pattern_length` (§4.3):
    /// the coarse-peak search in C5-b starts this far back so the true STF
    /// start is never missed even when detection fires late into the STF.
    pub time_with_jump_back: SampleTime,
    pub correlation_sum: f32,
}

/// Refined autocorrelation result (C5-b): adds the fractional symbol-rate β
/// estimate and, when the `integer-cfo-search` feature is enabled, an
/// integer carrier-frequency-offset estimate in units of subcarrier spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedPeak {
    pub time_64: SampleTime,
    pub beta_estimate: f32,
    pub cfo_frac_hz: f32,
    #[cfg(feature = "integer-cfo-search")]
    pub cfo_integer_subcarriers: i32,
}

/// Final fine-peak result from the crosscorrelator (C5-c): exact packet
/// start time and the transmit-stream template index that matched best.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinePeak {
    pub time_64: SampleTime,
    pub n_eff_tx_template_idx: usize,
    pub correlation_peak: f32,
}
