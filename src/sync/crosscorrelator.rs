//! C5-c: crosscorrelation-based fine-peak refinement against per-(β,
//! N_eff_TX) STF time-domain templates (§4.5).
//!
//! Grounded on `sync_crosscorrelator.hpp/.cpp`: slides each candidate
//! template across a short window around the autocorrelation peak and picks
//! the template/offset pair with the largest normalized correlation.

use crate::sample::{Sample, SampleTime};
use crate::sync::time_report::FinePeak;

pub struct Crosscorrelator {
    templates: Vec<Vec<Sample>>,
    window: usize,
}

impl Crosscorrelator {
    pub fn new(templates: Vec<Vec<Sample>>, window: usize) -> Self {
        assert!(!templates.is_empty(), "crosscorrelator needs at least one template");
        Self { templates, window }
    }

    /// `samples` must cover `[refined_time - window, refined_time + window + max_template_len]`
    /// relative to `base_time`.
    pub fn refine(&self, samples: &[Sample], base_time: SampleTime, refined_time: SampleTime) -> Option<FinePeak> {
        let center_rel = (refined_time - base_time) as isize;
        let mut best: Option<FinePeak> = None;

        for (template_idx, template) in self.templates.iter().enumerate() {
            let tlen = template.len() as isize;
            let template_energy: f32 = template.iter().map(|s| s.norm_sqr()).sum::<f32>().max(f32::EPSILON);

            for d in -(self.window as isize)..=(self.window as isize) {
                let start = center_rel + d;
                if start < 0 || start + tlen > samples.len() as isize {
                    continue;
                }
                let window = &samples[start as usize..(start + tlen) as usize];
                let mut corr = num_complex::Complex32::default();
                let mut sig_energy = 0.0f32;
                for (s, t) in window.iter().zip(template.iter()) {
                    corr += *s * t.conj();
                    sig_energy += s.norm_sqr();
                }
                let denom = (sig_energy * template_energy).sqrt().max(f32::EPSILON);
                let normalized = corr.norm() / denom;

                let better = best.as_ref().map(|b| normalized > b.correlation_peak).unwrap_or(true);
                if better {
                    best = Some(FinePeak {
                        time_64: base_time + start as SampleTime,
                        n_eff_tx_template_idx: template_idx,
                        correlation_peak: normalized,
                    });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn exact_template_match_scores_near_one() {
        let template: Vec<Sample> = (0..16).map(|i| Complex32::new((i as f32 * 0.4).sin(), 0.0)).collect();
        let mut samples = vec![Sample::default(); 8];
        samples.extend_from_slice(&template);
        samples.extend(vec![Sample::default(); 8]);

        let xc = Crosscorrelator::new(vec![template], 4);
        let peak = xc.refine(&samples, 0, 8).expect("peak found");
        assert!(peak.correlation_peak > 0.9);
        assert_eq!(peak.time_64, 8);
    }

    #[test]
    fn picks_best_matching_template() {
        let t0: Vec<Sample> = vec![Complex32::new(1.0, 0.0); 8];
        let t1: Vec<Sample> = vec![Complex32::new(-1.0, 0.0); 8];
        let mut samples = vec![Sample::default(); 4];
        samples.extend_from_slice(&t1);
        samples.extend(vec![Sample::default(); 4]);

        let xc = Crosscorrelator::new(vec![t0, t1], 2);
        let peak = xc.refine(&samples, 0, 4).unwrap();
        assert_eq!(peak.n_eff_tx_template_idx, 1);
    }
}
