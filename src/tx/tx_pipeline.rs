//! C12: packet-to-samples transform (§4.13 "Transmit-chain state machine").
//!
//! Grounded on `tx/tx.hpp/.cpp`'s per-symbol loop (FEC -> mapper -> subcarrier
//! placement -> precode -> IFFT+CP -> resample -> write) and `pcc.cpp`/
//! `pdc.cpp`'s subcarrier bookkeeping, generalized over the `PacketLayout`
//! state machine already built for both TX and RX use in
//! `sections_part3::layout`. Transmit-stream placement (flip-alternate PCC,
//! Alamouti PDC pairs) follows `index_mat_N_TS_x` as spec.md §4.11 stages 4-5
//! describe; the L/M resample to hardware rate follows `dsp::resampler`'s
//! streaming contract.

use num_complex::Complex32;
use rustfft::FftPlanner;

use crate::codec::fec::{encode_plcf, encode_tb, FecConfig};
use crate::codec::modulation::{qpsk_flip_alternate, qpsk_map, Qam};
use crate::dsp::resampler::{Resampler, RESAMPLER_PARAM_TX};
use crate::mac_iface::TxDescriptor;
use crate::pool::worker_tx_rx::TxRenderer;
use crate::ring::tx_ring::{TxBufferMeta, TxBufferPool};
use crate::sample::{Sample, SampleTime};
use crate::sections_part3::layout::{index_mat_n_ts_x, PacketLayout, SymbolKind};
use crate::sync::stf_template::generate_stf_template;

/// Deterministic DRS pilot value for occupied-subcarrier index `k`,
/// transmit-stream `ts` (§4.13 "DRS"): unit magnitude, phase rotated by
/// stream and position so adjacent pilots remain distinguishable at the
/// receiver's channel estimator.
pub(crate) fn drs_pilot(k: usize, ts: u32) -> Complex32 {
    let phase = std::f32::consts::FRAC_PI_4 * ((k % 8) as f32 + 2.0 * ts as f32);
    Complex32::from_polar(1.0, phase)
}

/// Places `n_b_occ` per-subcarrier values (zero where `None`) into a
/// DFT-sized spectrum, split around DC the same way
/// `stf_template::generate_stf_template` does, so TX and RX agree on which
/// FFT bin a given occupied-subcarrier index maps to.
fn occupied_to_spectrum(occ: &[Complex32], n_b_dft: usize) -> Vec<Complex32> {
    let n_b_occ = occ.len();
    let half = n_b_occ / 2;
    let mut spectrum = vec![Complex32::default(); n_b_dft];
    for (i, v) in occ.iter().take(half).enumerate() {
        spectrum[i + 1] = *v;
    }
    for (i, v) in occ.iter().skip(half).enumerate() {
        spectrum[n_b_dft - half + i] = *v;
    }
    spectrum
}

fn ifft_with_cp(spectrum: &mut [Complex32], cp_length: usize) -> Vec<Sample> {
    let n = spectrum.len();
    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n);
    ifft.process(spectrum);
    let norm = 1.0 / (n as f32).sqrt();
    for s in spectrum.iter_mut() {
        *s *= norm;
    }
    let mut out = Vec::with_capacity(cp_length + n);
    out.extend_from_slice(&spectrum[n - cp_length..]);
    out.extend_from_slice(spectrum);
    out
}

/// Applies the transmit-side Alamouti space-time block code to one pair of
/// adjacent PDC subcarriers for one transmit-stream pair (§4.12 PDC
/// combination, read backwards from the receiver's combining equations):
/// `TS_A` carries `(s0, -conj(s1))`, `TS_B` carries `(s1, conj(s0))` across
/// subcarriers `(k, k+1)`.
fn alamouti_encode_pair(s0: Complex32, s1: Complex32) -> ((Complex32, Complex32), (Complex32, Complex32)) {
    ((s0, -s1.conj()), (s1, s0.conj()))
}

/// Precoding matrix `W(N_TS, N_TX, codebook_index)` (§4.11 stage 5
/// "Precode"). Open-loop modes (`N_TS == N_TX`, e.g. tm_mode_index=1's 2x1
/// transmit diversity) map each transmit stream directly onto its own
/// antenna. Closed-loop modes (`N_TS < N_TX`) spread each stream's energy
/// across its own group of `N_TX / N_TS` antennas with a codebook-indexed
/// phase taper, generalizing the single-stream beamforming weight this
/// replaces. `N_SS > 1` spatial multiplexing is out of scope (`DESIGN.md`).
fn precoding_weight(n_ts: u32, n_tx: u32, codebook_index: u32, ts: u32, ant: u32) -> Complex32 {
    if n_ts >= n_tx {
        return if ts == ant { Complex32::new(1.0, 0.0) } else { Complex32::default() };
    }
    let antennas_per_ts = (n_tx / n_ts.max(1)).max(1);
    let group_start = ts * antennas_per_ts;
    if ant < group_start || ant >= group_start + antennas_per_ts {
        return Complex32::default();
    }
    let local = ant - group_start;
    let phase = std::f32::consts::PI * (codebook_index as f32 + local as f32) / antennas_per_ts as f32;
    Complex32::from_polar(1.0 / (antennas_per_ts as f32).sqrt(), phase)
}

/// Renders `TxDescriptor`s into a `TxBufferPool` (§4.13, §6).
pub struct TxPipeline {
    /// Oversampling ratio applied after IFFT+CP, baseband -> hardware rate.
    pub os_l: u32,
    pub os_m: u32,
}

impl TxPipeline {
    pub fn new(os_l: u32, os_m: u32) -> Self {
        Self { os_l, os_m }
    }

    /// Builds one baseband waveform per transmit stream (before precoding):
    /// STF, then one OFDM symbol per DF index with PCC/DRS/PDC subcarriers
    /// filled in. `N_TS == 1` fills stream 0 directly; `N_TS >= 2` applies
    /// the flip-alternate PCC mapping and Alamouti PDC pairing across
    /// `index_mat_n_ts_x(N_TS)`'s stream pairs (§4.11 stages 4-5).
    fn build_baseband_per_ts(&self, descriptor: &TxDescriptor) -> Vec<Vec<Sample>> {
        let sizes = &descriptor.packet_sizes;
        let numerology = &sizes.numerology;
        let n_ts = (sizes.tm_mode.n_ts as u32).max(1);
        let n_eff_tx = (sizes.tm_mode.n_eff_tx as u32).max(1);
        let layout = PacketLayout::new(numerology, sizes.n_packet_symb, n_eff_tx);

        let plcf_coded = encode_plcf(&descriptor.plcf_bytes);
        let pcc_symbols = qpsk_map(&plcf_coded);
        let pcc_symbols_flipped = qpsk_flip_alternate(&pcc_symbols);

        let fec_cfg = FecConfig {
            n_tb_bits: sizes.n_tb_bits,
            g: sizes.g,
            c: sizes.c,
            redundancy_version: descriptor.redundancy_version,
        };
        let pdc_coded = encode_tb(&descriptor.tb_bytes, &fec_cfg);
        let qam = Qam::new(sizes.mcs.n_bps);
        let pdc_symbols = qam.map(&pdc_coded);

        let ts_pairs = index_mat_n_ts_x(n_ts);

        let mut pcc_cursor = 0usize;
        let mut pdc_cursor = 0usize;

        let stf = generate_stf_template(numerology.n_b_dft as usize, numerology.n_b_occ as usize, numerology.n_b_cp as usize, 0);
        let mut streams: Vec<Vec<Sample>> = (0..n_ts)
            .map(|_| {
                let mut s = Vec::with_capacity(sizes.n_samples_packet as usize);
                s.extend(stf.iter().copied());
                s
            })
            .collect();

        for l in 1..=sizes.n_packet_symb.saturating_sub(1) {
            let mut occ: Vec<Vec<Complex32>> = vec![vec![Complex32::default(); layout.n_b_occ]; n_ts as usize];

            for k in layout.pcc_subcarriers(l) {
                let direct = pcc_symbols.get(pcc_cursor).copied().unwrap_or_default();
                if n_ts == 1 {
                    occ[0][k] = direct;
                } else {
                    let flipped = pcc_symbols_flipped.get(pcc_cursor).copied().unwrap_or_default();
                    for &(ts_a, ts_b) in &ts_pairs {
                        occ[ts_a as usize][k] = direct;
                        occ[ts_b as usize][k] = flipped;
                    }
                }
                pcc_cursor += 1;
            }

            for ts in 0..n_ts {
                for k in layout.drs_subcarriers(l, ts) {
                    occ[ts as usize][k] = drs_pilot(k, ts);
                }
            }

            if matches!(layout.symbol_kind(l), SymbolKind::Pdc | SymbolKind::PdcAndDrs) {
                let pdc_ks = layout.pdc_subcarriers(l, n_ts);
                if n_ts == 1 {
                    for k in pdc_ks {
                        occ[0][k] = pdc_symbols.get(pdc_cursor).copied().unwrap_or_default();
                        pdc_cursor += 1;
                    }
                } else {
                    let mut it = pdc_ks.into_iter();
                    while let (Some(k0), Some(k1)) = (it.next(), it.next()) {
                        let s0 = pdc_symbols.get(pdc_cursor).copied().unwrap_or_default();
                        let s1 = pdc_symbols.get(pdc_cursor + 1).copied().unwrap_or_default();
                        pdc_cursor += 2;
                        let ((a0, a1), (b0, b1)) = alamouti_encode_pair(s0, s1);
                        for &(ts_a, ts_b) in &ts_pairs {
                            occ[ts_a as usize][k0] = a0;
                            occ[ts_a as usize][k1] = a1;
                            occ[ts_b as usize][k0] = b0;
                            occ[ts_b as usize][k1] = b1;
                        }
                    }
                }
            }

            for ts in 0..n_ts as usize {
                let mut spectrum = occupied_to_spectrum(&occ[ts], numerology.n_b_dft as usize);
                streams[ts].extend(ifft_with_cp(&mut spectrum, numerology.n_b_cp as usize));
            }
        }

        streams
    }
}

impl TxRenderer for TxPipeline {
    fn render(&self, descriptor: &TxDescriptor, tx_time_hint: SampleTime, tx_buffers: &TxBufferPool) {
        let sizes = &descriptor.packet_sizes;
        let n_ts = (sizes.tm_mode.n_ts as u32).max(1);
        let n_tx = (sizes.tm_mode.n_tx as u32).max(1);

        let per_ts_baseband = self.build_baseband_per_ts(descriptor);
        let baseband_len = per_ts_baseband.first().map(|b| b.len()).unwrap_or(0);

        let handle = match tx_buffers.try_acquire_any() {
            Some(h) => h,
            None => return, // §7 "TX buffer unavailable": caller's fail counters already incremented
        };

        let nof_antennas = handle.get_ant_streams(0).len().max(1);

        // Precode (§4.11 stage 5): combine transmit streams into antenna
        // ports at baseband rate, equivalent to frequency-domain precoding
        // before IFFT since `precoding_weight` is flat across subcarriers.
        let mut combined: Vec<Vec<Complex32>> = vec![vec![Complex32::default(); baseband_len]; nof_antennas];
        for (ant, ant_wave) in combined.iter_mut().enumerate() {
            if (ant as u32) >= n_tx {
                continue;
            }
            for (ts, ts_wave) in per_ts_baseband.iter().enumerate() {
                let w = precoding_weight(n_ts, n_tx, descriptor.codebook_index, ts as u32, ant as u32);
                if w == Complex32::default() {
                    continue;
                }
                for (s, v) in ant_wave.iter_mut().zip(ts_wave.iter()) {
                    *s += *v * w;
                }
            }
        }

        // Resample L/M to hardware rate (§4.11 stage 6), one resampler
        // instance per antenna since each antenna's waveform differs once
        // precoded.
        let mut resampled: Vec<Vec<Complex32>> = Vec::with_capacity(nof_antennas);
        let mut final_len = 0usize;
        for ant_wave in &combined {
            let mut resampler = Resampler::new(self.os_l, self.os_m, RESAMPLER_PARAM_TX);
            let mut out = Vec::with_capacity(ant_wave.len() * self.os_l.max(1) as usize / self.os_m.max(1) as usize + 32);
            resampler.resample(ant_wave, ant_wave.len(), &mut out);
            resampler.resample_final_samples(&mut out);
            final_len = final_len.max(out.len());
            resampled.push(out);
        }

        let mut streams = handle.get_ant_streams(final_len);
        for (ant, stream) in streams.iter_mut().enumerate() {
            let samples = &resampled[ant];
            for (n, s) in stream.iter_mut().enumerate() {
                let phase = descriptor.initial_iq_phase + descriptor.phase_increment_per_sample * n as f32;
                let cfo_correction = Complex32::from_polar(1.0, phase);
                let base = samples.get(n).copied().unwrap_or_default();
                *s = base * descriptor.dac_scale * cfo_correction;
            }
        }
        drop(streams);

        handle.set_tx_length_samples_cnt(final_len as u32);
        handle.set_transmittable(TxBufferMeta {
            tx_order_id: 0,
            tx_order_id_expect_next: None,
            tx_time_64: tx_time_hint,
            tx_power_adj_db: None,
            rx_power_adj_db: None,
            busy_wait_us: 0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_iface::PlcfType;
    use crate::sections_part3::numerologies::get_numerologies;
    use crate::sections_part3::packet_sizes::get_packet_sizes;
    use crate::sections_part3::packet_sizes::PacketSizeDef;

    fn descriptor_with(tm_mode_index: u8) -> TxDescriptor {
        let psdef = PacketSizeDef { u: 1, b: 1, packet_length_type: 0, packet_length: 2, tm_mode_index, mcs_index: 0, z: 6144 };
        let sizes = get_packet_sizes(psdef).expect("valid packet sizes");
        TxDescriptor {
            tb_bytes: vec![0xAB; (sizes.n_tb_byte as usize).max(1)],
            packet_sizes: sizes,
            codebook_index: 0,
            redundancy_version: 0,
            network_id: 1,
            plcf_type: PlcfType::Type1,
            plcf_bytes: vec![1u8; 5],
            dac_scale: 1.0,
            optimal_scaling: false,
            gi_percentage: 100,
            initial_iq_phase: 0.0,
            phase_increment_per_sample: 0.0,
        }
    }

    fn small_descriptor() -> TxDescriptor {
        descriptor_with(0)
    }

    #[test]
    fn build_baseband_produces_stf_plus_df_symbols() {
        let pipeline = TxPipeline::new(1, 1);
        let descriptor = small_descriptor();
        let per_ts = pipeline.build_baseband_per_ts(&descriptor);
        assert_eq!(per_ts.len(), 1);
        let n = &descriptor.packet_sizes.numerology;
        let stf_len = crate::sync::stf_template::N_SAMPLES_STF_PATTERN * crate::sync::stf_template::nof_stf_patterns(n.u);
        assert!(per_ts[0].len() > stf_len);
    }

    #[test]
    fn render_marks_a_buffer_transmittable() {
        let pipeline = TxPipeline::new(1, 1);
        let descriptor = small_descriptor();
        let pool = TxBufferPool::new(1, 1, 8192);
        pipeline.render(&descriptor, 0, &pool);
        assert_eq!(pool.total_fail_count(), 0);
    }

    #[test]
    fn transmit_diversity_mode_produces_two_transmit_streams() {
        let pipeline = TxPipeline::new(1, 1);
        let descriptor = descriptor_with(1); // N_TS=2, N_SS=1, open-loop
        let per_ts = pipeline.build_baseband_per_ts(&descriptor);
        assert_eq!(per_ts.len(), 2);
        assert_eq!(per_ts[0].len(), per_ts[1].len());
    }

    #[test]
    fn transmit_diversity_render_writes_both_antennas() {
        let pipeline = TxPipeline::new(1, 1);
        let descriptor = descriptor_with(1);
        let pool = TxBufferPool::new(1, 2, 16384);
        pipeline.render(&descriptor, 0, &pool);
        assert_eq!(pool.total_fail_count(), 0);
        let samples = pool.read_buffer(0);
        assert_eq!(samples.len(), 2);
        assert!(samples[0].iter().any(|s| s.norm_sqr() > 0.0));
        assert!(samples[1].iter().any(|s| s.norm_sqr() > 0.0));
    }

    #[test]
    fn resampling_changes_sample_count_for_nontrivial_ratio() {
        let pipeline = TxPipeline::new(3, 2);
        let descriptor = small_descriptor();
        let pool = TxBufferPool::new(1, 1, 1 << 16);
        pipeline.render(&descriptor, 0, &pool);
        let per_ts = pipeline.build_baseband_per_ts(&descriptor);
        let baseband_len = per_ts[0].len();
        let samples = pool.read_buffer(0);
        // 3/2 oversampling must move a materially different sample count
        // than the untouched baseband length (the bug this guards against
        // is `render` silently writing baseband-rate samples unchanged).
        assert!(samples[0].len() > baseband_len);
    }
}
