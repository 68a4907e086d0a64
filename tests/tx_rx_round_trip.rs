// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Black-box TX -> RX round trip (§8 scenarios 4-6): render a `TxDescriptor`
//! through `TxPipeline`, push the rendered waveform into an `InMemoryRxRing`,
//! and drive `RxSynced::process_pcc`/`process_pdc` against it the way
//! `pool::worker_tx_rx`'s TX/RX worker does, asserting the PLCF and
//! transport-block bytes recovered match what was transmitted.

use std::sync::Arc;

use parking_lot::Mutex;

use dectnrp_phy::mac_iface::{HarqBuffer, PdcDecision, PlcfType, TxDescriptor};
use dectnrp_phy::pool::worker_tx_rx::{SyncedRxProcessor, TxRenderer};
use dectnrp_phy::ring::rx_ring::InMemoryRxRing;
use dectnrp_phy::ring::tx_ring::TxBufferPool;
use dectnrp_phy::rx_synced::RxSynced;
use dectnrp_phy::sections_part3::packet_sizes::{get_packet_sizes, PacketSizeDef};
use dectnrp_phy::sync::sync_report::SyncReport;
use dectnrp_phy::sync::time_report::FinePeak;
use dectnrp_phy::tx::tx_pipeline::TxPipeline;

const SAMP_RATE: u32 = 1_000_000;

/// Maps a transmission mode's `N_eff_TX` back to the crosscorrelator
/// template index a real sync worker would have reported, mirroring
/// `rx_synced::n_eff_tx_from_template_idx`'s `{1,2,4,8}` enumeration.
fn template_idx_for_n_eff_tx(n_eff_tx: u32) -> usize {
    match n_eff_tx {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

fn descriptor(tm_mode_index: u8, payload: Vec<u8>) -> TxDescriptor {
    let psdef = PacketSizeDef { u: 1, b: 1, packet_length_type: 0, packet_length: 2, tm_mode_index, mcs_index: 0, z: 6144 };
    let sizes = get_packet_sizes(psdef).expect("valid packet sizes");
    let tb_len = sizes.n_tb_byte as usize;
    let mut tb_bytes = payload;
    tb_bytes.resize(tb_len.max(1), 0xAB);
    TxDescriptor {
        tb_bytes,
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

/// Renders `descriptor` at baseband rate (no hardware resampling) into a
/// ring with `nof_rx_antennas`, padding the tail with zeros so every
/// `wait_until` call inside `process_pcc`/`process_pdc` is already
/// satisfied by the time the round trip runs.
fn render_into_ring(descriptor: &TxDescriptor, nof_tx_antennas: usize, nof_rx_antennas: usize) -> Arc<InMemoryRxRing> {
    let pipeline = TxPipeline::new(1, 1);
    let tx_buffers = TxBufferPool::new(1, nof_tx_antennas, descriptor.packet_sizes.n_samples_packet as usize * 2);
    pipeline.render(descriptor, 0, &tx_buffers);
    assert_eq!(tx_buffers.total_fail_count(), 0, "render must acquire a TX buffer");

    let tx_streams = tx_buffers.read_buffer(0);
    assert_eq!(tx_streams.len(), nof_tx_antennas);
    let waveform_len = tx_streams[0].len();

    // A SISO TX feeds every RX antenna the same waveform (a single shared
    // propagation path); a 2x1 diversity TX combines its own antennas'
    // waveforms into whatever the single RX antenna observes.
    let rx_streams: Vec<Vec<dectnrp_phy::sample::Sample>> = (0..nof_rx_antennas)
        .map(|rx_ant| {
            let mut combined = vec![dectnrp_phy::sample::Sample::default(); waveform_len];
            for tx_stream in &tx_streams {
                for (c, s) in combined.iter_mut().zip(tx_stream.iter()) {
                    *c += *s;
                }
            }
            let _ = rx_ant;
            combined
        })
        .collect();

    let ring_len = waveform_len * 4 + (1 << 20);
    let ring = Arc::new(InMemoryRxRing::new(nof_rx_antennas, ring_len, SAMP_RATE));
    ring.push_samples(&rx_streams);
    let padding = vec![dectnrp_phy::sample::Sample::default(); ring_len];
    ring.push_samples(&(0..nof_rx_antennas).map(|_| padding.clone()).collect::<Vec<_>>());
    ring
}

/// §8 scenario 4: PLCF type-1, SISO.
#[test]
fn siso_round_trip_recovers_plcf_and_transport_block() {
    let tx_descriptor = descriptor(0, b"hello dect nr+ world!!".to_vec());
    let n_eff_tx = tx_descriptor.packet_sizes.tm_mode.n_eff_tx as u32;
    let ring = render_into_ring(&tx_descriptor, 1, 1);

    let rx = RxSynced::with_mu(SAMP_RATE, 5, tx_descriptor.packet_sizes.psdef.u);
    let sync_report = SyncReport::Found {
        fine: FinePeak { time_64: 0, n_eff_tx_template_idx: template_idx_for_n_eff_tx(n_eff_tx), correlation_peak: 1.0 },
        antenna_index: 0,
        chunk_start_time: 0,
        beta: tx_descriptor.packet_sizes.psdef.b,
    };

    let pcc_report = rx.process_pcc(ring.as_ref(), &sync_report);
    assert!(pcc_report.has_valid_plcf(), "PCC blind decode must recover a PLCF candidate");
    let candidate = &pcc_report.candidates[0];
    assert_eq!(candidate.plcf_type, PlcfType::Type1);
    // `candidate.bytes` is the info bytes plus the trailing CRC-16 that
    // `decode_plcf` still returns (see `try_decode_plcf_type`'s doc).
    assert_eq!(&candidate.bytes[..tx_descriptor.plcf_bytes.len()], tx_descriptor.plcf_bytes.as_slice());

    let decision = PdcDecision::DecidePdc {
        redundancy_version: tx_descriptor.redundancy_version,
        network_id: tx_descriptor.network_id,
        packet_sizes: tx_descriptor.packet_sizes.clone(),
        harq_buffer: Arc::new(Mutex::new(HarqBuffer::default())),
    };
    let pdc_report = rx.process_pdc(ring.as_ref(), &sync_report, &decision);
    assert!(pdc_report.crc_ok, "transport block CRC must pass on a clean round trip");
    assert_eq!(pdc_report.tb_bytes, tx_descriptor.tb_bytes);
}

/// §8 scenario 5: PDC MRC gain, SISO TX into two RX antennas.
#[test]
fn two_antenna_mrc_round_trip_recovers_transport_block() {
    let tx_descriptor = descriptor(0, b"mrc across two receive antennas".to_vec());
    let n_eff_tx = tx_descriptor.packet_sizes.tm_mode.n_eff_tx as u32;
    let ring = render_into_ring(&tx_descriptor, 1, 2);

    let rx = RxSynced::with_mu(SAMP_RATE, 5, tx_descriptor.packet_sizes.psdef.u);
    let sync_report = SyncReport::Found {
        fine: FinePeak { time_64: 0, n_eff_tx_template_idx: template_idx_for_n_eff_tx(n_eff_tx), correlation_peak: 1.0 },
        antenna_index: 0,
        chunk_start_time: 0,
        beta: tx_descriptor.packet_sizes.psdef.b,
    };

    let pcc_report = rx.process_pcc(ring.as_ref(), &sync_report);
    assert!(pcc_report.has_valid_plcf());

    let decision = PdcDecision::DecidePdc {
        redundancy_version: tx_descriptor.redundancy_version,
        network_id: tx_descriptor.network_id,
        packet_sizes: tx_descriptor.packet_sizes.clone(),
        harq_buffer: Arc::new(Mutex::new(HarqBuffer::default())),
    };
    let pdc_report = rx.process_pdc(ring.as_ref(), &sync_report, &decision);
    assert!(pdc_report.crc_ok);
    assert_eq!(pdc_report.tb_bytes, tx_descriptor.tb_bytes);
}

/// §8 scenario 6: 2x1 open-loop transmit diversity (`tm_mode_index = 1`).
#[test]
fn transmit_diversity_round_trip_recovers_transport_block() {
    let tx_descriptor = descriptor(1, b"alamouti two stream diversity!!".to_vec());
    let n_tx = tx_descriptor.packet_sizes.tm_mode.n_tx as usize;
    let n_eff_tx = tx_descriptor.packet_sizes.tm_mode.n_eff_tx as u32;
    assert_eq!(n_tx, 2, "tm_mode_index 1 is the 2x1 open-loop diversity row");
    let ring = render_into_ring(&tx_descriptor, n_tx, 1);

    let rx = RxSynced::with_mu(SAMP_RATE, 5, tx_descriptor.packet_sizes.psdef.u);
    let sync_report = SyncReport::Found {
        fine: FinePeak { time_64: 0, n_eff_tx_template_idx: template_idx_for_n_eff_tx(n_eff_tx), correlation_peak: 1.0 },
        antenna_index: 0,
        chunk_start_time: 0,
        beta: tx_descriptor.packet_sizes.psdef.b,
    };

    let pcc_report = rx.process_pcc(ring.as_ref(), &sync_report);
    assert!(pcc_report.has_valid_plcf());

    let decision = PdcDecision::DecidePdc {
        redundancy_version: tx_descriptor.redundancy_version,
        network_id: tx_descriptor.network_id,
        packet_sizes: tx_descriptor.packet_sizes.clone(),
        harq_buffer: Arc::new(Mutex::new(HarqBuffer::default())),
    };
    let pdc_report = rx.process_pdc(ring.as_ref(), &sync_report, &decision);
    assert!(pdc_report.crc_ok);
    assert_eq!(pdc_report.tb_bytes, tx_descriptor.tb_bytes);
}
