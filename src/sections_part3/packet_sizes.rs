//! Packet-size definition (psdef) and derived packet-sizes record (§3).
//!
//! Grounded on `derivative/packet_sizes.cpp`, `transmission_packet_structure.cpp`
//! and `pdc.cpp::get_N_PDC_subc`/`get_N_DF_symb`/`get_N_DRS_subc`. The MCS
//! table and codeblock segmentation (`transport_block_size.cpp`, `cbsegm.hpp`)
//! were not present in the retrieved original source — see `DESIGN.md` for
//! the reconstruction rationale; the *rejection conditions* (filler bits,
//! zero PDC cells, N_eff_TX symbol-count floors) are load-bearing and match
//! spec.md §3 exactly.

use crate::sections_part3::numerologies::{get_numerologies, Numerologies};
use crate::sections_part3::tmmode::{get_transmission_mode, TransmissionMode};

/// Packet-size definition, the tuple named in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketSizeDef {
    pub u: u32,
    pub b: u32,
    pub packet_length_type: u32,
    pub packet_length: u32,
    pub tm_mode_index: u8,
    pub mcs_index: u8,
    pub z: u32,
}

/// One row of the MCS table: bits/symbol and code rate (reconstructed, see
/// `DESIGN.md`; DECT NR+ Table 6.2.1-1 spans BPSK..1024-QAM).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mcs {
    pub index: u8,
    pub n_bps: u32,
    pub r_num: u32,
    pub r_den: u32,
}

const MCS_TABLE: [Mcs; 10] = [
    Mcs { index: 0, n_bps: 1, r_num: 1, r_den: 2 },
    Mcs { index: 1, n_bps: 2, r_num: 1, r_den: 2 },
    Mcs { index: 2, n_bps: 2, r_num: 3, r_den: 4 },
    Mcs { index: 3, n_bps: 4, r_num: 1, r_den: 2 },
    Mcs { index: 4, n_bps: 4, r_num: 3, r_den: 4 },
    Mcs { index: 5, n_bps: 6, r_num: 2, r_den: 3 },
    Mcs { index: 6, n_bps: 6, r_num: 3, r_den: 4 },
    Mcs { index: 7, n_bps: 6, r_num: 5, r_den: 6 },
    Mcs { index: 8, n_bps: 8, r_num: 3, r_den: 4 },
    Mcs { index: 9, n_bps: 8, r_num: 5, r_den: 6 },
];

pub fn get_mcs(mcs_index: u8) -> Option<Mcs> {
    MCS_TABLE.get(mcs_index as usize).copied()
}

/// Codeblock-segmentation outcome (simplified Turbo-style segmentation).
/// `F` is the number of filler bits the standard's 5.3 footnote says should
/// always be zero but in fact is not (see spec.md §3's rejection rule).
#[derive(Debug, Clone, Copy, PartialEq)]
struct CbSegm {
    c: u32,
    f: u32,
}

/// Minimum codeblock size (payload + 24-bit codeblock CRC) below which the
/// segmentation scheme would require filler bits.
const CB_MIN_B_BITS: u32 = 40;
const CB_CRC_BITS: u32 = 24;

fn cbsegm(n_tb_bits: u32, z: u32) -> CbSegm {
    let b = n_tb_bits + CB_CRC_BITS;
    if b < CB_MIN_B_BITS {
        return CbSegm { c: 0, f: 1 };
    }
    let c = b.div_ceil(z).max(1);
    CbSegm { c, f: 0 }
}

/// Fully derived packet-sizes record (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSizes {
    pub psdef: PacketSizeDef,
    pub numerology: Numerologies,
    pub mcs: Mcs,
    pub tm_mode: TransmissionMode,

    pub n_packet_symb: u32,
    pub n_df_symb: u32,
    pub n_pdc_subc: u32,
    pub n_drs_subc: u32,
    pub g: u32,
    pub n_pdc_bits: u32,
    pub n_tb_bits: u32,
    pub n_tb_byte: u32,
    pub c: u32,

    pub n_samples_ofdm_symbol: u32,
    pub n_samples_stf: u32,
    pub n_samples_stf_cp_only: u32,
    pub n_samples_df: u32,
    pub n_samples_gi: u32,
    pub n_samples_packet_no_gi: u32,
    pub n_samples_packet: u32,
}

fn n_packet_symb(packet_length_type: u32, packet_length: u32, n: &Numerologies) -> u32 {
    if packet_length_type == 0 {
        packet_length * n.n_slot_u_symb / n.n_slot_u_subslot
    } else {
        packet_length * n.n_slot_u_symb
    }
}

fn n_samples_ofdm_symbol(b: u32) -> u32 {
    (64 + 8) * b
}

fn n_samples_stf(u: u32, b: u32) -> u32 {
    let sym = n_samples_ofdm_symbol(b);
    if u == 1 {
        sym * 14 / 9
    } else {
        sym * 2
    }
}

fn n_samples_gi(u: u32, b: u32) -> u32 {
    let sym = n_samples_ofdm_symbol(b);
    match u {
        1 => sym * 4 / 9,
        2 | 4 => sym,
        8 => sym * 2,
        _ => unreachable!("u undefined"),
    }
}

fn n_df_symb(u: u32, n_packet_symb: u32) -> u32 {
    match u {
        1 => n_packet_symb - 2,
        2 | 4 => n_packet_symb - 3,
        8 => n_packet_symb - 4,
        _ => unreachable!("u undefined"),
    }
}

fn nof_ofdm_symbols_carrying_drs_per_ts(u: u32, n_packet_symb: u32, n_eff_tx: u32) -> u32 {
    let n_step = if n_eff_tx <= 2 { 5 } else { 10 };
    let mut n = n_packet_symb / n_step;
    if n_step == 10 && n_packet_symb % 10 != 0 {
        debug_assert_eq!(n_packet_symb % 5, 0, "N_PACKET_symb not a multiple of 5 or 10");
        n += 1;
    }
    let _ = u;
    n
}

fn n_drs_subc(u: u32, n_packet_symb: u32, n_eff_tx: u32, n_b_occ: u32) -> u32 {
    n_eff_tx * n_b_occ / 4 * nof_ofdm_symbols_carrying_drs_per_ts(u, n_packet_symb, n_eff_tx)
}

/// PCC always needs its 98 cells spread across the leading DF symbols;
/// returns `false` if there is not even room for one full PCC allocation.
fn pcc_can_be_placed(n_df_symb: u32, n_b_occ: u32) -> bool {
    let pcc_cells = 98u32;
    n_df_symb >= pcc_cells.div_ceil(n_b_occ)
}

fn n_pdc_subc(n_packet_symb: u32, u: u32, n_eff_tx: u32, n_b_occ: u32) -> u32 {
    let pcc_cells = 98u32;
    let df = n_df_symb(u, n_packet_symb);
    let drs = n_drs_subc(u, n_packet_symb, n_eff_tx, n_b_occ);
    let total = df * n_b_occ;
    let used = drs + pcc_cells;
    if total <= used {
        0
    } else {
        total - used
    }
}

/// Computes the derived packet-sizes record from a psdef, or `None` if the
/// psdef is rejected per the conditions enumerated in spec.md §3.
pub fn get_packet_sizes(psdef: PacketSizeDef) -> Option<PacketSizes> {
    assert!(psdef.u.is_power_of_two() && psdef.u <= 8, "u undefined");
    assert!(
        (psdef.b.is_power_of_two() && psdef.b <= 16) || psdef.b == 12,
        "b undefined"
    );
    assert!(psdef.packet_length_type <= 1, "PacketLengthType undefined");
    assert!(
        psdef.packet_length >= 1 && psdef.packet_length <= 16,
        "PacketLength undefined"
    );
    assert!(psdef.tm_mode_index <= 11, "tm_mode_index undefined");
    assert!(psdef.z == 2048 || psdef.z == 6144, "Z undefined");

    let numerology = get_numerologies(psdef.u, psdef.b);

    let n_packet_symb_v = n_packet_symb(psdef.packet_length_type, psdef.packet_length, &numerology);
    if !(5..=1280).contains(&n_packet_symb_v) || n_packet_symb_v % 5 != 0 {
        return None;
    }

    let tm_mode = get_transmission_mode(psdef.tm_mode_index)?;
    let n_eff_tx = tm_mode.n_eff_tx as u32;

    // 5.1 Transmission packet structure.
    if n_eff_tx == 4 && n_packet_symb_v < 15 {
        return None;
    }
    if psdef.u == 8 && n_eff_tx == 8 && (n_packet_symb_v < 20 || n_packet_symb_v % 10 != 0) {
        return None;
    }

    let n_df_symb_v = n_df_symb(psdef.u, n_packet_symb_v);
    if !pcc_can_be_placed(n_df_symb_v, numerology.n_b_occ) {
        return None;
    }

    let n_pdc_subc_v = n_pdc_subc(n_packet_symb_v, psdef.u, n_eff_tx, numerology.n_b_occ);
    if n_pdc_subc_v == 0 {
        return None;
    }

    let mcs = get_mcs(psdef.mcs_index)?;
    let n_ss = tm_mode.n_ss as u32;

    let g = n_ss * n_pdc_subc_v * mcs.n_bps;
    let n_pdc_bits = (g * mcs.r_num) / mcs.r_den;
    let n_tb_bits = n_pdc_bits - (n_pdc_bits % 8);
    if n_tb_bits == 0 {
        return None;
    }

    let cb = cbsegm(n_tb_bits, psdef.z);
    if cb.f > 0 {
        return None;
    }

    let n_drs_subc_v = n_drs_subc(psdef.u, n_packet_symb_v, n_eff_tx, numerology.n_b_occ);

    let n_samples_ofdm_symbol_v = n_samples_ofdm_symbol(psdef.b);
    let n_samples_stf_v = n_samples_stf(psdef.u, psdef.b);
    let n_samples_stf_cp_only_v = n_samples_stf_v - 64 * psdef.b;
    let n_samples_df_v = n_samples_ofdm_symbol_v * n_df_symb_v;
    let n_samples_gi_v = n_samples_gi(psdef.u, psdef.b);
    let n_samples_packet_no_gi_v = n_samples_stf_v + n_samples_df_v;
    let n_samples_packet_v = n_samples_packet_no_gi_v + n_samples_gi_v;

    debug_assert_eq!(
        n_samples_packet_v,
        n_samples_ofdm_symbol_v * n_packet_symb_v,
        "incorrect number of samples for STF, DF and GI"
    );

    Some(PacketSizes {
        psdef,
        numerology,
        mcs,
        tm_mode,
        n_packet_symb: n_packet_symb_v,
        n_df_symb: n_df_symb_v,
        n_pdc_subc: n_pdc_subc_v,
        n_drs_subc: n_drs_subc_v,
        g,
        n_pdc_bits,
        n_tb_bits,
        n_tb_byte: n_tb_bits.div_ceil(8),
        c: cb.c,
        n_samples_ofdm_symbol: n_samples_ofdm_symbol_v,
        n_samples_stf: n_samples_stf_v,
        n_samples_stf_cp_only: n_samples_stf_cp_only_v,
        n_samples_df: n_samples_df_v,
        n_samples_gi: n_samples_gi_v,
        n_samples_packet_no_gi: n_samples_packet_no_gi_v,
        n_samples_packet: n_samples_packet_v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_psdef() -> PacketSizeDef {
        PacketSizeDef {
            u: 1,
            b: 1,
            packet_length_type: 1,
            packet_length: 5,
            tm_mode_index: 0,
            mcs_index: 2,
            z: 2048,
        }
    }

    #[test]
    fn siso_mu1_beta1_is_feasible() {
        let q = get_packet_sizes(base_psdef()).expect("feasible psdef");
        assert_eq!(q.n_packet_symb, 5);
        assert_eq!(q.numerology.n_b_dft, 64);
        assert!(q.n_pdc_subc > 0);
        assert!(q.n_tb_bits > 0);
        assert_eq!(
            q.n_samples_packet,
            q.n_samples_ofdm_symbol * q.n_packet_symb
        );
    }

    #[test]
    fn n_eff_tx_4_needs_at_least_15_symbols() {
        let mut psdef = base_psdef();
        psdef.tm_mode_index = 4; // N_eff_TX = 4
        psdef.packet_length = 5;
        assert!(get_packet_sizes(psdef).is_none());

        psdef.packet_length = 15;
        assert!(get_packet_sizes(psdef).is_some());
    }

    #[test]
    fn mu8_n_eff_tx_8_needs_multiple_of_ten() {
        let mut psdef = base_psdef();
        psdef.u = 8;
        psdef.tm_mode_index = 8; // N_eff_TX = 8
        psdef.packet_length_type = 1;
        psdef.packet_length = 2; // N_PACKET_symb = 20
        assert!(get_packet_sizes(psdef).is_some());

        psdef.packet_length = 3; // N_PACKET_symb = 30, multiple of 10: ok
        assert!(get_packet_sizes(psdef).is_some());
    }

    #[test]
    fn tiny_tb_bits_rejected_for_filler() {
        // Smallest feasible packet with the lowest-rate MCS should still
        // clear the 40-bit codeblock floor; verify the rejection path
        // directly via cbsegm instead of hunting for a pathological psdef.
        assert_eq!(cbsegm(8, 2048).f, 1);
        assert_eq!(cbsegm(100, 2048).f, 0);
    }

    #[test]
    fn invalid_tm_mode_index_rejected() {
        let mut psdef = base_psdef();
        psdef.tm_mode_index = 200;
        assert!(get_transmission_mode(psdef.tm_mode_index).is_none());
    }
}
