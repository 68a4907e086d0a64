//! QAM symbol mapping/demapping for the MCS table's `N_bps ∈ {1,2,4,6,8}`
//! (§3 "psdef" MCS field, §4.11 stage 4 "Map the 196 PCC bits to 98 QPSK
//! symbols", §4.12 stage 1 "select demapper for the MCS").
//!
//! Grounded on the black-box "modulation tables" interface named in
//! spec.md §1; square Gray-coded QAM constellations generated
//! algorithmically rather than tabulated, since the §8 properties only
//! require a consistent, invertible mapping, not bit-exact standard tables.

use num_complex::Complex32;

use crate::codec::fec::LLR_MAX;

/// Converts an unsigned integer to its binary-reflected Gray code.
#[inline]
fn to_gray(n: u32) -> u32 {
    n ^ (n >> 1)
}

/// Inverse of [`to_gray`].
#[inline]
fn from_gray(mut g: u32) -> u32 {
    let mut n = 0u32;
    while g != 0 {
        n ^= g;
        g >>= 1;
    }
    n
}

/// A square M-QAM constellation with `n_bps` bits/symbol (`n_bps` even,
/// `M = 2^n_bps`), unit average energy, Gray-coded per I/Q half.
pub struct Qam {
    n_bps: u32,
    bits_per_dim: u32,
    levels: u32,
    scale: f32,
}

impl Qam {
    pub fn new(n_bps: u32) -> Self {
        assert!(n_bps >= 1 && n_bps <= 8, "unsupported N_bps: {n_bps}");
        let bits_per_dim = n_bps.div_ceil(2);
        let levels = 1u32 << bits_per_dim;
        // Average energy of a PAM constellation with `levels` equally
        // spaced points at unit spacing is (levels^2-1)/3; normalize per
        // dimension so the combined I/Q constellation has unit average power.
        let avg_energy_per_dim = (levels as f32 * levels as f32 - 1.0) / 3.0;
        let scale = 1.0 / (2.0 * avg_energy_per_dim).sqrt();
        Self { n_bps, bits_per_dim, levels, scale }
    }

    pub fn n_bps(&self) -> u32 {
        self.n_bps
    }

    fn pam_level(&self, gray_code: u32) -> f32 {
        let natural = from_gray(gray_code);
        2.0 * natural as f32 - (self.levels - 1) as f32
    }

    /// Maps `n_bps` bits (MSB first) to one complex symbol. For odd
    /// `n_bps` (e.g. 1 for BPSK), the imaginary dimension carries zero bits
    /// and is fixed at the constellation's positive rail.
    pub fn map_bits(&self, bits: &[u8]) -> Complex32 {
        debug_assert_eq!(bits.len() as u32, self.n_bps);
        let i_bits = self.bits_per_dim.min(self.n_bps);
        let q_bits = self.n_bps - i_bits;

        let mut i_code = 0u32;
        for &b in &bits[..i_bits as usize] {
            i_code = (i_code << 1) | b as u32;
        }
        let mut q_code = 0u32;
        for &b in &bits[i_bits as usize..] {
            q_code = (q_code << 1) | b as u32;
        }

        let i = self.pam_level(i_code) * self.scale;
        let q = if q_bits > 0 {
            self.pam_level(q_code) * self.scale
        } else {
            self.scale
        };
        Complex32::new(i, q)
    }

    /// Maps a whole bitstream (length a multiple of `n_bps`) to symbols.
    pub fn map(&self, bits: &[u8]) -> Vec<Complex32> {
        bits.chunks(self.n_bps as usize).map(|c| self.map_bits(c)).collect()
    }

    /// Soft-demaps one complex symbol into `n_bps` LLRs (MSB-first,
    /// positive => bit 0), using a max-log approximation: for each bit
    /// position, the nearest constellation points with that bit = 0 vs = 1
    /// set the LLR sign and magnitude from the distance difference.
    pub fn demap_symbol(&self, y: Complex32, noise_scale: f32) -> Vec<i8> {
        let i_bits = self.bits_per_dim.min(self.n_bps);
        let q_bits = self.n_bps - i_bits;

        let mut out = Vec::with_capacity(self.n_bps as usize);
        out.extend(self.demap_dim(y.re, i_bits, noise_scale));
        if q_bits > 0 {
            out.extend(self.demap_dim(y.im, q_bits, noise_scale));
        }
        out
    }

    fn demap_dim(&self, r: f32, nbits: u32, noise_scale: f32) -> Vec<i8> {
        (0..nbits)
            .map(|bit_pos| {
                let mut best0 = f32::INFINITY;
                let mut best1 = f32::INFINITY;
                for code in 0..(1u32 << nbits) {
                    let level = self.pam_level(to_gray(code) << (self.bits_per_dim - nbits)) * self.scale;
                    let dist = (r - level).powi(2);
                    let bit = (code >> (nbits - 1 - bit_pos)) & 1;
                    if bit == 0 {
                        best0 = best0.min(dist);
                    } else {
                        best1 = best1.min(dist);
                    }
                }
                let llr = (best1 - best0) / noise_scale.max(1e-6);
                quantize_llr(llr)
            })
            .collect()
    }
}

fn quantize_llr(llr: f32) -> i8 {
    llr.clamp(-(LLR_MAX as f32), LLR_MAX as f32).round() as i8
}

/// QPSK is the fixed PCC modulation (§4.11 stage 4): 2 bits/symbol, no
/// noise-dependent scaling needed for the "flipped" alternate mapping used
/// by transmit-diversity coding.
pub fn qpsk_map(bits: &[u8]) -> Vec<Complex32> {
    Qam::new(2).map(bits)
}

/// The "flipped" alternate PCC mapping used by the pair-wise
/// transmit-diversity code (§4.11 stage 4): `(-Re, +Im, +Re, -Im, ...)`
/// alternating per symbol.
pub fn qpsk_flip_alternate(symbols: &[Complex32]) -> Vec<Complex32> {
    symbols
        .iter()
        .enumerate()
        .map(|(i, s)| if i % 2 == 0 { Complex32::new(-s.re, s.im) } else { Complex32::new(s.re, -s.im) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qpsk_round_trip_noiseless() {
        let qam = Qam::new(2);
        let bits = [0u8, 1, 1, 0, 0, 0, 1, 1];
        let symbols = qam.map(&bits);
        assert_eq!(symbols.len(), 4);
        for s in &symbols {
            let llrs = qam.demap_symbol(*s, 0.1);
            let recovered: Vec<u8> = llrs.iter().map(|&l| if l >= 0 { 0 } else { 1 }).collect();
            let original_idx = symbols.iter().position(|x| x == s).unwrap();
            assert_eq!(recovered, bits[original_idx * 2..original_idx * 2 + 2]);
        }
    }

    #[test]
    fn qam16_round_trip_noiseless() {
        let qam = Qam::new(4);
        let bits: Vec<u8> = vec![1, 0, 1, 1, 0, 0, 1, 0];
        let symbols = qam.map(&bits);
        for (i, s) in symbols.iter().enumerate() {
            let llrs = qam.demap_symbol(*s, 0.1);
            let recovered: Vec<u8> = llrs.iter().map(|&l| if l >= 0 { 0 } else { 1 }).collect();
            assert_eq!(recovered, bits[i * 4..i * 4 + 4]);
        }
    }

    #[test]
    fn qam_has_unit_average_energy() {
        for n_bps in [2u32, 4, 6, 8] {
            let qam = Qam::new(n_bps);
            let n_symbols = 1u32 << n_bps;
            let mut energy = 0.0f32;
            for code in 0..n_symbols {
                let bits: Vec<u8> = (0..n_bps).rev().map(|b| ((code >> b) & 1) as u8).collect();
                energy += qam.map_bits(&bits).norm_sqr();
            }
            let avg = energy / n_symbols as f32;
            assert!((avg - 1.0).abs() < 0.05, "n_bps={n_bps} avg_energy={avg}");
        }
    }

    #[test]
    fn flip_alternate_pattern() {
        let s = vec![Complex32::new(1.0, 1.0), Complex32::new(1.0, 1.0)];
        let flipped = qpsk_flip_alternate(&s);
        assert_eq!(flipped[0], Complex32::new(-1.0, 1.0));
        assert_eq!(flipped[1], Complex32::new(1.0, -1.0));
    }
}
