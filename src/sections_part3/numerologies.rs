//! Numerology formulas (§3 [ADD]), ported from `numerologies.cpp`.

/// Base subcarrier spacing, Hz (`subcarrier_spacing_min_u_b`).
pub const SUBCARRIER_SPACING_MIN_U_B: u32 = 27_000;

/// Derived FFT size / CP length / occupied-subcarrier table for one (u, b) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Numerologies {
    pub u: u32,
    pub b: u32,

    pub delta_u_f: u32,
    pub t_u_symb: f64,
    pub n_slot_u_symb: u32,
    pub n_slot_u_subslot: u32,

    pub n_b_dft: u32,
    pub n_b_cp: u32,
    pub n_b_occ: u32,

    pub n_guards_top: u32,
    pub n_guards_bottom: u32,
}

/// u must be a power of two up to 8; b must be a power of two up to 16, or 12.
fn u_is_valid(u: u32) -> bool {
    u.is_power_of_two() && u <= 8
}

fn b_is_valid(b: u32) -> bool {
    (b.is_power_of_two() && b <= 16) || b == 12
}

/// Computes numerology-dependent sizes for subcarrier-spacing multiplier `u`
/// and bandwidth multiplier `b`. Panics (mirrors `dectnrp_assert`) if either
/// is not one of the admissible values enumerated in the glossary.
pub fn get_numerologies(u: u32, b: u32) -> Numerologies {
    assert!(u_is_valid(u), "u undefined: {u}");
    assert!(b_is_valid(b), "b undefined: {b}");

    let delta_u_f = u * SUBCARRIER_SPACING_MIN_U_B;
    let t_u_symb = (64.0 + 8.0) / 64.0 / delta_u_f as f64;
    let n_slot_u_symb = u * 10;
    let n_slot_u_subslot = u * 2;

    let n_b_dft = b * 64;
    let n_b_cp = b * 8;
    let n_b_occ = b * 56;

    let n_guards_top = (n_b_dft - n_b_occ) / 2 - 1;
    let n_guards_bottom = n_guards_top + 1;

    Numerologies {
        u,
        b,
        delta_u_f,
        t_u_symb,
        n_slot_u_symb,
        n_slot_u_subslot,
        n_b_dft,
        n_b_cp,
        n_b_occ,
        n_guards_top,
        n_guards_bottom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mu1_beta1_matches_known_values() {
        let n = get_numerologies(1, 1);
        assert_eq!(n.delta_u_f, 27_000);
        assert_eq!(n.n_b_dft, 64);
        assert_eq!(n.n_b_cp, 8);
        assert_eq!(n.n_b_occ, 56);
        assert_eq!(n.n_guards_top, 3);
        assert_eq!(n.n_guards_bottom, 4);
    }

    #[test]
    fn mu8_beta16_scales_linearly() {
        let n = get_numerologies(8, 16);
        assert_eq!(n.delta_u_f, 216_000);
        assert_eq!(n.n_b_dft, 1024);
        assert_eq!(n.n_b_occ, 896);
    }

    #[test]
    #[should_panic]
    fn invalid_u_panics() {
        get_numerologies(3, 1);
    }

    #[test]
    fn beta_twelve_is_valid() {
        let n = get_numerologies(1, 12);
        assert_eq!(n.n_b_dft, 768);
    }
}
