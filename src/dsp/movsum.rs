//! Numerically-stabilized sliding moving sums (§4.3, §5 "Numerical invariants").
//!
//! Grounded on `movsum.hpp` (generic shift-register moving sum) and
//! `movsum_uw.hpp` (unit-weighted variant driven by the STF cover
//! sequence's pairwise product, used by the correlation-sum accumulator).

use num_complex::Complex32;
use std::ops::{AddAssign, SubAssign};

/// Generic shift-register moving sum over `T ∈ {f32, Complex32}`.
///
/// Every `resum_period` pops, `resum()` recomputes the sum directly from
/// the shift register to bound accumulated floating-point error (§5).
#[derive(Debug, Clone)]
pub struct MovSum<T> {
    shiftreg: Vec<T>,
    ptr: usize,
    sum: T,
    pop_cnt: u32,
    resum_period: u32,
}

impl<T: Copy + Default + AddAssign + SubAssign + std::iter::Sum> MovSum<T> {
    pub fn new(length: usize, resum_period: u32) -> Self {
        assert!(length > 0, "movsum length must be positive");
        Self {
            shiftreg: vec![T::default(); length],
            ptr: 0,
            sum: T::default(),
            pop_cnt: 0,
            resum_period,
        }
    }

    pub fn reset(&mut self) {
        self.shiftreg.iter_mut().for_each(|v| *v = T::default());
        self.ptr = 0;
        self.sum = T::default();
        self.pop_cnt = 0;
    }

    pub fn len(&self) -> usize {
        self.shiftreg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shiftreg.is_empty()
    }

    pub fn sum(&self) -> T {
        self.sum
    }

    /// Recomputes `sum` directly from the shift register.
    pub fn resum(&mut self) {
        self.sum = self.shiftreg.iter().copied().sum();
        self.pop_cnt = 0;
    }

    /// Pushes `val`, pops the oldest sample, updates the running sum; resums
    /// from scratch every `resum_period` calls.
    pub fn pop_push(&mut self, val: T) {
        self.sum -= self.shiftreg[self.ptr];
        self.sum += val;
        self.shiftreg[self.ptr] = val;
        self.ptr = (self.ptr + 1) % self.shiftreg.len();

        self.pop_cnt += 1;
        if self.resum_period > 0 && self.pop_cnt >= self.resum_period {
            self.resum();
        }
    }

    pub fn front(&self) -> &[T] {
        &self.shiftreg
    }
}

/// Unit-weighted moving sum for the STF correlation-sum accumulator `R`.
///
/// Each shift-register slot is scaled by a per-position weight drawn from
/// the (repeated) cover-sequence pairwise-product vector before being added
/// to/removed from the running sum, so that `pop_push` applies the correct
/// sign/scale without needing to re-derotate the whole window every step.
#[derive(Debug, Clone)]
pub struct MovSumUw {
    shiftreg: Vec<Complex32>,
    uw: Vec<f32>,
    ptr: usize,
    sum: Complex32,
    pop_cnt: u32,
    resum_period: u32,
}

impl MovSumUw {
    /// `uw` is the unit-weight vector (one entry per shift-register slot,
    /// already expanded/repeated to match `length`).
    pub fn new(uw: Vec<f32>, resum_period: u32) -> Self {
        let length = uw.len();
        assert!(length > 0, "unit-weight moving sum length must be positive");
        Self {
            shiftreg: vec![Complex32::default(); length],
            uw,
            ptr: 0,
            sum: Complex32::default(),
            pop_cnt: 0,
            resum_period,
        }
    }

    pub fn reset(&mut self) {
        self.shiftreg.iter_mut().for_each(|v| *v = Complex32::default());
        self.ptr = 0;
        self.sum = Complex32::default();
        self.pop_cnt = 0;
    }

    pub fn len(&self) -> usize {
        self.shiftreg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shiftreg.is_empty()
    }

    pub fn sum(&self) -> Complex32 {
        self.sum
    }

    pub fn resum(&mut self) {
        self.sum = self
            .shiftreg
            .iter()
            .zip(self.uw.iter())
            .map(|(v, w)| *v * *w)
            .sum();
        self.pop_cnt = 0;
    }

    /// `val` is the raw (un-weighted) conjugate-product sample entering the
    /// window; the weight is applied internally using `ptr`'s position.
    pub fn pop_push(&mut self, val: Complex32) {
        let old = self.shiftreg[self.ptr] * self.uw[self.ptr];
        let new = val * self.uw[self.ptr];
        self.sum -= old;
        self.sum += new;
        self.shiftreg[self.ptr] = val;
        self.ptr = (self.ptr + 1) % self.shiftreg.len();

        self.pop_cnt += 1;
        if self.resum_period > 0 && self.pop_cnt >= self.resum_period {
            self.resum();
        }
    }
}
