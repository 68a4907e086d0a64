//! C8: the token, serializing entry into the upper-MAC for one logical
//! PHY–radio pair (§4.8).
//!
//! Grounded on `pool/token.hpp`: a mutex plus a per-caller FIFO counter
//! array, so callers with known submission sequence numbers are admitted in
//! that order even when they contend on the underlying mutex out of order.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

struct TokenState {
    holder: Option<u32>,
    fifo_counters: Vec<u64>,
}

/// Single-holder FIFO mutex serializing upper-MAC entry (§4.8).
pub struct Token {
    max_pairs: usize,
    state: Mutex<TokenState>,
    cv: Condvar,
}

impl Token {
    pub fn new(max_pairs: usize) -> Self {
        Self {
            max_pairs,
            state: Mutex::new(TokenState { holder: None, fifo_counters: vec![0u64; max_pairs] }),
            cv: Condvar::new(),
        }
    }

    /// Blocks with a 100ms-polled timeout until the token is free and
    /// `caller_id`'s counter equals `expected_cnt`, enforcing FIFO order
    /// across submitters with known sequence numbers. Returns `false` if
    /// `keep_running` goes false while waiting.
    pub fn lock_fifo(&self, caller_id: u32, expected_cnt: u64, keep_running: &std::sync::atomic::AtomicBool) -> bool {
        assert!((caller_id as usize) < self.max_pairs, "caller_id out of range");
        let mut state = self.state.lock();
        loop {
            if state.holder.is_none() && state.fifo_counters[caller_id as usize] == expected_cnt {
                state.holder = Some(caller_id);
                return true;
            }
            if !keep_running.load(std::sync::atomic::Ordering::Relaxed) {
                return false;
            }
            self.cv.wait_for(&mut state, LOCK_TIMEOUT);
        }
    }

    /// Acquires the token without FIFO ordering, retried until acquired or
    /// the deadline passes.
    pub fn try_lock(&self, caller_id: u32) -> bool {
        let mut state = self.state.lock();
        if state.holder.is_none() {
            state.holder = Some(caller_id);
            true
        } else {
            false
        }
    }

    /// Blocking variant of [`try_lock`] with a best-effort overall timeout.
    pub fn lock(&self, caller_id: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.holder.is_none() {
                state.holder = Some(caller_id);
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.cv.wait_for(&mut state, remaining.min(LOCK_TIMEOUT));
        }
    }

    /// Releases the token and advances the releasing caller's FIFO counter
    /// so the next `lock_fifo(caller_id, expected_cnt + 1)` can succeed.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        if let Some(holder) = state.holder.take() {
            state.fifo_counters[holder as usize] += 1;
        }
        self.cv.notify_all();
    }

    /// Undefined outside the critical section, per §4.8.
    pub fn get_id_holder(&self) -> Option<u32> {
        self.state.lock().holder
    }
}
