//! C7: the baton, a single-token mutual-exclusion passed in strict
//! worker-ID round-robin, gating job-queue enqueue (§4.7).
//!
//! Grounded on `pool/baton.hpp`: an atomic `id_holder` plus a condvar for
//! the 100 ms-polled wait, per §9 "Concurrency primitives" ("a single
//! atomic `id_holder` + spin-polling... both are acceptable" — this
//! implementation uses the condvar variant for lower CPU use under test).

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::sample::{SampleTime, UNDEFINED_EARLY_64};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Single-holder-at-a-time token serializing job-queue enqueue across sync
/// workers (§4.7, §5 "Ordering guarantees").
pub struct Baton {
    n: u32,
    id_holder: AtomicU32,
    sync_time_unique_limit: SampleTime,
    sync_time_last_64: AtomicI64,
    job_regular_period: u32,
    job_regular_period_cnt: Mutex<u32>,

    advance_mutex: Mutex<()>,
    advance_cv: Condvar,

    /// Startup barrier state (§4.7 `register_and_wait_for_others`).
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
}

struct BarrierState {
    arrived: u32,
    candidate_max: SampleTime,
    chosen: Option<SampleTime>,
}

impl Baton {
    pub fn new(n: u32, sync_time_unique_limit: SampleTime, job_regular_period: u32) -> Self {
        assert!(n > 0, "baton needs at least one worker");
        Self {
            n,
            id_holder: AtomicU32::new(0),
            sync_time_unique_limit,
            sync_time_last_64: AtomicI64::new(UNDEFINED_EARLY_64),
            job_regular_period,
            job_regular_period_cnt: Mutex::new(0),
            advance_mutex: Mutex::new(()),
            advance_cv: Condvar::new(),
            barrier: Mutex::new(BarrierState { arrived: 0, candidate_max: i64::MIN, chosen: None }),
            barrier_cv: Condvar::new(),
        }
    }

    pub fn nof_workers(&self) -> u32 {
        self.n
    }

    /// Startup barrier (§4.7): every worker contributes a candidate start
    /// time; the largest wins. The last arrival broadcasts and invokes
    /// `on_chosen` exactly once with the winning time.
    pub fn register_and_wait_for_others(&self, candidate: SampleTime, on_chosen: impl FnOnce(SampleTime)) -> SampleTime {
        let mut state = self.barrier.lock();
        state.arrived += 1;
        state.candidate_max = state.candidate_max.max(candidate);

        if state.arrived == self.n {
            let chosen = state.candidate_max;
            state.chosen = Some(chosen);
            self.barrier_cv.notify_all();
            drop(state);
            on_chosen(chosen);
            chosen
        } else {
            self.barrier_cv.wait_while(&mut state, |s| s.chosen.is_none());
            state.chosen.expect("barrier released with no chosen time")
        }
    }

    /// Blocks until `id_holder == id`, polling for shutdown every 100ms.
    /// Returns `false` if the wait was woken merely to re-check shutdown
    /// (the caller should check `keep_running` and retry or exit).
    pub fn wait_to(&self, id: u32, keep_running: &AtomicBool) -> bool {
        if self.is_id_holder_the_same(id) {
            return true;
        }
        let mut guard = self.advance_mutex.lock();
        loop {
            if self.is_id_holder_the_same(id) {
                return true;
            }
            if !keep_running.load(Ordering::Relaxed) {
                return false;
            }
            self.advance_cv.wait_for(&mut guard, SHUTDOWN_POLL);
        }
    }

    pub fn is_id_holder_the_same(&self, id: u32) -> bool {
        self.id_holder.load(Ordering::Acquire) == id
    }

    pub fn get_id_holder(&self) -> u32 {
        self.id_holder.load(Ordering::Acquire)
    }

    /// Advances the holder to `(id+1) mod N`; asserts the caller actually
    /// held the baton (programming-error invariant, §7).
    pub fn pass_on(&self, id: u32) {
        assert!(self.is_id_holder_the_same(id), "pass_on called by non-holder {id}");
        let next = (id + 1) % self.n;
        self.id_holder.store(next, Ordering::Release);

        let mut cnt = self.job_regular_period_cnt.lock();
        *cnt += 1;

        let _guard = self.advance_mutex.lock();
        self.advance_cv.notify_all();
    }

    /// Returns true and updates `sync_time_last_64` iff `t` is strictly
    /// more than `sync_time_unique_limit` past the last accepted time;
    /// prevents double-enqueue of a packet detected by two workers in
    /// their overlap region (§4.7).
    pub fn is_sync_time_unique(&self, t: SampleTime) -> bool {
        loop {
            let last = self.sync_time_last_64.load(Ordering::Acquire);
            if last != UNDEFINED_EARLY_64 && t <= last.saturating_add(self.sync_time_unique_limit) {
                return false;
            }
            if self
                .sync_time_last_64
                .compare_exchange(last, t, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn sync_time_last(&self) -> SampleTime {
        self.sync_time_last_64.load(Ordering::Acquire)
    }

    /// Returns true and resets the counter when `job_regular_period_cnt`
    /// reaches `job_regular_period` (§4.7).
    pub fn is_job_regular_due(&self) -> bool {
        let mut cnt = self.job_regular_period_cnt.lock();
        if *cnt >= self.job_regular_period {
            *cnt = 0;
            true
        } else {
            false
        }
    }
}
