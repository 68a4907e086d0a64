//! C1: RX ring buffer, consumed read-only (§6).
//!
//! Grounded on spec.md §6's `RxRing` interface and the teacher's
//! `transport/shm/ring.rs` producer/consumer synchronization shape
//! (condvar-backed "wait until enough data" primitive).

use parking_lot::{Condvar, Mutex};

use crate::sample::{Sample, SampleTime};

/// The PHY never mutates this; it is a read-only reference handed in by the
/// radio subsystem per §3 "Lifetimes & ownership".
pub trait RxRing: Send + Sync {
    /// Blocks until the radio has produced samples through time `t`,
    /// returning the current ring time (may be `> t`).
    fn wait_until(&self, t: SampleTime) -> SampleTime;

    /// Copies out `n` samples per antenna starting at absolute time `t`
    /// (modulo the ring length). A true zero-copy view cannot be expressed
    /// across a lock boundary for every possible backing store (a
    /// radio-owned DMA ring, a mutex-guarded `Vec`, ...), so the trait
    /// commits to the owned-copy contract every implementation can satisfy.
    fn copy_ant_streams(&self, t: SampleTime, n: usize) -> Vec<Vec<Sample>>;

    fn samp_rate(&self) -> u32;
    fn nof_antennas(&self) -> usize;
    fn ant_streams_length_samples(&self) -> usize;

    /// Current absolute write time (most recently produced sample + 1).
    fn current_time(&self) -> SampleTime;
}

/// In-memory reference `RxRing` used by tests and loopback harnesses: a
/// fixed-length per-antenna circular buffer filled by a single producer
/// (`push_samples`) and read by any number of consumers.
pub struct InMemoryRxRing {
    samp_rate: u32,
    length: usize,
    state: Mutex<RxState>,
    cv: Condvar,
}

struct RxState {
    antennas: Vec<Vec<Sample>>,
    write_time: SampleTime,
}

impl InMemoryRxRing {
    pub fn new(nof_antennas: usize, length_samples: usize, samp_rate: u32) -> Self {
        Self {
            samp_rate,
            length: length_samples,
            state: Mutex::new(RxState {
                antennas: vec![vec![Sample::default(); length_samples]; nof_antennas],
                write_time: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Appends samples for every antenna (same length for each), advancing
    /// the ring's write time and writing modulo the ring length.
    pub fn push_samples(&self, per_antenna: &[Vec<Sample>]) {
        let mut state = self.state.lock();
        let n = per_antenna.first().map(|v| v.len()).unwrap_or(0);
        let start = state.write_time;
        for (ant_idx, ant_samples) in per_antenna.iter().enumerate() {
            for (i, s) in ant_samples.iter().enumerate() {
                let idx = ((start as usize + i) % self.length) as usize;
                state.antennas[ant_idx][idx] = *s;
            }
        }
        state.write_time = start + n as SampleTime;
        self.cv.notify_all();
    }
}

impl RxRing for InMemoryRxRing {
    fn wait_until(&self, t: SampleTime) -> SampleTime {
        let mut state = self.state.lock();
        while state.write_time < t {
            self.cv.wait_for(&mut state, std::time::Duration::from_millis(100));
        }
        state.write_time
    }

    fn copy_ant_streams(&self, t: SampleTime, n: usize) -> Vec<Vec<Sample>> {
        self.copy_samples(t, n)
    }

    fn samp_rate(&self) -> u32 {
        self.samp_rate
    }

    fn nof_antennas(&self) -> usize {
        self.state.lock().antennas.len()
    }

    fn ant_streams_length_samples(&self) -> usize {
        self.length
    }

    fn current_time(&self) -> SampleTime {
        self.state.lock().write_time
    }
}

impl InMemoryRxRing {
    /// Copies out `n` samples per antenna starting at global time `t`
    /// (modulo the ring length), for callers that cannot take a zero-copy
    /// reference across the lock.
    pub fn copy_samples(&self, t: SampleTime, n: usize) -> Vec<Vec<Sample>> {
        let state = self.state.lock();
        state
            .antennas
            .iter()
            .map(|ant| {
                (0..n)
                    .map(|i| ant[((t as usize + i) % self.length) as usize])
                    .collect()
            })
            .collect()
    }
}
