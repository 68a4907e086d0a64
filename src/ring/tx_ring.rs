//! C2: TX ring buffer, per-packet double-state buffer with outer/inner lock
//! and backpressure (§3 "Lifetimes & ownership", §6).
//!
//! Grounded on `radio/buffer_tx.hpp`/`buffer_tx_meta.hpp` and
//! `common/thread/lockable_outer_inner.hpp`'s outer/inner lock pattern
//! (producer fills under the outer lock; once marked transmittable, the
//! radio drains under its own, separate access path).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::sample::{Sample, SampleTime};

/// Per-antenna power adjustment applied after transmission (dB).
pub type PowerAdjDb = Vec<f32>;

/// Metadata handed to the radio when a TX buffer becomes transmittable.
#[derive(Debug, Clone, Default)]
pub struct TxBufferMeta {
    pub tx_order_id: i64,
    pub tx_order_id_expect_next: Option<i64>,
    pub tx_time_64: SampleTime,
    pub tx_power_adj_db: Option<PowerAdjDb>,
    pub rx_power_adj_db: Option<PowerAdjDb>,
    pub busy_wait_us: u32,
}

/// Outer-lock guard: exclusive producer access to one TX buffer between
/// acquiring the lock and marking the buffer transmittable.
pub struct TxBufferHandle<'a> {
    buffer: &'a TxBuffer,
    _outer: MutexGuard<'a, ()>,
}

impl<'a> TxBufferHandle<'a> {
    /// Returns a mutable view of every antenna stream, each of length
    /// `tx_length_samples`, for the caller to write into.
    pub fn get_ant_streams(&self, tx_length_samples: usize) -> Vec<parking_lot::MappedMutexGuard<'a, [Sample]>> {
        (0..self.buffer.nof_antennas)
            .map(|ant| {
                parking_lot::MutexGuard::map(self.buffer.antennas[ant].lock(), |v: &mut Vec<Sample>| {
                    v.resize(tx_length_samples.max(v.len()), Sample::default());
                    &mut v[..tx_length_samples]
                })
            })
            .collect()
    }

    /// Atomically publishes the number of samples written so far, enabling
    /// the radio to apply backpressure before the buffer is fully written.
    pub fn set_tx_length_samples_cnt(&self, n: u32) {
        self.buffer.tx_length_samples_cnt.store(n, Ordering::Release);
    }

    /// Hands the buffer to the radio: records metadata and marks
    /// transmittable. Consumes the handle (drops the outer lock).
    pub fn set_transmittable(self, meta: TxBufferMeta) {
        *self.buffer.meta.lock() = Some(meta);
        self.buffer.transmittable.store(true, Ordering::Release);
    }
}

/// One TX buffer slot: exclusively owned by a TX/RX worker while filling,
/// then exclusively owned by the radio drain thread after `set_transmittable`.
pub struct TxBuffer {
    pub id: u32,
    pub nof_antennas: usize,
    pub ant_streams_length_samples: usize,

    outer: Mutex<()>,
    antennas: Vec<Mutex<Vec<Sample>>>,
    tx_length_samples_cnt: AtomicU32,
    transmittable: std::sync::atomic::AtomicBool,
    meta: Mutex<Option<TxBufferMeta>>,
    fail_counter: AtomicU64,
}

impl TxBuffer {
    pub fn new(id: u32, nof_antennas: usize, ant_streams_length_samples: usize) -> Self {
        Self {
            id,
            nof_antennas,
            ant_streams_length_samples,
            outer: Mutex::new(()),
            antennas: (0..nof_antennas)
                .map(|_| Mutex::new(vec![Sample::default(); ant_streams_length_samples]))
                .collect(),
            tx_length_samples_cnt: AtomicU32::new(0),
            transmittable: std::sync::atomic::AtomicBool::new(false),
            meta: Mutex::new(None),
            fail_counter: AtomicU64::new(0),
        }
    }

    /// Attempts to acquire the outer lock without blocking. A TX/RX worker
    /// skips this descriptor and increments a fail counter when it returns
    /// `None` (§4.10).
    pub fn try_acquire(&self) -> Option<TxBufferHandle<'_>> {
        let outer = self.outer.try_lock()?;
        self.transmittable.store(false, Ordering::Release);
        self.tx_length_samples_cnt.store(0, Ordering::Release);
        Some(TxBufferHandle { buffer: self, _outer: outer })
    }

    pub fn record_acquire_failure(&self) {
        self.fail_counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_counter.load(Ordering::Relaxed)
    }

    pub fn is_transmittable(&self) -> bool {
        self.transmittable.load(Ordering::Acquire)
    }

    pub fn tx_length_samples_cnt(&self) -> u32 {
        self.tx_length_samples_cnt.load(Ordering::Acquire)
    }

    /// Radio-side busy wait for at least `target` samples to have been
    /// published. Reserved for low-jitter chained transmissions (§5).
    pub fn wait_for_samples_busy(&self, target: u32) {
        while self.tx_length_samples_cnt() < target && !self.is_transmittable() {
            std::hint::spin_loop();
        }
    }

    /// Called by the radio once it has fully drained the buffer, returning
    /// it to the pool for the next producer.
    pub fn release(&self) {
        self.transmittable.store(false, Ordering::Release);
    }

    /// Radio-side read access: copies out the antenna samples written by the
    /// producer, up to `tx_length_samples_cnt()` (the counterpart to
    /// `RxRing::copy_ant_streams` on the TX side).
    pub fn read_ant_streams(&self) -> Vec<Vec<Sample>> {
        let n = self.tx_length_samples_cnt() as usize;
        self.antennas
            .iter()
            .map(|a| {
                let guard = a.lock();
                let len = n.min(guard.len());
                guard[..len].to_vec()
            })
            .collect()
    }
}

/// A small pool of TX buffers a worker pool cycles through.
pub struct TxBufferPool {
    buffers: Vec<TxBuffer>,
}

impl TxBufferPool {
    pub fn new(nof_buffers: usize, nof_antennas: usize, ant_streams_length_samples: usize) -> Self {
        Self {
            buffers: (0..nof_buffers)
                .map(|id| TxBuffer::new(id as u32, nof_antennas, ant_streams_length_samples))
                .collect(),
        }
    }

    /// Finds the first free buffer, recording a failure on every busy one it
    /// skips past (§4.10, §7 "TX buffer unavailable").
    pub fn try_acquire_any(&self) -> Option<TxBufferHandle<'_>> {
        for b in &self.buffers {
            if let Some(handle) = b.try_acquire() {
                return Some(handle);
            }
            b.record_acquire_failure();
        }
        None
    }

    pub fn total_fail_count(&self) -> u64 {
        self.buffers.iter().map(|b| b.fail_count()).sum()
    }

    /// Radio-side read access to buffer `id`'s antenna samples.
    pub fn read_buffer(&self, id: usize) -> Vec<Vec<Sample>> {
        self.buffers[id].read_ant_streams()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_fill_publish_roundtrip() {
        let pool = TxBufferPool::new(2, 1, 1024);
        let handle = pool.try_acquire_any().expect("buffer available");
        {
            let mut streams = handle.get_ant_streams(100);
            for s in streams[0].iter_mut() {
                *s = Sample::new(1.0, 0.0);
            }
        }
        handle.set_tx_length_samples_cnt(100);
        handle.set_transmittable(TxBufferMeta {
            tx_order_id: 0,
            tx_time_64: 1000,
            ..Default::default()
        });
        assert_eq!(pool.buffers[0].tx_length_samples_cnt(), 100);
        assert!(pool.buffers[0].is_transmittable());
        let read_back = pool.read_buffer(0);
        assert_eq!(read_back[0].len(), 100);
        assert_eq!(read_back[0][0], Sample::new(1.0, 0.0));
    }

    #[test]
    fn exhausted_pool_increments_fail_counter() {
        let pool = TxBufferPool::new(1, 1, 16);
        let _h = pool.try_acquire_any().unwrap();
        assert!(pool.try_acquire_any().is_none());
        assert_eq!(pool.total_fail_count(), 1);
    }
}
