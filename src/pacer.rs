//! C4: Pacer, translating between the RX ring buffer and a local working
//! buffer at either hardware rate or the DECT nominal rate (§4.2).
//!
//! Grounded on `rx_pacer.hpp`/`localbuffer.hpp`.

use crate::dsp::resampler::{Resampler, ResamplerParam};
use crate::ring::rx_ring::RxRing;
use crate::sample::{Sample, SampleTime};

/// Which local-buffer mode the pacer is operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalBufferMode {
    /// No rate change; used by the crosscorrelator at hardware rate.
    Filter,
    /// Rational resampling to the DECT nominal rate; used by the
    /// autocorrelator and the synchronized-RX data path.
    Resample,
}

/// Per-antenna local working buffer plus the bookkeeping the pacer needs to
/// convert between ring-buffer (global) time and local-buffer indices.
pub struct Pacer {
    mode: LocalBufferMode,
    l: u32,
    m: u32,
    nof_antennas: usize,
    resamplers: Vec<Resampler>,
    buffer: Vec<Vec<Sample>>,
    start_time_global: SampleTime,
    /// Next global sample index not yet consumed from the ring.
    next_ring_read: SampleTime,
}

impl Pacer {
    pub fn new(nof_antennas: usize, l: u32, m: u32, param: ResamplerParam) -> Self {
        Self {
            mode: LocalBufferMode::Filter,
            l,
            m,
            nof_antennas,
            resamplers: (0..nof_antennas).map(|_| Resampler::new(l, m, param)).collect(),
            buffer: vec![Vec::new(); nof_antennas],
            start_time_global: 0,
            next_ring_read: 0,
        }
    }

    /// Sets the first sample time to copy from the ring buffer and clears
    /// the local buffer, selecting the local-buffer mode for the upcoming
    /// search.
    pub fn reset_localbuffer(&mut self, mode: LocalBufferMode, start_time: SampleTime) {
        self.mode = mode;
        self.start_time_global = start_time;
        self.next_ring_read = start_time;
        for b in &mut self.buffer {
            b.clear();
        }
        if mode == LocalBufferMode::Resample {
            for r in &mut self.resamplers {
                r.reset();
            }
        }
    }

    pub fn local_len(&self) -> usize {
        self.buffer[0].len()
    }

    pub fn antenna(&self, idx: usize) -> &[Sample] {
        &self.buffer[idx]
    }

    /// Blocks until the radio has produced samples through the time needed
    /// to satisfy `n` local-buffer samples, then returns the actual count
    /// available (may exceed `n`).
    pub fn filter_until(&mut self, ring: &dyn RxRing, n: usize) -> usize {
        debug_assert_eq!(self.mode, LocalBufferMode::Filter);
        self.pull_raw(ring, n);
        self.local_len()
    }

    pub fn resample_until(&mut self, ring: &dyn RxRing, n: usize) -> usize {
        debug_assert_eq!(self.mode, LocalBufferMode::Resample);
        // Estimate how many raw samples are needed to produce n resampled
        // ones, then iterate in case the resampler's skip/delay consumed
        // more than expected.
        loop {
            if self.local_len() >= n {
                return self.local_len();
            }
            let deficit = n - self.local_len();
            let raw_needed = (deficit as u64 * self.m as u64 / self.l as u64 + 1) as usize;
            let raw = self.fetch_raw(ring, raw_needed);
            for (ant, samples) in raw.iter().enumerate() {
                self.resamplers[ant].resample(samples, samples.len(), &mut self.buffer[ant]);
            }
        }
    }

    pub fn wait_until(&self, ring: &dyn RxRing, t: SampleTime) -> SampleTime {
        ring.wait_until(t)
    }

    fn pull_raw(&mut self, ring: &dyn RxRing, n: usize) {
        let raw = self.fetch_raw(ring, n.saturating_sub(self.local_len()));
        for (ant, samples) in raw.into_iter().enumerate() {
            self.buffer[ant].extend(samples);
        }
    }

    fn fetch_raw(&mut self, ring: &dyn RxRing, n: usize) -> Vec<Vec<Sample>> {
        if n == 0 {
            return vec![Vec::new(); self.nof_antennas];
        }
        ring.wait_until(self.next_ring_read + n as SampleTime);
        let raw = ring.copy_ant_streams(self.next_ring_read, n);
        self.next_ring_read += n as SampleTime;
        raw
    }

    /// Converts a resampled local-buffer index to a global (absolute)
    /// sample time, using the exact (L,M) ratio to avoid drift.
    pub fn convert_time_resampled_to_global(&self, local: SampleTime, offset: SampleTime) -> SampleTime {
        debug_assert_eq!(self.mode, LocalBufferMode::Resample);
        let scaled = (local as i128 * self.m as i128) / self.l as i128;
        self.start_time_global + scaled as SampleTime + offset
    }

    pub fn convert_time_global_to_resampled(&self, global: SampleTime) -> SampleTime {
        debug_assert_eq!(self.mode, LocalBufferMode::Resample);
        let delta = global - self.start_time_global;
        ((delta as i128 * self.l as i128) / self.m as i128) as SampleTime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::resampler::RESAMPLER_PARAM_SYNC;

    #[test]
    fn filter_mode_passes_samples_through() {
        let ring = InMemoryRxRing::new(1, 4096, 1_000_000);
        ring.push_samples(&[vec![Sample::new(1.0, 0.0); 2000]]);

        let mut pacer = Pacer::new(1, 1, 1, RESAMPLER_PARAM_SYNC);
        pacer.reset_localbuffer(LocalBufferMode::Filter, 0);
        let n = pacer.filter_until(&ring, 1000);
        assert!(n >= 1000);
    }

    #[test]
    fn resample_mode_advances_local_buffer() {
        let ring = InMemoryRxRing::new(1, 8192, 1_000_000);
        ring.push_samples(&[vec![Sample::new(1.0, 0.0); 4000]]);

        let mut pacer = Pacer::new(1, 10, 9, RESAMPLER_PARAM_SYNC);
        pacer.reset_localbuffer(LocalBufferMode::Resample, 0);
        let n = pacer.resample_until(&ring, 500);
        assert!(n >= 500);
    }

    #[test]
    fn time_conversion_round_trips() {
        let pacer = Pacer::new(1, 10, 9, RESAMPLER_PARAM_SYNC);
        // start_time_global defaults to 0 until reset_localbuffer is called
        let mut pacer = pacer;
        pacer.reset_localbuffer(LocalBufferMode::Resample, 1000);
        let g = pacer.convert_time_resampled_to_global(900, 0);
        let back = pacer.convert_time_global_to_resampled(g);
        assert!((back - 900).abs() <= 1);
    }
}
