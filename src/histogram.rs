use std::sync::Mutex;

use rayon::prelude::*;

use crate::error::{Error, Result};

/// Uniform binning along one histogram axis over `[min, max)`.
#[derive(Clone, Debug)]
pub struct Axis {
    min: f64,
    max: f64,
    width: f64,
    bins: usize,
}

impl Axis {
    pub fn new(min: f64, max: f64, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(Error::ZeroBinCount);
        }
        if !(max - min).is_finite() || max <= min {
            return Err(Error::InvalidExtent(max - min));
        }
        Ok(Self {
            min,
            max,
            width: (max - min) / bins as f64,
            bins,
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Bin containing `value`, or None when it falls outside the axis.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        let shifted = value - self.min;
        if !(shifted >= 0.0) {
            return None;
        }
        // Truncation equals floor here: shifted is non-negative.
        let bin = (shifted / self.width) as usize;
        (bin < self.bins).then_some(bin)
    }

    /// Center coordinate of every bin.
    pub fn centers(&self) -> Vec<f64> {
        (0..self.bins)
            .map(|i| self.min + (i as f64 + 0.5) * self.width)
            .collect()
    }
}

/// Per-worker histogram counters with deferred merge.
///
/// Each rayon worker owns one counter buffer, lazily allocated on first use
/// and kept across calls; one extra slot serves callers outside the pool.
/// During a parallel pass every worker touches only its own slot, so the
/// per-slot locks are uncontended. Reading the merged counts is a separate
/// reduction pass, parallel over bin index.
pub struct LocalHistograms {
    slots: Vec<Mutex<Vec<u64>>>,
    num_bins: usize,
}

impl LocalHistograms {
    pub fn new(num_bins: usize) -> Self {
        let slots = (0..rayon::current_num_threads() + 1)
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        Self { slots, num_bins }
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Runs `f` on the calling worker's counter buffer.
    pub fn with_local<R>(&self, f: impl FnOnce(&mut [u64]) -> R) -> R {
        let slot = rayon::current_thread_index()
            .unwrap_or(self.slots.len() - 1)
            .min(self.slots.len() - 1);
        let mut guard = lock(&self.slots[slot]);
        if guard.is_empty() {
            guard.resize(self.num_bins, 0);
        }
        f(&mut guard)
    }

    /// Element-wise sum of all worker buffers into `out`, parallel over bins.
    /// Callers must ensure no accumulation pass is in flight.
    pub fn reduce_into(&self, out: &mut [u64]) {
        let guards: Vec<_> = self.slots.iter().map(lock).collect();
        out.par_iter_mut().enumerate().for_each(|(bin, total)| {
            *total = guards
                .iter()
                .filter(|g| !g.is_empty())
                .map(|g| g[bin])
                .sum();
        });
    }

    /// Zeroes every allocated buffer without deallocating it.
    pub fn reset(&self) {
        for slot in &self.slots {
            lock(slot).fill(0);
        }
    }
}

fn lock(slot: &Mutex<Vec<u64>>) -> std::sync::MutexGuard<'_, Vec<u64>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
