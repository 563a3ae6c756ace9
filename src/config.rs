use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of work batches handed to each rayon thread per parallel loop.
pub(crate) const PARALLEL_TASKS_PER_THREAD: usize = 64;

// Default heuristic value for this machine.
const DEFAULT_PARALLEL_THRESHOLD: usize = 300;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Reference-point count below which passes run serially.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

/// Minimum items per rayon task for a loop over `n` items.
pub(crate) fn min_len_for(n: usize) -> usize {
    (n / (rayon::current_num_threads() * PARALLEL_TASKS_PER_THREAD)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_roundtrip() {
        let prev = get_parallel_threshold();
        set_parallel_threshold(7);
        assert_eq!(get_parallel_threshold(), 7);
        set_parallel_threshold(prev);
    }

    #[test]
    fn test_min_len_is_positive() {
        assert!(min_len_for(0) >= 1);
        assert!(min_len_for(1_000_000) >= 1);
    }
}
