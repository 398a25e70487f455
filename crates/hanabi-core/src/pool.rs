//! The process-wide worker pool.
//!
//! All parallel engine work (belief passes, search rollouts) runs on one
//! shared work-stealing pool. `init` sizes it explicitly; otherwise the
//! first use builds it from `FIBER_THREADS`. Tasks spawned from within a
//! worker are scheduled on the same pool.

use once_cell::sync::OnceCell;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::Config;

static POOL: OnceCell<ThreadPool> = OnceCell::new();

fn build(threads: usize) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|index| format!("hanabi-worker-{index}"))
        .build()
        .expect("worker pool construction cannot fail with static settings")
}

/// Sizes the pool explicitly. Returns false if the pool already exists, in
/// which case the existing pool is kept.
pub fn init(threads: usize) -> bool {
    POOL.set(build(threads)).is_ok()
}

pub fn get() -> &'static ThreadPool {
    POOL.get_or_init(|| build(Config::from_env().fiber_threads))
}

/// Runs `f` with rayon operations targeted at the shared pool.
pub fn install<R, F>(f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    get().install(f)
}

/// Splits `len` items into at most `lanes` contiguous chunks, one per
/// logical task; partitioning keys this way keeps workers off each other's
/// entries.
pub fn chunk_size(len: usize, lanes: usize) -> usize {
    len.div_ceil(lanes.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::{chunk_size, install};

    #[test]
    fn pool_runs_closures() {
        let sum: usize = install(|| (0..100).sum());
        assert_eq!(sum, 4950);
    }

    #[test]
    fn chunking_covers_all_items() {
        assert_eq!(chunk_size(10, 4), 3);
        assert_eq!(chunk_size(0, 4), 1);
        assert_eq!(chunk_size(5, 0), 5);
        assert_eq!(chunk_size(1000, 16), 63);
    }
}
