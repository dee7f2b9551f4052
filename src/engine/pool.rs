// src/engine/pool.rs
//
// Global thread pool for batch processing.
//
// A single pool is built lazily on first use and reused by every batch;
// its size follows `available_parallelism`, which respects cgroup/CPU
// quotas. Each task on the pool still runs its own single-threaded
// pipeline.

use rayon::ThreadPool;
use std::sync::OnceLock;
use tracing::warn;

/// Upper bound on the pool size.
pub const MAX_CONCURRENCY: usize = 1024;

const MIN_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_THREADS)
        .clamp(MIN_THREADS, MAX_CONCURRENCY)
}

/// The shared batch pool, or None if no pool could be built; callers then
/// run on rayon's global pool.
pub fn get_pool() -> Option<&'static ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let threads = default_thread_count();
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("image-resizer-{i}"))
                .build()
                .map_err(|e| warn!(threads, error = %e, "failed to build batch thread pool"))
                .ok()
        })
        .as_ref()
}

/// Run `f` inside the batch pool.
pub fn install<R, F>(f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match get_pool() {
        Some(pool) => pool.install(f),
        None => f(),
    }
}
