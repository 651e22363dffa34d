// src/engine/pool.rs
//
// Concurrency sizing and thread pool construction for the batch scheduler.
//
// Groups of items run concurrently on a dedicated rayon pool owned by the
// scheduler. The group size is derived from the host's reported parallelism
// and hard-capped: each concurrent decode/encode can hold a full pixel
// buffer in memory, so unbounded fan-out on a high-core-count machine would
// spike peak memory far past what the work gains in throughput.

use rayon::ThreadPool;

/// Hard upper bound on concurrent conversions within one group.
pub const MAX_GROUP_CONCURRENCY: usize = 8;

/// Minimum concurrency: always at least one task in flight.
pub const MIN_GROUP_CONCURRENCY: usize = 1;

/// Resolve the group size: the explicit request when given, otherwise the
/// host's available parallelism, clamped into
/// [MIN_GROUP_CONCURRENCY, MAX_GROUP_CONCURRENCY].
pub fn effective_concurrency(requested: Option<usize>) -> usize {
    let detected = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_GROUP_CONCURRENCY);
    requested
        .unwrap_or(detected)
        .clamp(MIN_GROUP_CONCURRENCY, MAX_GROUP_CONCURRENCY)
}

/// Build the scheduler's pool with exactly `num_threads` workers.
pub fn build_pool(num_threads: usize) -> ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap_or_else(|e| {
            // Fall back to a minimal pool if the preferred configuration fails
            rayon::ThreadPoolBuilder::new()
                .num_threads(MIN_GROUP_CONCURRENCY)
                .build()
                .unwrap_or_else(|fallback_err| {
                    panic!(
                        "failed to create fallback thread pool: {fallback_err} (original error: {e})"
                    )
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_request_is_clamped() {
        assert_eq!(effective_concurrency(Some(0)), 1);
        assert_eq!(effective_concurrency(Some(1)), 1);
        assert_eq!(effective_concurrency(Some(4)), 4);
        assert_eq!(effective_concurrency(Some(64)), MAX_GROUP_CONCURRENCY);
    }

    #[test]
    fn detected_parallelism_stays_in_bounds() {
        let n = effective_concurrency(None);
        assert!((MIN_GROUP_CONCURRENCY..=MAX_GROUP_CONCURRENCY).contains(&n));
    }

    #[test]
    fn pool_runs_tasks() {
        let pool = build_pool(2);
        let out = pool.install(|| 21 * 2);
        assert_eq!(out, 42);
    }
}
