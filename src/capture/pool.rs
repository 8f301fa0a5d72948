//! Shell and stack-buffer pools
//!
//! Lock-free free lists holding reset error shells and reusable
//! program-counter buffers. Acquisition never fails: an empty pool falls
//! back to a fresh allocation. Both pools are soft-capped so a burst of
//! releases cannot pin unbounded memory.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::SegQueue;
use once_cell::sync::Lazy;

use crate::config;
use crate::error::ErrorInner;

/// Soft cap on retained shells and stack buffers.
const POOL_CAP: usize = 1024;

struct Pools {
    shells: SegQueue<Box<ErrorInner>>,
    stacks: SegQueue<Vec<usize>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

static POOLS: Lazy<Pools> = Lazy::new(|| Pools {
    shells: SegQueue::new(),
    stacks: SegQueue::new(),
    hits: AtomicU64::new(0),
    misses: AtomicU64::new(0),
});

/// Pop a reset shell from the pool, or allocate a fresh one.
///
/// The returned shell has `pooled` set iff pooling is enabled, so release
/// knows whether it must be returned.
pub(crate) fn acquire_shell() -> Box<ErrorInner> {
    if config::snapshot().disable_pooling {
        return Box::new(ErrorInner::blank(false));
    }
    match POOLS.shells.pop() {
        Some(mut shell) => {
            POOLS.hits.fetch_add(1, Ordering::Relaxed);
            shell.pooled = true;
            shell
        }
        None => {
            POOLS.misses.fetch_add(1, Ordering::Relaxed);
            Box::new(ErrorInner::blank(true))
        }
    }
}

/// Reset a shell and return it to the pool.
///
/// The `pooled` flag is cleared before re-pooling; a shell that was never
/// pooled (or a second release of the same shell) is dropped as a no-op.
/// Any held stack buffer is recycled into its own pool first.
pub(crate) fn release_shell(mut shell: Box<ErrorInner>) {
    if let Some(buf) = shell.stack.take() {
        release_stack_buf(buf);
    }
    if !shell.pooled || config::snapshot().disable_pooling {
        return;
    }
    shell.pooled = false;
    shell.reset();
    if POOLS.shells.len() < POOL_CAP {
        POOLS.shells.push(shell);
    }
}

/// Pop a stack buffer (length zero, capacity preserved) or allocate one
/// sized to the configured depth.
pub(crate) fn acquire_stack_buf(depth: usize) -> Vec<usize> {
    if config::snapshot().disable_pooling {
        return Vec::with_capacity(depth);
    }
    match POOLS.stacks.pop() {
        Some(buf) => buf,
        None => Vec::with_capacity(depth),
    }
}

/// Return a stack buffer with its length zeroed but capacity kept.
pub(crate) fn release_stack_buf(mut buf: Vec<usize>) {
    if config::snapshot().disable_pooling {
        return;
    }
    buf.clear();
    if POOLS.stacks.len() < POOL_CAP {
        POOLS.stacks.push(buf);
    }
}

/// Pre-populate the shell pool with `count` reset shells. No-op when
/// pooling is disabled.
pub fn warm_pool(count: usize) {
    if config::snapshot().disable_pooling {
        return;
    }
    for _ in 0..count {
        if POOLS.shells.len() >= POOL_CAP {
            break;
        }
        POOLS.shells.push(Box::new(ErrorInner::blank(false)));
    }
}

/// Pre-populate the stack-buffer pool with `count` buffers sized to the
/// configured depth. No-op when pooling is disabled.
pub fn warm_stack_pool(count: usize) {
    let cfg = config::snapshot();
    if cfg.disable_pooling {
        return;
    }
    for _ in 0..count {
        if POOLS.stacks.len() >= POOL_CAP {
            break;
        }
        POOLS.stacks.push(Vec::with_capacity(cfg.stack_depth));
    }
}

/// Shell pool hit/miss counters since process start.
pub fn pool_stats() -> (u64, u64) {
    (
        POOLS.hits.load(Ordering::Relaxed),
        POOLS.misses.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;

    #[test]
    fn test_acquire_release_cycle() {
        let _g = test_support::lock();
        config::reset_config();

        let shell = acquire_shell();
        assert!(shell.pooled);
        release_shell(shell);

        let reused = acquire_shell();
        assert!(reused.pooled);
        assert!(reused.name.is_empty());
        assert!(reused.msg.is_empty());
        release_shell(reused);
    }

    #[test]
    fn test_disabled_pooling_allocates_fresh() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.disable_pooling = true);

        let shell = acquire_shell();
        assert!(!shell.pooled);
        release_shell(shell);

        config::reset_config();
    }

    #[test]
    fn test_stack_buffer_keeps_capacity() {
        let _g = test_support::lock();
        config::reset_config();

        let mut buf = acquire_stack_buf(16);
        buf.extend_from_slice(&[1, 2, 3]);
        let cap = buf.capacity();
        release_stack_buf(buf);

        // Drain until our buffer comes back or the pool empties.
        let mut found_empty = true;
        for _ in 0..POOL_CAP {
            let candidate = acquire_stack_buf(16);
            if !candidate.is_empty() {
                found_empty = false;
            }
            if candidate.capacity() >= cap {
                assert!(candidate.is_empty());
                release_stack_buf(candidate);
                break;
            }
            release_stack_buf(candidate);
        }
        assert!(found_empty);
    }

    #[test]
    fn test_warm_pool_prepopulates() {
        let _g = test_support::lock();
        config::reset_config();

        warm_pool(4);
        warm_stack_pool(4);

        let (hits_before, misses_before) = pool_stats();
        let shell = acquire_shell();
        release_shell(shell);
        let (hits_after, misses_after) = pool_stats();
        assert!(hits_after + misses_after > hits_before + misses_before);
    }
}
