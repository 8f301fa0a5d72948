//! Sharded per-name occurrence counters
//!
//! Each name owns eight cache-line-padded atomic cells. Increments pick a
//! shard from an address-derived probe so no thread-local state is needed;
//! totals are read by summing every shard. Relative order of racing
//! increments across shards is undefined; only the aggregate matters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use dashmap::DashMap;

/// Number of independent cells per name.
const SHARD_COUNT: usize = 8;

/// One name's shard array.
#[derive(Debug, Default)]
pub(crate) struct CounterShards {
    cells: [CachePadded<AtomicU64>; SHARD_COUNT],
}

impl CounterShards {
    fn total(&self) -> u64 {
        self.cells
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .sum()
    }

    fn zero(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
    }
}

/// Low-contention per-name counter.
#[derive(Debug, Default)]
pub(crate) struct ShardedCounter {
    counts: DashMap<String, Arc<CounterShards>>,
}

impl ShardedCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn shards_for(&self, name: &str) -> Arc<CounterShards> {
        if let Some(existing) = self.counts.get(name) {
            return Arc::clone(&existing);
        }
        Arc::clone(
            &self
                .counts
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CounterShards::default())),
        )
    }

    /// Increment one shard for `name` and return the new total across all
    /// shards.
    pub(crate) fn inc(&self, name: &str) -> u64 {
        let shards = self.shards_for(name);
        // Address-derived probe: the location of this stack slot varies by
        // thread and call depth, spreading contending callers across cells
        // without consulting thread identity.
        let probe = &shards as *const _ as usize;
        let index = (probe >> 4) % SHARD_COUNT;
        shards.cells[index].fetch_add(1, Ordering::Relaxed);
        shards.total()
    }

    /// Total for `name` across all shards; 0 when unregistered.
    pub(crate) fn value(&self, name: &str) -> u64 {
        self.counts
            .get(name)
            .map(|shards| shards.total())
            .unwrap_or(0)
    }

    /// Store zero into every shard for `name`.
    pub(crate) fn reset(&self, name: &str) {
        if let Some(shards) = self.counts.get(name) {
            shards.zero();
        }
    }

    /// Ensure a shard array exists for `name`.
    pub(crate) fn register_name(&self, name: &str) {
        self.counts
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CounterShards::default()));
    }

    /// Remove `name` entirely.
    pub(crate) fn remove(&self, name: &str) {
        self.counts.remove(name);
    }

    /// All registered names.
    pub(crate) fn names(&self) -> Vec<String> {
        self.counts.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_inc_returns_increasing_totals() {
        let counter = ShardedCounter::new();
        assert_eq!(counter.inc("a"), 1);
        assert_eq!(counter.inc("a"), 2);
        assert_eq!(counter.inc("a"), 3);
        assert_eq!(counter.value("a"), 3);
    }

    #[test]
    fn test_value_of_unregistered_is_zero() {
        let counter = ShardedCounter::new();
        assert_eq!(counter.value("missing"), 0);
    }

    #[test]
    fn test_reset_zeros_all_shards() {
        let counter = ShardedCounter::new();
        for _ in 0..100 {
            counter.inc("b");
        }
        counter.reset("b");
        assert_eq!(counter.value("b"), 0);
    }

    #[test]
    fn test_register_name_creates_entry() {
        let counter = ShardedCounter::new();
        counter.register_name("c");
        assert!(counter.names().contains(&"c".to_string()));
        assert_eq!(counter.value("c"), 0);
    }

    #[test]
    fn test_concurrent_increments_sum_exactly() {
        let counter = Arc::new(ShardedCounter::new());
        let threads = 8;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        counter.inc("hot");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread completes");
        }

        assert_eq!(counter.value("hot"), (threads * per_thread) as u64);
    }

    #[test]
    fn test_names_lists_all_registered() {
        let counter = ShardedCounter::new();
        counter.inc("x");
        counter.register_name("y");
        let mut names = counter.names();
        names.sort();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }
}
