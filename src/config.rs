//! Global library configuration
//!
//! Holds the process-wide knobs for stack capture, registry side effects,
//! pooling, and symbolication filtering. Reads take a cheap copy of the
//! current snapshot; writes go through [`configure`].

use std::sync::PoisonError;
use std::sync::RwLock;

use once_cell::sync::Lazy;

/// Default maximum number of captured stack frames.
pub const DEFAULT_STACK_DEPTH: usize = 32;

/// Default initial capacity hint for the context overflow map.
pub const DEFAULT_CONTEXT_SIZE: usize = 4;

/// Process-wide configuration snapshot.
///
/// Every field has a zero-cost `Copy` representation so hot paths can grab
/// one consistent view without holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum stack frames captured per error.
    pub stack_depth: usize,
    /// Initial capacity hint for the context overflow map.
    pub context_size: usize,
    /// Suppress automatic stack capture (including `trace`/`with_stack`).
    pub disable_stack: bool,
    /// Suppress counting, last-instance tracking, and threshold checks.
    pub disable_registry: bool,
    /// Bypass the shell and stack-buffer pools; allocate fresh each time.
    pub disable_pooling: bool,
    /// Hide this library's own frames during symbolication.
    pub filter_internal: bool,
    /// Return shells to the pool when a handle is dropped, not only on
    /// explicit `free`.
    pub auto_free: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_depth: DEFAULT_STACK_DEPTH,
            context_size: DEFAULT_CONTEXT_SIZE,
            disable_stack: false,
            disable_registry: false,
            disable_pooling: false,
            filter_internal: true,
            auto_free: true,
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Mutate the global configuration in place.
///
/// Fields not touched by the closure retain their prior values, so partial
/// reconfiguration never resets unrelated knobs:
///
/// ```
/// faultline::configure(|c| c.disable_stack = true);
/// faultline::configure(|c| c.disable_stack = false);
/// ```
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    let mut guard = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard);
}

/// Reset the global configuration to its defaults.
pub fn reset_config() {
    configure(|c| *c = Config::default());
}

/// Current configuration snapshot.
pub fn snapshot() -> Config {
    *CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Symbol substring identifying this library's own frames.
pub(crate) const CRATE_IDENT: &str = "faultline";

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Serializes tests that mutate global configuration or observe
    /// config-sensitive behavior (stack capture, pooling, registry).
    static GUARD: Mutex<()> = Mutex::new(());

    pub(crate) fn lock() -> MutexGuard<'static, ()> {
        GUARD.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
