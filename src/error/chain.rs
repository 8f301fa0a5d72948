//! Cause-chain traversal, equivalence, and conversion
//!
//! Chains are singly linked through each value's cause. Foreign errors
//! participate through `std::error::Error::source`; an element exposing no
//! source terminates the walk. Cycle freedom is the caller's contract, with
//! a fixed depth bound as defense in depth.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::PoisonError;

use crate::capture::pool;
use crate::error::Error;

/// Upper bound on chain traversal depth.
const CHAIN_DEPTH_LIMIT: usize = 1024;

/// Iterator over an error chain, outermost first.
pub struct ChainIter<'a> {
    current: Option<&'a (dyn StdError + 'static)>,
    remaining: usize,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            self.current = current.source();
        }
        Some(current)
    }
}

impl Error {
    /// Iterate the chain starting at this value, outermost first.
    pub fn chain(&self) -> ChainIter<'_> {
        ChainIter {
            current: Some(self as &(dyn StdError + 'static)),
            remaining: CHAIN_DEPTH_LIMIT,
        }
    }

    /// Every element of the chain in order, starting at this value.
    pub fn unwrap_all(&self) -> Vec<&(dyn StdError + 'static)> {
        self.chain().collect()
    }

    /// Invoke `f` on each chain element in order.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&(dyn StdError + 'static)),
    {
        for err in self.chain() {
            f(err);
        }
    }

    /// First chain element matching `pred`, if any.
    pub fn find<P>(&self, mut pred: P) -> Option<&(dyn StdError + 'static)>
    where
        P: FnMut(&(dyn StdError + 'static)) -> bool,
    {
        self.chain().find(|err| pred(*err))
    }

    /// Whether any element of this error's chain matches `target`: by
    /// shared non-empty name when both sides are library values, or by
    /// identity when the chain shares the exact target instance.
    pub fn is(&self, target: &(dyn StdError + 'static)) -> bool {
        let target_name = target
            .downcast_ref::<Error>()
            .map(Error::name)
            .filter(|name| !name.is_empty());
        let target_ptr = target as *const (dyn StdError + 'static) as *const ();

        for err in self.chain() {
            let err_ptr = err as *const (dyn StdError + 'static) as *const ();
            if std::ptr::eq(err_ptr, target_ptr) {
                return true;
            }
            if let (Some(lib), Some(name)) = (err.downcast_ref::<Error>(), target_name) {
                if lib.name() == name {
                    return true;
                }
            }
        }
        false
    }

    /// First library value in the chain (starting at this value) with a
    /// non-empty name.
    pub fn first_named(&self) -> Option<&Error> {
        self.chain()
            .filter_map(|err| err.downcast_ref::<Error>())
            .find(|err| !err.name().is_empty())
    }

    /// First cause (strictly below this value) downcasting to `T`.
    pub fn find_cause<T>(&self) -> Option<&T>
    where
        T: StdError + 'static,
    {
        self.chain().skip(1).find_map(|err| err.downcast_ref::<T>())
    }

    /// Combine two errors into one: messages joined with `"; "`, stack
    /// taken from `self` when present (else from `other`), contexts
    /// unioned with `other` winning on key conflicts, and `other`'s cause
    /// adopted only when `self` had none. Counts are not summed.
    pub fn merge(self, other: Error) -> Error {
        let mut kept = self.into_inner();
        let mut absorbed = other.into_inner();

        if kept.msg.is_empty() {
            kept.msg = std::mem::take(&mut absorbed.msg);
        } else if !absorbed.msg.is_empty() {
            kept.msg.push_str("; ");
            kept.msg.push_str(&absorbed.msg);
        }

        if kept.stack.is_none() {
            kept.stack = absorbed.stack.take();
        }

        {
            let kept_ctx = kept
                .context
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            let absorbed_ctx = absorbed
                .context
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            absorbed_ctx.for_each(|key, value| kept_ctx.insert(key.to_string(), value.clone()));
        }

        if kept.cause.is_none() {
            kept.cause = absorbed.cause.take();
        }

        pool::release_shell(absorbed);
        Error::from_inner(kept)
    }
}

/// Convert any error into a library value. A library error passes through
/// unchanged; a foreign error becomes a new value carrying its rendered
/// message and wrapping the original as cause.
pub fn convert<E>(err: E) -> Error
where
    E: StdError + Send + Sync + 'static,
{
    let boxed: Box<dyn StdError + Send + Sync> = Box::new(err);
    match boxed.downcast::<Error>() {
        Ok(lib) => *lib,
        Err(foreign) => Error::new(foreign.to_string()).wrap_boxed(foreign),
    }
}

/// Whether `err` indicates a timeout: the context marker for library
/// values, else a case-insensitive message probe.
pub fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    if let Some(lib) = err.downcast_ref::<Error>() {
        return lib.is_timeout();
    }
    err.to_string().to_lowercase().contains("timeout")
}

/// Whether `err` is retryable: the context marker for library values, else
/// a timeout or a case-insensitive "retry" message probe.
pub fn is_retryable(err: &(dyn StdError + 'static)) -> bool {
    if let Some(lib) = err.downcast_ref::<Error>() {
        return lib.is_retryable();
    }
    is_timeout(err) || err.to_string().to_lowercase().contains("retry")
}

/// Multi-line rendering of an error with name, context, stack, and cause
/// chain. Intended for logs and debugging output.
pub fn format_error(err: &(dyn StdError + 'static)) -> String {
    let mut out = String::new();
    format_into(&mut out, err);
    out
}

fn format_into(out: &mut String, err: &(dyn StdError + 'static)) {
    match err.downcast_ref::<Error>() {
        Some(lib) => {
            let _ = writeln!(out, "Error: {}", lib.message());
            if !lib.name().is_empty() {
                let _ = writeln!(out, "Name: {}", lib.name());
            }
            let context = lib.context();
            if !context.is_empty() {
                let _ = writeln!(out, "Context:");
                for (key, value) in &context {
                    let _ = writeln!(out, "\t{}: {}", key, value);
                }
            }
            let stack = lib.stack();
            if !stack.is_empty() {
                let _ = writeln!(out, "Stack Trace:");
                for frame in &stack {
                    let _ = writeln!(out, "\t{}", frame);
                }
            }
            if let Some(cause) = lib.unwrap_cause() {
                let _ = write!(out, "Caused by: ");
                format_into(out, cause);
            }
        }
        None => {
            let _ = writeln!(out, "Error: {}", err);
        }
    }
}
