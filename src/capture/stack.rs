//! Program-counter capture and on-demand symbolication
//!
//! Capture walks the runtime stack and records raw instruction pointers up
//! to the configured depth. Symbolication resolves those pointers to
//! `"<function>\n\t<file>:<line>"` (full form) or `"<file>:<line>"` (fast
//! form), optionally hiding this library's own frames.

use std::ffi::c_void;
use std::fmt::Write as _;

use crate::capture::pool;
use crate::config;

/// Frames belonging to the capture machinery itself: the `trace` closure and
/// `capture_stack`.
const INTRINSIC_SKIP: usize = 2;

/// Capture up to `stack_depth` program counters, skipping `skip` caller
/// frames beyond the capture machinery. Returns `None` when capture is
/// disabled, depth is zero, or the walk produced nothing.
pub(crate) fn capture_stack(skip: usize) -> Option<Vec<usize>> {
    let cfg = config::snapshot();
    if cfg.disable_stack || cfg.stack_depth == 0 {
        return None;
    }

    let mut buf = pool::acquire_stack_buf(cfg.stack_depth);
    let mut remaining_skip = skip + INTRINSIC_SKIP;
    backtrace::trace(|frame| {
        if remaining_skip > 0 {
            remaining_skip -= 1;
            return true;
        }
        buf.push(frame.ip() as usize);
        buf.len() < cfg.stack_depth
    });

    if buf.is_empty() {
        pool::release_stack_buf(buf);
        return None;
    }
    Some(buf)
}

/// Resolve captured program counters to human-readable frames in
/// caller-to-callee order as captured (innermost first).
///
/// With `full` set, each entry is `"<function>\n\t<file>:<line>"`; otherwise
/// `"<file>:<line>"`. Frames whose symbol contains this library's own
/// identifier are omitted when internal filtering is enabled.
pub(crate) fn symbolize(ips: &[usize], full: bool) -> Vec<String> {
    let cfg = config::snapshot();
    let mut frames = Vec::with_capacity(ips.len());

    for &ip in ips {
        let mut entry: Option<String> = None;
        backtrace::resolve(ip as *mut c_void, |symbol| {
            if entry.is_some() {
                return;
            }
            let function = symbol
                .name()
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("{:#x}", ip));
            if cfg.filter_internal && function.contains(config::CRATE_IDENT) {
                entry = Some(String::new());
                return;
            }

            let mut location = String::new();
            match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => {
                    let _ = write!(location, "{}:{}", file.display(), line);
                }
                (Some(file), None) => {
                    let _ = write!(location, "{}:?", file.display());
                }
                _ => location.push_str("<unknown>"),
            }

            entry = Some(if full {
                format!("{}\n\t{}", function, location)
            } else {
                location
            });
        });

        match entry {
            // Filtered internal frame.
            Some(ref s) if s.is_empty() => {}
            Some(s) => frames.push(s),
            // Resolution failed entirely; keep the raw pointer visible.
            None => frames.push(format!("{:#x}", ip)),
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;

    #[test]
    fn test_capture_respects_depth() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.stack_depth = 4);

        let stack = capture_stack(0);
        config::reset_config();

        let stack = stack.expect("capture enabled");
        assert!(!stack.is_empty());
        assert!(stack.len() <= 4);
    }

    #[test]
    fn test_capture_disabled_returns_none() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.disable_stack = true);

        let stack = capture_stack(0);
        config::reset_config();
        assert!(stack.is_none());
    }

    #[test]
    fn test_zero_depth_returns_none() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.stack_depth = 0);

        let stack = capture_stack(0);
        config::reset_config();
        assert!(stack.is_none());
    }

    #[test]
    fn test_symbolize_forms() {
        let _g = test_support::lock();
        config::reset_config();
        // Keep library frames visible so the capture site resolves.
        config::configure(|c| c.filter_internal = false);

        let stack = capture_stack(0).expect("capture enabled");
        let full = symbolize(&stack, true);
        let fast = symbolize(&stack, false);
        config::reset_config();

        assert_eq!(full.len(), fast.len());
        assert!(!full.is_empty());
        // Full form carries the function line; fast form is location-only.
        assert!(full.iter().any(|f| f.contains("\n\t")));
        assert!(fast.iter().all(|f| !f.contains("\n\t")));
    }
}
