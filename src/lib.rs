//! Faultline - enhanced error values for application code
//!
//! A single rich error object carrying an identifier, formatted message,
//! message template, numeric code, category tag, typed key/value context, a
//! wrapped cause chain, a lazily captured call stack, and an occurrence
//! counter - with composable subsystems around it.
//!
//! # Features
//!
//! - **Pooled allocation**: error shells and stack buffers are recycled
//!   through lock-free free lists
//! - **Registry**: templates, codes, and categories bound to stable names,
//!   with sharded occurrence counters and per-name last-instance tracking
//! - **Threshold alerts**: bounded per-name channels that never block the
//!   producer and count drops under back-pressure
//! - **Retry engine**: pluggable back-off with jitter, cancellation, and
//!   generic return values
//! - **Aggregation**: ordered error collections with capacity limits,
//!   random sampling, and custom formatting
//! - **Sequencing**: ordered step execution with per-step context, retry,
//!   and structured logging
//!
//! # Quick start
//!
//! ```
//! use faultline::{newf, Error};
//!
//! let db = Error::new("connection timeout")
//!     .with("timeout_sec", 5i64)
//!     .with("server", "db01.prod");
//! let api = newf!("API request failed")
//!     .with_code(500)
//!     .wrap(db);
//!
//! assert_eq!(api.code(), 500);
//! assert_eq!(api.unwrap_all().len(), 2);
//! assert!(api.to_string().starts_with("API request failed"));
//! ```

pub mod aggregate;
mod capture;
pub mod catalog;
pub mod config;
mod error;
pub mod prelude;
pub mod registry;
pub mod retry;
pub mod sequence;

// Re-export the public API at the crate root for convenience
pub use aggregate::{ErrorFormatter, Folded, MultiError};
pub use capture::{pool_stats, warm_pool, warm_stack_pool};
pub use config::{configure, reset_config, Config};
pub use error::chain::{convert, format_error, is_retryable, is_timeout, ChainIter};
pub use error::{
    ContextValue, Error, CONTEXT_INLINE, CTX_CANCELLED, CTX_COUNT, CTX_RETRY, CTX_TIMEOUT,
};
pub use registry::{
    callable, categorized, coded, define, dropped_alerts, func_error, last_error, metrics, names,
    reset_counter, reset_registry, set_locales, set_threshold, Callable, ErrorFn, Monitor,
    Template,
};
pub use retry::{
    cancel_pair, BackoffStrategy, CancelHandle, CancelToken, ConstantBackoff, ExponentialBackoff,
    LinearBackoff, Retry, RetryBuilder,
};
pub use sequence::Sequence;
