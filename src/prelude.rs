//! Faultline prelude - convenient imports for users
//!
//! This module provides everything most callers need to construct, shape,
//! and coordinate error values.

// Core error value and its context types
pub use crate::error::{ContextValue, Error, CTX_COUNT, CTX_RETRY, CTX_TIMEOUT};

// Chain helpers
pub use crate::error::chain::{convert, format_error, is_retryable, is_timeout};

// Registry surface
pub use crate::registry::{
    callable, categorized, coded, define, last_error, metrics, set_threshold, Monitor, Template,
};

// Retry engine
pub use crate::retry::{
    cancel_pair, BackoffStrategy, CancelToken, ConstantBackoff, ExponentialBackoff, LinearBackoff,
    Retry,
};

// Aggregation and sequencing
pub use crate::aggregate::{Folded, MultiError};
pub use crate::sequence::Sequence;

// Configuration and pooling
pub use crate::capture::{warm_pool, warm_stack_pool};
pub use crate::config::{configure, Config};
