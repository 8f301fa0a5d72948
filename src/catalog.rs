//! Predefined errors, categories, and codes
//!
//! Common error shapes for consistent handling across applications. The
//! singleton instances are immutable; clone one to customize it. The
//! templates count occurrences per name like any registered template.

use once_cell::sync::Lazy;

use crate::error::Error;
use crate::registry::{categorized, coded, Template};

// ── Categories ────────────────────────────────────────────────────

/// Authentication failures.
pub const CATEGORY_AUTH: &str = "auth";
/// Database failures.
pub const CATEGORY_DATABASE: &str = "database";
/// Network failures.
pub const CATEGORY_NETWORK: &str = "network";
/// Input/output failures.
pub const CATEGORY_IO: &str = "io";
/// Validation failures.
pub const CATEGORY_VALIDATION: &str = "validation";
/// Business-rule violations.
pub const CATEGORY_BUSINESS: &str = "business";
/// System-level failures.
pub const CATEGORY_SYSTEM: &str = "system";

// ── Codes (HTTP semantics) ────────────────────────────────────────

pub const CODE_BAD_REQUEST: i32 = 400;
pub const CODE_UNAUTHORIZED: i32 = 401;
pub const CODE_FORBIDDEN: i32 = 403;
pub const CODE_NOT_FOUND: i32 = 404;
pub const CODE_CONFLICT: i32 = 409;
pub const CODE_TOO_MANY_REQUESTS: i32 = 429;
pub const CODE_INTERNAL_ERROR: i32 = 500;
pub const CODE_NOT_IMPLEMENTED: i32 = 501;
pub const CODE_SERVICE_UNAVAILABLE: i32 = 503;

// ── Predefined instances ──────────────────────────────────────────

/// Generic invalid argument.
pub static ERR_INVALID_ARG: Lazy<Error> =
    Lazy::new(|| Error::new("invalid argument").with_code(CODE_BAD_REQUEST));

/// Resource or entity not found.
pub static ERR_NOT_FOUND: Lazy<Error> =
    Lazy::new(|| Error::new("not found").with_code(CODE_NOT_FOUND));

/// Missing permission for an action.
pub static ERR_PERMISSION: Lazy<Error> =
    Lazy::new(|| Error::new("permission denied").with_code(CODE_FORBIDDEN));

/// Operation exceeded its allotted time.
pub static ERR_TIMEOUT: Lazy<Error> =
    Lazy::new(|| Error::new("operation timed out").with_timeout());

/// Unspecified or unexpected failure.
pub static ERR_UNKNOWN: Lazy<Error> = Lazy::new(|| Error::new("unknown error"));

/// Invalid authentication token.
pub static ERR_INVALID_TOKEN: Lazy<Error> =
    Lazy::new(|| Error::new("invalid authentication token").with_code(CODE_UNAUTHORIZED));

/// Expired authentication token.
pub static ERR_TOKEN_EXPIRED: Lazy<Error> =
    Lazy::new(|| Error::new("authentication token expired").with_code(CODE_UNAUTHORIZED));

/// Missing credentials.
pub static ERR_MISSING_CREDS: Lazy<Error> =
    Lazy::new(|| Error::new("missing credentials").with_code(CODE_BAD_REQUEST));

/// Database operation timed out; retryable.
pub static ERR_DB_TIMEOUT: Lazy<Error> = Lazy::new(|| {
    Error::new("database operation timed out")
        .with_code(CODE_INTERNAL_ERROR)
        .with_retryable()
});

/// Network timeout; retryable.
pub static ERR_NETWORK_TIMEOUT: Lazy<Error> = Lazy::new(|| {
    Error::new("network timeout")
        .with_code(CODE_INTERNAL_ERROR)
        .with_retryable()
});

/// Refused network connection.
pub static ERR_CONN_REFUSED: Lazy<Error> =
    Lazy::new(|| Error::new("connection refused").with_code(CODE_INTERNAL_ERROR));

/// File not found.
pub static ERR_FILE_NOT_FOUND: Lazy<Error> =
    Lazy::new(|| Error::new("file not found").with_code(CODE_NOT_FOUND));

/// Insufficient resources for an operation.
pub static ERR_INSUFFICIENT_FUNDS: Lazy<Error> =
    Lazy::new(|| Error::new("insufficient funds").with_code(CODE_BAD_REQUEST));

/// Unimplemented feature.
pub static ERR_NOT_IMPLEMENTED: Lazy<Error> =
    Lazy::new(|| Error::new("not implemented").with_code(CODE_NOT_IMPLEMENTED));

/// External service failure; retryable.
pub static ERR_EXTERNAL_SERVICE: Lazy<Error> = Lazy::new(|| {
    Error::new("external service error")
        .with_code(CODE_INTERNAL_ERROR)
        .with_retryable()
});

// ── Predefined templates ──────────────────────────────────────────

/// Authentication failure for a subject with a reason.
pub static AUTH_FAILED: Lazy<Template> = Lazy::new(|| {
    categorized(
        CATEGORY_AUTH,
        "AuthFailed",
        "authentication failed for {}: {}",
    )
});

/// General database failure.
pub static DB_ERROR: Lazy<Template> =
    Lazy::new(|| categorized(CATEGORY_DATABASE, "DBError", "database error: {}"));

/// General network failure.
pub static NETWORK_ERROR: Lazy<Template> =
    Lazy::new(|| categorized(CATEGORY_NETWORK, "NetworkError", "network failure: {}"));

/// General I/O failure.
pub static IO_ERROR: Lazy<Template> =
    Lazy::new(|| categorized(CATEGORY_IO, "IOError", "I/O error: {}"));

/// General validation failure.
pub static VALIDATION_ERROR: Lazy<Template> = Lazy::new(|| {
    categorized(
        CATEGORY_VALIDATION,
        "ValidationError",
        "validation error: {}",
    )
});

/// General business-rule failure.
pub static BUSINESS_ERROR: Lazy<Template> =
    Lazy::new(|| categorized(CATEGORY_BUSINESS, "BusinessError", "business error: {}"));

/// General system failure.
pub static SYSTEM_ERROR: Lazy<Template> =
    Lazy::new(|| categorized(CATEGORY_SYSTEM, "SystemError", "system error: {}"));

/// Database connection failure with a coded template.
pub static DB_CONNECTION: Lazy<Template> = Lazy::new(|| {
    coded(
        "ErrDBConnection",
        CODE_INTERNAL_ERROR,
        "database connection failed: {}",
    )
});

/// Rate limit exceeded with a coded template.
pub static RATE_LIMIT_EXCEEDED: Lazy<Template> = Lazy::new(|| {
    coded(
        "ErrRateLimitExceeded",
        CODE_TOO_MANY_REQUESTS,
        "rate limit exceeded: {}",
    )
});
