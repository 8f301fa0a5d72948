//! Rich error values
//!
//! The central [`Error`] type carries an identifier, rendered message,
//! message template, numeric code, category tag, typed key/value context, an
//! optional wrapped cause, a lazily captured call stack, and a per-instance
//! occurrence counter. Shells live in a pool; a handle returns its shell on
//! release.

pub(crate) mod chain;
pub(crate) mod context;
pub(crate) mod json;

use std::error::Error as StdError;
use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::capture::{pool, stack};
use crate::config;
use crate::registry;

pub use self::context::{ContextValue, CONTEXT_INLINE};
pub(crate) use self::context::ContextStore;

/// Context key marking an error as a timeout.
pub const CTX_TIMEOUT: &str = "[error] timeout";

/// Context key marking an error as retryable.
pub const CTX_RETRY: &str = "[error] retry";

/// Context key carrying the occurrence total on dispatched alerts.
pub const CTX_COUNT: &str = "count";

/// Context key marking a cancellation error.
pub const CTX_CANCELLED: &str = "cancelled";

/// Fallback message when name, message, and template are all empty.
const UNKNOWN_MESSAGE: &str = "unknown error";

/// Heap shell holding every field of an error value. Shells are reset and
/// recycled through the pool; the public [`Error`] handle owns exactly one.
pub(crate) struct ErrorInner {
    pub(crate) name: String,
    pub(crate) msg: String,
    pub(crate) template: String,
    pub(crate) code: i32,
    pub(crate) category: String,
    pub(crate) count: AtomicU64,
    pub(crate) context: RwLock<ContextStore>,
    pub(crate) cause: Option<Arc<dyn StdError + Send + Sync>>,
    pub(crate) stack: Option<Vec<usize>>,
    pub(crate) callback: Option<Arc<dyn Fn() + Send + Sync>>,
    pub(crate) pooled: bool,
}

impl ErrorInner {
    pub(crate) fn blank(pooled: bool) -> Self {
        Self {
            name: String::new(),
            msg: String::new(),
            template: String::new(),
            code: 0,
            category: String::new(),
            count: AtomicU64::new(0),
            context: RwLock::new(ContextStore::new()),
            cause: None,
            stack: None,
            callback: None,
            pooled,
        }
    }

    /// Clear every field. The stack buffer is recycled separately by the
    /// pool before reset runs.
    pub(crate) fn reset(&mut self) {
        self.name.clear();
        self.msg.clear();
        self.template.clear();
        self.code = 0;
        self.category.clear();
        self.count.store(0, Ordering::Relaxed);
        self.context
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.cause = None;
        self.stack = None;
        self.callback = None;
    }
}

/// Enhanced error value with context, cause chain, stack capture, and
/// occurrence counting.
///
/// Constructed through [`Error::new`] and friends, shaped through chainable
/// builders, and released back to the pool on drop (or explicitly via
/// [`Error::free`]).
pub struct Error {
    inner: ManuallyDrop<Box<ErrorInner>>,
}

/// Create a formatted error, `format!`-style.
#[macro_export]
macro_rules! newf {
    ($($arg:tt)*) => {
        $crate::Error::newf(::core::format_args!($($arg)*))
    };
}

/// Create a formatted error wrapping a cause, `format!`-style.
#[macro_export]
macro_rules! wrapf {
    ($cause:expr, $($arg:tt)*) => {
        $crate::Error::wrapf($cause, ::core::format_args!($($arg)*))
    };
}

/// Create a formatted error with a captured stack, `format!`-style.
#[macro_export]
macro_rules! tracef {
    ($($arg:tt)*) => {
        $crate::Error::tracef(::core::format_args!($($arg)*))
    };
}

impl Error {
    pub(crate) fn from_inner(inner: Box<ErrorInner>) -> Self {
        Self {
            inner: ManuallyDrop::new(inner),
        }
    }

    /// Take ownership of the shell, bypassing `Drop`.
    pub(crate) fn into_inner(mut self) -> Box<ErrorInner> {
        // Safety: `self` is forgotten immediately, so the slot is never
        // observed again.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        std::mem::forget(self);
        inner
    }

    /// Blank error with no message, stack, or metadata.
    pub fn empty() -> Self {
        Self::from_inner(pool::acquire_shell())
    }

    /// Error with the given message. No stack is captured.
    pub fn new(text: impl Into<String>) -> Self {
        let mut inner = pool::acquire_shell();
        inner.msg = text.into();
        Self::from_inner(inner)
    }

    /// Error with a formatted message. No stack is captured. Usually
    /// invoked through the [`newf!`] macro.
    pub fn newf(args: fmt::Arguments<'_>) -> Self {
        Self::new(fmt::format(args))
    }

    /// Error with a stable identifier and a captured stack.
    pub fn named(name: impl Into<String>) -> Self {
        let mut inner = pool::acquire_shell();
        inner.name = name.into();
        inner.stack = stack::capture_stack(1);
        Self::from_inner(inner)
    }

    /// Error with the given message and a captured stack.
    pub fn traced(text: impl Into<String>) -> Self {
        let mut inner = pool::acquire_shell();
        inner.msg = text.into();
        inner.stack = stack::capture_stack(1);
        Self::from_inner(inner)
    }

    /// Error with a formatted message and a captured stack. Usually invoked
    /// through the [`tracef!`] macro.
    pub fn tracef(args: fmt::Arguments<'_>) -> Self {
        let mut inner = pool::acquire_shell();
        inner.msg = fmt::format(args);
        inner.stack = stack::capture_stack(1);
        Self::from_inner(inner)
    }

    /// Formatted error wrapping `cause`. No stack is captured. Usually
    /// invoked through the [`wrapf!`] macro.
    pub fn wrapf<E>(cause: E, args: fmt::Arguments<'_>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut inner = pool::acquire_shell();
        inner.msg = fmt::format(args);
        inner.cause = Some(Arc::new(cause));
        Self::from_inner(inner)
    }

    // ── Builders ─────────────────────────────────────────────────────

    /// Attach a context entry. The first four entries are stored inline;
    /// the fifth spills everything into a map.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.inner
            .context
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        self
    }

    /// Set the cause, forming a chain. The caller guarantees the chain is
    /// acyclic.
    pub fn wrap<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.inner.cause = Some(Arc::new(cause));
        self
    }

    /// Set the cause only when one is present.
    pub fn wrap_not_nil<E>(self, cause: Option<E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        match cause {
            Some(cause) => self.wrap(cause),
            None => self,
        }
    }

    pub(crate) fn wrap_boxed(mut self, cause: Box<dyn StdError + Send + Sync>) -> Self {
        self.inner.cause = Some(Arc::from(cause));
        self
    }

    /// Replace the message with a formatted string.
    pub fn msgf(mut self, args: fmt::Arguments<'_>) -> Self {
        self.inner.msg = fmt::format(args);
        self
    }

    /// Capture a stack at this call site. No-op when a stack is already
    /// present or capture is disabled.
    pub fn with_stack(mut self) -> Self {
        if self.inner.stack.is_none() {
            self.inner.stack = stack::capture_stack(1);
        }
        self
    }

    /// Capture a stack at this call site. Identical contract to
    /// [`Error::with_stack`].
    pub fn trace(mut self) -> Self {
        if self.inner.stack.is_none() {
            self.inner.stack = stack::capture_stack(1);
        }
        self
    }

    /// Set the identifier.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Set the message template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.inner.template = template.into();
        self
    }

    /// Set the numeric code on this instance.
    pub fn with_code(mut self, code: i32) -> Self {
        self.inner.code = code;
        self
    }

    /// Set the category tag.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.inner.category = category.into();
        self
    }

    /// Mark this error as a timeout.
    pub fn with_timeout(self) -> Self {
        self.with(CTX_TIMEOUT, true)
    }

    /// Mark this error as retryable.
    pub fn with_retryable(self) -> Self {
        self.with(CTX_RETRY, true)
    }

    /// Attach a handler invoked on every message read, before the message
    /// is selected. The handler must not mutate the value.
    pub fn callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.inner.callback = Some(Arc::new(f));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Identifier, or empty string when unset.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Message template, or empty string when unset.
    pub fn template(&self) -> &str {
        &self.inner.template
    }

    /// Category tag, or empty string when unset.
    pub fn category(&self) -> &str {
        &self.inner.category
    }

    /// Numeric code: the instance code when set, else the code registered
    /// for this error's name, else 0.
    pub fn code(&self) -> i32 {
        if self.inner.code != 0 {
            return self.inner.code;
        }
        if self.inner.name.is_empty() {
            return 0;
        }
        registry::code_for(&self.inner.name).unwrap_or(0)
    }

    /// Select the display message without firing the callback.
    fn render(&self) -> String {
        if !self.inner.msg.is_empty() {
            return self.inner.msg.clone();
        }
        if !self.inner.template.is_empty() {
            return self.inner.template.clone();
        }
        if !self.inner.name.is_empty() {
            return self.inner.name.clone();
        }
        UNKNOWN_MESSAGE.to_string()
    }

    /// Rendered message: the first non-empty of message, template, name,
    /// else `"unknown error"`. Fires the attached callback first.
    pub fn message(&self) -> String {
        if let Some(cb) = &self.inner.callback {
            cb();
        }
        self.render()
    }

    /// Localized message for `locale`, falling back to the rendered
    /// message when no translation is registered.
    pub fn message_localized(&self, locale: &str) -> String {
        if !self.inner.name.is_empty() {
            if let Some(localized) = registry::localized(locale, &self.inner.name) {
                return localized;
            }
        }
        self.message()
    }

    /// Per-instance occurrence count.
    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Relaxed)
    }

    /// Increment the per-instance occurrence count, returning the new
    /// value.
    pub fn increment(&self) -> u64 {
        self.inner.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn set_count(&self, count: u64) {
        self.inner.count.store(count, Ordering::Relaxed);
    }

    /// Keyed map view of the context. Key order is not guaranteed.
    pub fn context(&self) -> std::collections::HashMap<String, ContextValue> {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_map()
    }

    /// Value stored under `key`, if any.
    pub fn context_value(&self, key: &str) -> Option<ContextValue> {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Whether the context contains `key`.
    pub fn has_context_key(&self, key: &str) -> bool {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Raw captured program counters, innermost first.
    pub fn frames(&self) -> Option<&[usize]> {
        self.inner.stack.as_deref()
    }

    /// Symbolized stack in full form (`"<function>\n\t<file>:<line>"`).
    /// Empty when no stack was captured.
    pub fn stack(&self) -> Vec<String> {
        match &self.inner.stack {
            Some(ips) => stack::symbolize(ips, true),
            None => Vec::new(),
        }
    }

    /// Symbolized stack in fast form (`"<file>:<line>"`).
    pub fn stack_fast(&self) -> Vec<String> {
        match &self.inner.stack {
            Some(ips) => stack::symbolize(ips, false),
            None => Vec::new(),
        }
    }

    /// Direct cause, if any.
    pub fn unwrap_cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }

    /// Whether this error is marked as (or reads as) a timeout.
    pub fn is_timeout(&self) -> bool {
        if let Some(ContextValue::Bool(flag)) = self.context_value(CTX_TIMEOUT) {
            return flag;
        }
        self.message().to_lowercase().contains("timeout")
    }

    /// Whether this error is marked as (or reads as) retryable.
    pub fn is_retryable(&self) -> bool {
        if let Some(ContextValue::Bool(flag)) = self.context_value(CTX_RETRY) {
            return flag;
        }
        let lower = self.message().to_lowercase();
        self.is_timeout() || lower.contains("retry")
    }

    /// Whether this error carries no message, template, or name.
    pub fn is_empty(&self) -> bool {
        self.inner.msg.trim().is_empty()
            && self.inner.template.is_empty()
            && self.inner.name.is_empty()
    }

    /// Whether this error carries meaningful content.
    pub fn has(&self) -> bool {
        !self.is_empty()
    }

    /// Release the shell back to the pool immediately.
    ///
    /// Dropping the handle has the same effect while `auto_free` is on;
    /// `free` repools even when it is off. Ownership makes a second release
    /// impossible.
    pub fn free(self) {
        pool::release_shell(self.into_inner());
    }
}

/// Fresh shell from the pool with every field duplicated: the stack is
/// deep-copied into its own pooled buffer, the count is preserved, and the
/// cause and callback are shared.
impl Clone for Error {
    fn clone(&self) -> Self {
        let mut shell = pool::acquire_shell();
        shell.name = self.inner.name.clone();
        shell.msg = self.inner.msg.clone();
        shell.template = self.inner.template.clone();
        shell.code = self.inner.code;
        shell.category = self.inner.category.clone();
        shell.count = AtomicU64::new(self.inner.count.load(Ordering::Relaxed));
        *shell
            .context
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = self
            .inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        shell.cause = self.inner.cause.clone();
        shell.stack = self.inner.stack.as_ref().map(|ips| {
            let mut buf = pool::acquire_stack_buf(ips.len());
            buf.extend_from_slice(ips);
            buf
        });
        shell.callback = self.inner.callback.clone();
        Self::from_inner(shell)
    }
}

impl Drop for Error {
    fn drop(&mut self) {
        // Safety: drop runs at most once and nothing reads the slot after.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        if config::snapshot().auto_free {
            pool::release_shell(inner);
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Error");
        dbg.field("name", &self.inner.name)
            .field("msg", &self.inner.msg)
            .field("template", &self.inner.template)
            .field("code", &self.inner.code)
            .field("category", &self.inner.category)
            .field("count", &self.count());
        dbg.field(
            "context",
            &self
                .inner
                .context
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        );
        dbg.field("cause", &self.inner.cause.as_ref().map(|c| c.to_string()))
            .field("stack_frames", &self.inner.stack.as_ref().map(Vec::len))
            .finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.unwrap_cause()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_new_has_message_and_no_stack() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::new("operation failed");
        assert_eq!(err.message(), "operation failed");
        assert!(err.frames().is_none());
    }

    #[test]
    fn test_newf_formats() {
        let err = newf!("failed {} {}", "test", 42);
        assert_eq!(err.message(), "failed test 42");
    }

    #[test]
    fn test_named_captures_stack() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::named("db_error");
        assert_eq!(err.name(), "db_error");
        assert_eq!(err.message(), "db_error");
        assert!(err.frames().is_some());
    }

    #[test]
    fn test_traced_captures_stack() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::traced("boom");
        assert!(err.frames().is_some());
        let err2 = tracef!("boom {}", 2);
        assert!(err2.frames().is_some());
        assert_eq!(err2.message(), "boom 2");
    }

    #[test]
    fn test_message_fallback_order() {
        let err = Error::empty();
        assert_eq!(err.message(), "unknown error");

        let err = Error::empty().with_name("n");
        assert_eq!(err.message(), "n");

        let err = Error::empty().with_name("n").with_template("t");
        assert_eq!(err.message(), "t");

        let err = Error::new("m").with_name("n").with_template("t");
        assert_eq!(err.message(), "m");
    }

    #[test]
    fn test_callback_fires_on_each_read() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let err = Error::new("watched").callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let _ = err.message();
        let _ = err.to_string();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_with_stack_is_idempotent() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::traced("x");
        let before = err.frames().map(<[usize]>::to_vec);
        let err = err.with_stack().trace();
        let after = err.frames().map(<[usize]>::to_vec);
        assert_eq!(before, after);
    }

    #[test]
    fn test_stack_disabled_globally() {
        let _g = test_support::lock();
        config::reset_config();
        config::configure(|c| c.disable_stack = true);

        let err = Error::named("quiet").with_stack().trace();
        assert!(err.frames().is_none());
        assert!(err.stack().is_empty());

        config::reset_config();
    }

    #[test]
    fn test_code_stored_on_instance() {
        let err = Error::new("plain").with_code(500);
        assert_eq!(err.code(), 500);

        let unnamed = Error::new("plain");
        assert_eq!(unnamed.code(), 0);
    }

    #[test]
    fn test_timeout_and_retry_markers() {
        let err = Error::new("x").with_timeout();
        assert!(err.is_timeout());
        assert!(err.has_context_key(CTX_TIMEOUT));

        let err = Error::new("x").with_retryable();
        assert!(err.is_retryable());
        assert!(!err.is_timeout());

        // Message probing without explicit markers.
        let err = Error::new("connection timeout");
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_clone_preserves_fields_and_count() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::named("orig")
            .with_code(409)
            .with_category("db")
            .with("k", "v");
        err.increment();
        err.increment();

        let copy = err.clone();
        assert_eq!(copy.name(), "orig");
        assert_eq!(copy.code(), 409);
        assert_eq!(copy.category(), "db");
        assert_eq!(copy.count(), 2);
        assert_eq!(
            copy.context_value("k"),
            Some(ContextValue::Str("v".into()))
        );
        assert_eq!(copy.frames(), err.frames());

        // Independent stacks: mutating the copy's count leaves the original.
        copy.increment();
        assert_eq!(err.count(), 2);
    }

    #[test]
    fn test_pool_reuse_after_free() {
        let _g = test_support::lock();
        config::reset_config();

        let err = Error::new("recycled").with("k", 1i64).with_code(404);
        err.free();

        let next = Error::empty();
        assert!(next.name().is_empty());
        assert_eq!(next.code(), 0);
        assert!(!next.has_context_key("k"));
        assert_eq!(next.count(), 0);
        next.free();
    }

    #[test]
    fn test_is_empty() {
        assert!(Error::empty().is_empty());
        assert!(Error::new("  ").is_empty());
        assert!(!Error::new("x").is_empty());
        assert!(!Error::empty().with_name("n").is_empty());
        assert!(!Error::empty().has());
    }

    #[test]
    fn test_basic_chain_scenario() {
        let _g = test_support::lock();
        config::reset_config();

        let db = Error::new("connection timeout")
            .with("timeout_sec", 5i64)
            .with("server", "db01.prod");
        let biz = Error::new("failed to process user 12345")
            .with("user_id", "12345")
            .wrap(db);
        let api = Error::new("API request failed")
            .with_code(500)
            .with_stack()
            .wrap(biz);

        assert!(api.to_string().starts_with("API request failed"));
        assert_eq!(api.code(), 500);
        assert!(api.frames().is_some());

        let all = api.unwrap_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].to_string(), "API request failed");
        assert_eq!(all[1].to_string(), "failed to process user 12345");
        assert_eq!(all[2].to_string(), "connection timeout");

        let biz_ref = api
            .find_cause::<Error>()
            .expect("library cause present");
        assert_eq!(biz_ref.code(), 0);
        assert!(biz_ref.frames().is_none());
    }
}
