//! Chainable retry engine
//!
//! Runs an operation up to a configured number of attempts, suspending
//! between attempts according to a pluggable back-off strategy with
//! optional ±25% jitter. The suspension races the computed delay against a
//! cancellation token; cancellation surfaces the cancellation error itself,
//! never the wrapped last attempt.

pub(crate) mod backoff;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, Receiver, Sender};
use rand::Rng;

use crate::error::{Error, CTX_CANCELLED};

pub use self::backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff};

/// Default maximum attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default cap on the computed delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Cancellation signal observed by the retry suspension.
///
/// Created from [`cancel_pair`] for manual cancellation or
/// [`CancelToken::deadline`] for a timeout. Dropping the paired
/// [`CancelHandle`] also cancels, mirroring scope-exit cancellation.
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<Instant>,
}

impl CancelToken {
    /// Token that fires after `timeout` elapses.
    pub fn deadline(timeout: Duration) -> Self {
        Self {
            rx: crossbeam_channel::after(timeout),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<Instant> {
        &self.rx
    }
}

/// Write side of a cancellation pair.
pub struct CancelHandle {
    tx: Sender<Instant>,
}

impl CancelHandle {
    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.try_send(Instant::now());
    }
}

/// Create a manual cancellation pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded(1);
    (CancelHandle { tx }, CancelToken { rx })
}

fn cancelled_error() -> Error {
    Error::new("operation cancelled").with(CTX_CANCELLED, true)
}

/// Retryable operation runner with configurable attempts, back-off,
/// jitter, predicate, callback, and cancellation.
#[derive(Clone)]
pub struct Retry {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Arc<dyn BackoffStrategy>,
    jitter: bool,
    on_retry: Option<Arc<dyn Fn(u32, &Error) + Send + Sync>>,
    predicate: Arc<dyn Fn(&Error) -> bool + Send + Sync>,
    cancel: Option<CancelToken>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff: Arc::new(ExponentialBackoff),
            jitter: true,
            on_retry: None,
            predicate: Arc::new(Error::is_retryable),
            cancel: None,
        }
    }
}

impl Retry {
    /// Engine with default settings: 3 attempts, 100ms base delay, 10s
    /// cap, exponential back-off with jitter, retrying errors that read as
    /// retryable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start configuring an engine.
    pub fn builder() -> RetryBuilder {
        RetryBuilder {
            cfg: Self::default(),
        }
    }

    /// Builder seeded with this engine's configuration; the original is
    /// unchanged.
    pub fn transform(&self) -> RetryBuilder {
        RetryBuilder { cfg: self.clone() }
    }

    /// Configured maximum number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `f` until it succeeds, the predicate rejects its error, the
    /// attempts are exhausted, or the token fires.
    pub fn execute<F>(&self, mut f: F) -> Result<(), Error>
    where
        F: FnMut() -> Result<(), Error>,
    {
        self.execute_reply(|| f())
    }

    /// [`Retry::execute`] with a success value of type `T`.
    pub fn execute_reply<T, F>(&self, mut f: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, Error>,
    {
        let mut last_err: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.predicate)(&err) {
                        return Err(err);
                    }
                    if attempt == self.max_attempts {
                        last_err = Some(err);
                        break;
                    }
                    if let Some(on_retry) = &self.on_retry {
                        on_retry(attempt, &err);
                    }
                    last_err = Some(err);
                    self.suspend(self.delay_for(attempt))?;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::new("retry attempts exhausted")))
    }

    /// Delay before the attempt following `attempt`: back-off, clamped to
    /// the cap, then jittered.
    fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.backoff.delay(attempt, self.base_delay);
        if !self.max_delay.is_zero() && delay > self.max_delay {
            delay = self.max_delay;
        }
        if self.jitter {
            delay = apply_jitter(delay);
        }
        delay
    }

    /// Sleep for `delay`, racing the cancellation token. A fired token
    /// surfaces the cancellation error immediately.
    fn suspend(&self, delay: Duration) -> Result<(), Error> {
        let timer = crossbeam_channel::after(delay);
        let cancel = match &self.cancel {
            Some(token) => token.receiver().clone(),
            None => never(),
        };
        crossbeam_channel::select! {
            recv(cancel) -> _ => Err(cancelled_error()),
            recv(timer) -> _ => Ok(()),
        }
    }
}

/// Perturb `delay` by a uniform offset in `[-delay/4, +delay/4]`,
/// quantized to whole nanoseconds.
fn apply_jitter(delay: Duration) -> Duration {
    let quarter = delay.as_nanos() as i128 / 4;
    if quarter == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(-quarter..=quarter);
    let adjusted = (delay.as_nanos() as i128 + offset).max(0);
    Duration::from_nanos(adjusted as u64)
}

/// Configuration builder for [`Retry`].
pub struct RetryBuilder {
    cfg: Retry,
}

impl RetryBuilder {
    /// Maximum attempts, clamped to at least 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.cfg.max_attempts = max_attempts.max(1);
        self
    }

    /// Base delay fed to the back-off strategy.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.cfg.base_delay = base_delay;
        self
    }

    /// Cap on the computed delay. Zero disables the cap.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.cfg.max_delay = max_delay;
        self
    }

    /// Back-off strategy.
    pub fn backoff<S>(mut self, strategy: S) -> Self
    where
        S: BackoffStrategy + 'static,
    {
        self.cfg.backoff = Arc::new(strategy);
        self
    }

    /// Enable or disable ±25% jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.cfg.jitter = jitter;
        self
    }

    /// Callback fired after each failed attempt except the last, before
    /// the delay.
    pub fn on_retry<F>(mut self, on_retry: F) -> Self
    where
        F: Fn(u32, &Error) + Send + Sync + 'static,
    {
        self.cfg.on_retry = Some(Arc::new(on_retry));
        self
    }

    /// Predicate deciding whether an error is worth retrying. Replaces the
    /// default retryable-marker/message probe.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.cfg.predicate = Arc::new(predicate);
        self
    }

    /// Cancellation token raced against every suspension.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cfg.cancel = Some(token);
        self
    }

    /// Finalize the configuration.
    pub fn build(self) -> Retry {
        self.cfg
    }
}
