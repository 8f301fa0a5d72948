//! Aggregate errors
//!
//! An ordered, thread-safe collection of errors with an optional capacity
//! limit, random sampling, a custom formatter, and filter/merge operations.
//! The aggregate collects; it never wraps.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Error;

/// Custom rendering for aggregates holding more than one error.
pub type ErrorFormatter = Arc<dyn Fn(&[Error]) -> String + Send + Sync>;

struct MultiState {
    errors: Vec<Error>,
    rng: StdRng,
}

/// Ordered collection of errors with optional limit and sampling.
pub struct MultiError {
    state: Mutex<MultiState>,
    limit: usize,
    sampling: bool,
    sample_rate: u32,
    formatter: Option<ErrorFormatter>,
}

/// Folded view of an aggregate: nothing, exactly one error, or the
/// aggregate itself.
pub enum Folded {
    /// No errors were collected.
    Empty,
    /// Exactly one error was collected.
    Single(Error),
    /// More than one error was collected.
    Multiple(MultiError),
}

impl Default for MultiError {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiError {
    /// Unlimited aggregate with sampling off.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring an aggregate.
    pub fn builder() -> MultiErrorBuilder {
        MultiErrorBuilder {
            limit: 0,
            sampling: false,
            sample_rate: 100,
            seed: None,
            formatter: None,
        }
    }

    fn with_options(&self) -> Self {
        Self {
            state: Mutex::new(MultiState {
                errors: Vec::new(),
                rng: StdRng::from_entropy(),
            }),
            limit: self.limit,
            sampling: self.sampling,
            sample_rate: self.sample_rate,
            formatter: self.formatter.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MultiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `err`, subject to sampling (when the list is non-empty) and
    /// the capacity limit.
    pub fn add(&self, err: Error) {
        let mut state = self.lock();
        if self.sampling && !state.errors.is_empty() {
            let roll: u32 = state.rng.gen_range(0..100);
            if roll >= self.sample_rate {
                return;
            }
        }
        if self.limit > 0 && state.errors.len() >= self.limit {
            return;
        }
        state.errors.push(err);
    }

    /// Append `err` when present.
    pub fn add_not_nil(&self, err: Option<Error>) {
        if let Some(err) = err {
            self.add(err);
        }
    }

    /// Number of collected errors.
    pub fn count(&self) -> usize {
        self.lock().errors.len()
    }

    /// Whether any errors were collected.
    pub fn has(&self) -> bool {
        self.count() > 0
    }

    /// First collected error, if any.
    pub fn first(&self) -> Option<Error> {
        self.lock().errors.first().cloned()
    }

    /// Most recently collected error, if any.
    pub fn last(&self) -> Option<Error> {
        self.lock().errors.last().cloned()
    }

    /// Defensive copy of the collected errors in insertion order.
    pub fn errors(&self) -> Vec<Error> {
        self.lock().errors.clone()
    }

    /// Drop every collected error.
    pub fn clear(&self) {
        self.lock().errors.clear();
    }

    /// New aggregate with the same options holding the errors matching
    /// `pred`. Matching entries are copied directly (no sampling re-roll),
    /// still subject to the capacity limit.
    pub fn filter<P>(&self, pred: P) -> MultiError
    where
        P: Fn(&Error) -> bool,
    {
        let filtered = self.with_options();
        {
            let mut target = filtered.lock();
            for err in self.lock().errors.iter().filter(|err| pred(err)) {
                if filtered.limit > 0 && target.errors.len() >= filtered.limit {
                    break;
                }
                target.errors.push(err.clone());
            }
        }
        filtered
    }

    /// Append copies of `other`'s errors, subject to this aggregate's own
    /// sampling and limit.
    pub fn merge(&self, other: &MultiError) {
        for err in other.errors() {
            self.add(err);
        }
    }

    /// Collapse into nothing, the sole error, or the aggregate itself.
    pub fn fold(self) -> Folded {
        let MultiError {
            state,
            limit,
            sampling,
            sample_rate,
            formatter,
        } = self;
        let mut inner = state.into_inner().unwrap_or_else(PoisonError::into_inner);
        match inner.errors.len() {
            0 => Folded::Empty,
            1 => match inner.errors.pop() {
                Some(err) => Folded::Single(err),
                None => Folded::Empty,
            },
            _ => Folded::Multiple(MultiError {
                state: Mutex::new(inner),
                limit,
                sampling,
                sample_rate,
                formatter,
            }),
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        match state.errors.len() {
            0 => Ok(()),
            1 => f.write_str(&state.errors[0].message()),
            count => {
                if let Some(formatter) = &self.formatter {
                    return f.write_str(&formatter(&state.errors));
                }
                write!(f, "errors({}): ", count)?;
                for (index, err) in state.errors.iter().enumerate() {
                    if index > 0 {
                        f.write_str("; ")?;
                    }
                    f.write_str(&err.message())?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiError")
            .field("count", &self.count())
            .field("limit", &self.limit)
            .field("sampling", &self.sampling)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl StdError for MultiError {}

/// Configuration builder for [`MultiError`].
pub struct MultiErrorBuilder {
    limit: usize,
    sampling: bool,
    sample_rate: u32,
    seed: Option<u64>,
    formatter: Option<ErrorFormatter>,
}

impl MultiErrorBuilder {
    /// Maximum number of errors retained; 0 keeps everything.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Enable sampling at `rate` percent (clamped to 1..=100). The first
    /// error is always kept.
    pub fn sampling(mut self, rate: u32) -> Self {
        self.sampling = true;
        self.sample_rate = rate.clamp(1, 100);
        self
    }

    /// Seed the sampling RNG for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Custom rendering for multi-error display.
    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&[Error]) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Finalize the configuration.
    pub fn build(self) -> MultiError {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        MultiError {
            state: Mutex::new(MultiState {
                errors: Vec::new(),
                rng,
            }),
            limit: self.limit,
            sampling: self.sampling,
            sample_rate: self.sample_rate,
            formatter: self.formatter,
        }
    }
}
