//! Step sequencer
//!
//! Runs closures in order with per-step context, category, code, retry, and
//! optional continuation. Failures are enhanced with the step's metadata
//! (when auto-wrap is on) and logged through the `log` facade. A
//! sequence-wide deadline is honored between steps and inside retry
//! suspensions.

use std::time::{Duration, Instant};

use crate::aggregate::MultiError;
use crate::error::{ContextValue, Error, CTX_RETRY};
use crate::retry::{CancelToken, Retry};

type StepFn = Box<dyn FnMut() -> Result<(), Error> + Send>;

struct Step {
    run: StepFn,
    optional: bool,
    context: Vec<(String, ContextValue)>,
    category: String,
    code: i32,
    retry: Option<Retry>,
    log_on_fail: bool,
}

/// Ordered sequence of fallible steps.
///
/// Step-shaping methods (`optional`, `with`, `tag`, `code`, `retry`,
/// `log_on_fail`) configure the most recently added step and panic when no
/// step exists yet; that is a construction bug, not a runtime condition.
pub struct Sequence {
    steps: Vec<Step>,
    errors: Vec<Error>,
    timeout: Option<Duration>,
    max_errors: usize,
    auto_wrap: bool,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    /// Empty sequence with auto-wrap on and no deadline or error cap.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            errors: Vec::new(),
            timeout: None,
            max_errors: 0,
            auto_wrap: true,
        }
    }

    /// Append a step.
    pub fn step<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> Result<(), Error> + Send + 'static,
    {
        self.steps.push(Step {
            run: Box::new(f),
            optional: false,
            context: Vec::new(),
            category: String::new(),
            code: 0,
            retry: None,
            log_on_fail: false,
        });
        self
    }

    fn last_step(&mut self, method: &str) -> &mut Step {
        match self.steps.last_mut() {
            Some(step) => step,
            None => panic!("Sequence::{}: add a step first", method),
        }
    }

    /// Mark the last step optional: its failure is recorded but does not
    /// stop the run.
    pub fn optional(mut self) -> Self {
        self.last_step("optional").optional = true;
        self
    }

    /// Attach a context entry to the last step, copied onto its failures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        let entry = (key.into(), value.into());
        self.last_step("with").context.push(entry);
        self
    }

    /// Tag the last step's failures with a category.
    pub fn tag(mut self, category: impl Into<String>) -> Self {
        self.last_step("tag").category = category.into();
        self
    }

    /// Stamp the last step's failures with a numeric code.
    pub fn code(mut self, code: i32) -> Self {
        self.last_step("code").code = code;
        self
    }

    /// Retry the last step on retryable errors with a constant delay.
    pub fn retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        let retry = Retry::builder()
            .max_attempts(max_attempts)
            .base_delay(delay)
            .backoff(crate::retry::ConstantBackoff)
            .on_retry(move |attempt, err| {
                log::warn!(
                    "sequence step retrying (attempt {}/{}): {}",
                    attempt,
                    max_attempts.max(1),
                    err
                );
            })
            .build();
        self.last_step("retry").retry = Some(retry);
        self
    }

    /// Log the last step's failures even when the step is optional.
    pub fn log_on_fail(mut self) -> Self {
        self.last_step("log_on_fail").log_on_fail = true;
        self
    }

    /// Deadline for the whole sequence.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop `run_all` after `max_errors` failures; 0 means unlimited.
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Enable or disable enhancing failures with step metadata.
    pub fn auto_wrap(mut self, auto_wrap: bool) -> Self {
        self.auto_wrap = auto_wrap;
        self
    }

    /// Execute steps in order, stopping at the first non-optional failure.
    pub fn run(&mut self) -> Result<(), Error> {
        self.errors.clear();
        let deadline = self.timeout.map(|t| Instant::now() + t);

        for index in 0..self.steps.len() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let err = deadline_error();
                    let enhanced = enhance(err, &self.steps[index], self.auto_wrap);
                    log_failure(&enhanced, "sequence stopped at deadline before step");
                    self.errors.push(enhanced.clone());
                    return Err(enhanced);
                }
            }

            if let Err(err) = execute_step(&mut self.steps[index], deadline) {
                let step = &self.steps[index];
                let enhanced = enhance(err, step, self.auto_wrap);
                if step.log_on_fail || !step.optional {
                    let msg = if step.optional {
                        "optional sequence step failed"
                    } else {
                        "sequence stopped at failed step"
                    };
                    log_failure(&enhanced, msg);
                }
                let optional = step.optional;
                self.errors.push(enhanced.clone());
                if !optional {
                    return Err(enhanced);
                }
            }
        }
        Ok(())
    }

    /// Execute every step, collecting failures without stopping, up to the
    /// configured error cap. Use [`MultiError::fold`] on the result to
    /// collapse it to a single error when exactly one step failed.
    pub fn run_all(&mut self) -> Result<(), MultiError> {
        self.errors.clear();
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let multi = MultiError::new();

        for index in 0..self.steps.len() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let err = deadline_error();
                    let enhanced = enhance(err, &self.steps[index], self.auto_wrap);
                    log_failure(&enhanced, "sequence stopped at deadline before step");
                    self.errors.push(enhanced.clone());
                    multi.add(enhanced);
                    break;
                }
            }

            if let Err(err) = execute_step(&mut self.steps[index], deadline) {
                let step = &self.steps[index];
                let enhanced = enhance(err, step, self.auto_wrap);
                if step.log_on_fail {
                    log_failure(&enhanced, "sequence step failed");
                }
                self.errors.push(enhanced.clone());
                multi.add(enhanced);
                if self.max_errors > 0 && multi.count() >= self.max_errors {
                    log::warn!(
                        "sequence stopping after reaching max errors ({})",
                        self.max_errors
                    );
                    break;
                }
            }
        }

        if multi.has() {
            Err(multi)
        } else {
            Ok(())
        }
    }

    /// Failures recorded by the most recent run, in order.
    pub fn errors(&self) -> Vec<Error> {
        self.errors.clone()
    }

    /// Number of configured steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence holds no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the most recent run recorded failures.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Most recent failure, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.errors.last().cloned()
    }

    /// Drop all steps and recorded failures.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.errors.clear();
    }
}

fn deadline_error() -> Error {
    Error::new("sequence deadline exceeded").with_timeout()
}

fn execute_step(step: &mut Step, deadline: Option<Instant>) -> Result<(), Error> {
    match step.retry.clone() {
        Some(retry) => {
            let engine = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    retry
                        .transform()
                        .cancel_token(CancelToken::deadline(remaining))
                        .build()
                }
                None => retry,
            };
            engine.execute(&mut step.run)
        }
        None => (step.run)(),
    }
}

/// Copy the step's metadata onto a failure: category and code only where
/// unset, context entries unconditionally, and a retryable marker when the
/// step carries a retry policy.
fn enhance(err: Error, step: &Step, auto_wrap: bool) -> Error {
    if !auto_wrap {
        return err;
    }
    let mut enhanced = err;
    if !step.category.is_empty() && enhanced.category().is_empty() {
        enhanced = enhanced.with_category(&step.category);
    }
    if step.code != 0 && enhanced.code() == 0 {
        enhanced = enhanced.with_code(step.code);
    }
    for (key, value) in &step.context {
        enhanced = enhanced.with(key.clone(), value.clone());
    }
    if step.retry.is_some() && !enhanced.has_context_key(CTX_RETRY) {
        enhanced = enhanced.with_retryable();
    }
    enhanced
}

fn log_failure(err: &Error, msg: &str) {
    log::error!(
        "{}: {} (name={}, category={}, code={})",
        msg,
        err,
        err.name(),
        err.category(),
        err.code()
    );
}
