//! Back-off strategies for the retry engine

use std::time::Duration;

/// Computes the delay before the attempt following attempt `attempt`
/// (1-indexed; attempt 1 is the first execution).
pub trait BackoffStrategy: Send + Sync {
    /// Delay for the given attempt based on the configured base delay.
    fn delay(&self, attempt: u32, base_delay: Duration) -> Duration;
}

/// Fixed delay for every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantBackoff;

impl BackoffStrategy for ConstantBackoff {
    fn delay(&self, _attempt: u32, base_delay: Duration) -> Duration {
        base_delay
    }
}

/// Delay growing linearly with the attempt index.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBackoff;

impl BackoffStrategy for LinearBackoff {
    fn delay(&self, attempt: u32, base_delay: Duration) -> Duration {
        base_delay.saturating_mul(attempt.max(1))
    }
}

/// Delay doubling with each attempt, starting from the base delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialBackoff;

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32, base_delay: Duration) -> Duration {
        if attempt <= 1 {
            return base_delay;
        }
        let exponent = (attempt - 1).min(31);
        base_delay.saturating_mul(1u32 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);

    #[test]
    fn test_constant_is_flat() {
        let strategy = ConstantBackoff;
        for attempt in 1..6 {
            assert_eq!(strategy.delay(attempt, BASE), BASE);
        }
    }

    #[test]
    fn test_linear_grows_linearly() {
        let strategy = LinearBackoff;
        assert_eq!(strategy.delay(1, BASE), BASE);
        assert_eq!(strategy.delay(2, BASE), BASE * 2);
        assert_eq!(strategy.delay(5, BASE), BASE * 5);
    }

    #[test]
    fn test_exponential_doubles() {
        let strategy = ExponentialBackoff;
        assert_eq!(strategy.delay(1, BASE), BASE);
        assert_eq!(strategy.delay(2, BASE), BASE * 2);
        assert_eq!(strategy.delay(3, BASE), BASE * 4);
        assert_eq!(strategy.delay(4, BASE), BASE * 8);
    }

    #[test]
    fn test_monotone_non_decreasing() {
        let strategies: [&dyn BackoffStrategy; 2] = [&LinearBackoff, &ExponentialBackoff];
        for strategy in strategies {
            for attempt in 1..10 {
                assert!(strategy.delay(attempt + 1, BASE) >= strategy.delay(attempt, BASE));
            }
        }
    }

    #[test]
    fn test_exponential_saturates_instead_of_overflowing() {
        let strategy = ExponentialBackoff;
        let huge = strategy.delay(64, Duration::from_secs(u64::MAX / 2));
        assert!(huge >= Duration::from_secs(u64::MAX / 2));
    }
}
