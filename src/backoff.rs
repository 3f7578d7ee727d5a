//! Backoff strategies for the gateway retry loop.
//!
//! Attempt semantics: `attempt` is zero-based and counts *retries*, so the wait before the first
//! retry is `next_backoff(0)`. The exponential policy computes
//! `initial_interval * multiplier^attempt` and clamps it to `max_interval`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use paywire::backoff::{BackoffStrategy, ExponentialBackoff};
//!
//! let backoff =
//!     ExponentialBackoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(10)).unwrap();
//! assert_eq!(backoff.next_backoff(0), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(3), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(4), Duration::from_secs(10)); // capped
//! ```
//!
//! Overflow behavior: computations that overflow or produce non-finite values saturate to the
//! configured maximum, which itself may never exceed `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

/// Upper bound for any configured backoff interval (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffError {
    #[error("multiplier must be finite and >= 1.0 (got {0})")]
    InvalidMultiplier(f64),
    #[error("max interval must be greater than zero")]
    MaxMustBePositive,
    #[error("max interval ({max:?}) must be >= initial interval ({initial:?})")]
    MaxLessThanInitial { initial: Duration, max: Duration },
    #[error("max interval ({0:?}) exceeds the 1 day ceiling")]
    MaxTooLarge(Duration),
}

/// Maps a zero-based retry attempt to the wait before that retry.
///
/// Implementations must be pure: the same attempt always yields the same duration.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    fn next_backoff(&self, attempt: u32) -> Duration;
}

/// Exponential backoff, capped at `max_interval`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl ExponentialBackoff {
    /// Create a validated exponential backoff.
    ///
    /// Errors if `multiplier` is not finite or below `1.0`, if `max_interval` is zero or below
    /// `initial_interval`, or if `max_interval` exceeds [`MAX_BACKOFF`].
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
    ) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        if max_interval.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max_interval < initial_interval {
            return Err(BackoffError::MaxLessThanInitial {
                initial: initial_interval,
                max: max_interval,
            });
        }
        if max_interval > MAX_BACKOFF {
            return Err(BackoffError::MaxTooLarge(max_interval));
        }
        Ok(Self { initial_interval, multiplier, max_interval })
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let max_nanos = self.max_interval.as_nanos() as f64;
        let interval =
            self.initial_interval.as_nanos() as f64 * self.multiplier.powf(f64::from(attempt));
        // NaN and infinity both land on the cap.
        if !interval.is_finite() || interval >= max_nanos {
            return self.max_interval;
        }
        Duration::from_nanos(interval.round() as u64).min(self.max_interval)
    }
}

/// Waits the same interval before every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval: interval.min(MAX_BACKOFF) }
    }

    /// No wait at all between retries.
    pub fn none() -> Self {
        Self { interval: Duration::ZERO }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn next_backoff(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(initial: Duration, multiplier: f64, max: Duration) -> ExponentialBackoff {
        ExponentialBackoff::new(initial, multiplier, max).expect("valid backoff")
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let backoff = exp(Duration::from_secs(1), 2.0, Duration::from_secs(10));
        let got: Vec<_> = (0..7).map(|a| backoff.next_backoff(a)).collect();
        assert_eq!(
            got,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn exponential_without_reaching_cap() {
        let backoff = exp(Duration::from_secs(1), 2.0, Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(4), Duration::from_secs(16));
    }

    #[test]
    fn fractional_multiplier() {
        let backoff = exp(Duration::from_millis(100), 1.5, Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(0), Duration::from_millis(100));
        assert_eq!(backoff.next_backoff(1), Duration::from_millis(150));
        assert_eq!(backoff.next_backoff(2), Duration::from_millis(225));
    }

    #[test]
    fn never_exceeds_max_and_is_monotonic() {
        let max = Duration::from_millis(2_500);
        let backoff = exp(Duration::from_millis(7), 1.7, max);
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = backoff.next_backoff(attempt);
            assert!(delay <= max, "attempt {attempt} exceeded max: {delay:?}");
            assert!(delay >= previous, "attempt {attempt} decreased");
            previous = delay;
        }
    }

    #[test]
    fn huge_attempt_saturates_to_max() {
        let backoff = exp(Duration::from_secs(1), 2.0, Duration::from_secs(30));
        assert_eq!(backoff.next_backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn multiplier_of_one_is_constant() {
        let backoff = exp(Duration::from_millis(250), 1.0, Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(0), Duration::from_millis(250));
        assert_eq!(backoff.next_backoff(50), Duration::from_millis(250));
    }

    #[test]
    fn zero_initial_interval_stays_zero() {
        let backoff = exp(Duration::ZERO, 2.0, Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(10), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            ExponentialBackoff::new(Duration::from_secs(1), 0.5, Duration::from_secs(2)),
            Err(BackoffError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            ExponentialBackoff::new(Duration::from_secs(1), f64::NAN, Duration::from_secs(2)),
            Err(BackoffError::InvalidMultiplier(_))
        ));
        assert_eq!(
            ExponentialBackoff::new(Duration::ZERO, 2.0, Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        );
        assert!(matches!(
            ExponentialBackoff::new(Duration::from_secs(5), 2.0, Duration::from_secs(1)),
            Err(BackoffError::MaxLessThanInitial { .. })
        ));
        assert!(matches!(
            ExponentialBackoff::new(Duration::from_secs(1), 2.0, MAX_BACKOFF * 2),
            Err(BackoffError::MaxTooLarge(_))
        ));
    }

    #[test]
    fn constant_backoff_ignores_attempt() {
        let backoff = ConstantBackoff::new(Duration::from_millis(40));
        assert_eq!(backoff.next_backoff(0), Duration::from_millis(40));
        assert_eq!(backoff.next_backoff(9), Duration::from_millis(40));
        assert_eq!(ConstantBackoff::none().next_backoff(3), Duration::ZERO);
    }
}
