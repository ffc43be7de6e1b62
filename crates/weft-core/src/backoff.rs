//! Backoff policy: decides wait intervals for retry/poll loops.
//!
//! Used by lease acquisition (wait for the current holder) and by the remote
//! job client (status polling).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Geometric backoff with a cap.
///
/// interval(0) = initial, interval(n+1) = min(interval(n) * multiplier, max)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    #[serde(with = "crate::config::millis")]
    pub initial: Duration,

    /// Growth factor applied to each subsequent delay. Values below 1.0 are
    /// treated as 1.0 so the sequence never shrinks.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    #[serde(with = "crate::config::millis")]
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max,
        }
    }

    /// Status polling: 1s, growing by 10% per poll, capped at 60s.
    pub fn polling() -> Self {
        Self::new(Duration::from_secs(1), 1.1, Duration::from_secs(60))
    }

    /// Waiting for another holder's lease.
    pub fn lease_acquisition() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(15))
    }

    /// Reject policies that would spin: every delay must be positive.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.initial.is_zero() {
            return Err(ConfigError::Invalid(format!("{name}.initial must be positive")));
        }
        if self.max.is_zero() {
            return Err(ConfigError::Invalid(format!("{name}.max must be positive")));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!("{name}.multiplier must be >= 1.0")));
        }
        Ok(())
    }

    /// First delay, already capped.
    pub fn first_delay(&self) -> Duration {
        self.initial.min(self.max)
    }

    /// Delay following `previous`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let factor = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let next = previous.as_secs_f64() * factor;
        if next >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(next).max(previous.min(self.max))
        }
    }

    /// Infinite iterator of delays.
    pub fn intervals(&self) -> Intervals<'_> {
        Intervals {
            policy: self,
            next: Some(self.first_delay()),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::polling()
    }
}

pub struct Intervals<'a> {
    policy: &'a BackoffPolicy,
    next: Option<Duration>,
}

impl Iterator for Intervals<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next?;
        self.next = Some(self.policy.next_delay(current));
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn polling_defaults() {
        let policy = BackoffPolicy::polling();
        assert_eq!(policy.initial, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 1.1);
        assert_eq!(policy.max, Duration::from_secs(60));
    }

    #[test]
    fn polling_sequence_reaches_but_never_exceeds_cap() {
        let policy = BackoffPolicy::polling();
        let intervals: Vec<Duration> = policy.intervals().take(200).collect();

        assert_eq!(intervals[0], Duration::from_millis(1000));
        assert!((intervals[1].as_secs_f64() - 1.1).abs() < 1e-9);
        assert!(intervals.windows(2).all(|w| w[0] <= w[1]));
        assert!(intervals.iter().all(|d| *d <= Duration::from_secs(60)));
        assert_eq!(*intervals.last().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn initial_above_cap_is_clamped() {
        let policy = BackoffPolicy::new(Duration::from_secs(90), 2.0, Duration::from_secs(60));
        assert_eq!(policy.first_delay(), Duration::from_secs(60));
    }

    #[test]
    fn zero_delays_are_rejected() {
        let zero_max = BackoffPolicy::new(Duration::from_secs(1), 2.0, Duration::ZERO);
        assert!(matches!(zero_max.validate("poll"), Err(ConfigError::Invalid(msg)) if msg == "poll.max must be positive"));

        let zero_initial = BackoffPolicy::new(Duration::ZERO, 2.0, Duration::from_secs(1));
        assert!(zero_initial.validate("poll").is_err());

        let shrinking = BackoffPolicy::new(Duration::from_secs(1), 0.5, Duration::from_secs(1));
        assert!(shrinking.validate("poll").is_err());

        assert!(BackoffPolicy::polling().validate("poll").is_ok());
        assert!(BackoffPolicy::lease_acquisition().validate("acquire_backoff").is_ok());
    }

    proptest! {
        #[test]
        fn intervals_are_non_decreasing_and_capped(
            initial_ms in 1u64..5_000,
            multiplier in 0.5f64..3.0,
            max_ms in 1u64..120_000,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(initial_ms),
                multiplier,
                Duration::from_millis(max_ms),
            );
            let intervals: Vec<Duration> = policy.intervals().take(100).collect();
            for pair in intervals.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for d in &intervals {
                prop_assert!(*d <= policy.max);
            }
        }
    }
}
