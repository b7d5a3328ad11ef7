//! Retry policy for transient failures.
//!
//! Whether an error can be retried is decided by its kind alone
//! ([`Error::is_retryable`]); the policy adds the attempt budget and the delay
//! between attempts.

use crate::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// How the wait grows between attempts.
///
/// Both shapes produce strictly increasing delays for a non-zero base, up to
/// the point where a delay no longer fits in a `Duration`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// `base * (attempt + 1)`: 1x, 2x, 3x...
    #[default]
    Linear,

    /// `base * 2^attempt`: 1x, 2x, 4x...
    ///
    /// With `jitter`, up to half of the computed delay is added at random. The
    /// next attempt's minimum is twice this attempt's minimum, so jitter never
    /// makes a later delay shorter than an earlier one.
    Exponential {
        /// Whether to add random jitter (recommended for many clients).
        jitter: bool,
    },
}

/// The outcome of consulting a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make another attempt.
    Retry { delay: Duration },
    /// Give up and surface the error.
    Stop,
}

/// Decides whether and when a failed attempt is repeated.
///
/// # Examples
///
/// ```
/// use fetchkit::{Error, RetryDecision, RetryPolicy};
/// use http::StatusCode;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::linear(3, Duration::from_millis(100));
/// let server_error = Error::ServerError { status: StatusCode::BAD_GATEWAY };
///
/// assert_eq!(
///     policy.should_retry(0, &server_error),
///     RetryDecision::Retry { delay: Duration::from_millis(100) }
/// );
/// assert_eq!(
///     policy.should_retry(1, &server_error),
///     RetryDecision::Retry { delay: Duration::from_millis(200) }
/// );
/// // third attempt was the last one
/// assert_eq!(policy.should_retry(2, &server_error), RetryDecision::Stop);
/// // never retried, whatever the budget
/// assert_eq!(policy.should_retry(0, &Error::NotFound), RetryDecision::Stop);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    ///
    /// See [`RetryPolicy::validate`] for the upper bound.
    pub max_attempts: usize,
    /// Delay unit the backoff is computed from.
    pub base_backoff: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_backoff: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            base_backoff,
            backoff,
        }
    }

    pub fn linear(max_attempts: usize, base_backoff: Duration) -> Self {
        Self::new(max_attempts, base_backoff, Backoff::Linear)
    }

    pub fn exponential(max_attempts: usize, base_backoff: Duration, jitter: bool) -> Self {
        Self::new(max_attempts, base_backoff, Backoff::Exponential { jitter })
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    /// Decides what to do after attempt `attempt` (0-based) failed with `error`.
    ///
    /// Stops once the budget is spent, for non-retryable errors, and when the
    /// next delay would not fit in a `Duration`.
    pub fn should_retry(&self, attempt: usize, error: &Error) -> RetryDecision {
        if attempt.saturating_add(1) >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::Stop;
        }
        match self.delay_for_attempt(attempt) {
            Some(delay) => RetryDecision::Retry { delay },
            None => RetryDecision::Stop,
        }
    }

    /// The wait after failed attempt `attempt` (0-based).
    ///
    /// Returns `None` when the delay cannot be represented. Exponential backoff
    /// runs out after attempt 31 (`2^31 * base`), so such a policy allows at
    /// most 33 attempts.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self.backoff {
            Backoff::Linear => {
                let factor = u32::try_from(attempt.checked_add(1)?).ok()?;
                self.base_backoff.checked_mul(factor)
            }
            Backoff::Exponential { jitter } => {
                let exponent = u32::try_from(attempt).ok()?;
                let multiplier = 2u32.checked_pow(exponent)?;
                let delay = self.base_backoff.checked_mul(multiplier)?;
                // leave room for the largest jitter
                delay.checked_add(delay / 2)?;
                if jitter {
                    let extra = rand::thread_rng().gen_range(0.0..0.5);
                    Some(delay + delay.mul_f64(extra))
                } else {
                    Some(delay)
                }
            }
        }
    }

    /// Checks that the policy can schedule every retry its budget allows, each
    /// one waiting strictly longer than the last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `max_attempts` is zero, if retries
    /// are enabled with a zero `base_backoff`, or if the last retry's delay
    /// would not fit in a `Duration`.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_request("max_attempts must be at least 1"));
        }
        if self.max_attempts == 1 {
            return Ok(());
        }
        if self.base_backoff.is_zero() {
            return Err(Error::invalid_request(
                "base_backoff must be non-zero when retries are enabled",
            ));
        }
        if self.delay_for_attempt(self.max_attempts - 2).is_none() {
            return Err(Error::invalid_request(format!(
                "max_attempts {} is too large for {:?} backoff from {:?}",
                self.max_attempts, self.backoff, self.base_backoff
            )));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_millis(250))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FieldError, TransportError};
    use http::StatusCode;

    fn non_retryable() -> Vec<Error> {
        vec![
            Error::Unauthorized,
            Error::Forbidden,
            Error::NotFound,
            Error::InvalidRequest {
                reason: "teapot".into(),
                status: Some(StatusCode::IM_A_TEAPOT),
            },
            Error::ValidationFailed {
                errors: vec![FieldError {
                    field: "name".into(),
                    message: "blank".into(),
                }],
            },
            Error::DecodeFailure {
                message: "missing field `id`".into(),
                raw_response: "{}".into(),
                status: StatusCode::OK,
            },
            Error::Cancelled,
        ]
    }

    #[test]
    fn linear_delays() {
        let policy = RetryPolicy::linear(5, Duration::from_millis(100));
        let delays: Vec<_> = (0..4).map(|a| policy.delay_for_attempt(a).unwrap()).collect();
        assert_eq!(
            delays,
            [100, 200, 300, 400].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn exponential_delays() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), false);
        let delays: Vec<_> = (0..4).map(|a| policy.delay_for_attempt(a).unwrap()).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 800].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn jittered_delays_still_increase() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(10), true);
        for _ in 0..50 {
            let delays: Vec<_> = (0..8).map(|a| policy.delay_for_attempt(a).unwrap()).collect();
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
        }
    }

    #[test]
    fn exponential_delays_never_repeat() {
        let error = Error::ServerError {
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        for jitter in [false, true] {
            let policy = RetryPolicy::exponential(100, Duration::from_nanos(1), jitter);
            let delays: Vec<_> = (0..100)
                .map_while(|a| match policy.should_retry(a, &error) {
                    RetryDecision::Retry { delay } => Some(delay),
                    RetryDecision::Stop => None,
                })
                .collect();

            assert_eq!(delays.len(), 32);
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
            assert_eq!(policy.delay_for_attempt(32), None);
        }
    }

    #[test]
    fn validate_bounds_the_budget() {
        let base = Duration::from_millis(10);
        assert!(RetryPolicy::linear(3, base).validate().is_ok());
        assert!(RetryPolicy::exponential(33, base, true).validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());

        let rejected = [
            RetryPolicy::linear(0, base),
            RetryPolicy::linear(2, Duration::ZERO),
            RetryPolicy::exponential(34, base, false),
            RetryPolicy::linear(3, Duration::MAX),
        ];
        for policy in rejected {
            assert!(
                matches!(policy.validate(), Err(Error::InvalidRequest { .. })),
                "{policy:?}"
            );
        }
    }

    #[test]
    fn stops_when_budget_is_spent() {
        let retryable = [
            Error::ServerError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::TransportFailure(TransportError::Timeout),
        ];
        for max_attempts in 0..5 {
            let policy = RetryPolicy::linear(max_attempts, Duration::from_millis(1));
            for attempt in 0..6 {
                for err in &retryable {
                    let decision = policy.should_retry(attempt, err);
                    if attempt + 1 >= max_attempts {
                        assert_eq!(decision, RetryDecision::Stop);
                    } else {
                        assert!(matches!(decision, RetryDecision::Retry { .. }));
                    }
                }
            }
        }
    }

    #[test]
    fn never_retries_client_side_errors() {
        let policy = RetryPolicy::linear(100, Duration::from_millis(1));
        for err in non_retryable() {
            for attempt in 0..10 {
                assert_eq!(policy.should_retry(attempt, &err), RetryDecision::Stop, "{err:?}");
            }
        }
    }

    #[test]
    fn none_makes_a_single_attempt() {
        let err = Error::ServerError {
            status: StatusCode::BAD_GATEWAY,
        };
        assert_eq!(RetryPolicy::none().should_retry(0, &err), RetryDecision::Stop);
    }
}
