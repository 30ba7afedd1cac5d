//! Retry policies for failed work units.

use crate::error::RunError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What to do after a work unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Run the unit again without waiting.
    RetryImmediately,
    /// Wait, then run the unit again.
    RetryAfter(Duration),
    /// Stop retrying. The unit is dropped from the queue.
    GiveUp,
}

impl RetryPolicy {
    /// Returns true if this policy ends the unit's life.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryPolicy::GiveUp)
    }
}

/// Decides how to react to a failed run.
///
/// Evaluation must be a pure function of the error and the zero-based
/// attempt index: the first failure is evaluated with `attempt == 0`.
pub trait RetryPolicyEvaluator: Send + Sync {
    /// Returns the policy for this failure.
    fn evaluate(&self, error: &RunError, attempt: u32) -> RetryPolicy;
}

impl<F> RetryPolicyEvaluator for F
where
    F: Fn(&RunError, u32) -> RetryPolicy + Send + Sync,
{
    fn evaluate(&self, error: &RunError, attempt: u32) -> RetryPolicy {
        self(error, attempt)
    }
}

/// Exponential backoff policy.
///
/// - Non-retryable errors give up at once
/// - The first failure is retried immediately
/// - Later failures wait `initial_delay * multiplier^(attempt - 1)`, capped
///   at `max_delay`, plus up to 25% jitter
/// - After `max_attempts` runs the unit is given up
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of runs, including the first one.
    pub max_attempts: u32,
    /// Delay before the second retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl BackoffPolicy {
    /// Creates a policy allowing `max_attempts` runs.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier. Values below 1, and non-finite values,
    /// are raised to 1 (constant delay).
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = clamp_multiplier(multiplier);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Returns the wait before re-running after failure number `attempt`
    /// (zero-based). The first failure never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let growth = clamp_multiplier(self.backoff_multiplier).powi(exponent.min(i32::MAX as u32) as i32);
        let uncapped = self.initial_delay.as_secs_f64() * growth;
        let delay = if uncapped.is_finite() {
            Duration::try_from_secs_f64(uncapped)
                .map_or(self.max_delay, |delay| delay.min(self.max_delay))
        } else {
            self.max_delay
        };

        if self.add_jitter {
            delay.saturating_add(delay.mul_f64(MAX_JITTER * jitter_fraction(attempt)))
        } else {
            delay
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicyEvaluator for BackoffPolicy {
    fn evaluate(&self, error: &RunError, attempt: u32) -> RetryPolicy {
        if !error.is_retryable() || attempt.saturating_add(1) >= self.max_attempts {
            return RetryPolicy::GiveUp;
        }
        match self.delay_for_attempt(attempt) {
            Duration::ZERO => RetryPolicy::RetryImmediately,
            delay => RetryPolicy::RetryAfter(delay),
        }
    }
}

/// Largest jitter, as a fraction of the delay.
const MAX_JITTER: f64 = 0.25;

fn clamp_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() {
        multiplier.max(1.0)
    } else {
        1.0
    }
}

/// Pseudo-random value in `[0, 1)` from the clock, spread by attempt so
/// units failing together do not retry in lockstep.
fn jitter_fraction(attempt: u32) -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let mixed = nanos ^ attempt.wrapping_mul(0x9E37_79B9);
    f64::from(mixed % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_retry_gives_up() {
        let policy = BackoffPolicy::no_retry();
        assert_eq!(
            policy.evaluate(&RunError::transient("down"), 0),
            RetryPolicy::GiveUp
        );
    }

    #[test]
    fn fatal_errors_give_up() {
        let policy = BackoffPolicy::new(10);
        assert_eq!(
            policy.evaluate(&RunError::fatal("rejected"), 0),
            RetryPolicy::GiveUp
        );
    }

    #[test]
    fn backoff_sequence() {
        let policy = BackoffPolicy::new(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);
        let err = RunError::transient("down");

        assert_eq!(policy.evaluate(&err, 0), RetryPolicy::RetryImmediately);
        assert_eq!(
            policy.evaluate(&err, 1),
            RetryPolicy::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.evaluate(&err, 2),
            RetryPolicy::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(policy.evaluate(&err, 3), RetryPolicy::GiveUp);
    }

    #[test]
    fn jittered_delay_stays_within_a_quarter() {
        let policy = BackoffPolicy::new(5).with_initial_delay(Duration::from_millis(100));

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);

        let first = policy.delay_for_attempt(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(125));

        assert!(policy.delay_for_attempt(2) >= Duration::from_millis(200));
    }

    #[test]
    fn degenerate_multipliers_keep_the_delay_constant() {
        for multiplier in [-3.0, 0.5, f64::NAN, f64::INFINITY] {
            let policy = BackoffPolicy::new(5)
                .with_initial_delay(Duration::from_millis(40))
                .with_backoff_multiplier(multiplier)
                .with_jitter(false);

            assert_eq!(policy.backoff_multiplier, 1.0);
            assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
        }
    }

    #[test]
    fn negative_multiplier_set_directly_does_not_panic() {
        let mut policy = BackoffPolicy::new(5).with_jitter(false);
        policy.backoff_multiplier = -2.0;
        assert_eq!(policy.delay_for_attempt(2), policy.initial_delay);
    }

    #[test]
    fn huge_delays_are_capped() {
        let policy = BackoffPolicy::new(100)
            .with_initial_delay(Duration::MAX)
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(5));
    }

    #[test]
    fn closures_are_evaluators() {
        let evaluator = |_: &RunError, attempt: u32| {
            if attempt < 2 {
                RetryPolicy::RetryImmediately
            } else {
                RetryPolicy::GiveUp
            }
        };
        let err = RunError::transient("x");
        assert_eq!(evaluator.evaluate(&err, 1), RetryPolicy::RetryImmediately);
        assert!(evaluator.evaluate(&err, 2).is_terminal());
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_jittered_cap(attempt in 1u32..64, max_secs in 1u64..30) {
            let policy = BackoffPolicy::new(100)
                .with_initial_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(max_secs))
                .with_backoff_multiplier(10.0);

            let delay = policy.delay_for_attempt(attempt);
            prop_assert!(delay <= Duration::from_secs_f64(max_secs as f64 * 1.25));
        }

        #[test]
        fn never_more_runs_than_allowed(max_attempts in 1u32..20, attempt in 0u32..40) {
            let policy = BackoffPolicy::new(max_attempts);
            let decision = policy.evaluate(&RunError::transient("x"), attempt);
            if attempt + 1 >= max_attempts {
                prop_assert_eq!(decision, RetryPolicy::GiveUp);
            } else {
                prop_assert!(!decision.is_terminal());
            }
        }
    }
}
