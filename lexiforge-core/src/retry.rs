use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::LexiforgeError;

/// Backoff schedule shared by the generation client and anything else that
/// needs to call out to a flaky service.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Adds up to 25% random extra delay on top of the exponential schedule.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), LexiforgeError> {
        if self.max_attempts == 0 {
            return Err(LexiforgeError::Configuration(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(LexiforgeError::Configuration(format!(
                "max_delay ({:?}) is shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }

    /// Delay before the attempt following `attempt` (1-indexed), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, attempt)
    }

    fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=0.25);
        delay + delay.mul_f64(extra)
    }
}

/// `min(base * 2^(attempt-1), max)` for `attempt >= 1`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retryable(LexiforgeError),
    Fatal(LexiforgeError),
}

impl<T> AttemptOutcome<T> {
    pub fn from_result(result: Result<T, LexiforgeError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(error) if error.is_retryable() => AttemptOutcome::Retryable(error),
            Err(error) => AttemptOutcome::Fatal(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<LexiforgeError>,
    pub next_delay: Duration,
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Drives `operation` until it succeeds, fails fatally, or the policy runs out
/// of attempts. The closure receives the 1-indexed attempt number.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<Retried<T>, LexiforgeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    policy.validate()?;

    let mut state = RetryState::default();
    loop {
        state.attempt += 1;
        match operation(state.attempt).await {
            AttemptOutcome::Success(value) => {
                return Ok(Retried {
                    value,
                    attempts: state.attempt,
                })
            }
            AttemptOutcome::Fatal(error) => return Err(error),
            AttemptOutcome::Retryable(error) => {
                if state.attempt >= policy.max_attempts {
                    return Err(LexiforgeError::RetriesExhausted {
                        attempts: state.attempt,
                        source: Box::new(error),
                    });
                }
                state.next_delay = policy.sleep_for(state.attempt);
                state.last_error = Some(error);
                tokio::time::sleep(state.next_delay).await;
            }
        }
    }
}
