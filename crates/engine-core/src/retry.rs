use std::{fmt, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Successful result together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal { error: E, attempts: u32 },
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded { error: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::AttemptsExceeded { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::AttemptsExceeded { error, .. } => error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal { error, .. } => write!(f, "{error}"),
            RetryError::AttemptsExceeded { error, attempts } => {
                write!(f, "{error} (gave up after {attempts} attempts)")
            }
        }
    }
}

/// Bounded exponential backoff: attempt `n` waits `base * 2^n`, capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay < base_delay {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Policy without waits, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        let mut attempt: u32 = 0;

        loop {
            let attempts = attempt + 1;
            match op().await {
                Ok(value) => return Ok(Attempted { value, attempts }),
                Err(error) => match classify(&error) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal { error, attempts }),
                    RetryDisposition::Retry => {
                        if attempts >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded { error, attempts });
                        }

                        let delay = self.backoff_delay(attempt);
                        warn!(
                            attempt = attempts,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Transient failure, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u128 << attempt.min(16);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
