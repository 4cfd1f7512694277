/// Bounded retries for idempotent side effects
///
/// Delays grow geometrically from `initial_backoff` and are capped at
/// `max_backoff`. With `jitter` on, each delay is spread by up to 30% so that
/// blobs removed in parallel don't retry in lockstep.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = try once)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            next: self.initial_backoff,
        }
    }
}

/// Delay schedule for one [`with_retry`] call
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.next.min(self.config.max_backoff);
        self.next = base.mul_f64(self.config.backoff_multiplier.max(1.0));

        if !self.config.jitter || base.is_zero() {
            return Some(base);
        }
        let spread = rand::thread_rng().gen_range(0.7..1.3);
        Some(base.mul_f64(spread))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryError<E> {
    attempts: u32,
    last: E,
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Error returned by the final attempt
    pub fn into_last(self) -> E {
        self.last
    }
}

/// Call `f` until it returns `Ok` or `config.max_attempts()` calls have failed.
///
/// Each failure that will be retried is logged at warn level under `label`.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts();
    let mut delays = config.backoff();
    let mut attempt = 1;

    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if attempt >= max_attempts {
            return Err(RetryError {
                attempts: attempt,
                last: err,
            });
        }

        let delay = delays.next().unwrap_or_default();
        warn!(
            operation = label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
