//! Exponential backoff with jitter for retrying idempotent reads.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Multiplier applied after each retry
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: 3,
        }
    }
}

impl BackoffConfig {
    /// Create a new backoff config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set jitter factor (clamped to 0.0..=1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }
}

/// Iterator over retry delays
#[derive(Debug)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
    current_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a new backoff instance
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            attempt: 0,
        }
    }

    /// Attempts consumed so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Check if more attempts are allowed
    pub fn can_retry(&self) -> bool {
        self.attempt < self.config.max_attempts
    }

    fn delay_with_jitter(&self, base: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return base;
        }
        let range = base.as_secs_f64() * self.config.jitter;
        if range <= 0.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(-range..range);
        Duration::from_secs_f64((base.as_secs_f64() + jitter).max(0.0))
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.delay_with_jitter(self.current_delay).min(self.config.max_delay);

        self.attempt += 1;
        self.current_delay = Duration::from_secs_f64(
            (self.current_delay.as_secs_f64() * self.config.multiplier)
                .min(self.config.max_delay.as_secs_f64()),
        );

        Some(delay)
    }
}

/// Error returned when every attempt failed or a permanent error stopped retrying
#[derive(Debug)]
pub struct BackoffError<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Last error encountered
    pub last_error: E,
}

impl<E> BackoffError<E> {
    /// Unwraps the last error
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for BackoffError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempt(s): {}", self.attempts, self.last_error)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BackoffError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Runs `f` until it succeeds, `retryable` rejects the error, or attempts run out.
pub async fn with_backoff<F, Fut, T, E>(
    config: BackoffConfig,
    retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, BackoffError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = ExponentialBackoff::new(config);

    loop {
        let delay = backoff.next();
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempts = backoff.attempt();
                if !retryable(&e) || !backoff.can_retry() {
                    return Err(BackoffError {
                        attempts,
                        last_error: e,
                    });
                }
                tracing::debug!(attempt = attempts, error = %e, "retrying after failure");
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
