//! Bounded retry with backoff for calls to upstream services.
//!
//! The caller decides which errors are worth retrying; everything else is
//! returned on the first failure.

use metrics::counter;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// How the delay grows between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `initial_backoff * n` before the n-th retry.
    Linear,
    /// `initial_backoff * multiplier^(n-1)` before the n-th retry.
    Exponential { multiplier: u32 },
}

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay unit for the backoff strategy.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay (before jitter).
    pub max_backoff: Duration,
    pub strategy: BackoffStrategy,
    /// Adds up to 25% random jitter to every delay.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential { multiplier: 2 },
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Linear backoff, the policy used for provider rate limits.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: step,
            max_backoff: step.saturating_mul(max_attempts.max(1)),
            strategy: BackoffStrategy::Linear,
            add_jitter: true,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = match self.strategy {
            BackoffStrategy::Linear => self.initial_backoff.saturating_mul(attempt),
            BackoffStrategy::Exponential { multiplier } => self
                .initial_backoff
                .saturating_mul(multiplier.saturating_pow(attempt - 1)),
        };
        let base = base.min(self.max_backoff);

        if self.add_jitter && !base.is_zero() {
            let max_jitter_ms = (base.as_millis() as u64) / 4;
            let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
            base + Duration::from_millis(jitter)
        } else {
            base
        }
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. The last error is returned on exhaustion.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "Upstream call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Upstream call failed with non-retryable error"
                    );
                    return Err(err);
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Upstream call failed after max attempts"
                    );
                    return Err(err);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "Upstream call failed, retrying after backoff"
                );
                counter!("llm_retry_attempts_total", "operation" => operation_name.to_string())
                    .increment(1);

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
