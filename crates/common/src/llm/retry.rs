//! Bounded retry with exponential backoff for model calls
//!
//! Transient errors ([`AppError::is_transient`]) are retried until either the
//! attempt ceiling or the elapsed-time ceiling is reached, at which point the
//! caller sees [`AppError::ModelUnavailable`]. Everything else fails on the
//! first attempt.

use crate::config::RetryConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::future::retry_notify;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{error, warn};

/// Retry ceilings and backoff curve
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            multiplier: config.multiplier,
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}

impl RetryPolicy {
    /// Policy with near-zero waits, for tests and local fakes
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 1.0,
            max_elapsed: Duration::from_secs(30),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the policy
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;
        let max_attempts = self.max_attempts;

        let result = retry_notify(
            self.backoff(),
            || {
                let call = op();
                async move {
                    let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
                    match call.await {
                        Ok(value) => Ok(value),
                        Err(e) if e.is_transient() && attempt < max_attempts => {
                            Err(match e.retry_after() {
                                Some(wait) => backoff::Error::retry_after(e, wait),
                                None => backoff::Error::transient(e),
                            })
                        }
                        Err(e) if e.is_transient() => {
                            Err(backoff::Error::permanent(AppError::ModelUnavailable {
                                operation: operation.to_string(),
                                attempts: attempt,
                                message: e.to_string(),
                            }))
                        }
                        Err(e) => Err(backoff::Error::permanent(e)),
                    }
                }
            },
            |err: AppError, wait: Duration| {
                metrics::record_model_retry(operation);
                warn!(
                    operation,
                    attempt = attempts_ref.load(Ordering::SeqCst),
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    error = %err,
                    "Model request failed, retrying"
                );
            },
        )
        .await;

        match result {
            // Elapsed-time ceiling hit while the last error was still transient
            Err(e) if e.is_transient() => {
                let attempts = attempts.load(Ordering::SeqCst);
                error!(operation, attempts, error = %e, "Retry budget exhausted");
                Err(AppError::ModelUnavailable {
                    operation: operation.to_string(),
                    attempts,
                    message: e.to_string(),
                })
            }
            Err(e @ AppError::ModelUnavailable { .. }) => {
                error!(operation, error = %e, "Retry budget exhausted");
                Err(e)
            }
            other => other,
        }
    }
}
