// Retry policy for calls to external services
// Transient failures are retried with capped exponential backoff


use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts - 1` times without sleeping.
    #[inline]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which [`RagError::is_transient`] holds are retried. When
    /// attempts are exhausted a rate-limit failure becomes
    /// [`RagError::RateLimited`] and a transport failure becomes
    /// [`RagError::Connectivity`]; anything else is returned unchanged.
    #[inline]
    pub fn run<T, F>(&self, service: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("{} request attempt {}/{}", service, attempt, max_attempts);

            let error = match operation() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    "{} request failed after {} attempt(s): {}",
                    service, attempt, error
                );
                return Err(exhausted(service, attempt, error));
            }

            let delay = self.delay_for(attempt);
            warn!(
                "{} request failed (attempt {}/{}), retrying in {:?}: {}",
                service, attempt, max_attempts, delay, error
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            attempt += 1;
        }
    }
}

fn exhausted(service: &str, attempts: u32, error: RagError) -> RagError {
    match error {
        RagError::RateLimited { .. } => RagError::RateLimited {
            service: service.to_string(),
            attempts,
        },
        RagError::Network { message, .. } => RagError::Connectivity {
            target: service.to_string(),
            message,
            hint: "Check network access and the service URL".to_string(),
        },
        other => other,
    }
}
