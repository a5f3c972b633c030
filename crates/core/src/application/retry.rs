// Bounded retry policy for the broker handshake
use crate::error::{AppError, Result};
use std::time::Duration;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// Attempts exhausted
    GiveUp,
}

/// Fixed-delay, bounded-attempts policy.
///
/// `max_attempts` counts every attempt including the first, so a policy of
/// 3 attempts sleeps twice before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::Config("max_retries must be at least 1".to_string()));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decide what to do after `attempt` (1-based) failed
    pub fn after_failure(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay)
        }
    }
}
