use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32, max_delay: Duration },
}

/// A bounded retry policy.
///
/// The policy only answers "should I retry after `n` failures, and how long
/// should I wait"; the caller owns the failure counter and the timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    // Three network failures in a row give up; retries wait one second.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential { factor, max_delay },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wait before the next attempt, or `None` once `failures`
    /// has reached the limit.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.max_attempts {
            return None;
        }
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { factor, max_delay } => {
                let multiplier = factor.saturating_pow(failures - 1);
                self.base_delay.saturating_mul(multiplier).min(max_delay)
            }
        };
        Some(delay)
    }
}
