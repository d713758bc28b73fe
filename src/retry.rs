use std::thread;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fixed-delay retry policy shared by every network call of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Calls `op` until `should_retry` rejects its result or attempts run
    /// out, and returns the last result either way.
    pub fn run<T, E, F, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&Result<T, E>) -> bool,
    {
        let mut attempt = 1u32;
        loop {
            let result = op(attempt);
            if attempt >= self.max_attempts || !should_retry(&result) {
                return result;
            }
            debug!(attempt, max_attempts = self.max_attempts, "retrying request");
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            attempt += 1;
        }
    }
}
