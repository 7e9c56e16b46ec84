use std::time::Duration;

use crate::error::AppError;

/// Retry configuration with exponential backoff.
///
/// Delay schedule for a 3 s cap starting at 750 ms: 750 ms, 1.5 s, 3 s, 3 s, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(750),
            max_backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Settings for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Upper bound on concurrently in-flight listing extractions.
    pub concurrency: usize,
    /// Per-attempt timeout for index page fetches.
    pub page_timeout: Duration,
    /// Per-attempt timeout for listing detail fetches.
    pub listing_timeout: Duration,
    /// Attempts per page or listing, the first one included.
    pub max_retries: u32,
    /// Longest wait between two attempts.
    pub retry_wait: Duration,
    /// Capacity of the queue between pagination and the worker pool.
    pub queue_capacity: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_timeout: Duration::from_secs(15),
            listing_timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_wait: Duration::from_secs(3),
            queue_capacity: 64,
        }
    }
}

impl HarvestConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_listing_timeout(mut self, timeout: Duration) -> Self {
        self.listing_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 {
            return Err(AppError::ConfigError(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(AppError::ConfigError(
                "max retries must be at least 1".into(),
            ));
        }
        if self.page_timeout.is_zero() || self.listing_timeout.is_zero() {
            return Err(AppError::ConfigError("timeouts must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AppError::ConfigError(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Backoff shared by page and listing retries, capped at `retry_wait`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_backoff: self.retry_wait / 4,
            max_backoff: self.retry_wait,
        }
    }
}
