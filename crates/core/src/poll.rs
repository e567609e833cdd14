//! Bounded polling with an injectable sleeper
//!
//! The termination check after ending a session is the only place the client
//! waits on purpose. Sleeping goes through `Sleeper` so tests can count
//! waits without spending real time.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Interval between session-list checks after a terminate request
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Number of checks before giving up on a terminating session
pub const DEFAULT_POLL_ATTEMPTS: u32 = 3;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Sleep, then check, up to `max_attempts` times.
///
/// Returns `Ok(true)` as soon as `check` reports done, `Ok(false)` when the
/// attempts run out. Errors from `check` end the loop immediately.
pub async fn poll_until<F, Fut>(config: &PollConfig, sleeper: &dyn Sleeper, mut check: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for attempt in 1..=config.max_attempts {
        sleeper.sleep(config.interval).await;
        tracing::debug!(attempt, max_attempts = config.max_attempts, "polling");
        if check().await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Poll configuration builder
#[derive(Debug, Clone)]
pub struct PollBuilder {
    interval: Duration,
    max_attempts: u32,
}

impl PollBuilder {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn build(self) -> PollConfig {
        PollConfig {
            interval: self.interval,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for PollBuilder {
    fn default() -> Self {
        Self::new()
    }
}
