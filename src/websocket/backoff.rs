use std::time::Duration;

/// Configuration for reconnection behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
    /// Consecutive failures after which the session gives up
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

    /// The backoff curve described by this configuration
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Capped exponential backoff: `min(base * 2^attempt, cap)`.
///
/// Stateless; the caller owns the attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay to wait after `attempt` consecutive failures
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        ReconnectConfig::default().backoff()
    }
}
