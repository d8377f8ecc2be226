//! Reconnect policy for unclean channel closes.
//!
//! Backoff is linear: the n-th consecutive retry waits `base_delay × n`.
//! With the defaults (5 attempts, 1 s base) the waits are 1 s, 2 s, 3 s, 4 s
//! and 5 s; the sixth unclean close in a row is terminal. A successful open
//! resets the count.

use std::time::Duration;

/// Default number of consecutive retries after unclean closes.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay unit for the linear backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How the session client retries after unclean closes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use blanco_session_client::reconnect::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for(0), Some(Duration::from_secs(1)));
/// assert_eq!(policy.delay_for(4), Some(Duration::from_secs(5)));
/// assert_eq!(policy.delay_for(5), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries allowed before giving up. Zero disables reconnecting.
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the backoff delay unit.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before the next retry, given how many retries already happened
    /// since the last successful open. `None` once the budget is spent.
    pub fn delay_for(&self, attempts_so_far: u32) -> Option<Duration> {
        if attempts_so_far >= self.max_attempts {
            return None;
        }
        Some(self.base_delay.saturating_mul(attempts_so_far.saturating_add(1)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_linear() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (0..6)
            .filter_map(|n| policy.delay_for(n))
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn exhausted_budget_yields_none() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(5).is_none());
        assert!(policy.delay_for(u32::MAX).is_none());
    }

    #[test]
    fn disabled_never_retries() {
        assert!(ReconnectPolicy::disabled().delay_for(0).is_none());
    }

    #[test]
    fn builders_override_defaults() {
        let policy = ReconnectPolicy::default()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(2), None);
    }
}
