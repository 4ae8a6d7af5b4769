//! Reconnect policy
//!
//! Transport failure on a connection with reconnect enabled schedules a
//! retry. Delays grow by capped exponential backoff with jitter, and the
//! attempt count is bounded; both are configuration, not constants.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Ceiling on the delay between attempts.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g. 2.0 for doubling).
    pub backoff_multiplier: f64,
    /// Randomize each delay by up to ±20% to avoid thundering herds.
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given 1-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        let millis = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.8..=1.2);
            capped * factor
        } else {
            capped
        };
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Per-connection reconnect bookkeeping.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReconnectState {
    /// Consecutive failed attempts since the last healthy socket.
    pub attempts: u32,
    /// Index into the failover host list for the next attempt.
    pub host_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let c = config();
        assert_eq!(c.delay_for(1), Duration::from_millis(100));
        assert_eq!(c.delay_for(2), Duration::from_millis(200));
        assert_eq!(c.delay_for(3), Duration::from_millis(400));
        assert_eq!(c.delay_for(4), Duration::from_millis(450));
        assert_eq!(c.delay_for(10), Duration::from_millis(450));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut c = config();
        c.jitter = true;
        for attempt in 1..=6 {
            let d = c.delay_for(attempt).as_millis() as f64;
            let nominal = (100.0 * 2.0f64.powi(attempt as i32 - 1)).min(450.0);
            assert!(d >= nominal * 0.8 - 1.0, "attempt {attempt}: {d} too small");
            assert!(d <= 450.0 + 1.0, "attempt {attempt}: {d} above cap");
        }
    }
}
