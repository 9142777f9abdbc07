use std::time::Duration;

use crate::config::ConnectionConfig;

/// Reconnect schedule for the connection manager
///
/// Delays grow exponentially from `base_delay` and never exceed `max_delay`.
/// `max_attempts = None` retries until the manager is shut down.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Backoff multiplier (exponential backoff)
    pub multiplier: f64,
    /// Jitter factor to add randomness to retry delays
    pub jitter_factor: f64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            multiplier: config.reconnect_multiplier,
            jitter_factor: config.reconnect_jitter,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Deterministic doubling schedule, no jitter
    pub fn exponential(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Calculate the wait before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_delay = self.max_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = (self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent)).min(max_delay);

        let jitter = delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (delay + jitter).clamp(0.0, max_delay) as u64;

        Duration::from_millis(final_delay)
    }

    /// Whether retry number `attempt` (zero-based) is still permitted
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule_is_capped() {
        let policy = ReconnectPolicy::exponential(500, 3_000);
        let delays: Vec<u64> = (0..6).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 3_000, 3_000, 3_000]);
    }

    #[test]
    fn test_huge_attempt_counts_stay_bounded() {
        let policy = ReconnectPolicy::exponential(500, 30_000);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_band_and_cap() {
        let policy = ReconnectPolicy {
            jitter_factor: 0.5,
            ..ReconnectPolicy::exponential(1_000, 1_500)
        };
        for _ in 0..200 {
            let first = policy.delay_for(0).as_millis() as u64;
            assert!((750..=1_250).contains(&first), "delay {} out of band", first);
            assert!(policy.delay_for(5).as_millis() as u64 <= 1_500);
        }
    }

    #[test]
    fn test_attempt_limit() {
        let unbounded = ReconnectPolicy::default();
        assert!(unbounded.allows(1_000_000));

        let bounded = ReconnectPolicy::default().with_max_attempts(2);
        assert!(bounded.allows(0));
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));
    }

    #[test]
    fn test_from_config() {
        let config = ConnectionConfig {
            reconnect_base_delay_ms: 250,
            reconnect_max_delay_ms: 4_000,
            max_reconnect_attempts: Some(7),
            ..ConnectionConfig::default()
        };
        let policy = ReconnectPolicy::from_config(&config);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(4));
        assert_eq!(policy.max_attempts, Some(7));
    }
}
