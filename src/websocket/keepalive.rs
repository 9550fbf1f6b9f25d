use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Per-session liveness settings.
///
/// The writer pings every `ping_interval`; the reader gives up when nothing
/// at all arrives within `pong_timeout`. The ping interval has to stay below
/// the deadline so a healthy client always has a chance to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
}

impl KeepaliveConfig {
    pub fn is_valid(&self) -> bool {
        !self.ping_interval.is_zero() && self.ping_interval < self.pong_timeout
    }

    /// Ping timer whose first tick fires one full interval from now
    pub(crate) fn ping_timer(&self) -> Interval {
        let mut timer = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(54),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KeepaliveConfig::default().is_valid());
    }

    #[test]
    fn test_ping_not_shorter_than_deadline() {
        let config = KeepaliveConfig {
            ping_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(!config.is_valid());
    }

    #[tokio::test]
    async fn test_ping_timer_skips_immediate_tick() {
        let config = KeepaliveConfig {
            ping_interval: Duration::from_millis(50),
            pong_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(50),
        };
        let mut timer = config.ping_timer();
        let start = Instant::now();
        timer.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
