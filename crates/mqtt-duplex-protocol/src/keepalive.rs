//! Keep alive scheduling. Pure bookkeeping over caller-supplied
//! instants, so the client loop (and tests) control the clock.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    pub ping_interval_percent: u8,
    pub timeout_percent: u8,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_percent: 75,
            timeout_percent: 150,
        }
    }
}

impl KeepaliveConfig {
    #[must_use]
    pub const fn new(ping_interval_percent: u8, timeout_percent: u8) -> Self {
        Self {
            ping_interval_percent,
            timeout_percent,
        }
    }

    /// Pings at half the interval, for lossy links.
    #[must_use]
    pub const fn conservative() -> Self {
        Self {
            ping_interval_percent: 50,
            timeout_percent: 150,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn ping_interval(&self, keepalive: Duration) -> Duration {
        let millis = keepalive.as_millis() as u64;
        Duration::from_millis(millis * u64::from(self.ping_interval_percent) / 100)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timeout_duration(&self, keepalive: Duration) -> Duration {
        let millis = keepalive.as_millis() as u64;
        Duration::from_millis(millis * u64::from(self.timeout_percent) / 100)
    }
}

/// Tracks traffic timestamps for one connection and answers the two
/// scheduling questions: send a PINGREQ now, and has the server gone
/// silent past the timeout.
///
/// A keep alive of zero disables the mechanism entirely, matching the
/// negotiated meaning of `keep_alive = 0`.
#[derive(Debug, Clone)]
pub struct KeepaliveTracker {
    keepalive: Duration,
    config: KeepaliveConfig,
    last_outbound: Instant,
    last_inbound: Instant,
    ping_sent_at: Option<Instant>,
}

impl KeepaliveTracker {
    #[must_use]
    pub fn new(keepalive: Duration, config: KeepaliveConfig, now: Instant) -> Self {
        Self {
            keepalive,
            config,
            last_outbound: now,
            last_inbound: now,
            ping_sent_at: None,
        }
    }

    #[must_use]
    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// Applies a server override from CONNACK's Server Keep Alive.
    pub fn set_keepalive(&mut self, keepalive: Duration) {
        self.keepalive = keepalive;
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.keepalive.is_zero()
    }

    /// Any packet written resets the ping schedule; the broker only
    /// requires that some control packet flows within the interval.
    pub fn record_outbound(&mut self, now: Instant) {
        self.last_outbound = now;
    }

    pub fn record_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
        self.ping_sent_at = None;
    }

    #[must_use]
    pub fn should_ping(&self, now: Instant) -> bool {
        if !self.enabled() || self.ping_sent_at.is_some() {
            return false;
        }
        now.duration_since(self.last_outbound) >= self.config.ping_interval(self.keepalive)
    }

    pub fn ping_sent(&mut self, now: Instant) {
        self.ping_sent_at = Some(now);
        self.last_outbound = now;
    }

    /// True once a ping has gone unanswered past the timeout, or the
    /// server has been silent for that long without a ping in flight.
    #[must_use]
    pub fn is_timed_out(&self, now: Instant) -> bool {
        if !self.enabled() {
            return false;
        }
        let timeout = self.config.timeout_duration(self.keepalive);
        let since = match self.ping_sent_at {
            Some(sent) => now.duration_since(sent),
            None => now.duration_since(self.last_inbound),
        };
        since > timeout
    }

    /// The next instant the caller's loop needs to wake at, or `None`
    /// when keep alive is disabled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.enabled() {
            return None;
        }
        match self.ping_sent_at {
            Some(sent) => Some(sent + self.config.timeout_duration(self.keepalive)),
            None => Some(self.last_outbound + self.config.ping_interval(self.keepalive)),
        }
    }
}
