//! Socket configuration: connection settings, the reconnect backoff
//! policy and heartbeat parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// SocketSettings
// ---------------------------------------------------------------------------

/// Where to connect and what to present. Immutable for the lifetime of a
/// socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketSettings {
    /// `ws://` or `wss://` endpoint.
    pub url: String,

    /// Sent as a bearer token during the upgrade. Empty means none.
    #[serde(default)]
    pub api_token: String,
}

impl SocketSettings {
    /// Creates settings for `url` with `api_token`.
    pub fn new(url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_token: api_token.into(),
        }
    }

    /// The token to present, or `None` when it's empty.
    pub fn token(&self) -> Option<&str> {
        Some(self.api_token.as_str()).filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Tiered fixed backoff.
///
/// ```text
/// retry 1                    → next scheduler tick
/// retry 2..=short_retry_limit → short_delay
/// later retries              → long_delay
/// ```
///
/// With the defaults that is: immediate, 1s, 1s, then 15s forever.
///
/// A close initiated by the server only starts this cycle when
/// `reconnect_on_server_close` is set. Otherwise it leaves the socket
/// `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay for the retries after the first.
    pub short_delay: Duration,

    /// The last retry number that still uses `short_delay`.
    pub short_retry_limit: u32,

    /// Delay once the short retries are used up.
    pub long_delay: Duration,

    /// Reconnect when the server closes the connection with any code other
    /// than `1000`, including its own `4199`.
    #[serde(default)]
    pub reconnect_on_server_close: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_secs(1),
            short_retry_limit: 3,
            long_delay: Duration::from_secs(15),
            reconnect_on_server_close: false,
        }
    }
}

impl ReconnectPolicy {
    /// The delay before retry number `retry` (1-based). `None` means
    /// "on the next scheduler tick".
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        match retry {
            0 | 1 => None,
            n if n <= self.short_retry_limit => Some(self.short_delay),
            _ => Some(self.long_delay),
        }
    }

    /// Fixes out-of-range values. Rules:
    /// - `long_delay` is never shorter than `short_delay`.
    pub fn validated(mut self) -> Self {
        if self.long_delay < self.short_delay {
            warn!(
                short_ms = self.short_delay.as_millis() as u64,
                long_ms = self.long_delay.as_millis() as u64,
                "long_delay shorter than short_delay, raising it"
            );
            self.long_delay = self.short_delay;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// HeartbeatConfig
// ---------------------------------------------------------------------------

/// Keep-alive parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Time between pings while connected.
    pub interval: Duration,

    /// Consecutive unanswered pings that mark the peer unresponsive.
    pub max_missed: u32,

    /// Random delay (0..max) added to the first ping so many clients
    /// started together don't ping in lockstep.
    pub initial_jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_missed: 3,
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl HeartbeatConfig {
    /// Shortest accepted ping interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Clamp and fix any out-of-range values. Rules:
    /// - `interval` raised to [`Self::MIN_INTERVAL`].
    /// - `max_missed` at least 1.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "heartbeat interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.max_missed == 0 {
            warn!("heartbeat max_missed is 0, using 1");
            self.max_missed = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SocketConfig
// ---------------------------------------------------------------------------

/// Everything a [`Socket`](crate::Socket) is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Connection target.
    pub settings: SocketSettings,

    /// Backoff between reconnect attempts.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Keep-alive parameters.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

impl SocketConfig {
    /// Creates a config with default policies for `settings`.
    pub fn new(settings: SocketSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Validates the nested policies. The URL is checked by `connect()`.
    pub fn validated(self) -> Self {
        Self {
            settings: self.settings,
            reconnect: self.reconnect.validated(),
            heartbeat: self.heartbeat.validated(),
        }
    }
}
