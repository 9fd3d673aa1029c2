//! Client configuration.
//!
//! Every value has a default so a bare `ClientConfig::default()` talks to a
//! local server with unbounded reconnection.

use std::time::Duration;

use serde_json::Value;

use crate::domain::SlotConfig;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 25;
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// How long a locally moved reservation ignores its own echo
pub const DEFAULT_SUPPRESSION_WINDOW_MS: i64 = 1_000;
/// Mutations kept while disconnected; older ones are dropped first
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 256;

/// Reconnection backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; doubled on each further attempt
    pub base_delay: Duration,
    /// Upper bound of the delay
    pub max_delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_DELAY_MS),
            max_attempts: None,
        }
    }
}

/// Connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Sent as `set_filter` on every open when present
    pub filter: Option<Value>,
    pub reconnect: ReconnectPolicy,
    pub ping_interval: Duration,
    pub max_pending_messages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            filter: None,
            reconnect: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}

/// Calendar-side settings
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub slots: SlotConfig,
    pub suppression_window_ms: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            slots: SlotConfig::default(),
            suppression_window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
        }
    }
}
