//! Backend and synchronization configuration

use std::time::Duration;

use crate::error::{StoreError, StoreResult};

pub const ENV_URL: &str = "STOREFRONT_URL";
pub const ENV_ANON_KEY: &str = "STOREFRONT_ANON_KEY";
pub const ENV_TIMEOUT: &str = "STOREFRONT_TIMEOUT_SECS";

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Project base URL (e.g. "https://xyz.supabase.co")
    pub base_url: String,

    /// Public (anon) API key, sent as `apikey` and bearer token
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: crate::utils::remove_trailing_slash(&base_url.into()),
            api_key: api_key.into(),
            timeout: 30,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Read configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> StoreResult<Self> {
        let _ = dotenvy::dotenv();

        let url = std::env::var(ENV_URL)
            .map_err(|_| StoreError::Config(format!("{} is not set", ENV_URL)))?;
        let key = std::env::var(ENV_ANON_KEY)
            .map_err(|_| StoreError::Config(format!("{} is not set", ENV_ANON_KEY)))?;

        let mut config = Self::new(url, key);
        if let Ok(raw) = std::env::var(ENV_TIMEOUT) {
            let secs = raw
                .parse()
                .map_err(|_| StoreError::Config(format!("{} must be a number, got '{}'", ENV_TIMEOUT, raw)))?;
            config = config.with_timeout(secs);
        }
        Ok(config)
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let ws = self
            .base_url
            .replace("https://", "wss://")
            .replace("http://", "ws://");
        format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", ws, self.api_key)
    }
}

/// Timing of the order synchronization loops.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Silent refresh cadence, independent of the change feed
    pub poll_interval: Duration,
    /// Wait before re-opening a failed change feed channel
    pub reconnect_delay: Duration,
    /// Deferral between a change event and its refresh
    pub change_delay: Duration,
    /// How long a channel join may go unanswered before it is timed out
    pub join_timeout: Duration,
    /// Realtime socket keepalive
    pub heartbeat_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            change_delay: Duration::from_millis(100),
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
        }
    }
}

impl SyncConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_change_delay(mut self, delay: Duration) -> Self {
        self.change_delay = delay;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
