use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Subscriber name sent with every token request unless overridden.
pub const DEFAULT_SUBSCRIBER: &str = "wmioSubscriber";

pub(crate) const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;
pub(crate) const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5_000;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_TOKEN_EXPIRY_MINUTES: u32 = 1;
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 2;
pub(crate) const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 40;
pub(crate) const DEFAULT_FRAME_CHANNEL_CAPACITY: usize = 64;

const ENV_URL: &str = "C8Y_BASEURL";
const ENV_USER: &str = "C8Y_USER";
const ENV_PASSWORD: &str = "C8Y_PASSWORD";
const ENV_SUBSCRIBER: &str = "C8Y_NOTIFICATION_SUBSCRIBER";

/// Connection details for a Cumulocity tenant.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Tenant base URL, e.g. `https://example.cumulocity.com`.
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_subscriber")]
    pub subscriber: String,
    /// Host used for the streaming socket. Defaults to `url`. Any `http`
    /// scheme is upgraded to `wss`; an explicit `ws://` URL is used unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_subscriber() -> String {
    DEFAULT_SUBSCRIBER.to_string()
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("subscriber", &self.subscriber)
            .field("streaming_url", &self.streaming_url)
            .field("timing", &self.timing)
            .finish()
    }
}

/// Timeouts, delays and sizes used by the REST calls and the stream loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause before reopening a closed stream.
    pub reconnect_delay_ms: u64,
    /// How long to wait for the server's reply to our close frame.
    pub close_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub token_expiry_minutes: u32,
    /// Page size for the subscription search.
    pub page_size: u32,
    /// Consecutive failed (re)connection attempts before giving up. 0 = unlimited.
    pub max_reconnect_attempts: u32,
    pub frame_channel_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_expiry_minutes: DEFAULT_TOKEN_EXPIRY_MINUTES,
            page_size: DEFAULT_PAGE_SIZE,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            frame_channel_capacity: DEFAULT_FRAME_CHANNEL_CAPACITY,
        }
    }
}

impl TimingConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProviderConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            subscriber: default_subscriber(),
            streaming_url: None,
            timing: TimingConfig::default(),
        }
    }

    /// Read `C8Y_BASEURL`, `C8Y_USER`, `C8Y_PASSWORD` and the optional
    /// `C8Y_NOTIFICATION_SUBSCRIBER`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{key} is not set")))
        };
        let mut config = Self::new(require(ENV_URL)?, require(ENV_USER)?, require(ENV_PASSWORD)?);
        if let Some(subscriber) = lookup(ENV_SUBSCRIBER) {
            config.subscriber = subscriber;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        url::Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid url '{}': {e}", self.url)))?;
        if self.username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".to_string()));
        }
        if self.subscriber.trim().is_empty() {
            return Err(Error::Config("subscriber must not be empty".to_string()));
        }
        if self.timing.page_size == 0 {
            return Err(Error::Config("timing.page_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Load and validate a provider config from a YAML file.
pub async fn load(path: &Path) -> Result<ProviderConfig, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
    let config: ProviderConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
