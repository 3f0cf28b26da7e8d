use std::fmt;
use std::time::Duration;

use url::Url;

use super::envelope::ConnectionProperties;
use crate::core::{
    ConfigError, Credential, Intents, LinearBackoffReconnect, WebSocketBufferConfig, WsTlsConfig,
    parse_url,
};
use crate::observer::ObserverHook;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";
pub const DEFAULT_API_VERSION: u8 = 10;

/// Settings for one gateway session.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Initial connect address; resumes use the address the server hands out.
    pub url: String,
    pub api_version: u8,
    pub credential: Credential,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    /// Member count above which the server omits offline members (50..=250).
    pub large_threshold: u16,
    pub hello_timeout: Duration,
    pub invalid_session_delay_min: Duration,
    pub invalid_session_delay_max: Duration,
    pub backoff_base: Duration,
    pub backoff_step: Duration,
    pub backoff_max: Duration,
    /// Outbound command budget per window; handshakes and heartbeats are exempt.
    pub command_limit: u32,
    pub command_window: Duration,
    pub buffers: WebSocketBufferConfig,
    pub tls: WsTlsConfig,
    pub observer: Option<ObserverHook>,
    pub label: Option<String>,
}

impl GatewayConfig {
    pub fn new(credential: Credential, intents: Intents) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            api_version: DEFAULT_API_VERSION,
            credential,
            intents,
            properties: ConnectionProperties::default(),
            large_threshold: 50,
            hello_timeout: Duration::from_secs(30),
            invalid_session_delay_min: Duration::from_secs(1),
            invalid_session_delay_max: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_step: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            command_limit: 120,
            command_window: Duration::from_secs(60),
            buffers: WebSocketBufferConfig::default(),
            tls: WsTlsConfig::default(),
            observer: None,
            label: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_large_threshold(mut self, threshold: u16) -> Self {
        self.large_threshold = threshold;
        self
    }

    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    pub fn with_invalid_session_delay(mut self, min: Duration, max: Duration) -> Self {
        self.invalid_session_delay_min = min;
        self.invalid_session_delay_max = max;
        self
    }

    pub fn with_backoff(mut self, base: Duration, step: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_step = step;
        self.backoff_max = max;
        self
    }

    pub fn with_command_budget(mut self, limit: u32, window: Duration) -> Self {
        self.command_limit = limit;
        self.command_window = window;
        self
    }

    pub fn with_buffers(mut self, buffers: WebSocketBufferConfig) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_tls(mut self, tls: WsTlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_observer(mut self, observer: ObserverHook) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn backoff(&self) -> LinearBackoffReconnect {
        LinearBackoffReconnect::new(self.backoff_base, self.backoff_step, self.backoff_max)
    }

    /// Label used in logs and observer callbacks.
    pub fn connection_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.url.clone())
    }

    pub fn validate(&self) -> Result<Url, ConfigError> {
        let url = parse_url(&self.url, &["ws", "wss"])?;
        if !(50..=250).contains(&self.large_threshold) {
            return Err(ConfigError::InvalidSetting {
                name: "large_threshold",
                reason: format!("{} is outside 50..=250", self.large_threshold),
            });
        }
        if self.hello_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "hello_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.invalid_session_delay_min > self.invalid_session_delay_max {
            return Err(ConfigError::InvalidSetting {
                name: "invalid_session_delay",
                reason: "minimum exceeds maximum".to_string(),
            });
        }
        if self.command_window.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "command_window",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(url)
    }

    /// Append the version and encoding query to a gateway address.
    pub fn connect_url(&self, base: &str) -> Result<String, ConfigError> {
        let mut url = parse_url(base, &["ws", "wss"])?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "v" && key != "encoding")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (key, value) in &kept {
                query.append_pair(key, value);
            }
            query.append_pair("v", &self.api_version.to_string());
            query.append_pair("encoding", "json");
        }
        Ok(url.into())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .field("credential", &self.credential)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("hello_timeout", &self.hello_timeout)
            .field("command_limit", &self.command_limit)
            .field("observer", &self.observer.is_some())
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
