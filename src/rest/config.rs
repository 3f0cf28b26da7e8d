use std::fmt;
use std::time::Duration;

use url::Url;

use crate::core::{ConfigError, Credential, parse_url};
use crate::observer::ObserverHook;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/shared-gateway, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Request dispatcher settings.
#[derive(Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub credential: Credential,
    pub user_agent: String,
    /// Physical attempts allowed for transport failures and 5xx responses.
    pub transient_attempts: u32,
    /// Delay before retry `n` is `n * transient_backoff`.
    pub transient_backoff: Duration,
    /// Server retry delays above this are surfaced instead of honoured.
    pub max_retry_after: Duration,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
    pub observer: Option<ObserverHook>,
}

impl RestConfig {
    pub fn new(credential: Credential) -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            credential,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            transient_attempts: 3,
            transient_backoff: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            observer: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_transient_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.transient_attempts = attempts;
        self.transient_backoff = backoff;
        self
    }

    pub fn with_max_retry_after(mut self, ceiling: Duration) -> Self {
        self.max_retry_after = ceiling;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: ObserverHook) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Check every value and return the parsed base URL.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let url = parse_url(&self.base_url, &["http", "https"])?;
        if self.transient_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "transient_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "sweep_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if http::HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ConfigError::InvalidSetting {
                name: "user_agent",
                reason: "not a valid header value".to_string(),
            });
        }
        Ok(url)
    }
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("user_agent", &self.user_agent)
            .field("transient_attempts", &self.transient_attempts)
            .field("transient_backoff", &self.transient_backoff)
            .field("max_retry_after", &self.max_retry_after)
            .field("sweep_interval", &self.sweep_interval)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new("token").expect("valid")
    }

    #[test]
    fn defaults_validate() {
        let config = RestConfig::new(credential());
        let url = config.validate().expect("defaults are valid");
        assert_eq!(url.as_str(), "https://discord.com/api/v10");
        assert_eq!(config.transient_attempts, 3);
        assert_eq!(config.max_retry_after, Duration::from_secs(60));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            RestConfig::new(credential())
                .with_base_url("ftp://example.test")
                .validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RestConfig::new(credential())
                .with_transient_retry(0, Duration::ZERO)
                .validate(),
            Err(ConfigError::InvalidSetting {
                name: "transient_attempts",
                ..
            })
        ));
        assert!(matches!(
            RestConfig::new(credential())
                .with_user_agent("bad\nagent")
                .validate(),
            Err(ConfigError::InvalidSetting {
                name: "user_agent",
                ..
            })
        ));
    }
}
