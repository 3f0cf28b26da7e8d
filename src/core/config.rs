//! Configuration values shared by the request and gateway halves.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use url::Url;

use super::types::ConfigError;

/// Validated bot credential.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self, ConfigError> {
        let token = token.into();
        let trimmed = token.strip_prefix("Bot ").unwrap_or(&token);
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyCredential);
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ConfigError::MalformedCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Raw token as sent in the identify payload.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` request header.
    pub fn authorization(&self) -> String {
        format!("Bot {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Capability mask declared in the identify handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u64);

impl Intents {
    pub const NONE: Self = Self(0);
    pub const GUILDS: Self = Self(1 << 0);
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    pub const GUILD_MODERATION: Self = Self(1 << 2);
    pub const GUILD_EXPRESSIONS: Self = Self(1 << 3);
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    pub const GUILD_INVITES: Self = Self(1 << 6);
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);

    /// Intents the server grants without extra approval.
    pub const NON_PRIVILEGED: Self = Self(
        Self::GUILDS.0
            | Self::GUILD_MODERATION.0
            | Self::GUILD_EXPRESSIONS.0
            | Self::GUILD_INTEGRATIONS.0
            | Self::GUILD_WEBHOOKS.0
            | Self::GUILD_INVITES.0
            | Self::GUILD_VOICE_STATES.0
            | Self::GUILD_MESSAGES.0
            | Self::GUILD_MESSAGE_REACTIONS.0
            | Self::GUILD_MESSAGE_TYPING.0
            | Self::DIRECT_MESSAGES.0
            | Self::DIRECT_MESSAGE_REACTIONS.0
            | Self::DIRECT_MESSAGE_TYPING.0,
    );

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Parse `raw` and require one of `schemes`.
pub fn parse_url(raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("scheme must be one of {schemes:?}"),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejects_empty_and_whitespace() {
        assert_eq!(Credential::new(""), Err(ConfigError::EmptyCredential));
        assert_eq!(Credential::new("Bot "), Err(ConfigError::EmptyCredential));
        assert_eq!(
            Credential::new("abc def"),
            Err(ConfigError::MalformedCredential)
        );
        assert_eq!(
            Credential::new("abc\n"),
            Err(ConfigError::MalformedCredential)
        );
    }

    #[test]
    fn credential_strips_prefix_and_redacts_debug() {
        let credential = Credential::new("Bot secret.token").expect("valid");
        assert_eq!(credential.token(), "secret.token");
        assert_eq!(credential.authorization(), "Bot secret.token");
        assert!(!format!("{credential:?}").contains("secret"));
    }

    #[test]
    fn intents_combine_with_bitor() {
        let mut intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        intents |= Intents::MESSAGE_CONTENT;
        assert_eq!(intents.bits(), 1 | (1 << 9) | (1 << 15));
        assert!(intents.contains(Intents::GUILD_MESSAGES));
        assert!(!Intents::NON_PRIVILEGED.contains(Intents::MESSAGE_CONTENT));
    }

    #[test]
    fn parse_url_enforces_scheme() {
        assert!(parse_url("wss://gateway.example.test", &["ws", "wss"]).is_ok());
        assert!(matches!(
            parse_url("https://gateway.example.test", &["ws", "wss"]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_url("not a url", &["ws", "wss"]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
