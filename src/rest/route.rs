use std::borrow::Cow;
use std::fmt;

use http::Method;

use super::error::{RestError, RestResult};

/// Parameters the server tracks quota for separately.
pub const MAJOR_PARAMETERS: [&str; 3] = ["channel_id", "guild_id", "webhook_id"];

/// A request endpoint: path template plus the values substituted into it.
///
/// ```
/// use shared_gateway::rest::Route;
///
/// let route = Route::new("/channels/{channel_id}/messages").with("channel_id", 42);
/// assert_eq!(route.path().unwrap(), "/channels/42/messages");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    template: Cow<'static, str>,
    params: Vec<(&'static str, String)>,
}

impl Route {
    pub fn new(template: impl Into<Cow<'static, str>>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.params.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Key quota is tracked under before the server assigns a bucket id.
    ///
    /// Two requests share a key when method, template and every major parameter
    /// match; minor ids (message ids and such) do not split the bucket.
    pub fn bucket_key(&self, method: &Method) -> String {
        let major = self.major_key();
        if major.is_empty() {
            format!("{method} {}", self.template)
        } else {
            format!("{method} {} {major}", self.template)
        }
    }

    /// The major parameter values of this route, e.g. `channel_id=42`.
    ///
    /// Empty when the template has none. A server bucket id only names a quota
    /// pool together with these values.
    pub fn major_key(&self) -> String {
        let mut key = String::new();
        for major in MAJOR_PARAMETERS {
            if let Some(value) = self.param(major) {
                if !key.is_empty() {
                    key.push(' ');
                }
                key.push_str(major);
                key.push('=');
                key.push_str(value);
            }
        }
        key
    }

    /// Render the template with every placeholder substituted.
    pub fn path(&self) -> RestResult<String> {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut rest = self.template.as_ref();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                RestError::InvalidRoute(format!("unclosed placeholder in {}", self.template))
            })?;
            let name = &after[..close];
            let value = self.param(name).ok_or_else(|| {
                RestError::InvalidRoute(format!("missing parameter {name} for {}", self.template))
            })?;
            if value.is_empty() || value.contains(['/', '?', '#']) {
                return Err(RestError::InvalidRoute(format!(
                    "parameter {name} has unusable value {value:?}"
                )));
            }
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders() {
        let route = Route::new("/channels/{channel_id}/messages/{message_id}")
            .with("message_id", 7)
            .with("channel_id", 42);
        assert_eq!(route.path().unwrap(), "/channels/42/messages/7");
    }

    #[test]
    fn missing_or_unsafe_parameters_are_rejected() {
        let missing = Route::new("/guilds/{guild_id}");
        assert!(matches!(missing.path(), Err(RestError::InvalidRoute(_))));

        let unsafe_value = Route::new("/guilds/{guild_id}").with("guild_id", "1/../2");
        assert!(matches!(unsafe_value.path(), Err(RestError::InvalidRoute(_))));

        let unclosed = Route::new("/guilds/{guild_id").with("guild_id", 1);
        assert!(matches!(unclosed.path(), Err(RestError::InvalidRoute(_))));
    }

    #[test]
    fn bucket_key_splits_on_major_parameters_only() {
        let template = "/channels/{channel_id}/messages/{message_id}";
        let a = Route::new(template)
            .with("channel_id", 1)
            .with("message_id", 10);
        let b = Route::new(template)
            .with("channel_id", 1)
            .with("message_id", 11);
        let c = Route::new(template)
            .with("channel_id", 2)
            .with("message_id", 10);

        assert_eq!(a.bucket_key(&Method::GET), b.bucket_key(&Method::GET));
        assert_ne!(a.bucket_key(&Method::GET), c.bucket_key(&Method::GET));
        assert_ne!(a.bucket_key(&Method::GET), a.bucket_key(&Method::DELETE));
    }

    #[test]
    fn major_key_lists_only_major_parameters() {
        let route = Route::new("/guilds/{guild_id}/members/{user_id}")
            .with("user_id", 5)
            .with("guild_id", 9);
        assert_eq!(route.major_key(), "guild_id=9");
        assert_eq!(
            route.bucket_key(&Method::GET),
            "GET /guilds/{guild_id}/members/{user_id} guild_id=9"
        );
        assert_eq!(Route::new("/gateway").major_key(), "");
    }

    #[test]
    fn with_overwrites_existing_parameter() {
        let route = Route::new("/users/{user_id}")
            .with("user_id", 1)
            .with("user_id", 2);
        assert_eq!(route.param("user_id"), Some("2"));
    }
}
