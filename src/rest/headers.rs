//! Quota metadata carried on responses.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use serde::Deserialize;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
pub const HEADER_SCOPE: &str = "x-ratelimit-scope";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Used when a 429 carries no usable delay at all.
const FALLBACK_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Counters for one bucket as reported by a single response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Who a quota violation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaScope {
    /// This route (and the bucket it shares) only.
    User,
    /// Shared resource quota; still route-local for admission purposes.
    Shared,
    /// Every route on the account.
    Global,
}

impl QuotaScope {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "shared" => Some(Self::Shared),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

/// All quota-related headers present on a response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub bucket: Option<String>,
    pub snapshot: Option<QuotaSnapshot>,
    pub global: bool,
    pub scope: Option<QuotaScope>,
    pub retry_after: Option<Duration>,
}

impl QuotaHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let limit = header_str(headers, HEADER_LIMIT).and_then(|v| v.parse::<u32>().ok());
        let remaining =
            header_str(headers, HEADER_REMAINING).and_then(|v| v.parse::<u32>().ok());
        let reset_after = header_str(headers, HEADER_RESET_AFTER)
            .and_then(parse_seconds)
            .or_else(|| header_str(headers, HEADER_RESET).and_then(reset_epoch_to_delay));

        let snapshot = match (limit, remaining, reset_after) {
            (Some(limit), Some(remaining), Some(reset_after)) => Some(QuotaSnapshot {
                limit,
                remaining,
                reset_after,
            }),
            _ => None,
        };

        Self {
            bucket: header_str(headers, HEADER_BUCKET).map(str::to_string),
            snapshot,
            global: header_str(headers, HEADER_GLOBAL)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            scope: header_str(headers, HEADER_SCOPE).and_then(QuotaScope::parse),
            retry_after: header_str(headers, HEADER_RETRY_AFTER).and_then(parse_seconds),
        }
    }
}

/// Error document returned with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub retry_after: Option<f64>,
    #[serde(default)]
    pub global: Option<bool>,
}

impl ErrorBody {
    pub fn parse(body: &[u8]) -> Self {
        sonic_rs::from_slice(body).unwrap_or_default()
    }
}

/// Server-reported quota violation (HTTP 429).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaViolation {
    pub retry_after: Duration,
    pub scope: QuotaScope,
}

impl QuotaViolation {
    /// Combine headers and body. The body's fractional `retry_after` is the most
    /// precise value, then `Retry-After`, then the bucket's reset.
    pub fn from_response(headers: &QuotaHeaders, body: &ErrorBody) -> Self {
        let retry_after = body
            .retry_after
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .or(headers.retry_after)
            .or(headers.snapshot.map(|s| s.reset_after))
            .unwrap_or(FALLBACK_RETRY_AFTER);

        let global = headers.global
            || body.global.unwrap_or(false)
            || headers.scope == Some(QuotaScope::Global);
        let scope = if global {
            QuotaScope::Global
        } else {
            headers.scope.unwrap_or(QuotaScope::User)
        };

        Self { retry_after, scope }
    }

    pub fn is_global(&self) -> bool {
        self.scope == QuotaScope::Global
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    raw.parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn reset_epoch_to_delay(raw: &str) -> Option<Duration> {
    let reset = parse_seconds(raw)?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    Some(reset.saturating_sub(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn parses_full_quota_headers() {
        let parsed = QuotaHeaders::from_headers(&headers(&[
            ("x-ratelimit-limit", "5"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "2.5"),
            ("x-ratelimit-bucket", "abcd1234"),
        ]));

        assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
        assert_eq!(
            parsed.snapshot,
            Some(QuotaSnapshot {
                limit: 5,
                remaining: 0,
                reset_after: Duration::from_millis(2_500),
            })
        );
        assert!(!parsed.global);
    }

    #[test]
    fn incomplete_headers_yield_no_snapshot() {
        let parsed = QuotaHeaders::from_headers(&headers(&[("x-ratelimit-limit", "5")]));
        assert_eq!(parsed.snapshot, None);
        assert_eq!(QuotaHeaders::from_headers(&HeaderMap::new()), QuotaHeaders::default());
    }

    #[test]
    fn violation_prefers_body_delay_and_detects_global() {
        let parsed = QuotaHeaders::from_headers(&headers(&[
            ("retry-after", "3"),
            ("x-ratelimit-scope", "user"),
        ]));
        let body = ErrorBody::parse(br#"{"message":"You are being rate limited.","retry_after":1.25,"global":true}"#);

        let violation = QuotaViolation::from_response(&parsed, &body);
        assert_eq!(violation.retry_after, Duration::from_millis(1_250));
        assert!(violation.is_global());
    }

    #[test]
    fn violation_falls_back_to_headers() {
        let parsed = QuotaHeaders::from_headers(&headers(&[
            ("retry-after", "3"),
            ("x-ratelimit-scope", "shared"),
        ]));
        let violation = QuotaViolation::from_response(&parsed, &ErrorBody::parse(b"not json"));
        assert_eq!(violation.retry_after, Duration::from_secs(3));
        assert_eq!(violation.scope, QuotaScope::Shared);

        let bare = QuotaViolation::from_response(&QuotaHeaders::default(), &ErrorBody::default());
        assert_eq!(bare.retry_after, FALLBACK_RETRY_AFTER);
        assert_eq!(bare.scope, QuotaScope::User);
    }
}
