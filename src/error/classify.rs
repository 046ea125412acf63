//! Mapping raw transport and HTTP outcomes onto the error taxonomy.
//!
//! This is the only place raw failures become typed. Everything above it
//! sees [`ClassifiedError`].

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ClassifiedError, ErrorKind};

const MAX_DETAIL_CHARS: usize = 300;

/// A raw failure, as first observed.
#[derive(Debug)]
pub enum Outcome<'a> {
    /// reqwest failed to send the request or read the response.
    Transport(&'a reqwest::Error),
    /// reqwest failed while reading an already-open response stream.
    StreamRead(&'a reqwest::Error),
    /// A bare I/O failure.
    Io(&'a std::io::Error),
    /// A non-success HTTP response.
    Http {
        status: u16,
        headers: &'a HeaderMap,
        body: &'a str,
    },
    /// A response body that does not match the expected schema.
    Malformed {
        status: u16,
        body: &'a str,
        detail: String,
    },
    /// A vendor error object delivered inside a stream.
    VendorError(&'a Value),
    /// The per-attempt timeout elapsed.
    Timeout(Duration),
    /// The caller cancelled.
    Cancelled,
    /// Anything else.
    Other(&'a (dyn std::error::Error + 'static)),
}

/// How a 404 is split between `ModelNotFound` and `ResourceNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NotFoundRule {
    /// `ModelNotFound` when the vendor body mentions one of the markers in
    /// its error type, code, param or message.
    Discriminate {
        #[serde(default = "default_model_markers")]
        markers: Vec<String>,
    },
    AlwaysModel,
    AlwaysResource,
}

fn default_model_markers() -> Vec<String> {
    vec!["model".to_string()]
}

impl Default for NotFoundRule {
    fn default() -> Self {
        Self::Discriminate {
            markers: default_model_markers(),
        }
    }
}

/// Tunable parts of classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    pub not_found: NotFoundRule,
}

/// Classify with the default rules.
pub fn classify(outcome: Outcome<'_>) -> ClassifiedError {
    ClassifierRules::default().classify(outcome)
}

impl ClassifierRules {
    pub fn classify(&self, outcome: Outcome<'_>) -> ClassifiedError {
        self.classify_at(outcome, Utc::now())
    }

    /// Classify relative to a fixed clock, for reset timestamps.
    pub fn classify_at(&self, outcome: Outcome<'_>, now: DateTime<Utc>) -> ClassifiedError {
        match outcome {
            Outcome::Cancelled => ClassifiedError::cancelled(),
            Outcome::Timeout(after) => ClassifiedError::new(
                ErrorKind::RequestTimeout,
                format!("no response within {}ms", after.as_millis()),
            ),
            Outcome::Transport(err) => classify_reqwest(err, false),
            Outcome::StreamRead(err) => classify_reqwest(err, true),
            Outcome::Io(err) => {
                let kind = io_kind(err).unwrap_or_else(|| kind_from_text(&err.to_string()));
                ClassifiedError::new(kind, err.to_string())
            }
            Outcome::Http {
                status,
                headers,
                body,
            } => self.classify_http(status, headers, body, now),
            Outcome::Malformed {
                status,
                body,
                detail,
            } => ClassifiedError::http(ErrorKind::MalformedResponse, status, detail)
                .with_raw_body(truncate(body)),
            Outcome::VendorError(value) => self.classify_vendor(value),
            Outcome::Other(err) => ClassifiedError::new(ErrorKind::UnknownError, err.to_string()),
        }
    }

    fn classify_http(
        &self,
        status: u16,
        headers: &HeaderMap,
        body: &str,
        now: DateTime<Utc>,
    ) -> ClassifiedError {
        let vendor = serde_json::from_str::<Value>(body)
            .map(|v| VendorError::from_body(&v))
            .unwrap_or_default();

        let base = match status {
            401 => ErrorKind::AuthenticationError,
            402 => ErrorKind::QuotaExceeded,
            403 => ErrorKind::AuthorizationError,
            404 => self.not_found_kind(&vendor),
            408 => ErrorKind::RequestTimeout,
            429 => ErrorKind::RateLimitExceeded,
            500 => ErrorKind::ServerError,
            502 | 503 => ErrorKind::ServiceUnavailable,
            504 => ErrorKind::GatewayTimeout,
            529 => ErrorKind::ModelUnavailable,
            _ => ErrorKind::ApiError,
        };
        let kind = self.refine(base, status, &vendor);

        let detail = vendor
            .message
            .clone()
            .unwrap_or_else(|| fallback_detail(status, body));

        let mut retry_after = retry_after_from_headers(headers, now);
        if retry_after.is_none() && kind == ErrorKind::RateLimitExceeded {
            retry_after = reset_from_headers(headers, now);
        }
        let retry_after = retry_after
            .or(vendor.retry_after)
            .or_else(|| vendor.message.as_deref().and_then(retry_hint_from_message));

        ClassifiedError::http(kind, status, detail)
            .with_raw_body(truncate(body))
            .with_retry_after(retry_after)
    }

    fn classify_vendor(&self, value: &Value) -> ClassifiedError {
        let vendor = VendorError::from_body(value);
        let status = vendor.numeric_code();

        let kind = match (vendor.specific_kind(), vendor.generic_kind()) {
            (Some(kind), _) => kind,
            (None, Some(GenericKind::NotFound)) => self.not_found_kind(&vendor),
            (None, Some(GenericKind::Kind(kind))) => kind,
            (None, None) => match status {
                Some(401) => ErrorKind::AuthenticationError,
                Some(403) => ErrorKind::AuthorizationError,
                Some(429) => ErrorKind::RateLimitExceeded,
                Some(500) => ErrorKind::ServerError,
                Some(502 | 503) => ErrorKind::ServiceUnavailable,
                _ => ErrorKind::ApiError,
            },
        };
        let detail = vendor
            .message
            .clone()
            .unwrap_or_else(|| truncate(&value.to_string()));
        let retry_after = vendor
            .retry_after
            .or_else(|| vendor.message.as_deref().and_then(retry_hint_from_message));

        let err = match status {
            Some(status) => ClassifiedError::http(kind, status, detail),
            None => ClassifiedError::new(kind, detail),
        };
        err.with_raw_body(truncate(&value.to_string()))
            .with_retry_after(retry_after)
    }

    fn refine(&self, base: ErrorKind, status: u16, vendor: &VendorError) -> ErrorKind {
        if let Some(specific) = vendor.specific_kind() {
            if (400..500).contains(&status) || specific == ErrorKind::ModelUnavailable {
                return specific;
            }
        }
        if base == ErrorKind::ApiError && (400..500).contains(&status) {
            match vendor.generic_kind() {
                Some(GenericKind::Kind(kind)) => return kind,
                Some(GenericKind::NotFound) => return self.not_found_kind(vendor),
                None => {}
            }
        }
        base
    }

    fn not_found_kind(&self, vendor: &VendorError) -> ErrorKind {
        match &self.not_found {
            NotFoundRule::AlwaysModel => ErrorKind::ModelNotFound,
            NotFoundRule::AlwaysResource => ErrorKind::ResourceNotFound,
            NotFoundRule::Discriminate { markers } => {
                let haystacks = [&vendor.kind, &vendor.code, &vendor.param, &vendor.message];
                let mentions_model = haystacks.iter().filter_map(|h| h.as_deref()).any(|h| {
                    let h = h.to_ascii_lowercase();
                    markers.iter().any(|m| h.contains(&m.to_ascii_lowercase()))
                });
                if mentions_model {
                    ErrorKind::ModelNotFound
                } else {
                    ErrorKind::ResourceNotFound
                }
            }
        }
    }
}

/// Vendor error fields pulled out of an error body.
#[derive(Debug, Default)]
struct VendorError {
    kind: Option<String>,
    code: Option<String>,
    param: Option<String>,
    message: Option<String>,
    retry_after: Option<f64>,
}

enum GenericKind {
    Kind(ErrorKind),
    NotFound,
}

impl VendorError {
    /// Accepts `{"error": {...}}`, `{"error": "text"}` and flat
    /// `{"type"|"code"|"message": ...}` shapes.
    fn from_body(body: &Value) -> Self {
        let obj = match body.get("error") {
            Some(Value::String(text)) => {
                return Self {
                    message: Some(text.clone()),
                    ..Self::default()
                }
            }
            Some(inner @ Value::Object(_)) => inner,
            _ => body,
        };
        let text = |key: &str| match obj.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let kind = text("type").filter(|t| t != "error");
        Self {
            kind,
            code: text("code"),
            param: text("param"),
            message: text("message").or_else(|| text("detail")),
            retry_after: obj.get("retry_after").and_then(Value::as_f64),
        }
    }

    fn tokens(&self) -> impl Iterator<Item = String> + '_ {
        [&self.code, &self.kind]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .map(str::to_ascii_lowercase)
    }

    fn numeric_code(&self) -> Option<u16> {
        self.code.as_deref().and_then(|c| c.parse().ok())
    }

    /// Precise vendor codes that override the HTTP status.
    fn specific_kind(&self) -> Option<ErrorKind> {
        for token in self.tokens() {
            let kind = match token.as_str() {
                "insufficient_quota" | "quota_exceeded" | "billing_hard_limit_reached" => {
                    ErrorKind::QuotaExceeded
                }
                "context_length_exceeded" => ErrorKind::ContextLengthExceeded,
                "invalid_api_key" => ErrorKind::ApiKeyInvalid,
                "model_not_found" => ErrorKind::ModelNotFound,
                "invalid_model" => ErrorKind::InvalidModel,
                "content_filter" | "content_policy_violation" => ErrorKind::ContentFiltered,
                "overloaded_error" => ErrorKind::ModelUnavailable,
                _ => continue,
            };
            return Some(kind);
        }
        let message = self.message.as_deref()?.to_ascii_lowercase();
        if message.contains("maximum context length") {
            return Some(ErrorKind::ContextLengthExceeded);
        }
        None
    }

    /// Broad vendor types, used when the status alone is ambiguous.
    fn generic_kind(&self) -> Option<GenericKind> {
        for token in self.tokens() {
            let kind = match token.as_str() {
                "invalid_request" | "invalid_request_error" | "request_too_large" => {
                    ErrorKind::InvalidRequest
                }
                "authentication_error" => ErrorKind::AuthenticationError,
                "permission_error" | "permission_denied" => ErrorKind::AuthorizationError,
                "rate_limit_exceeded" | "rate_limit_error" | "rate_limit" => {
                    ErrorKind::RateLimitExceeded
                }
                "api_error" | "server_error" => ErrorKind::ServerError,
                "timeout_error" => ErrorKind::GatewayTimeout,
                "not_found_error" | "not_found" => return Some(GenericKind::NotFound),
                _ => continue,
            };
            return Some(GenericKind::Kind(kind));
        }
        None
    }
}

fn classify_reqwest(err: &reqwest::Error, mid_stream: bool) -> ClassifiedError {
    let detail = error_chain(err);
    let kind = if err.is_timeout() {
        ErrorKind::RequestTimeout
    } else if err.is_builder() {
        if detail.to_ascii_lowercase().contains("url") {
            ErrorKind::InvalidBaseUrl
        } else {
            ErrorKind::ConfigurationError
        }
    } else if mid_stream {
        ErrorKind::StreamInterrupted
    } else if err.is_decode() {
        ErrorKind::ResponseParsingError
    } else if let Some(kind) = find_io(err).and_then(io_kind) {
        kind
    } else if err.is_connect() || err.is_request() || err.is_body() {
        kind_from_text(&detail)
    } else {
        ErrorKind::UnknownError
    };

    match err.status() {
        Some(status) => ClassifiedError::http(kind, status.as_u16(), detail),
        None => ClassifiedError::new(kind, detail),
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        let text = source.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        current = source.source();
    }
    parts.join(": ")
}

fn find_io<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a std::io::Error> {
    let mut current: Option<&'a (dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        current = e.source();
    }
    None
}

fn io_kind(err: &std::io::Error) -> Option<ErrorKind> {
    use std::io::ErrorKind as Io;
    match err.kind() {
        Io::ConnectionRefused => Some(ErrorKind::ConnectionRefused),
        Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe | Io::UnexpectedEof => {
            Some(ErrorKind::ConnectionReset)
        }
        Io::TimedOut => Some(ErrorKind::RequestTimeout),
        Io::NotConnected | Io::AddrNotAvailable | Io::AddrInUse => Some(ErrorKind::NetworkError),
        _ => None,
    }
}

fn kind_from_text(detail: &str) -> ErrorKind {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
    {
        ErrorKind::DnsFailure
    } else if lower.contains("certificate")
        || lower.contains("tls")
        || lower.contains("ssl")
        || lower.contains("handshake")
    {
        ErrorKind::TlsError
    } else if lower.contains("connection refused") {
        ErrorKind::ConnectionRefused
    } else if lower.contains("connection reset") || lower.contains("connection closed") {
        ErrorKind::ConnectionReset
    } else {
        ErrorKind::NetworkError
    }
}

fn fallback_detail(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("no response body")
            .to_string()
    } else {
        truncate(trimmed)
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// `retry-after-ms` or `retry-after` (delta-seconds or HTTP-date).
pub fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<f64> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    if let Some(ms) = header("retry-after-ms").and_then(|v| v.parse::<f64>().ok()) {
        return Some(ms / 1000.0);
    }
    let value = header("retry-after")?;
    if let Ok(seconds) = value.parse::<f64>() {
        return Some(seconds);
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|at| seconds_until(at.with_timezone(&Utc), now))
}

/// Vendor rate-limit reset headers; the latest reset wins.
pub fn reset_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<f64> {
    const DURATION_HEADERS: [&str; 2] = ["x-ratelimit-reset-requests", "x-ratelimit-reset-tokens"];
    const TIMESTAMP_HEADERS: [&str; 4] = [
        "anthropic-ratelimit-requests-reset",
        "anthropic-ratelimit-tokens-reset",
        "anthropic-ratelimit-input-tokens-reset",
        "anthropic-ratelimit-output-tokens-reset",
    ];
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    let durations = DURATION_HEADERS
        .iter()
        .filter_map(|name| header(name))
        .filter_map(parse_reset_duration);
    let timestamps = TIMESTAMP_HEADERS
        .iter()
        .filter_map(|name| header(name))
        .filter_map(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|at| seconds_until(at.with_timezone(&Utc), now));

    durations.chain(timestamps).reduce(f64::max)
}

fn seconds_until(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (at - now).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Parse reset durations such as `1s`, `6m0s`, `20ms` or `1h2m3.5s`.
pub fn parse_reset_duration(text: &str) -> Option<f64> {
    static PART: OnceLock<Regex> = OnceLock::new();
    let part = PART.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").unwrap_or_else(|e| panic!("invalid regex: {e}"))
    });

    let mut total = 0.0;
    let mut consumed = 0;
    for caps in part.captures_iter(text) {
        let value: f64 = caps[1].parse().ok()?;
        total += match &caps[2] {
            "ms" => value / 1000.0,
            "h" => value * 3600.0,
            "m" => value * 60.0,
            _ => value,
        };
        consumed += caps[0].len();
    }
    (consumed > 0 && consumed == text.len()).then_some(total)
}

/// Hints like "Please try again in 20s" or "try again in 250ms".
pub fn retry_hint_from_message(message: &str) -> Option<f64> {
    static HINT: OnceLock<Regex> = OnceLock::new();
    let hint = HINT.get_or_init(|| {
        Regex::new(r"(?i)try again in (\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)\b")
            .unwrap_or_else(|e| panic!("invalid regex: {e}"))
    });
    let caps = hint.captures(message)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps[2].to_ascii_lowercase();
    if unit.starts_with("ms") || unit.starts_with("milli") {
        Some(value / 1000.0)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, Severity};
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use strum::IntoEnumIterator;

    fn http(status: u16, body: &str) -> ClassifiedError {
        let headers = HeaderMap::new();
        classify(Outcome::Http {
            status,
            headers: &headers,
            body,
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn status_table_maps_known_codes() {
        let cases = [
            (401, ErrorKind::AuthenticationError),
            (403, ErrorKind::AuthorizationError),
            (408, ErrorKind::RequestTimeout),
            (429, ErrorKind::RateLimitExceeded),
            (500, ErrorKind::ServerError),
            (502, ErrorKind::ServiceUnavailable),
            (503, ErrorKind::ServiceUnavailable),
            (504, ErrorKind::GatewayTimeout),
            (529, ErrorKind::ModelUnavailable),
            (418, ErrorKind::ApiError),
            (400, ErrorKind::ApiError),
        ];
        for (status, expected) in cases {
            assert_eq!(http(status, "").kind(), expected, "status {status}");
        }
    }

    #[test]
    fn rate_limit_body_classifies_as_retryable_client_error() {
        let err = http(429, r#"{"error":{"type":"rate_limit_exceeded"}}"#);
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.category(), ErrorCategory::Client);
        assert!(err.is_retryable());
    }

    #[test]
    fn vendor_type_refines_bad_request() {
        let invalid_request = http(
            400,
            r#"{"error":{"type":"invalid_request_error","message":"messages: required"}}"#,
        );
        assert_eq!(invalid_request.kind(), ErrorKind::InvalidRequest);
        assert!(invalid_request.message().contains("messages: required"));

        let invalid_model = http(400, r#"{"error":{"type":"invalid_model"}}"#);
        assert_eq!(invalid_model.kind(), ErrorKind::InvalidModel);

        let context = http(
            400,
            r#"{"error":{"type":"invalid_request_error","code":"context_length_exceeded"}}"#,
        );
        assert_eq!(context.kind(), ErrorKind::ContextLengthExceeded);
    }

    #[test]
    fn specific_codes_override_status() {
        assert_eq!(
            http(401, r#"{"error":{"code":"invalid_api_key"}}"#).kind(),
            ErrorKind::ApiKeyInvalid
        );
        assert_eq!(
            http(429, r#"{"error":{"type":"insufficient_quota","code":"insufficient_quota"}}"#)
                .kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            http(503, r#"{"type":"error","error":{"type":"overloaded_error"}}"#).kind(),
            ErrorKind::ModelUnavailable
        );
    }

    #[test]
    fn server_status_is_not_downgraded_by_vendor_type() {
        let err = http(500, r#"{"error":{"type":"invalid_request_error"}}"#);
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }

    #[test]
    fn not_found_uses_discriminator_rule() {
        let model = http(
            404,
            r#"{"error":{"code":"model_not_found","message":"The model `gpt-9` does not exist"}}"#,
        );
        assert_eq!(model.kind(), ErrorKind::ModelNotFound);

        let resource = http(404, r#"{"error":{"type":"not_found_error","message":"Not found"}}"#);
        assert_eq!(resource.kind(), ErrorKind::ResourceNotFound);

        let headers = HeaderMap::new();
        let rules = ClassifierRules {
            not_found: NotFoundRule::AlwaysModel,
        };
        let forced = rules.classify(Outcome::Http {
            status: 404,
            headers: &headers,
            body: "<html>not found</html>",
        });
        assert_eq!(forced.kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn not_found_markers_are_configurable() {
        let headers = HeaderMap::new();
        let rules = ClassifierRules {
            not_found: NotFoundRule::Discriminate {
                markers: vec!["deployment".to_string()],
            },
        };
        let err = rules.classify(Outcome::Http {
            status: 404,
            headers: &headers,
            body: r#"{"error":{"code":"DeploymentNotFound"}}"#,
        });
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn retry_after_header_seconds_and_date() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(retry_after_from_headers(&headers, now()), Some(5.0));

        headers.insert(
            "retry-after",
            HeaderValue::from_static("Mon, 01 Jan 2024 12:00:30 GMT"),
        );
        assert_eq!(retry_after_from_headers(&headers, now()), Some(30.0));

        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(retry_after_from_headers(&headers, now()), Some(1.5));
    }

    #[test]
    fn rate_limit_uses_reset_headers_when_retry_after_missing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset-requests", HeaderValue::from_static("6m0s"));
        headers.insert("x-ratelimit-reset-tokens", HeaderValue::from_static("20ms"));
        let err = ClassifierRules::default().classify_at(
            Outcome::Http {
                status: 429,
                headers: &headers,
                body: "",
            },
            now(),
        );
        assert_eq!(err.retry_after_seconds(), Some(360.0));

        let mut headers = HeaderMap::new();
        headers.insert(
            "anthropic-ratelimit-requests-reset",
            HeaderValue::from_static("2024-01-01T12:00:10Z"),
        );
        let err = ClassifierRules::default().classify_at(
            Outcome::Http {
                status: 429,
                headers: &headers,
                body: "",
            },
            now(),
        );
        assert_eq!(err.retry_after_seconds(), Some(10.0));
    }

    #[test]
    fn reset_headers_ignored_for_non_rate_limit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset-requests", HeaderValue::from_static("1s"));
        let err = classify(Outcome::Http {
            status: 500,
            headers: &headers,
            body: "",
        });
        assert_eq!(err.retry_after_seconds(), None);
    }

    #[test]
    fn retry_after_falls_back_to_body_and_message() {
        let err = http(429, r#"{"error":{"retry_after":2.5}}"#);
        assert_eq!(err.retry_after_seconds(), Some(2.5));

        let err = http(
            429,
            r#"{"error":{"message":"Rate limit reached. Please try again in 20s."}}"#,
        );
        assert_eq!(err.retry_after_seconds(), Some(20.0));

        let err = http(
            429,
            r#"{"error":{"message":"Please try again in 250ms."}}"#,
        );
        assert_eq!(err.retry_after_seconds(), Some(0.25));
    }

    #[test]
    fn reset_duration_parser() {
        assert_eq!(parse_reset_duration("1s"), Some(1.0));
        assert_eq!(parse_reset_duration("6m0s"), Some(360.0));
        assert_eq!(parse_reset_duration("1h2m3.5s"), Some(3723.5));
        assert_eq!(parse_reset_duration("20ms"), Some(0.02));
        assert_eq!(parse_reset_duration("soon"), None);
        assert_eq!(parse_reset_duration("5s later"), None);
    }

    #[test]
    fn malformed_body_is_not_retryable() {
        let err = classify(Outcome::Malformed {
            status: 200,
            body: "<html>",
            detail: "expected value at line 1 column 1".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(!err.is_retryable());
        assert_eq!(err.raw_body(), Some("<html>"));
    }

    #[test]
    fn io_errors_map_to_connection_kinds() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify(Outcome::Io(&refused)).kind(), ErrorKind::ConnectionRefused);

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify(Outcome::Io(&reset)).kind(), ErrorKind::ConnectionReset);

        let dns = std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to lookup address information",
        );
        assert_eq!(classify(Outcome::Io(&dns)).kind(), ErrorKind::DnsFailure);
    }

    #[test]
    fn invalid_url_is_a_configuration_problem() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let classified = classify(Outcome::Transport(&err));
        assert_eq!(classified.kind(), ErrorKind::InvalidBaseUrl);
        assert!(!classified.is_retryable());
    }

    #[test]
    fn cancellation_and_timeout() {
        let cancelled = classify(Outcome::Cancelled);
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_retryable());

        let timeout = classify(Outcome::Timeout(Duration::from_millis(1500)));
        assert_eq!(timeout.kind(), ErrorKind::RequestTimeout);
        assert!(timeout.message().contains("1500ms"));
    }

    #[test]
    fn vendor_stream_errors() {
        let overloaded = classify(Outcome::VendorError(&json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })));
        assert_eq!(overloaded.kind(), ErrorKind::ModelUnavailable);

        let numeric = classify(Outcome::VendorError(&json!({
            "error": {"code": 429, "message": "slow down"}
        })));
        assert_eq!(numeric.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(numeric.http_status(), Some(429));

        let unknown = classify(Outcome::VendorError(&json!({"error": {"message": "??"}})));
        assert_eq!(unknown.kind(), ErrorKind::ApiError);
    }

    #[test]
    fn other_errors_become_unknown() {
        let fmt_err = std::fmt::Error;
        let err = classify(Outcome::Other(&fmt_err));
        assert_eq!(err.kind(), ErrorKind::UnknownError);
        assert_eq!(err.severity(), Severity::Medium);
        assert!(!err.is_retryable());
    }

    #[test]
    fn classification_is_total_over_statuses() {
        let kinds: Vec<ErrorKind> = ErrorKind::iter().collect();
        for status in 100..600u16 {
            let err = http(status, r#"{"error":{"type":"whatever"}}"#);
            assert!(kinds.contains(&err.kind()));
            assert_eq!(err.metadata().kind, err.kind());
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = http(500, &body);
        assert!(err.raw_body().unwrap().chars().count() <= MAX_DETAIL_CHARS + 1);
    }
}
