//! Shared HTTP client and auth headers.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::{AuthMode, RequestConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{ClassifiedError, ErrorKind, Result};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// The client has no total timeout; each attempt is bounded by
/// [`RequestConfig::timeout`] so long streams are not cut off.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        build_client(DEFAULT_CONNECT_TIMEOUT).unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Build a client with the given connect timeout.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| {
            ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("failed to build HTTP client: {e}"),
            )
            .with_source(e)
        })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AUTHORIZATION, key_value(&format!("Bearer {api_key}"))?);
    Ok(headers)
}

/// Build `x-api-key` headers with an `anthropic-version`.
pub fn api_key_headers(api_key: &str, version: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("x-api-key", key_value(api_key)?);
    let version = HeaderValue::from_str(version).map_err(|e| {
        ClassifiedError::new(
            ErrorKind::ConfigurationError,
            format!("invalid API version header {version:?}: {e}"),
        )
    })?;
    headers.insert("anthropic-version", version);
    Ok(headers)
}

/// All headers for one call: auth per mode, then caller extras.
pub fn request_headers(api_key: &str, config: &RequestConfig, streaming: bool) -> Result<HeaderMap> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ClassifiedError::new(ErrorKind::ApiKeyMissing, "API key is empty"));
    }

    let mut headers = match config.auth_mode {
        AuthMode::Bearer => bearer_headers(api_key)?,
        AuthMode::ApiKeyHeader => api_key_headers(api_key, &config.api_version)?,
    };
    if streaming {
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    }

    for (name, value) in &config.extra_headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ClassifiedError::new(ErrorKind::ConfigurationError, format!("invalid header name {name:?}: {e}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("invalid value for header {name:?}: {e}"),
            )
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn key_value(text: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(text).map_err(|_| {
        ClassifiedError::new(
            ErrorKind::ApiKeyInvalid,
            "API key contains characters that are not allowed in a header",
        )
    })?;
    value.set_sensitive(true);
    Ok(value)
}
