//! Per-call request configuration and loadable transport defaults.
//!
//! [`RequestConfig`] is what every call takes. [`TransportSettings`] holds
//! defaults that can come from TOML or the environment, and
//! [`Credentials`] is a helper for callers that keep keys in env vars. The
//! request engine itself never reads the environment.

use std::path::Path;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::error::{ClassifiedError, ClassifierRules, ErrorKind, Result};
use crate::util::retry::Backoff;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// How the API key is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AuthMode {
    /// `Authorization: Bearer <key>`.
    #[default]
    Bearer,
    /// `x-api-key: <key>` plus an `anthropic-version` header.
    ApiKeyHeader,
}

/// Which SSE convention the endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StreamFormat {
    /// `data: <json>` chunks with `choices[].delta`, ended by `[DONE]`.
    #[default]
    DeltaJson,
    /// `event: <name>` records (`message_start`, `content_block_delta`, ...).
    TypedEvent,
}

/// Settings for one call. Not shared between calls.
#[derive(Debug, Clone, Builder)]
pub struct RequestConfig {
    /// Retries after the first attempt.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    /// Per-attempt timeout. For streams it covers the response headers.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub auth_mode: AuthMode,
    #[builder(default)]
    pub format: StreamFormat,
    #[builder(default)]
    pub extra_headers: Vec<(String, String)>,
    #[builder(default)]
    pub cancellation: CancellationToken,
    #[builder(default)]
    pub backoff: Backoff,
    /// Longest allowed gap between stream chunks.
    pub stream_idle_timeout: Option<Duration>,
    /// Sent as `anthropic-version` in [`AuthMode::ApiKeyHeader`] mode.
    #[builder(into, default = DEFAULT_API_VERSION.to_string())]
    pub api_version: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RequestConfig {
    /// Bearer auth with the delta-JSON stream format.
    pub fn delta_json() -> Self {
        Self::builder()
            .auth_mode(AuthMode::Bearer)
            .format(StreamFormat::DeltaJson)
            .build()
    }

    /// `x-api-key` auth with the typed-event stream format.
    pub fn typed_event() -> Self {
        Self::builder()
            .auth_mode(AuthMode::ApiKeyHeader)
            .format(StreamFormat::TypedEvent)
            .build()
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                "timeout must be greater than zero",
            ));
        }
        if self.stream_idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                "stream idle timeout must be greater than zero",
            ));
        }
        self.backoff.validate()
    }
}

/// Transport defaults, loadable from TOML or `INFERENCE_*` variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub stream_idle_timeout_ms: Option<u64>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_jitter: f64,
    pub api_version: String,
    pub classifier: ClassifierRules,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            stream_idle_timeout_ms: None,
            initial_backoff_ms: backoff.initial.as_millis() as u64,
            max_backoff_ms: backoff.max.as_millis() as u64,
            backoff_multiplier: backoff.multiplier,
            backoff_jitter: backoff.jitter,
            api_version: DEFAULT_API_VERSION.to_string(),
            classifier: ClassifierRules::default(),
        }
    }
}

impl TransportSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("invalid transport settings: {e}"),
            )
            .with_source(e)
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("cannot read {}: {e}", path.display()),
            )
            .with_source(e)
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `INFERENCE_*` variables (a `.env` file is
    /// loaded first if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(v) = parse_var(&lookup, "INFERENCE_MAX_RETRIES")? {
            settings.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "INFERENCE_TIMEOUT_MS")? {
            settings.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "INFERENCE_CONNECT_TIMEOUT_MS")? {
            settings.connect_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "INFERENCE_STREAM_IDLE_TIMEOUT_MS")? {
            settings.stream_idle_timeout_ms = Some(v);
        }
        if let Some(v) = lookup("INFERENCE_API_VERSION").filter(|v| !v.trim().is_empty()) {
            settings.api_version = v.trim().to_string();
        }
        Ok(settings)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
            jitter: self.backoff_jitter,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// A fresh per-call config seeded from these defaults.
    pub fn request_config(&self, format: StreamFormat, auth_mode: AuthMode) -> RequestConfig {
        RequestConfig::builder()
            .max_retries(self.max_retries)
            .timeout(Duration::from_millis(self.timeout_ms))
            .format(format)
            .auth_mode(auth_mode)
            .backoff(self.backoff())
            .maybe_stream_idle_timeout(self.stream_idle_timeout_ms.map(Duration::from_millis))
            .api_version(self.api_version.clone())
            .build()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|e| {
        ClassifiedError::new(
            ErrorKind::ConfigurationError,
            format!("{name}={raw:?} is not valid: {e}"),
        )
    })
}

/// An API key and base URL pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"..")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Credentials {
    /// Validate an explicit key and base URL.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ClassifiedError::new(ErrorKind::ApiKeyMissing, "API key is empty"));
        }
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base_url).map_err(|e| {
            ClassifiedError::new(ErrorKind::InvalidBaseUrl, format!("{base_url:?}: {e}"))
                .with_source(e)
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClassifiedError::new(
                ErrorKind::InvalidBaseUrl,
                format!("{base_url:?}: scheme must be http or https"),
            ));
        }
        Ok(Self { api_key, base_url })
    }

    /// Read the key from `key_var` and the base URL from `url_var`,
    /// falling back to `default_url`.
    pub fn from_env(key_var: &str, url_var: &str, default_url: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok(), key_var, url_var, default_url)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        key_var: &str,
        url_var: &str,
        default_url: &str,
    ) -> Result<Self> {
        let api_key = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ClassifiedError::new(ErrorKind::ApiKeyMissing, format!("{key_var} is not set")))?;
        let base_url = lookup(url_var)
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| default_url.to_string());
        Self::new(api_key, base_url)
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
