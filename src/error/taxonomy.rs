//! Error taxonomy: every failure kind and its static metadata.
//!
//! The table is total: [`ErrorKind::metadata`] is backed by an exhaustive
//! `match`, so adding a variant without metadata does not compile.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

/// Machine-readable failure class.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Authentication and authorization
    AuthenticationError,
    AuthorizationError,
    ApiKeyMissing,
    ApiKeyInvalid,

    // Request shape
    InvalidRequest,
    InvalidModel,
    ModelNotFound,
    ResourceNotFound,
    InvalidToolFormat,
    ContextLengthExceeded,

    // Rate and quota
    RateLimitExceeded,
    QuotaExceeded,

    // Server side
    ServerError,
    ServiceUnavailable,
    ModelUnavailable,
    GatewayTimeout,

    // Network
    RequestTimeout,
    NetworkError,
    ConnectionRefused,
    ConnectionReset,
    DnsFailure,
    TlsError,

    // Response and stream format
    ResponseParsingError,
    MalformedResponse,
    StreamError,
    StreamInterrupted,

    // Policy
    ContentFiltered,

    // Configuration
    ConfigurationError,
    InvalidBaseUrl,

    // Control flow and fallbacks
    Cancelled,
    ApiError,
    UnknownError,
}

/// How badly a failure affects the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Broad origin of a failure, used to route recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorCategory {
    Client,
    Server,
    Network,
    Validation,
    Configuration,
}

/// Static description of an [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMetadata {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub retryable: bool,
    pub user_message: &'static str,
    /// Technical message; `{status}` and `{detail}` are substituted.
    pub technical_message_template: &'static str,
    pub recovery_steps: &'static [&'static str],
    pub doc_url: Option<&'static str>,
    pub estimated_resolution_time: Option<&'static str>,
}

const OPENAI_ERROR_DOCS: &str = "https://platform.openai.com/docs/guides/error-codes";
const ANTHROPIC_ERROR_DOCS: &str = "https://docs.anthropic.com/en/api/errors";
const ANTHROPIC_RATE_LIMIT_DOCS: &str = "https://docs.anthropic.com/en/api/rate-limits";

static METADATA: OnceLock<Vec<ErrorMetadata>> = OnceLock::new();

impl ErrorKind {
    /// Look up the static metadata for this kind.
    pub fn metadata(self) -> &'static ErrorMetadata {
        let table = METADATA.get_or_init(|| ErrorKind::iter().map(describe).collect());
        // `iter()` yields variants in declaration order, matching discriminants.
        &table[self as usize]
    }

    pub fn severity(self) -> Severity {
        self.metadata().severity
    }

    pub fn category(self) -> ErrorCategory {
        self.metadata().category
    }

    pub fn is_retryable(self) -> bool {
        self.metadata().retryable
    }

    /// Total number of kinds in the taxonomy.
    pub fn count() -> usize {
        Self::COUNT
    }
}

impl ErrorMetadata {
    /// Render the technical template with an optional status and detail.
    pub fn technical_message(&self, status: Option<u16>, detail: &str) -> String {
        let status = status.map(|s| s.to_string()).unwrap_or_else(|| "n/a".to_string());
        self.technical_message_template
            .replace("{status}", &status)
            .replace("{detail}", detail)
    }
}

#[allow(clippy::too_many_arguments)]
const fn entry(
    kind: ErrorKind,
    severity: Severity,
    category: ErrorCategory,
    retryable: bool,
    user_message: &'static str,
    technical_message_template: &'static str,
    recovery_steps: &'static [&'static str],
    doc_url: Option<&'static str>,
    estimated_resolution_time: Option<&'static str>,
) -> ErrorMetadata {
    ErrorMetadata {
        kind,
        severity,
        category,
        retryable,
        user_message,
        technical_message_template,
        recovery_steps,
        doc_url,
        estimated_resolution_time,
    }
}

fn describe(kind: ErrorKind) -> ErrorMetadata {
    use ErrorCategory as C;
    use ErrorKind as K;
    use Severity as S;

    match kind {
        K::AuthenticationError => entry(
            kind,
            S::High,
            C::Configuration,
            false,
            "Authentication failed. The API key was rejected.",
            "HTTP {status}: authentication failed: {detail}",
            &[
                "Check that the API key is correct and has not been revoked",
                "Make sure the key belongs to the provider you are calling",
            ],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::AuthorizationError => entry(
            kind,
            S::High,
            C::Client,
            false,
            "This API key is not allowed to perform the request.",
            "HTTP {status}: permission denied: {detail}",
            &[
                "Verify the key has access to the requested model or resource",
                "Check organization or project permissions for the key",
            ],
            Some(ANTHROPIC_ERROR_DOCS),
            None,
        ),
        K::ApiKeyMissing => entry(
            kind,
            S::Critical,
            C::Configuration,
            false,
            "No API key was provided.",
            "missing API key: {detail}",
            &["Provide an API key for the provider before making requests"],
            None,
            None,
        ),
        K::ApiKeyInvalid => entry(
            kind,
            S::Critical,
            C::Configuration,
            false,
            "The API key is malformed or invalid.",
            "HTTP {status}: invalid API key: {detail}",
            &[
                "Copy the API key again, without surrounding whitespace or quotes",
                "Generate a new key in the provider console if the problem persists",
            ],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::InvalidRequest => entry(
            kind,
            S::Medium,
            C::Validation,
            false,
            "The request was rejected as invalid.",
            "HTTP {status}: invalid request: {detail}",
            &[
                "Check the request parameters against the provider documentation",
                "Remove unsupported options for this model",
            ],
            Some(ANTHROPIC_ERROR_DOCS),
            None,
        ),
        K::InvalidModel => entry(
            kind,
            S::Medium,
            C::Validation,
            false,
            "The requested model name is not valid.",
            "HTTP {status}: invalid model: {detail}",
            &["Check the model identifier for typos", "Pick a model listed by the provider"],
            None,
            None,
        ),
        K::ModelNotFound => entry(
            kind,
            S::Medium,
            C::Client,
            false,
            "The requested model does not exist or is not available to you.",
            "HTTP {status}: model not found: {detail}",
            &[
                "Check the model identifier",
                "Confirm your account has access to this model",
            ],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::ResourceNotFound => entry(
            kind,
            S::Medium,
            C::Client,
            false,
            "The requested endpoint or resource was not found.",
            "HTTP {status}: resource not found: {detail}",
            &["Check the base URL and endpoint path"],
            None,
            None,
        ),
        K::InvalidToolFormat => entry(
            kind,
            S::Medium,
            C::Validation,
            false,
            "The model produced tool-call arguments that are not valid JSON.",
            "invalid tool call arguments: {detail}",
            &[
                "Retry the request; the model may produce valid arguments next time",
                "Simplify the tool's parameter schema",
            ],
            None,
            None,
        ),
        K::ContextLengthExceeded => entry(
            kind,
            S::Medium,
            C::Validation,
            false,
            "The conversation is too long for this model.",
            "HTTP {status}: context length exceeded: {detail}",
            &[
                "Shorten the prompt or drop earlier messages",
                "Lower the maximum output tokens",
                "Use a model with a larger context window",
            ],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::RateLimitExceeded => entry(
            kind,
            S::Medium,
            C::Client,
            true,
            "Too many requests. The provider is rate limiting this key.",
            "HTTP {status}: rate limit exceeded: {detail}",
            &[
                "Wait before retrying",
                "Reduce request frequency or concurrency",
            ],
            Some(ANTHROPIC_RATE_LIMIT_DOCS),
            Some("a few seconds to a minute"),
        ),
        K::QuotaExceeded => entry(
            kind,
            S::High,
            C::Client,
            false,
            "The account has run out of quota or credits.",
            "HTTP {status}: quota exceeded: {detail}",
            &[
                "Check billing and usage limits in the provider console",
                "Add credits or raise the spending limit",
            ],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::ServerError => entry(
            kind,
            S::High,
            C::Server,
            true,
            "The provider had an internal error.",
            "HTTP {status}: server error: {detail}",
            &["Retry the request after a short delay", "Check the provider status page"],
            Some(ANTHROPIC_ERROR_DOCS),
            Some("a few minutes"),
        ),
        K::ServiceUnavailable => entry(
            kind,
            S::High,
            C::Server,
            true,
            "The provider is temporarily unavailable.",
            "HTTP {status}: service unavailable: {detail}",
            &["Retry the request after a short delay", "Check the provider status page"],
            Some(ANTHROPIC_ERROR_DOCS),
            Some("a few minutes"),
        ),
        K::ModelUnavailable => entry(
            kind,
            S::High,
            C::Server,
            true,
            "The model is overloaded or temporarily unavailable.",
            "HTTP {status}: model unavailable: {detail}",
            &["Retry the request after a short delay", "Try a different model"],
            Some(ANTHROPIC_ERROR_DOCS),
            Some("a few minutes"),
        ),
        K::GatewayTimeout => entry(
            kind,
            S::Medium,
            C::Server,
            true,
            "The provider's gateway timed out.",
            "HTTP {status}: gateway timeout: {detail}",
            &["Retry the request", "Reduce the size of the request"],
            None,
            Some("a few minutes"),
        ),
        K::RequestTimeout => entry(
            kind,
            S::Medium,
            C::Network,
            true,
            "The request timed out.",
            "request timed out: {detail}",
            &["Retry the request", "Increase the request timeout"],
            None,
            Some("immediately on retry"),
        ),
        K::NetworkError => entry(
            kind,
            S::Medium,
            C::Network,
            true,
            "A network error prevented the request from completing.",
            "network error: {detail}",
            &["Check your internet connection", "Retry the request"],
            None,
            Some("depends on your connection"),
        ),
        K::ConnectionRefused => entry(
            kind,
            S::High,
            C::Network,
            true,
            "The server refused the connection.",
            "connection refused: {detail}",
            &[
                "Check that the base URL and port are correct",
                "Make sure the server is running",
            ],
            None,
            None,
        ),
        K::ConnectionReset => entry(
            kind,
            S::Medium,
            C::Network,
            true,
            "The connection was closed unexpectedly.",
            "connection reset: {detail}",
            &["Retry the request", "Check for proxies or firewalls closing idle connections"],
            None,
            Some("immediately on retry"),
        ),
        K::DnsFailure => entry(
            kind,
            S::High,
            C::Network,
            true,
            "The server's hostname could not be resolved.",
            "DNS lookup failed: {detail}",
            &["Check the hostname in the base URL", "Check your DNS settings"],
            None,
            None,
        ),
        K::TlsError => entry(
            kind,
            S::High,
            C::Network,
            true,
            "A secure connection to the server could not be established.",
            "TLS error: {detail}",
            &[
                "Check that the base URL uses the correct scheme",
                "Check system certificates and any intercepting proxy",
            ],
            None,
            None,
        ),
        K::ResponseParsingError => entry(
            kind,
            S::Medium,
            C::Server,
            false,
            "The provider's response could not be read.",
            "HTTP {status}: failed to parse response: {detail}",
            &["Check that the base URL points at a compatible API"],
            None,
            None,
        ),
        K::MalformedResponse => entry(
            kind,
            S::Medium,
            C::Server,
            false,
            "The provider returned a response in an unexpected format.",
            "HTTP {status}: malformed response: {detail}",
            &[
                "Check that the base URL points at a compatible API",
                "Report the issue to the provider if it persists",
            ],
            None,
            None,
        ),
        K::StreamError => entry(
            kind,
            S::Medium,
            C::Server,
            false,
            "The response stream contained invalid data.",
            "stream error: {detail}",
            &["Retry the request", "Check that the streaming format matches the provider"],
            None,
            None,
        ),
        K::StreamInterrupted => entry(
            kind,
            S::Medium,
            C::Network,
            true,
            "The response stream ended before it was complete.",
            "stream interrupted: {detail}",
            &["Retry the request", "Check your network connection"],
            None,
            Some("immediately on retry"),
        ),
        K::ContentFiltered => entry(
            kind,
            S::Medium,
            C::Client,
            false,
            "The request or response was blocked by the provider's content policy.",
            "HTTP {status}: content filtered: {detail}",
            &["Rephrase the request", "Review the provider's usage policies"],
            Some(OPENAI_ERROR_DOCS),
            None,
        ),
        K::ConfigurationError => entry(
            kind,
            S::High,
            C::Configuration,
            false,
            "The client is not configured correctly.",
            "configuration error: {detail}",
            &["Review the client configuration values"],
            None,
            None,
        ),
        K::InvalidBaseUrl => entry(
            kind,
            S::High,
            C::Configuration,
            false,
            "The API base URL is not valid.",
            "invalid base URL: {detail}",
            &["Use an absolute http:// or https:// URL for the base URL"],
            None,
            None,
        ),
        K::Cancelled => entry(
            kind,
            S::Low,
            C::Client,
            false,
            "The request was cancelled.",
            "request cancelled: {detail}",
            &[],
            None,
            None,
        ),
        K::ApiError => entry(
            kind,
            S::Medium,
            C::Client,
            false,
            "The provider returned an error.",
            "HTTP {status}: API error: {detail}",
            &["Check the error details", "Retry later if the problem persists"],
            None,
            None,
        ),
        K::UnknownError => entry(
            kind,
            S::Medium,
            C::Server,
            false,
            "An unexpected error occurred.",
            "unknown error: {detail}",
            &["Retry the request", "Report the issue if it keeps happening"],
            None,
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_its_own_metadata() {
        for kind in ErrorKind::iter() {
            assert_eq!(kind.metadata().kind, kind);
        }
        assert_eq!(ErrorKind::iter().count(), ErrorKind::count());
    }

    #[test]
    fn cancelled_is_never_retryable() {
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert_eq!(ErrorKind::Cancelled.severity(), Severity::Low);
    }

    #[test]
    fn unknown_error_is_medium_and_not_retryable() {
        let meta = ErrorKind::UnknownError.metadata();
        assert_eq!(meta.severity, Severity::Medium);
        assert!(!meta.retryable);
    }

    #[test]
    fn network_kinds_are_retryable() {
        for kind in ErrorKind::iter().filter(|k| k.category() == ErrorCategory::Network) {
            assert!(kind.is_retryable(), "{kind} should be retryable");
        }
    }

    #[test]
    fn technical_message_fills_placeholders() {
        let meta = ErrorKind::ServerError.metadata();
        assert_eq!(
            meta.technical_message(Some(500), "boom"),
            "HTTP 500: server error: boom"
        );
        let meta = ErrorKind::NetworkError.metadata();
        assert_eq!(meta.technical_message(None, "reset"), "network error: reset");
    }

    #[test]
    fn kind_names_round_trip_through_strings() {
        assert_eq!(ErrorKind::RateLimitExceeded.to_string(), "RATE_LIMIT_EXCEEDED");
        let parsed: ErrorKind = "MALFORMED_RESPONSE".parse().unwrap();
        assert_eq!(parsed, ErrorKind::MalformedResponse);
    }
}
