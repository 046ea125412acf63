//! User-facing rendering of classified errors.

use serde::Serialize;

use super::{ClassifiedError, ErrorCategory, ErrorKind, Severity};

/// A classified error prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserFacingError {
    pub user_message: String,
    pub technical_details: String,
    pub recovery_suggestions: Vec<String>,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_resolution_time: Option<String>,
}

impl From<&ClassifiedError> for UserFacingError {
    fn from(err: &ClassifiedError) -> Self {
        format(err)
    }
}

/// Build the display form of `err`.
pub fn format(err: &ClassifiedError) -> UserFacingError {
    let meta = err.metadata();

    let mut recovery_suggestions = Vec::with_capacity(meta.recovery_steps.len() + 1);
    if let Some(seconds) = err.retry_after_seconds() {
        recovery_suggestions.push(format!(
            "Wait at least {} before retrying",
            describe_seconds(seconds)
        ));
    }
    recovery_suggestions.extend(meta.recovery_steps.iter().map(|s| s.to_string()));

    let estimated_resolution_time = match err.retry_after_seconds() {
        Some(seconds) => Some(describe_seconds(seconds)),
        None => meta.estimated_resolution_time.map(str::to_string),
    };

    UserFacingError {
        user_message: meta.user_message.to_string(),
        technical_details: err.to_string(),
        recovery_suggestions,
        severity: meta.severity,
        category: meta.category,
        is_retryable: err.is_retryable(),
        doc_url: meta.doc_url.map(str::to_string),
        estimated_resolution_time,
    }
}

/// Whether the fix lies in the caller's configuration.
pub fn is_configuration_error(err: &ClassifiedError) -> bool {
    err.category() == ErrorCategory::Configuration
}

/// Whether the failure is a transient server or network condition.
pub fn is_temporary_service_error(err: &ClassifiedError) -> bool {
    matches!(err.category(), ErrorCategory::Server | ErrorCategory::Network) && err.is_retryable()
}

/// Extra, kind-specific recovery steps.
pub fn contextual_help(kind: ErrorKind) -> &'static [&'static str] {
    match kind {
        ErrorKind::ApiKeyMissing => &[
            "Set the credential environment variable (for example OPENAI_API_KEY or ANTHROPIC_API_KEY)",
            "Or pass the API key explicitly when creating the provider",
        ],
        ErrorKind::ApiKeyInvalid | ErrorKind::AuthenticationError => &[
            "Check for stray whitespace or quotes around the key",
            "Confirm the key matches the provider's authentication mode (bearer or x-api-key)",
        ],
        ErrorKind::InvalidBaseUrl => &[
            "Include the scheme, for example https://api.example.com/v1",
            "Check the base URL environment variable if one is set",
        ],
        ErrorKind::RateLimitExceeded => &[
            "Lower the number of parallel requests",
            "Raise the retry budget so the client can wait out the limit",
        ],
        ErrorKind::QuotaExceeded => &["Check the billing page of the provider console"],
        ErrorKind::ContextLengthExceeded => &[
            "Summarize or drop older messages",
            "Reduce the maximum output tokens",
        ],
        ErrorKind::ModelNotFound | ErrorKind::InvalidModel => &[
            "List the models available to your key",
            "Check whether the model has been renamed or retired",
        ],
        ErrorKind::InvalidToolFormat => &["Keep tool parameter schemas small and strictly typed"],
        ErrorKind::RequestTimeout | ErrorKind::GatewayTimeout => &[
            "Increase the per-attempt timeout",
            "Use streaming for long generations",
        ],
        ErrorKind::StreamError | ErrorKind::MalformedResponse => &[
            "Make sure the stream format matches the provider (delta JSON or typed events)",
        ],
        ErrorKind::ConnectionRefused | ErrorKind::DnsFailure | ErrorKind::TlsError => &[
            "Try opening the base URL from the same machine",
            "Check proxy environment variables such as HTTPS_PROXY",
        ],
        _ => &[],
    }
}

/// One line: the user message, plus a retry hint when applicable.
pub fn render_simple(err: &ClassifiedError) -> String {
    let formatted = format(err);
    if formatted.is_retryable {
        format!("{} You can try again.", formatted.user_message)
    } else {
        formatted.user_message
    }
}

/// User message, technical details, and numbered recovery steps.
pub fn render_detailed(err: &ClassifiedError) -> String {
    render(&format(err), &[])
}

/// Like [`render_detailed`] with [`contextual_help`] appended to the steps.
pub fn render_with_help(err: &ClassifiedError) -> String {
    render(&format(err), contextual_help(err.kind()))
}

fn render(formatted: &UserFacingError, extra: &[&str]) -> String {
    let mut out = format!(
        "{}\n\nDetails: {}\nSeverity: {} | Category: {} | Retryable: {}",
        formatted.user_message,
        formatted.technical_details,
        formatted.severity,
        formatted.category,
        if formatted.is_retryable { "yes" } else { "no" },
    );

    let steps: Vec<&str> = formatted
        .recovery_suggestions
        .iter()
        .map(String::as_str)
        .chain(extra.iter().copied())
        .collect();
    if !steps.is_empty() {
        out.push_str("\n\nWhat you can do:");
        for (i, step) in steps.iter().enumerate() {
            out.push_str(&format!("\n  {}. {}", i + 1, step));
        }
    }
    if let Some(ref eta) = formatted.estimated_resolution_time {
        out.push_str(&format!("\n\nExpected resolution: {eta}"));
    }
    if let Some(ref url) = formatted.doc_url {
        out.push_str(&format!("\nMore information: {url}"));
    }
    out
}

fn describe_seconds(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{}ms", (seconds * 1000.0).round() as u64)
    } else if seconds.fract() == 0.0 {
        let whole = seconds as u64;
        if whole == 1 {
            "1 second".to_string()
        } else {
            format!("{whole} seconds")
        }
    } else {
        format!("{seconds:.1} seconds")
    }
}
