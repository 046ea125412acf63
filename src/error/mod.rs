//! Error types: taxonomy, classification, and user-facing formatting.

pub mod classify;
pub mod format;
pub mod taxonomy;

pub use classify::{ClassifierRules, NotFoundRule, Outcome};
pub use format::{contextual_help, UserFacingError};
pub use taxonomy::{ErrorCategory, ErrorKind, ErrorMetadata, Severity};

use std::sync::Arc;

use thiserror::Error;

type BoxedSource = Arc<dyn std::error::Error + Send + Sync>;

/// A failure that has been mapped onto the taxonomy.
///
/// Created once where the raw failure is first observed, then passed
/// around unchanged. Cloning shares the underlying source.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    raw_body: Option<String>,
    retry_after_seconds: Option<f64>,
    #[source]
    source: Option<BoxedSource>,
}

impl ClassifiedError {
    /// Create an error whose message is rendered from the kind's template.
    pub fn new(kind: ErrorKind, detail: impl AsRef<str>) -> Self {
        Self {
            message: kind.metadata().technical_message(None, detail.as_ref()),
            kind,
            http_status: None,
            raw_body: None,
            retry_after_seconds: None,
            source: None,
        }
    }

    /// Create an error for an HTTP response.
    pub fn http(kind: ErrorKind, status: u16, detail: impl AsRef<str>) -> Self {
        Self {
            message: kind
                .metadata()
                .technical_message(Some(status), detail.as_ref()),
            http_status: Some(status),
            ..Self::new(kind, "")
        }
    }

    /// Error for a request the caller cancelled.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancellation requested by caller")
    }

    /// Attach the response body; an empty body is ignored.
    pub fn with_raw_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.is_empty() {
            self.raw_body = Some(body);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: Option<f64>) -> Self {
        self.retry_after_seconds = seconds.filter(|s| s.is_finite() && *s >= 0.0);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// The taxonomy entry this error was mapped to.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn metadata(&self) -> &'static ErrorMetadata {
        self.kind.metadata()
    }

    /// Technical message for logs.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status code of the response, when one was received.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// Raw response body, if it was captured.
    pub fn raw_body(&self) -> Option<&str> {
        self.raw_body.as_deref()
    }

    /// Minimum delay the server asked for before the next attempt.
    pub fn retry_after_seconds(&self) -> Option<f64> {
        self.retry_after_seconds
    }

    pub fn severity(&self) -> Severity {
        self.metadata().severity
    }

    pub fn category(&self) -> ErrorCategory {
        self.metadata().category
    }

    /// Whether the request engine may retry after this error.
    pub fn is_retryable(&self) -> bool {
        self.kind != ErrorKind::Cancelled && self.metadata().retryable
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ClassifiedError>;
