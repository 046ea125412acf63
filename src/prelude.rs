//! Convenience re-exports for common use.

pub use crate::config::{AuthMode, Credentials, RequestConfig, StreamFormat, TransportSettings};
pub use crate::error::classify::classify;
pub use crate::error::format::{format as format_error, render_detailed, render_simple, render_with_help};
pub use crate::error::{ClassifiedError, ErrorCategory, ErrorKind, Result, Severity, UserFacingError};
pub use crate::provider::TransportClient;
pub use crate::stream::collect_stream;
pub use crate::types::{
    FinishReason, ProviderEventStream, ProviderStreamEvent, StreamTextResult, ToolCall, Usage,
};
