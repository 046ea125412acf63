//! Provider-agnostic streaming events.

use futures::stream::BoxStream;

use super::generation::{FinishReason, ToolCall};
use super::usage::Usage;
use crate::error::ClassifiedError;

/// One event of a provider stream.
///
/// A stream yields any number of non-terminal events followed by exactly
/// one terminal event (`Finish` or `Error`). Nothing follows a terminal
/// event.
#[derive(Debug, Clone)]
pub enum ProviderStreamEvent {
    /// Incremental assistant text, as received.
    TextDelta { text: String },
    /// Incremental reasoning ("thinking") text.
    ReasoningDelta { text: String },
    /// A tool call was opened.
    ToolCallStart { index: u32, id: String, name: String },
    /// A raw fragment of a tool call's JSON arguments.
    ToolCallDelta {
        index: u32,
        id: String,
        arguments_delta: String,
    },
    /// A tool call whose arguments were fully received and parsed.
    ToolCall(ToolCall),
    Finish { reason: FinishReason, usage: Usage },
    Error(ClassifiedError),
}

impl ProviderStreamEvent {
    /// Returns true for `Finish` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error(_))
    }

    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Lazy, pull-based stream of provider events.
pub type ProviderEventStream = BoxStream<'static, ProviderStreamEvent>;

/// Final result after consuming a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamTextResult {
    /// Full accumulated text.
    pub text: String,
    /// Full accumulated reasoning text.
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}
