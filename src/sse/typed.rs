//! Decoder for the typed-event format: `event: <name>` followed by
//! `data: <json>`.

use serde_json::{Map, Value};

use super::SseRecord;
use crate::error::{ClassifiedError, ErrorKind};

/// One decoded typed-event record.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    MessageStart(Value),
    ContentBlockStart(Value),
    ContentBlockDelta(Value),
    ContentBlockStop(Value),
    MessageDelta(Value),
    MessageStop(Value),
    Ping,
    Error(Value),
    /// An event name this decoder does not know; ignored downstream.
    Unknown { name: String, data: Value },
}

impl TypedEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::MessageStart(_) => "message_start",
            Self::ContentBlockStart(_) => "content_block_start",
            Self::ContentBlockDelta(_) => "content_block_delta",
            Self::ContentBlockStop(_) => "content_block_stop",
            Self::MessageDelta(_) => "message_delta",
            Self::MessageStop(_) => "message_stop",
            Self::Ping => "ping",
            Self::Error(_) => "error",
            Self::Unknown { name, .. } => name,
        }
    }
}

/// Decode a record.
///
/// The event name comes from the `event:` line, falling back to the
/// payload's `type` field. A missing payload decodes as `{}`.
pub fn decode(record: &SseRecord) -> Result<Option<TypedEvent>, ClassifiedError> {
    let data = match record.data.as_deref().map(str::trim) {
        None | Some("") => Value::Object(Map::new()),
        Some(text) => serde_json::from_str(text).map_err(|e| {
            ClassifiedError::new(
                ErrorKind::StreamError,
                format!("event payload is not valid JSON: {e}"),
            )
            .with_raw_body(text)
            .with_source(e)
        })?,
    };

    let name = match record.event.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match data.get("type").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None if record.data.is_none() => return Ok(None),
            None => {
                return Err(ClassifiedError::new(
                    ErrorKind::StreamError,
                    "typed event has neither an event name nor a type field",
                ))
            }
        },
    };

    let event = match name.as_str() {
        "message_start" => TypedEvent::MessageStart(data),
        "content_block_start" => TypedEvent::ContentBlockStart(data),
        "content_block_delta" => TypedEvent::ContentBlockDelta(data),
        "content_block_stop" => TypedEvent::ContentBlockStop(data),
        "message_delta" => TypedEvent::MessageDelta(data),
        "message_stop" => TypedEvent::MessageStop(data),
        "ping" => TypedEvent::Ping,
        "error" => TypedEvent::Error(data),
        _ => TypedEvent::Unknown { name, data },
    };
    Ok(Some(event))
}
