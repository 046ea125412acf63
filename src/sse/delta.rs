//! Decoder for the delta-JSON format: `data: <json>` records closed by
//! `data: [DONE]`.

use serde_json::Value;

use super::SseRecord;
use crate::error::{ClassifiedError, ErrorKind};

/// Terminal sentinel of the delta-JSON format.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded delta-JSON record.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaFrame {
    /// A completion chunk (`choices[].delta`, `usage`, ...).
    Chunk(Value),
    /// An in-band `{"error": ...}` payload.
    Error(Value),
    /// The `[DONE]` sentinel.
    Done,
}

/// Decode a record. Records without `data:` carry nothing and yield `None`.
pub fn decode(record: &SseRecord) -> Result<Option<DeltaFrame>, ClassifiedError> {
    let Some(data) = record.data.as_deref() else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_SENTINEL {
        return Ok(Some(DeltaFrame::Done));
    }

    let value: Value = serde_json::from_str(data).map_err(|e| {
        ClassifiedError::new(
            ErrorKind::StreamError,
            format!("stream chunk is not valid JSON: {e}"),
        )
        .with_raw_body(data)
        .with_source(e)
    })?;

    if record.event.as_deref() == Some("error") || value.get("error").is_some_and(|e| !e.is_null()) {
        return Ok(Some(DeltaFrame::Error(value)));
    }
    if !value.is_object() {
        return Err(ClassifiedError::new(
            ErrorKind::StreamError,
            format!("stream chunk is not a JSON object: {data}"),
        ));
    }
    Ok(Some(DeltaFrame::Chunk(value)))
}
