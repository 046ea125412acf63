//! Reducer for the typed-event format.
//!
//! Content blocks are addressed by index: `content_block_start` opens one,
//! deltas extend it, `content_block_stop` closes it. A `tool_use` block
//! becomes a tool call when it closes. `message_delta` carries the stop
//! reason and output usage; `message_stop` ends the stream.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use super::tool_calls::{closed_events, ToolCallSet};
use super::Reducer;
use crate::error::classify::{classify, Outcome};
use crate::error::{ClassifiedError, ErrorKind};
use crate::sse::typed::{decode, TypedEvent};
use crate::sse::SseRecord;
use crate::types::{FinishReason, ProviderStreamEvent, Usage};

#[derive(Debug, Default)]
pub struct TypedReducer {
    tools: ToolCallSet,
    /// Indices of open non-tool blocks (text, thinking, ...).
    open_blocks: BTreeSet<u32>,
    usage: Usage,
    stop_reason: Option<FinishReason>,
    finished: bool,
}

impl TypedReducer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, err: ClassifiedError) -> Vec<ProviderStreamEvent> {
        self.finished = true;
        vec![ProviderStreamEvent::Error(err)]
    }

    fn absorb_usage(&mut self, usage: Option<&Value>) {
        if let Some(usage) = usage.and_then(Usage::from_typed_event) {
            self.usage.absorb(&usage);
        }
    }

    fn block_index(data: &Value) -> u32 {
        data.get("index").and_then(Value::as_u64).unwrap_or(0) as u32
    }

    fn on_block_start(&mut self, data: &Value) -> Vec<ProviderStreamEvent> {
        let index = Self::block_index(data);
        let Some(block) = data.get("content_block") else {
            self.open_blocks.insert(index);
            return Vec::new();
        };
        let mut events = Vec::new();
        match block.get("type").and_then(Value::as_str).unwrap_or_default() {
            "tool_use" | "server_tool_use" => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                events.extend(self.tools.open(index, id, name, block.get("input").cloned()));
            }
            "text" => {
                self.open_blocks.insert(index);
                if let Some(text) = block.get("text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
                    events.push(ProviderStreamEvent::TextDelta {
                        text: text.to_string(),
                    });
                }
            }
            "thinking" => {
                self.open_blocks.insert(index);
                if let Some(text) = block.get("thinking").and_then(Value::as_str).filter(|t| !t.is_empty()) {
                    events.push(ProviderStreamEvent::ReasoningDelta {
                        text: text.to_string(),
                    });
                }
            }
            _ => {
                self.open_blocks.insert(index);
            }
        }
        events
    }

    fn on_block_delta(&mut self, data: &Value) -> Vec<ProviderStreamEvent> {
        let index = Self::block_index(data);
        if !self.tools.contains(index) && !self.open_blocks.contains(&index) {
            return self.fail(ClassifiedError::new(
                ErrorKind::StreamError,
                format!("content_block_delta for block {index}, which was never started"),
            ));
        }
        let Some(delta) = data.get("delta") else {
            return Vec::new();
        };
        let field = |name: &str| delta.get(name).and_then(Value::as_str).unwrap_or_default();

        match delta.get("type").and_then(Value::as_str).unwrap_or_default() {
            "text_delta" if !field("text").is_empty() => vec![ProviderStreamEvent::TextDelta {
                text: field("text").to_string(),
            }],
            "thinking_delta" if !field("thinking").is_empty() => {
                vec![ProviderStreamEvent::ReasoningDelta {
                    text: field("thinking").to_string(),
                }]
            }
            "input_json_delta" => self.tools.append(index, field("partial_json")).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn on_block_stop(&mut self, data: &Value) -> Vec<ProviderStreamEvent> {
        let index = Self::block_index(data);
        self.open_blocks.remove(&index);
        let Some(closed) = self.tools.close(index) else {
            return Vec::new();
        };
        let events = closed_events(vec![closed]);
        if events.last().and_then(ProviderStreamEvent::as_error).is_some() {
            self.finished = true;
        }
        events
    }

    fn on_message_stop(&mut self) -> Vec<ProviderStreamEvent> {
        let mut events = closed_events(self.tools.close_all());
        if events.last().and_then(ProviderStreamEvent::as_error).is_some() {
            self.finished = true;
            return events;
        }
        let reason = self.stop_reason.take().unwrap_or(if self.tools.any_opened() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        });
        self.finished = true;
        events.push(ProviderStreamEvent::Finish {
            reason,
            usage: self.usage.clone(),
        });
        events
    }
}

impl Reducer for TypedReducer {
    fn on_record(&mut self, record: &SseRecord) -> Vec<ProviderStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let event = match decode(record) {
            Ok(Some(event)) => event,
            Ok(None) => return Vec::new(),
            Err(e) => return self.fail(e),
        };

        match event {
            TypedEvent::MessageStart(data) => {
                self.absorb_usage(data.get("message").and_then(|m| m.get("usage")));
                Vec::new()
            }
            TypedEvent::ContentBlockStart(data) => self.on_block_start(&data),
            TypedEvent::ContentBlockDelta(data) => self.on_block_delta(&data),
            TypedEvent::ContentBlockStop(data) => self.on_block_stop(&data),
            TypedEvent::MessageDelta(data) => {
                if let Some(reason) = data
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    self.stop_reason = Some(FinishReason::from_vendor(reason));
                }
                self.absorb_usage(data.get("usage"));
                Vec::new()
            }
            TypedEvent::MessageStop(_) => self.on_message_stop(),
            TypedEvent::Ping => Vec::new(),
            TypedEvent::Error(data) => self.fail(classify(Outcome::VendorError(&data))),
            TypedEvent::Unknown { name, .. } => {
                debug!(event = name.as_str(), "Ignoring unknown stream event");
                Vec::new()
            }
        }
    }

    fn on_end(&mut self) -> Vec<ProviderStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.fail(ClassifiedError::new(
            ErrorKind::StreamInterrupted,
            "stream ended before message_stop",
        ))
    }
}
