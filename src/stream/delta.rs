//! Reducer for the delta-JSON format.
//!
//! Chunks carry `choices[0].delta` with `content`, `reasoning_content` and
//! `tool_calls`. The chunk with `finish_reason` closes the tool calls.
//! Usage may ride on that chunk or on the next one; when the request asked
//! for usage, `Finish` waits one chunk (or `[DONE]`, or the end of the
//! body) for it. Otherwise it is emitted with the `finish_reason` chunk.

use serde_json::Value;

use super::tool_calls::{closed_events, ToolCallSet};
use super::Reducer;
use crate::error::classify::{classify, Outcome};
use crate::error::{ClassifiedError, ErrorKind};
use crate::sse::delta::{decode, DeltaFrame};
use crate::sse::SseRecord;
use crate::types::{FinishReason, ProviderStreamEvent, Usage};

#[derive(Debug)]
pub struct DeltaReducer {
    tools: ToolCallSet,
    usage: Usage,
    await_usage: bool,
    pending_finish: Option<FinishReason>,
    finished: bool,
}

impl Default for DeltaReducer {
    fn default() -> Self {
        Self {
            tools: ToolCallSet::default(),
            usage: Usage::default(),
            await_usage: true,
            pending_finish: None,
            finished: false,
        }
    }
}

impl DeltaReducer {
    /// A reducer that waits one chunk after `finish_reason` for usage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `Finish` waits for a trailing usage chunk. Turn this off
    /// when the request did not ask for usage, so a server that goes quiet
    /// after `finish_reason` does not hold the consumer.
    pub fn awaiting_usage(mut self, await_usage: bool) -> Self {
        self.await_usage = await_usage;
        self
    }

    /// Whether a request body asks for a trailing usage chunk.
    pub fn requests_usage(body: &Value) -> bool {
        body.pointer("/stream_options/include_usage")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn finish(&mut self, reason: FinishReason) -> ProviderStreamEvent {
        self.finished = true;
        ProviderStreamEvent::Finish {
            reason,
            usage: self.usage.clone(),
        }
    }

    fn fail(&mut self, err: ClassifiedError) -> Vec<ProviderStreamEvent> {
        self.finished = true;
        vec![ProviderStreamEvent::Error(err)]
    }

    fn absorb_usage(&mut self, chunk: &Value) -> bool {
        match chunk.get("usage").and_then(Usage::from_delta_json) {
            Some(usage) => {
                self.usage.absorb(&usage);
                true
            }
            None => false,
        }
    }

    /// Close open tool calls. Returns their events and whether one failed.
    fn close_tools(&mut self) -> (Vec<ProviderStreamEvent>, bool) {
        let events = closed_events(self.tools.close_all());
        let failed = events.last().is_some_and(ProviderStreamEvent::is_terminal);
        if failed {
            self.finished = true;
        }
        (events, failed)
    }

    fn on_chunk(&mut self, chunk: Value) -> Vec<ProviderStreamEvent> {
        let has_usage = self.absorb_usage(&chunk);

        if let Some(reason) = self.pending_finish.take() {
            return vec![self.finish(reason)];
        }

        let Some(choice) = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(ProviderStreamEvent::TextDelta {
                        text: text.to_string(),
                    });
                }
            }
            let reasoning = delta
                .get("reasoning_content")
                .or_else(|| delta.get("reasoning"))
                .and_then(Value::as_str);
            if let Some(text) = reasoning.filter(|t| !t.is_empty()) {
                events.push(ProviderStreamEvent::ReasoningDelta {
                    text: text.to_string(),
                });
            }
            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for (position, call) in calls.iter().enumerate() {
                    self.on_tool_fragment(position, call, &mut events);
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            let (closed, failed) = self.close_tools();
            events.extend(closed);
            if failed {
                return events;
            }
            let reason = FinishReason::from_vendor(reason);
            if has_usage || !self.await_usage {
                events.push(self.finish(reason));
            } else {
                self.pending_finish = Some(reason);
            }
        }
        events
    }

    fn on_tool_fragment(&mut self, position: usize, call: &Value, events: &mut Vec<ProviderStreamEvent>) {
        let index = call
            .get("index")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64) as u32;
        let function = call.get("function");
        let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
        let id = call.get("id").and_then(Value::as_str);

        if let Some(start) = self.tools.open(index, id, name, None) {
            events.push(start);
        }
        let fragment = function
            .and_then(|f| f.get("arguments"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(delta) = self.tools.append(index, fragment) {
            events.push(delta);
        }
    }

    fn on_done(&mut self) -> Vec<ProviderStreamEvent> {
        let reason = match self.pending_finish.take() {
            Some(reason) => reason,
            None => {
                let opened = self.tools.any_opened();
                let (mut events, failed) = self.close_tools();
                if failed {
                    return events;
                }
                let reason = if opened {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                };
                events.push(self.finish(reason));
                return events;
            }
        };
        vec![self.finish(reason)]
    }
}

impl Reducer for DeltaReducer {
    fn on_record(&mut self, record: &SseRecord) -> Vec<ProviderStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        match decode(record) {
            Err(e) => self.fail(e),
            Ok(None) => Vec::new(),
            Ok(Some(DeltaFrame::Done)) => self.on_done(),
            Ok(Some(DeltaFrame::Error(value))) => self.fail(classify(Outcome::VendorError(&value))),
            Ok(Some(DeltaFrame::Chunk(chunk))) => self.on_chunk(chunk),
        }
    }

    fn on_end(&mut self) -> Vec<ProviderStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        match self.pending_finish.take() {
            Some(reason) => vec![self.finish(reason)],
            None => self.fail(ClassifiedError::new(
                ErrorKind::StreamInterrupted,
                "stream ended before a finish reason was received",
            )),
        }
    }
}
