//! Tool-call argument accumulation.
//!
//! Argument JSON arrives as arbitrary string fragments. Fragments are only
//! concatenated while streaming; parsing happens once, when the call is
//! closed.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{ClassifiedError, ErrorKind};
use crate::types::{ProviderStreamEvent, ToolCall};

/// One in-progress tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
    /// Complete input sent with the opening event, used when no fragments
    /// follow.
    pub initial_input: Option<Value>,
}

impl ToolCallAccumulator {
    /// Parse the accumulated arguments. Empty arguments mean `{}`.
    pub fn finish(self) -> Result<ToolCall, ClassifiedError> {
        let arguments = if self.arguments.trim().is_empty() {
            self.initial_input
                .unwrap_or_else(|| Value::Object(Map::new()))
        } else {
            serde_json::from_str(&self.arguments).map_err(|e| {
                ClassifiedError::new(
                    ErrorKind::InvalidToolFormat,
                    format!("arguments of tool call {} ({}) are not valid JSON: {e}", self.id, self.name),
                )
                .with_raw_body(self.arguments.clone())
                .with_source(e)
            })?
        };
        Ok(ToolCall {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

/// Open tool calls keyed by stream index.
#[derive(Debug, Default)]
pub struct ToolCallSet {
    open: BTreeMap<u32, ToolCallAccumulator>,
    opened: usize,
}

impl ToolCallSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.open.contains_key(&index)
    }

    /// Whether any tool call was opened during the stream.
    pub fn any_opened(&self) -> bool {
        self.opened > 0
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Open a call at `index`, or fill in an id or name the opening
    /// fragment lacked. Returns `ToolCallStart` the first time only.
    pub fn open(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        initial_input: Option<Value>,
    ) -> Option<ProviderStreamEvent> {
        let id = id.filter(|s| !s.is_empty());
        let name = name.filter(|s| !s.is_empty());

        if let Some(existing) = self.open.get_mut(&index) {
            if let Some(name) = name.filter(|_| existing.name.is_empty()) {
                existing.name = name.to_string();
            }
            return None;
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        let name = name.unwrap_or_default().to_string();
        self.open.insert(
            index,
            ToolCallAccumulator {
                index,
                id: id.clone(),
                name: name.clone(),
                arguments: String::new(),
                initial_input: initial_input.filter(|v| v.as_object().is_some_and(|o| !o.is_empty())),
            },
        );
        self.opened += 1;
        Some(ProviderStreamEvent::ToolCallStart { index, id, name })
    }

    /// Append a fragment. Returns `ToolCallDelta` unless the index is not
    /// open or the fragment is empty.
    pub fn append(&mut self, index: u32, fragment: &str) -> Option<ProviderStreamEvent> {
        if fragment.is_empty() {
            return None;
        }
        let call = self.open.get_mut(&index)?;
        call.arguments.push_str(fragment);
        Some(ProviderStreamEvent::ToolCallDelta {
            index,
            id: call.id.clone(),
            arguments_delta: fragment.to_string(),
        })
    }

    /// Close one call.
    pub fn close(&mut self, index: u32) -> Option<Result<ToolCall, ClassifiedError>> {
        self.open.remove(&index).map(ToolCallAccumulator::finish)
    }

    /// Close every open call in index order.
    pub fn close_all(&mut self) -> Vec<Result<ToolCall, ClassifiedError>> {
        std::mem::take(&mut self.open)
            .into_values()
            .map(ToolCallAccumulator::finish)
            .collect()
    }
}

/// Turn closed calls into events. Stops at the first parse failure, which
/// becomes the terminal error.
pub fn closed_events(closed: Vec<Result<ToolCall, ClassifiedError>>) -> Vec<ProviderStreamEvent> {
    let mut events = Vec::with_capacity(closed.len());
    for result in closed {
        match result {
            Ok(call) => events.push(ProviderStreamEvent::ToolCall(call)),
            Err(e) => {
                events.push(ProviderStreamEvent::Error(e));
                break;
            }
        }
    }
    events
}
