//! Token usage reported by a stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    /// Fold in a newer report. Vendors send running totals, so each
    /// counter keeps the larger value and never decreases.
    pub fn absorb(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.total_tokens = self
            .total_tokens
            .max(other.total_tokens)
            .max(self.input_tokens.saturating_add(self.output_tokens));
        absorb_opt(&mut self.cache_read_tokens, other.cache_read_tokens);
        absorb_opt(&mut self.cache_creation_tokens, other.cache_creation_tokens);
        absorb_opt(&mut self.reasoning_tokens, other.reasoning_tokens);
    }

    /// Usage object in the delta-JSON shape
    /// (`prompt_tokens`, `completion_tokens`, `total_tokens`).
    pub fn from_delta_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let input_tokens = count(obj.get("prompt_tokens"));
        let output_tokens = count(obj.get("completion_tokens"));
        Some(Self {
            input_tokens,
            output_tokens,
            total_tokens: obj
                .get("total_tokens")
                .and_then(Value::as_u64)
                .map(clamp)
                .unwrap_or(input_tokens.saturating_add(output_tokens)),
            cache_read_tokens: value
                .pointer("/prompt_tokens_details/cached_tokens")
                .and_then(Value::as_u64)
                .map(clamp),
            cache_creation_tokens: None,
            reasoning_tokens: value
                .pointer("/completion_tokens_details/reasoning_tokens")
                .and_then(Value::as_u64)
                .map(clamp),
        })
    }

    /// Usage object in the typed-event shape (`input_tokens`, `output_tokens`).
    pub fn from_typed_event(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let input_tokens = count(obj.get("input_tokens"));
        let output_tokens = count(obj.get("output_tokens"));
        Some(Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cache_read_tokens: obj
                .get("cache_read_input_tokens")
                .and_then(Value::as_u64)
                .map(clamp),
            cache_creation_tokens: obj
                .get("cache_creation_input_tokens")
                .and_then(Value::as_u64)
                .map(clamp),
            reasoning_tokens: None,
        })
    }
}

fn absorb_opt(slot: &mut Option<u32>, other: Option<u32>) {
    if let Some(v) = other {
        let current = slot.get_or_insert(0);
        *current = (*current).max(v);
    }
}

fn count(value: Option<&Value>) -> u32 {
    value.and_then(Value::as_u64).map(clamp).unwrap_or(0)
}

fn clamp(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
