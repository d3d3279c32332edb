//! Streamed response events.
//!
//! Responses streams (SSE) and realtime sessions (WebSocket) both deliver JSON
//! objects tagged by a `type` field. Both are folded into [`StreamEvent`] here,
//! chat-completions chunks are mapped in `chat.rs`.

use crate::error::{LlmError, Result};
use crate::sse::SseEvent;
use crate::types::Usage;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental text fragment.
    TextDelta { delta: String },
    /// A text part finished. Carries the full part text when the server sends it.
    TextDone { text: Option<String> },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { arguments: String },
    /// Terminal: the response is complete.
    ResponseDone {
        status: Option<String>,
        usage: Option<Usage>,
    },
    /// An event type this crate does not interpret.
    Unknown { kind: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::ResponseDone { .. })
    }

    /// Maps one Responses/realtime server event onto a `StreamEvent`.
    ///
    /// `error` and `response.failed` events become `Err(LlmError::Remote)`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
            return Err(LlmError::StreamParse(format!(
                "event missing type field: {value}"
            )));
        };

        let event = match kind {
            "response.output_text.delta" | "response.text.delta" => StreamEvent::TextDelta {
                delta: str_field(value, "delta").unwrap_or_default(),
            },
            "response.output_text.done" | "response.text.done" => StreamEvent::TextDone {
                text: str_field(value, "text"),
            },
            "response.output_item.added" => {
                let item = value.get("item");
                let is_call = item
                    .and_then(|i| i.get("type"))
                    .and_then(|t| t.as_str())
                    == Some("function_call");
                match item.filter(|_| is_call) {
                    Some(item) => StreamEvent::ToolCallStart {
                        id: str_field(item, "call_id")
                            .or_else(|| str_field(item, "id"))
                            .unwrap_or_default(),
                        name: str_field(item, "name").unwrap_or_default(),
                    },
                    None => StreamEvent::Unknown {
                        kind: kind.to_string(),
                    },
                }
            }
            "response.function_call_arguments.delta" => StreamEvent::ToolCallDelta {
                arguments: str_field(value, "delta").unwrap_or_default(),
            },
            "response.completed" | "response.incomplete" | "response.done" => {
                let response = value.get("response");
                StreamEvent::ResponseDone {
                    status: response.and_then(|r| str_field(r, "status")),
                    usage: response.and_then(|r| r.get("usage")).and_then(usage_from),
                }
            }
            "error" | "response.failed" => return Err(LlmError::Remote(error_message(value))),
            other => StreamEvent::Unknown {
                kind: other.to_string(),
            },
        };
        Ok(event)
    }

    /// Parses a raw JSON payload (one SSE `data:` block or one WebSocket text frame).
    pub fn from_json(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| LlmError::StreamParse(format!("event json error={e} data={data}")))?;
        Self::from_value(&value)
    }
}

/// Maps decoded SSE frames of a responses stream onto [`StreamEvent`]s.
pub(crate) fn response_events<S>(sse: S) -> EventStream
where
    S: Stream<Item = Result<SseEvent>> + Send + 'static,
{
    let events = sse.filter_map(|frame| async move {
        match frame {
            Ok(SseEvent::Data(data)) if data.trim() == "[DONE]" => None,
            Ok(SseEvent::Data(data)) => Some(StreamEvent::from_json(&data)),
            Ok(SseEvent::Other) => None,
            Err(e) => Some(Err(e)),
        }
    });
    Box::pin(events)
}

fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

// Responses usage uses input/output names, realtime and chat use prompt/completion.
fn usage_from(value: &serde_json::Value) -> Option<Usage> {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| value.get(*n).and_then(|v| v.as_u64()))
    };
    let prompt = field(&["input_tokens", "prompt_tokens"]);
    let completion = field(&["output_tokens", "completion_tokens"]);
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    Some(Usage {
        prompt_tokens: saturate(prompt),
        completion_tokens: saturate(completion),
    })
}

fn saturate(count: Option<u64>) -> u32 {
    count.map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn error_message(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .or_else(|| {
            value
                .get("response")
                .and_then(|r| r.get("error"))
                .and_then(|e| e.get("message"))
        })
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("stream error without message")
        .to_string()
}
