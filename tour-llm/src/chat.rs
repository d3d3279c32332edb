//! Chat Completions (`POST /chat/completions`) wire format.

use crate::error::{LlmError, Result};
use crate::events::{EventStream, StreamEvent};
use crate::sse::SseEvent;
use crate::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
use futures_util::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub(crate) struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<WireStreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

impl WireChatRequest {
    pub(crate) fn new(
        model: String,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Self {
        let mut out = Self {
            model,
            messages: messages.iter().map(to_wire_message).collect(),
            tools: tools.iter().map(to_wire_tool).collect(),
            tool_choice: None,
            response_format: None,
            stream: None,
            stream_options: None,
        };

        if !out.tools.is_empty() {
            out.tool_choice = Some("auto".to_string());
        }

        if stream {
            out.stream = Some(true);
            out.stream_options = Some(WireStreamOptions {
                include_usage: true,
            });
        }

        out
    }

    pub(crate) fn with_response_format(mut self, format: serde_json::Value) -> Self {
        self.response_format = Some(format);
        self
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

fn to_wire_tool(t: &ToolDefinition) -> WireTool {
    WireTool {
        r#type: "function".to_string(),
        function: WireToolFunction {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireToolFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireToolFunctionCall {
    name: String,
    arguments: String,
}

fn to_wire_message(m: &ChatMessage) -> WireMessage {
    WireMessage {
        role: m.role.as_str(),
        content: Some(m.content.clone()).filter(|s| !s.is_empty()),
        tool_calls: m
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                id: tc.id.clone(),
                r#type: "function".to_string(),
                function: WireToolFunctionCall {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect(),
        tool_call_id: m.tool_call_id.clone(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChatResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireChoiceToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceToolCall {
    id: String,
    #[serde(default)]
    function: WireChoiceToolCallFunction,
}

#[derive(Debug, Deserialize, Default)]
struct WireChoiceToolCallFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl TryFrom<WireChatResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: WireChatResponse) -> Result<Self> {
        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("chat response missing choices".to_string())
        })?;

        let usage = v.usage.map_or_else(Usage::default, |u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
                tool_call_id: None,
            },
            refusal: choice.message.refusal.filter(|r| !r.is_empty()),
            usage,
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireStreamDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDeltaToolCall {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireStreamDeltaToolFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDeltaToolFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallProgress {
    id: Option<String>,
    name: Option<String>,
    started: bool,
}

#[derive(Debug, Default)]
struct ChatStreamState {
    tool_calls: HashMap<u32, ToolCallProgress>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    pending: std::collections::VecDeque<StreamEvent>,
}

impl ChatStreamState {
    /// Queues the events carried by one chunk.
    fn absorb(&mut self, chunk: WireStreamChunk) {
        if let Some(u) = chunk.usage.as_ref() {
            self.usage = Some(Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
            });
        }

        // Usage-only chunks (and some proxies' keep-alives) carry no choices.
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.pending
                .push_back(StreamEvent::TextDelta { delta: content });
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let idx = tc.index.unwrap_or(0);
            let entry = self.tool_calls.entry(idx).or_default();
            if entry.id.is_none() {
                entry.id = tc.id.clone();
            }
            if entry.name.is_none() {
                entry.name = tc.function.as_ref().and_then(|f| f.name.clone());
            }

            if !entry.started {
                let (Some(id), Some(name)) = (entry.id.clone(), entry.name.clone()) else {
                    continue;
                };
                entry.started = true;
                self.pending
                    .push_back(StreamEvent::ToolCallStart { id, name });
            }

            let arguments = tc
                .function
                .and_then(|f| f.arguments)
                .unwrap_or_default();
            if !arguments.is_empty() {
                self.pending
                    .push_back(StreamEvent::ToolCallDelta { arguments });
            }
        }
    }

    fn done(&mut self) -> StreamEvent {
        StreamEvent::ResponseDone {
            status: self.finish_reason.take(),
            usage: self.usage.take(),
        }
    }
}

/// Maps decoded SSE frames of a chat-completions stream onto [`StreamEvent`]s.
pub(crate) fn chat_events<S>(sse: S) -> EventStream
where
    S: Stream<Item = Result<SseEvent>> + Send + 'static,
{
    let sse = Box::pin(sse);
    let stream = futures_util::stream::unfold(
        (sse, ChatStreamState::default(), false),
        |(mut sse, mut state, finished)| async move {
            loop {
                if let Some(ev) = state.pending.pop_front() {
                    return Some((Ok(ev), (sse, state, finished)));
                }
                if finished {
                    return None;
                }
                match sse.as_mut().next().await? {
                    Ok(SseEvent::Data(data)) => {
                        if data.trim() == "[DONE]" {
                            let done = state.done();
                            return Some((Ok(done), (sse, state, true)));
                        }
                        match serde_json::from_str::<WireStreamChunk>(&data) {
                            Ok(chunk) => state.absorb(chunk),
                            Err(e) => {
                                return Some((
                                    Err(LlmError::StreamParse(format!(
                                        "chat chunk json error={e} data={data}"
                                    ))),
                                    (sse, state, finished),
                                ));
                            }
                        }
                    }
                    Ok(SseEvent::Other) => continue,
                    Err(e) => return Some((Err(e), (sse, state, finished))),
                }
            }
        },
    );
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frames(data: &[&str]) -> impl Stream<Item = Result<SseEvent>> + Send + 'static {
        let items: Vec<Result<SseEvent>> = data
            .iter()
            .map(|d| Ok(SseEvent::Data(d.to_string())))
            .collect();
        futures_util::stream::iter(items)
    }

    #[test]
    fn request_sets_tool_choice_and_stream_options() {
        let tools = vec![ToolDefinition {
            name: "get_current_weather".to_string(),
            description: "weather".to_string(),
            parameters: json!({}),
        }];
        let req = WireChatRequest::new(
            "gpt-4o".to_string(),
            &[ChatMessage::system("You are an assistant"), ChatMessage::user("hi")],
            &tools,
            true,
        );
        let v = serde_json::to_value(&req).expect("serialize");
        assert_eq!(v["tool_choice"], "auto");
        assert_eq!(v["stream"], true);
        assert_eq!(v["stream_options"]["include_usage"], true);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["tools"][0]["function"]["name"], "get_current_weather");
        assert!(v.get("response_format").is_none());
    }

    #[test]
    fn response_maps_refusal_and_tool_calls() {
        let wire: WireChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "refusal": "I can't help with that.",
                    "tool_calls": [{"id": "call_1", "type": "function",
                        "function": {"name": "f", "arguments": "{}"}}]
                },
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4}
        }))
        .expect("deserialize");
        let resp = ChatResponse::try_from(wire).expect("convert");
        assert_eq!(resp.refusal.as_deref(), Some("I can't help with that."));
        assert_eq!(resp.message.content, "");
        assert_eq!(resp.message.tool_calls[0].name, "f");
        assert_eq!(resp.usage.completion_tokens, 4);
    }

    #[test]
    fn response_without_choices_is_rejected() {
        let wire: WireChatResponse =
            serde_json::from_value(json!({"choices": []})).expect("deserialize");
        assert!(matches!(
            ChatResponse::try_from(wire),
            Err(LlmError::ResponseFormat(_))
        ));
    }

    #[tokio::test]
    async fn stream_maps_deltas_skips_empty_chunks_and_ends_on_done() {
        let events: Vec<StreamEvent> = chat_events(frames(&[
            r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"{"choices":[{"delta":{"content":"Artificial"}}]}"#,
            r#"{"choices":[]}"#,
            r#"{"choices":[{"delta":{"content":" intelligence"},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
            "[DONE]",
            r#"{"choices":[{"delta":{"content":"ignored"}}]}"#,
        ]))
        .map(|r| r.expect("event"))
        .collect()
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    delta: "Artificial".to_string()
                },
                StreamEvent::TextDelta {
                    delta: " intelligence".to_string()
                },
                StreamEvent::ResponseDone {
                    status: Some("stop".to_string()),
                    usage: Some(Usage {
                        prompt_tokens: 5,
                        completion_tokens: 2
                    }),
                },
            ]
        );
    }

    #[tokio::test]
    async fn stream_emits_tool_call_start_then_argument_deltas() {
        let events: Vec<StreamEvent> = chat_events(frames(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_current_weather","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"location\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Beijing\"}"}}]}}]}"#,
        ]))
        .map(|r| r.expect("event"))
        .collect()
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStart {
                    id: "call_1".to_string(),
                    name: "get_current_weather".to_string()
                },
                StreamEvent::ToolCallDelta {
                    arguments: "{\"location\":".to_string()
                },
                StreamEvent::ToolCallDelta {
                    arguments: "\"Beijing\"}".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_usage_is_a_stream_parse_error() {
        let mut stream = chat_events(frames(&[
            r#"{"choices":[],"usage":{"prompt_tokens":4294967296,"completion_tokens":1}}"#,
        ]));
        let first = stream.next().await.expect("item");
        assert!(matches!(first, Err(LlmError::StreamParse(_))));
    }

    #[tokio::test]
    async fn malformed_chunk_is_a_stream_parse_error() {
        let mut stream = chat_events(frames(&["{oops"]));
        let first = stream.next().await.expect("item");
        assert!(matches!(first, Err(LlmError::StreamParse(_))));
    }
}
