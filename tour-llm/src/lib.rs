//! Client for OpenAI-compatible LLM APIs.
//!
//! Responses and chat completions over HTTP (plain and SSE streamed),
//! realtime sessions over WebSocket, and a [`StreamConsumer`] that renders
//! streamed text deltas as they arrive.

mod blocking;
mod chat;
mod client;
mod config;
mod consumer;
mod error;
mod events;
mod realtime;
mod responses;
mod sse;
mod structured;
mod types;

pub use blocking::{BlockingEvents, BlockingLlmClient};
pub use client::LlmClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use consumer::{StreamConsumer, StreamSummary};
pub use error::{LlmError, Result};
pub use events::{EventStream, StreamEvent};
pub use realtime::{RealtimeSession, realtime_url};
pub use responses::{
    FunctionCall, InputMessage, InputPart, MessageContent, OutputContent, OutputItem,
    ReasoningEffort, Response, ResponseInput, ResponseRequest, ResponseUsage, ToolChoice,
};
pub use structured::{ParsedMessage, ResponseFormat};
pub use types::{
    ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage, validate_tool_name,
};
