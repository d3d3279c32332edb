//! Blocking facade over [`LlmClient`].
//!
//! Owns a current-thread tokio runtime and blocks on every network call. Must
//! not be used from inside an async context.

use crate::client::LlmClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{EventStream, StreamEvent};
use crate::responses::{Response, ResponseRequest};
use crate::structured::{ParsedMessage, ResponseFormat};
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::runtime::Runtime;

pub struct BlockingLlmClient {
    inner: LlmClient,
    runtime: Runtime,
}

impl BlockingLlmClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: LlmClient::new(config)?,
            runtime,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    pub fn create_response(&self, req: &ResponseRequest) -> Result<Response> {
        self.runtime.block_on(self.inner.create_response(req))
    }

    pub fn chat(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.runtime.block_on(self.inner.chat(model, messages, tools))
    }

    pub fn parse_chat<T: DeserializeOwned>(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        format: &ResponseFormat,
    ) -> Result<ParsedMessage<T>> {
        self.runtime
            .block_on(self.inner.parse_chat(model, messages, format))
    }

    /// Iterator over response events; each `next()` blocks until one arrives.
    pub fn stream_response(&self, req: &ResponseRequest) -> Result<BlockingEvents<'_>> {
        let stream = self.runtime.block_on(self.inner.stream_response(req))?;
        Ok(BlockingEvents {
            runtime: &self.runtime,
            stream,
        })
    }

    pub fn chat_stream(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<BlockingEvents<'_>> {
        let stream = self
            .runtime
            .block_on(self.inner.chat_stream(model, messages, tools))?;
        Ok(BlockingEvents {
            runtime: &self.runtime,
            stream,
        })
    }
}

pub struct BlockingEvents<'a> {
    runtime: &'a Runtime,
    stream: EventStream,
}

impl Iterator for BlockingEvents<'_> {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}
