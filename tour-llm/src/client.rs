use crate::chat::{WireChatRequest, WireChatResponse, chat_events};
use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::events::{EventStream, response_events};
use crate::responses::{Response, ResponseRequest, WireResponseRequest};
use crate::sse::decode_sse;
use crate::structured::{ParsedMessage, ResponseFormat};
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Async client for an OpenAI-compatible API.
#[derive(Clone)]
pub struct LlmClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn create_response(&self, req: &ResponseRequest) -> Result<Response> {
        req.validate()?;
        let model = self.config.resolve_model(req.model.as_deref())?;
        let body = WireResponseRequest::new(model, req, false);
        self.post_json("responses", &body).await
    }

    /// Streams a response as [`crate::StreamEvent`]s. Pair with [`crate::StreamConsumer`].
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn stream_response(&self, req: &ResponseRequest) -> Result<EventStream> {
        req.validate()?;
        let model = self.config.resolve_model(req.model.as_deref())?;
        let body = WireResponseRequest::new(model, req, true);
        let response = self.send("responses", &body).await?;

        Ok(response_events(decode_sse(response.bytes_stream())))
    }

    /// `model` falls back to the configured default when `None`.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let body = self.chat_request(model, messages, tools, false)?;
        let wire: WireChatResponse = self.post_json("chat/completions", &body).await?;
        wire.try_into()
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat_stream(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<EventStream> {
        let body = self.chat_request(model, messages, tools, true)?;
        let response = self.send("chat/completions", &body).await?;
        Ok(chat_events(decode_sse(response.bytes_stream())))
    }

    /// Chat completion constrained to `format`, parsed into `T`.
    ///
    /// A refusal comes back as `Ok` with `refusal` set and `parsed` empty.
    #[tracing::instrument(level = "info", skip_all, fields(format = %format.name))]
    pub async fn parse_chat<T: DeserializeOwned>(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        format: &ResponseFormat,
    ) -> Result<ParsedMessage<T>> {
        let body = self
            .chat_request(model, messages, &[], false)?
            .with_response_format(format.to_wire());
        let wire: WireChatResponse = self.post_json("chat/completions", &body).await?;
        let resp: ChatResponse = wire.try_into()?;
        resp.try_into()
    }

    fn chat_request(
        &self,
        model: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireChatRequest> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput("chat messages are empty".to_string()));
        }
        for t in tools {
            crate::types::validate_tool_name(&t.name)?;
        }
        let model = self.config.resolve_model(model)?;
        Ok(WireChatRequest::new(model, messages, tools, stream))
    }

    async fn send<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.config.endpoint(path);
        tracing::debug!(%url, "sending request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, path, "api returned error status");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self.send(path, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| LlmError::ResponseFormat(format!("{path} json error={e} body={text}")))
    }
}
