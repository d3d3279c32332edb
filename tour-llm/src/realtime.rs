//! Realtime sessions over WebSocket (`{base}/realtime?model=...`).
//!
//! Text-only: client events are JSON text frames, server events are parsed
//! into [`StreamEvent`]s. The socket is closed when the session is dropped.

use crate::config::ClientConfig;
use crate::error::{LlmError, Result};
use crate::events::StreamEvent;
use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RealtimeSession {
    socket: Socket,
    url: reqwest::Url,
}

/// WebSocket URL for a realtime session: the base URL with a ws(s) scheme,
/// `/realtime` appended and `model` set, other query parameters kept.
pub fn realtime_url(config: &ClientConfig, model: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&config.base_url)
        .map_err(|e| LlmError::Config(format!("invalid base url {}: {e}", config.base_url)))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(LlmError::Config(format!(
                "unsupported base url scheme for realtime: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| LlmError::Config(format!("cannot use scheme {scheme} for {url}")))?;

    url.path_segments_mut()
        .map_err(|_| LlmError::Config("base url cannot be a base".to_string()))?
        .pop_if_empty()
        .push("realtime");

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "model")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("model", model);
    }
    Ok(url)
}

impl RealtimeSession {
    #[tracing::instrument(level = "info", skip(config))]
    pub async fn connect(config: &ClientConfig, model: &str) -> Result<Self> {
        config.validate()?;
        if model.trim().is_empty() {
            return Err(LlmError::Config("realtime model must not be empty".to_string()));
        }
        let url = realtime_url(config, model)?;

        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| LlmError::Config(format!("api key is not a valid header value: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert("openai-beta", HeaderValue::from_static("realtime=v1"));

        let (socket, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(status = %response.status(), "realtime session connected");
        Ok(Self { socket, url })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    /// `session.update` with the given session object, e.g. `{"modalities": ["text"]}`.
    pub async fn update_session(&mut self, session: serde_json::Value) -> Result<()> {
        self.send_event(json!({ "type": "session.update", "session": session }))
            .await
    }

    pub async fn create_conversation_item(&mut self, item: serde_json::Value) -> Result<()> {
        self.send_event(json!({ "type": "conversation.item.create", "item": item }))
            .await
    }

    /// Asks the server to generate a response for the conversation so far.
    pub async fn create_response(&mut self) -> Result<()> {
        self.send_event(json!({ "type": "response.create" })).await
    }

    /// Sends a raw client event, tagging it with an `event_id` if it has none.
    pub async fn send_event(&mut self, mut event: serde_json::Value) -> Result<()> {
        if let Some(obj) = event.as_object_mut() {
            obj.entry("event_id")
                .or_insert_with(|| json!(format!("evt_{}", uuid::Uuid::new_v4().simple())));
        }
        let kind = event
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("<untyped>")
            .to_string();
        self.socket
            .send(Message::Text(event.to_string().into()))
            .await?;
        tracing::debug!(%kind, "realtime client event sent");
        Ok(())
    }

    /// Next server event, or `None` once the server closes the socket.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            let msg = match self.socket.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => return Some(StreamEvent::from_json(text.as_str())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "realtime session closed by server");
                    return None;
                }
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    continue;
                }
            }
        }
    }

    /// Server events as a stream borrowing the session.
    pub fn events(&mut self) -> impl Stream<Item = Result<StreamEvent>> + '_ {
        futures_util::stream::unfold(self, |session| async move {
            let event = session.next_event().await?;
            Some((event, session))
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_switches_scheme_and_appends_model() {
        let cfg = ClientConfig::new("sk-test");
        let url = realtime_url(&cfg, "gpt-realtime").expect("url");
        assert_eq!(
            url.as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn url_keeps_existing_query_parameters() {
        let cfg = ClientConfig::new("sk-test")
            .base_url("http://localhost:8080/openai/v1/?api-version=2025-04-01&model=old");
        let url = realtime_url(&cfg, "gpt-realtime").expect("url");
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/openai/v1/realtime?api-version=2025-04-01&model=gpt-realtime"
        );
    }
}
