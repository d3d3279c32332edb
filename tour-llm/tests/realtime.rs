use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tour_llm::{ClientConfig, LlmError, RealtimeSession, StreamConsumer};

#[derive(Debug, Default)]
struct Handshake {
    uri: String,
    authorization: Option<String>,
    beta: Option<String>,
}

/// Accepts one session, records the handshake and the first `expected` client
/// events, then replies with `replies` in order.
async fn serve_once(
    listener: TcpListener,
    expected: usize,
    replies: Vec<serde_json::Value>,
    handshake: Arc<Mutex<Handshake>>,
) -> Vec<serde_json::Value> {
    let (tcp, _) = listener.accept().await.expect("accept");
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let mut seen = handshake.lock().expect("handshake lock");
        seen.uri = req.uri().to_string();
        seen.authorization = header("authorization");
        seen.beta = header("openai-beta");
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
        .await
        .expect("handshake");

    let mut received = Vec::new();
    while received.len() < expected {
        let msg = ws.next().await.expect("client event").expect("ws frame");
        if let Message::Text(text) = msg {
            received.push(serde_json::from_str(text.as_str()).expect("client json"));
        }
    }
    for reply in replies {
        ws.send(Message::Text(reply.to_string().into()))
            .await
            .expect("send reply");
    }
    received
}

#[tokio::test]
async fn realtime_text_session_streams_until_response_done() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handshake = Arc::new(Mutex::new(Handshake::default()));
    let server = tokio::spawn(serve_once(
        listener,
        3,
        vec![
            json!({"type": "session.updated", "session": {"modalities": ["text"]}}),
            json!({"type": "response.text.delta", "delta": "Hel"}),
            json!({"type": "response.text.delta", "delta": "lo!"}),
            json!({"type": "response.text.done", "text": "Hello!"}),
            json!({"type": "response.done", "response": {"status": "completed"}}),
            json!({"type": "response.text.delta", "delta": "never read"}),
        ],
        handshake.clone(),
    ));

    let config = ClientConfig::new("sk-test").base_url(format!("http://{addr}/v1"));
    let mut session = RealtimeSession::connect(&config, "gpt-realtime")
        .await
        .expect("connect");
    assert_eq!(
        session.url().as_str(),
        format!("ws://{addr}/v1/realtime?model=gpt-realtime")
    );

    session
        .update_session(json!({"modalities": ["text"]}))
        .await
        .expect("session.update");
    session
        .create_conversation_item(json!({
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": "Say hello!"}]
        }))
        .await
        .expect("item.create");
    session.create_response().await.expect("response.create");

    let mut consumer = StreamConsumer::new(Vec::new());
    let summary = consumer.consume(session.events()).await.expect("consume");
    assert_eq!(summary.text, "Hello!");
    assert!(summary.terminated);
    assert_eq!(summary.status.as_deref(), Some("completed"));
    assert_eq!(consumer.into_sink(), b"Hello!\n".to_vec());
    session.close().await.ok();

    let received = server.await.expect("server task");
    let kinds: Vec<&str> = received
        .iter()
        .map(|e| e["type"].as_str().unwrap_or(""))
        .collect();
    assert_eq!(
        kinds,
        vec!["session.update", "conversation.item.create", "response.create"]
    );
    assert!(received.iter().all(|e| e["event_id"].is_string()));
    assert_eq!(received[0]["session"]["modalities"][0], "text");

    let seen = handshake.lock().expect("handshake lock");
    assert_eq!(seen.uri, "/v1/realtime?model=gpt-realtime");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen.beta.as_deref(), Some("realtime=v1"));
}

#[tokio::test]
async fn realtime_error_event_is_returned_to_the_caller() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve_once(
        listener,
        1,
        vec![json!({"type": "error", "error": {"message": "invalid_request_error"}})],
        Arc::new(Mutex::new(Handshake::default())),
    ));

    let config = ClientConfig::new("sk-test").base_url(format!("http://{addr}/v1"));
    let mut session = RealtimeSession::connect(&config, "gpt-realtime")
        .await
        .expect("connect");
    session.create_response().await.expect("response.create");

    let mut consumer = StreamConsumer::new(Vec::new());
    let err = consumer.consume(session.events()).await.unwrap_err();
    assert!(matches!(err, LlmError::Remote(ref m) if m == "invalid_request_error"));
    server.await.expect("server task");
}

#[tokio::test]
async fn connect_rejects_empty_model_before_dialing() {
    let config = ClientConfig::new("sk-test").base_url("http://127.0.0.1:9/v1");
    let err = RealtimeSession::connect(&config, " ").await.err().expect("error");
    assert!(matches!(err, LlmError::Config(_)));
}
