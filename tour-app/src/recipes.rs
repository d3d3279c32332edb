//! One function per recipe. Each builds a request, sends it and prints the result.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tour_llm::{
    BlockingLlmClient, ChatMessage, ClientConfig, InputMessage, InputPart, LlmClient,
    ParsedMessage, RealtimeSession, ReasoningEffort, ResponseFormat, ResponseRequest, Role,
    StreamConsumer, ToolDefinition,
};

pub const PIRATE_INSTRUCTIONS: &str = "You are a coding assistant that talks like a pirate.";
pub const STRUCTURED_SYSTEM_PROMPT: &str = "Guide the user through the solution step by step.";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    pub explanation: String,
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MathReasoning {
    pub steps: Vec<Step>,
    pub final_answer: String,
}

fn model_or(config: &ClientConfig, fallback: &str) -> String {
    config
        .model
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

pub async fn respond(client: &LlmClient, prompt: &str) -> Result<()> {
    let req = ResponseRequest::text(prompt)
        .model(model_or(client.config(), "gpt-5"))
        .instructions(PIRATE_INSTRUCTIONS);
    let resp = client.create_response(&req).await?;
    println!("{}", resp.output_text());
    Ok(())
}

pub fn respond_blocking(client: &BlockingLlmClient, prompt: &str) -> Result<()> {
    let req = ResponseRequest::text(prompt)
        .model(model_or(client.config(), "gpt-5"))
        .instructions(PIRATE_INSTRUCTIONS);
    let resp = client.create_response(&req)?;
    println!("{}", resp.output_text());
    Ok(())
}

pub async fn chat(client: &LlmClient, prompt: &str) -> Result<()> {
    let model = model_or(client.config(), "gpt-4o");
    let resp = client
        .chat(Some(model.as_str()), &[ChatMessage::user(prompt)], &[])
        .await?;
    match resp.refusal {
        Some(refusal) => println!("{refusal}"),
        None => println!("{}", resp.message.content),
    }
    Ok(())
}

pub async fn stream(client: &LlmClient, prompt: &str) -> Result<()> {
    let req = ResponseRequest::text(prompt).model(model_or(client.config(), "gpt-4o"));
    let events = client.stream_response(&req).await?;
    let mut consumer = StreamConsumer::new(std::io::stdout()).newline_on_text_done(false);
    consumer.consume(events).await?;
    println!();
    Ok(())
}

pub fn stream_blocking(client: &BlockingLlmClient, prompt: &str) -> Result<()> {
    let req = ResponseRequest::text(prompt).model(model_or(client.config(), "gpt-4o"));
    let events = client.stream_response(&req)?;
    let mut consumer = StreamConsumer::new(std::io::stdout()).newline_on_text_done(false);
    consumer.consume_blocking(events)?;
    println!();
    Ok(())
}

pub fn image_mime(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        other => Err(anyhow::anyhow!(
            "unsupported image type {other:?} for {}; expected png, jpeg, gif or webp",
            path.display()
        )),
    }
}

pub async fn image(client: &LlmClient, path: &Path, prompt: &str) -> Result<()> {
    let mime = image_mime(path)?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read image {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), mime, "image loaded");

    let req = ResponseRequest::messages(vec![InputMessage::parts(
        Role::User,
        vec![InputPart::text(prompt), InputPart::image_from_bytes(mime, &bytes)],
    )])
    .model(model_or(client.config(), "gpt-4o-mini"));
    let resp = client.create_response(&req).await?;
    println!("{}", resp.output_text());
    Ok(())
}

pub fn weather_tool() -> tour_llm::Result<ToolDefinition> {
    ToolDefinition::validated(
        "get_current_weather",
        "Get the current weather in a given location",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}
            },
            "required": ["location", "unit"]
        }),
    )
}

pub async fn functions(client: &LlmClient, prompt: &str) -> Result<()> {
    let req = ResponseRequest::text(prompt)
        .model(model_or(client.config(), "gpt-5"))
        .tools(vec![weather_tool()?])
        .tool_choice(tour_llm::ToolChoice::Auto);
    let resp = client.create_response(&req).await?;
    for call in resp.function_calls() {
        tracing::info!(call_id = %call.call_id, name = %call.name, "model requested a function call");
    }
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

pub async fn reasoning(client: &LlmClient, prompt: &str, effort: ReasoningEffort) -> Result<()> {
    let req = ResponseRequest::messages(vec![InputMessage::text(Role::User, prompt)])
        .model(model_or(client.config(), "gpt-5"))
        .reasoning(effort);
    let resp = client.create_response(&req).await?;
    println!("{}", resp.output_text());
    Ok(())
}

pub fn structured_format() -> ResponseFormat {
    ResponseFormat::for_type::<MathReasoning>().strict(true)
}

pub async fn structured(client: &LlmClient, prompt: &str) -> Result<()> {
    let model = model_or(client.config(), "gpt-5");
    let format = structured_format();
    let messages = [
        ChatMessage::system(STRUCTURED_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ];
    let parsed: ParsedMessage<MathReasoning> =
        client.parse_chat(Some(model.as_str()), &messages, &format).await?;

    match (parsed.refusal, parsed.parsed) {
        (Some(refusal), _) => println!("{refusal}"),
        (None, Some(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
        (None, None) => return Err(anyhow::anyhow!("structured response was empty")),
    }
    Ok(())
}

pub async fn realtime(config: &ClientConfig, prompt: &str) -> Result<()> {
    let model = model_or(config, "gpt-realtime");
    let mut session = RealtimeSession::connect(config, &model).await?;
    println!("WebSocket URL: {}", session.url());

    session
        .update_session(json!({ "modalities": ["text"] }))
        .await?;
    session
        .create_conversation_item(json!({
            "type": "message",
            "role": "user",
            "content": [{ "type": "input_text", "text": prompt }],
        }))
        .await?;
    session.create_response().await?;

    let mut consumer = StreamConsumer::new(std::io::stdout());
    let consumed = consumer.consume(session.events()).await;
    let closed = session.close().await;
    let summary = consumed?;
    tracing::debug!(events = summary.events, terminated = summary.terminated, "realtime response finished");
    closed?;
    Ok(())
}

/// Plain then streamed chat against the configured `MODEL`, which is required here.
pub async fn compat(client: &LlmClient) -> Result<()> {
    let model = client.config().require_model()?.to_string();

    println!("----- standard request -----");
    let resp = client
        .chat(
            Some(model.as_str()),
            &[
                ChatMessage::system("You are an AI assistant."),
                ChatMessage::user("Hello"),
            ],
            &[],
        )
        .await?;
    println!("{}", resp.message.content);

    println!("----- streaming request -----");
    let events = client
        .chat_stream(
            Some(model.as_str()),
            &[
                ChatMessage::system("You are an AI assistant."),
                ChatMessage::user("What is artificial intelligence?"),
            ],
            &[],
        )
        .await?;
    let mut consumer = StreamConsumer::new(std::io::stdout());
    consumer.consume(events).await?;
    println!();
    std::io::stdout().flush()?;
    Ok(())
}
