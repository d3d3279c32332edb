//! Responses API (`POST /responses`) request and result types.

use crate::error::{LlmError, Result};
use crate::types::{Role, ToolDefinition, Usage};
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// One content part of an input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPart {
    InputText { text: String },
    InputImage { image_url: String },
}

impl InputPart {
    pub fn text(text: impl Into<String>) -> Self {
        InputPart::InputText { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        InputPart::InputImage {
            image_url: url.into(),
        }
    }

    /// Inline image as a base64 `data:` URL.
    pub fn image_from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::image_url(format!("data:{mime};base64,{b64}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<InputPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl InputMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn parts(role: Role, parts: Vec<InputPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Messages(Vec<InputMessage>),
}

#[derive(Debug, Clone)]
pub struct ResponseRequest {
    /// Falls back to the client's configured model when `None`.
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub input: ResponseInput,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub reasoning: Option<ReasoningEffort>,
}

impl ResponseRequest {
    pub fn text(input: impl Into<String>) -> Self {
        Self::with_input(ResponseInput::Text(input.into()))
    }

    pub fn messages(messages: Vec<InputMessage>) -> Self {
        Self::with_input(ResponseInput::Messages(messages))
    }

    fn with_input(input: ResponseInput) -> Self {
        Self {
            model: None,
            instructions: None,
            input,
            tools: Vec::new(),
            tool_choice: None,
            reasoning: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn reasoning(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning = Some(effort);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let empty = match &self.input {
            ResponseInput::Text(t) => t.trim().is_empty(),
            ResponseInput::Messages(m) => m.is_empty(),
        };
        if empty {
            return Err(LlmError::InvalidInput("response input is empty".to_string()));
        }
        for t in &self.tools {
            crate::types::validate_tool_name(&t.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireResponseRequest<'a> {
    model: String,
    input: &'a ResponseInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireFunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<WireReasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireFunctionTool<'a> {
    r#type: &'static str,
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireReasoning {
    effort: ReasoningEffort,
}

impl<'a> WireResponseRequest<'a> {
    pub(crate) fn new(model: String, req: &'a ResponseRequest, stream: bool) -> Self {
        let tools: Vec<WireFunctionTool<'a>> = req
            .tools
            .iter()
            .map(|t| WireFunctionTool {
                r#type: "function",
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            })
            .collect();
        let tool_choice = match (&req.tool_choice, tools.is_empty()) {
            (Some(c), _) => Some(c.clone()),
            (None, false) => Some(ToolChoice::Auto),
            (None, true) => None,
        };
        Self {
            model,
            input: &req.input,
            instructions: req.instructions.as_deref(),
            tools,
            tool_choice,
            reasoning: req.reasoning.map(|effort| WireReasoning { effort }),
            stream: stream.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        id: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText { text: String },
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl From<&ResponseUsage> for Usage {
    fn from(u: &ResponseUsage) -> Self {
        Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    /// JSON string.
    pub arguments: String,
}

impl Response {
    /// All `output_text` parts of message items, concatenated.
    pub fn output_text(&self) -> String {
        self.message_parts()
            .filter_map(|c| match c {
                OutputContent::OutputText { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// First refusal returned by the model, if it declined.
    pub fn refusal(&self) -> Option<&str> {
        self.message_parts().find_map(|c| match c {
            OutputContent::Refusal { refusal } => Some(refusal.as_str()),
            _ => None,
        })
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                    ..
                } => Some(FunctionCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn message_parts(&self) -> impl Iterator<Item = &OutputContent> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
    }
}
