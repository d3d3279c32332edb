//! Structured output: JSON-schema constrained chat completions.

use crate::error::{LlmError, Result};
use crate::types::{ChatResponse, Usage};
use serde::de::DeserializeOwned;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

impl ResponseFormat {
    /// Schema generated from `T`, named after the schema title.
    pub fn for_type<T: schemars::JsonSchema>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}));
        let name = schema
            .get("title")
            .and_then(|t| t.as_str())
            .map(schema_name)
            .unwrap_or_else(|| "response".to_string());
        Self {
            name,
            schema,
            strict: false,
        }
    }

    /// Strict mode: every object schema is closed with `additionalProperties: false`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        if strict {
            close_objects(&mut self.schema);
        }
        self
    }

    pub(crate) fn to_wire(&self) -> serde_json::Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": self.strict,
                "schema": self.schema,
            }
        })
    }
}

/// Result of a structured request. Exactly one of `parsed` and `refusal` is set.
#[derive(Debug, Clone)]
pub struct ParsedMessage<T> {
    pub content: Option<String>,
    pub parsed: Option<T>,
    /// The model's refusal, verbatim. Not an error.
    pub refusal: Option<String>,
    pub finish_reason: String,
    pub usage: Usage,
}

impl<T> ParsedMessage<T> {
    pub fn is_refusal(&self) -> bool {
        self.refusal.is_some()
    }
}

impl<T: DeserializeOwned> TryFrom<ChatResponse> for ParsedMessage<T> {
    type Error = LlmError;

    fn try_from(resp: ChatResponse) -> Result<Self> {
        let content = Some(resp.message.content).filter(|c| !c.is_empty());
        if let Some(refusal) = resp.refusal {
            return Ok(Self {
                content,
                parsed: None,
                refusal: Some(refusal),
                finish_reason: resp.finish_reason,
                usage: resp.usage,
            });
        }

        let raw = content.as_deref().ok_or_else(|| {
            LlmError::ResponseFormat("structured response has neither content nor refusal".into())
        })?;
        let parsed: T = serde_json::from_str(raw).map_err(|e| {
            LlmError::ResponseFormat(format!(
                "structured content does not match schema: {e} (finish_reason={})",
                resp.finish_reason
            ))
        })?;
        Ok(Self {
            content,
            parsed: Some(parsed),
            refusal: None,
            finish_reason: resp.finish_reason,
            usage: resp.usage,
        })
    }
}

fn schema_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if name.is_empty() {
        "response".to_string()
    } else {
        name
    }
}

fn close_objects(schema: &mut serde_json::Value) {
    match schema {
        serde_json::Value::Object(map) => {
            if map.contains_key("properties") {
                map.insert("additionalProperties".to_string(), json!(false));
            }
            for v in map.values_mut() {
                close_objects(v);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}
