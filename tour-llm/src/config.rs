use crate::error::{LlmError, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for an OpenAI-compatible endpoint.
///
/// Built explicitly and handed to [`crate::LlmClient::new`]; nothing in this
/// crate reads process state on its own except [`ClientConfig::from_env`].
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Base URL including the API version prefix, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Default model used when a request does not name one.
    pub model: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `OPENAI_API_KEY`, `BASE_URL` and `MODEL` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank("OPENAI_API_KEY")
            .ok_or_else(|| LlmError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let mut cfg = Self::new(api_key);
        if let Some(base_url) = non_blank("BASE_URL") {
            cfg.base_url = base_url;
        }
        cfg.model = non_blank("MODEL");
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Config("api key must not be empty".to_string()));
        }
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| LlmError::Config(format!("invalid base url {}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LlmError::Config(format!(
                "base url must be http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// The configured default model, or a config error when there is none.
    pub fn require_model(&self) -> Result<&str> {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| LlmError::Config("MODEL environment variable is not set".to_string()))
    }

    /// Picks the request's model, falling back to the configured default.
    pub(crate) fn resolve_model(&self, requested: Option<&str>) -> Result<String> {
        match requested.filter(|m| !m.trim().is_empty()) {
            Some(m) => Ok(m.to_string()),
            None => self.require_model().map(str::to_string),
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_requires_api_key() {
        let err = ClientConfig::from_lookup(lookup(&[("MODEL", "gpt-4o")])).unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn from_lookup_applies_overrides_and_ignores_blank_values() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("BASE_URL", "https://proxy.example.com/v1/"),
            ("MODEL", "  "),
        ]))
        .expect("config");
        assert_eq!(cfg.base_url, "https://proxy.example.com/v1/");
        assert!(cfg.model.is_none());
        assert_eq!(
            cfg.endpoint("responses"),
            "https://proxy.example.com/v1/responses"
        );
    }

    #[test]
    fn require_model_fails_without_default() {
        let cfg = ClientConfig::new("sk-test");
        let err = cfg.require_model().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: MODEL environment variable is not set"
        );
        assert_eq!(cfg.resolve_model(Some("gpt-5")).expect("explicit"), "gpt-5");
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let cfg = ClientConfig::new("sk-test").base_url("ftp://example.com");
        assert!(matches!(cfg.validate(), Err(LlmError::Config(_))));
        let cfg = ClientConfig::new("sk-test").base_url("not a url");
        assert!(matches!(cfg.validate(), Err(LlmError::Config(_))));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let cfg = ClientConfig::new("sk-secret");
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }
}
