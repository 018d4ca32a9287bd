//! Language-model round-trip. One call per message: the model sees the
//! business snapshot plus recent turns and answers with a single decision
//! JSON object, optionally asking for one read-only tool.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use zapys_core::config::{LlmConfig, LlmProvider};
use zapys_core::domain::conversation::Turn;

use crate::decision::Decision;
use crate::settings::AiSettings;

const SYSTEM_PROMPT: &str = "Ти — асистент адміністратора салону краси. \
Відповідай ОДНИМ JSON-об'єктом без жодного тексту навколо. \
Обов'язкові поля: \"action\" (snake_case тег дії), \"reply\" (коротка відповідь \
українською), \"confidence\" (0..1). Поля дії кладуться поруч із тегом. \
Для читання даних додай поле \"tool\": {\"tool\": назва, \"args\": {...}} і \
action \"reply\". Ніколи не вигадуй дані — запитуй їх через tool.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed decision: {0}")]
    Malformed(String),
}

/// Per-business model overrides sourced from `business_settings`. Unset
/// fields fall back to the application config.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelOverrides {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl From<&AiSettings> for ModelOverrides {
    fn from(settings: &AiSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn decide(
        &self,
        message: &str,
        tool_context: &str,
        history: &[Turn],
        overrides: &ModelOverrides,
    ) -> Result<Decision, LlmError>;
}

/// OpenAI-compatible chat-completions client. Ollama and most gateways speak
/// the same shape, so one implementation covers every configured provider
/// except `none`.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com".to_string(),
            (None, LlmProvider::Ollama) => "http://localhost:11434".to_string(),
            (None, LlmProvider::Anthropic) => "https://api.anthropic.com".to_string(),
            (None, LlmProvider::None) => return None,
        };
        if config.provider == LlmProvider::None {
            return None;
        }
        Some(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Endpoint and model for one call: a tenant's base_url wins outright,
    /// then a tenant provider's default endpoint, then the configured one.
    fn request_target(&self, overrides: &ModelOverrides) -> (String, String) {
        let base = overrides
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| overrides.provider.as_deref().and_then(provider_default_url))
            .unwrap_or_else(|| self.base_url.clone());
        let model = overrides.model.clone().unwrap_or_else(|| self.model.clone());
        (format!("{base}/v1/chat/completions"), model)
    }

    fn build_messages(&self, message: &str, tool_context: &str, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() }];
        if !tool_context.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: format!("Дані бізнесу:\n{tool_context}"),
            });
        }
        for turn in history {
            messages.push(ChatMessage {
                role: match turn.role {
                    zapys_core::domain::conversation::TurnRole::User => "user",
                    zapys_core::domain::conversation::TurnRole::Assistant => "assistant",
                },
                content: turn.message.clone(),
            });
        }
        messages.push(ChatMessage { role: "user", content: message.to_string() });
        messages
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn decide(
        &self,
        message: &str,
        tool_context: &str,
        history: &[Turn],
        overrides: &ModelOverrides,
    ) -> Result<Decision, LlmError> {
        let (url, model) = self.request_target(overrides);
        let request = ChatRequest {
            model: &model,
            messages: self.build_messages(message, tool_context, history),
            temperature: 0.2,
        };

        let mut builder = self.http.post(url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .map_err(|err| LlmError::Provider(err.to_string()))?;

        let status = response.status();
        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .map_err(|err| LlmError::Provider(err.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Provider(format!("{status}: {body}")));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|err| LlmError::Malformed(err.to_string()))?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Malformed("missing message content".to_string()))?;
        debug!(event_name = "llm.response", length = content.len());
        parse_decision(content)
    }
}

/// Extracts the first balanced JSON object from model output and decodes it.
/// Models occasionally wrap the object in prose or a code fence.
pub fn parse_decision(content: &str) -> Result<Decision, LlmError> {
    let object = first_json_object(content)
        .ok_or_else(|| LlmError::Malformed("no JSON object in model output".to_string()))?;
    serde_json::from_str(object).map_err(|err| LlmError::Malformed(err.to_string()))
}

fn provider_default_url(name: &str) -> Option<String> {
    match LlmProvider::parse(name)? {
        LlmProvider::OpenAi => Some("https://api.openai.com".to_string()),
        LlmProvider::Ollama => Some("http://localhost:11434".to_string()),
        LlmProvider::Anthropic => Some("https://api.anthropic.com".to_string()),
        LlmProvider::None => None,
    }
}

fn first_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
