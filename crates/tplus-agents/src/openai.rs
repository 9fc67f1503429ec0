use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tplus_models::LlmConfig;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::model::LanguageModel;

/// Environment variable that overrides `llm.api_key`.
pub const API_KEY_ENV: &str = "TPLUS_LLM_API_KEY";

/// Language model behind an OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, vLLM, Ollama, ...).
pub struct OpenAiCompatible {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatible {
    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| config.api_key.clone())
            .ok_or_else(|| {
                AgentError::Config(format!("llm.api_key or {API_KEY_ENV} is required"))
            })?;
        let timeout = Duration::from_secs(config.timeout_seconds);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        let started = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            warn!(%status, model = %self.model, "Chat completion failed");
            return Err(AgentError::Backend(format!("status={status}: {text}")));
        }

        let content = extract_content(&text)?;
        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completion returned"
        );
        Ok(content)
    }
}

impl OpenAiCompatible {
    fn transport_error(&self, e: reqwest::Error) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout(self.timeout.as_secs())
        } else {
            AgentError::Http(e)
        }
    }
}

/// Pull the first choice's text out of a chat-completions response body.
fn extract_content(body: &str) -> Result<String, AgentError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AgentError::Backend("response has no choices".to_string()))?;
    if content.trim().is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(content)
}
