//! OpenAI-compatible chat completion client (OpenAI, Groq, Ollama)

use crate::backends::LanguageModel;
use crate::config::{parse_duration, LlmConfig};
use crate::error::{FlowscopeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Language model reached over an OpenAI-compatible HTTP API
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let timeout = parse_duration(&config.timeout).unwrap_or(Duration::from_secs(20));
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() && config.provider != "ollama" {
            tracing::warn!(
                "Environment variable {} is not set; LLM requests will be unauthenticated",
                config.api_key_env
            );
        }

        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn chat(&self, prompt: &str, max_tokens: Option<u32>) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(FlowscopeError::backend(
                "llm",
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| FlowscopeError::backend("llm", "empty completion"))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(prompt, None).await
    }

    async fn classify(&self, prompt: &str) -> Result<String> {
        self.chat(prompt, Some(8)).await
    }
}
