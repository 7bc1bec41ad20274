use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::{InferenceBackend, ModelTier, Prompt};

/// Calls a locally-hosted Ollama model via its native chat API.
///
/// Keeps case material on the local machine. One model serves every tier.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        let mut messages = Vec::new();
        if !prompt.system.is_empty() {
            messages.push(OllamaMessage {
                role: "system",
                content: &prompt.system,
            });
        }
        messages.push(OllamaMessage {
            role: "user",
            content: &prompt.user,
        });

        let request_body = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        info!(
            model = %self.model,
            base_url = %self.base_url,
            prompt_len = prompt.user.len(),
            "calling ollama chat API"
        );

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .context("ollama request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("ollama error {status}: {body}");
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("failed to parse ollama response")?;

        info!(output_len = parsed.message.content.len(), "ollama response received");
        Ok(parsed.message.content)
    }
}
