use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::{InferenceBackend, ModelTier, Prompt};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini via the `generateContent` REST endpoint.
pub struct GeminiBackend {
    pub api_key: String,
    pub standard_model: String,
    pub advanced_model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        standard_model: impl Into<String>,
        advanced_model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            standard_model: standard_model.into(),
            advanced_model: advanced_model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 120,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.standard_model,
            ModelTier::Advanced => &self.advanced_model,
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Concatenated text of the first candidate.
fn first_candidate_text(resp: GenerateResponse) -> String {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default()
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &Prompt, tier: ModelTier) -> Result<String> {
        let model = self.model(tier);
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt.user }],
            }],
            system_instruction: (!prompt.system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part { text: &prompt.system }],
            }),
        };

        info!(model, prompt_len = prompt.user.len(), "calling gemini generateContent");

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        // Keep the key out of the URL: transport errors embed it and logs
        // are streamed on /logs.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("gemini error {status}: {body}");
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to parse gemini response")?;
        let text = first_candidate_text(parsed);
        info!(model, output_len = text.len(), "gemini response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_system_instruction() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "hi" }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part { text: "be brief" }],
            }),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(v["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}},
                      {"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_candidate_text(resp), "ab");
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_api_key() {
        let backend = GeminiBackend::new("SECRET-KEY-123", "m1", "m2")
            .with_base_url("http://127.0.0.1:1/v1beta")
            .with_timeout(5);
        let prompt = Prompt {
            system: String::new(),
            user: "hello".into(),
        };
        let err = backend
            .generate(&prompt, ModelTier::Standard)
            .await
            .unwrap_err();
        let logged = format!("inference failed: {err:#}");
        assert!(logged.contains("gemini request failed"));
        assert!(!logged.contains("SECRET-KEY-123"), "{logged}");
    }

    #[test]
    fn blocked_response_has_no_text() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert_eq!(first_candidate_text(resp), "");
    }
}
