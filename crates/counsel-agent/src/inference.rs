use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Which model class a call needs. Backends with a single model ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast model for retrieval-heavy work (evidence, summary, drafting).
    Standard,
    /// Stronger model for open-ended legal reasoning.
    Advanced,
}

/// A system instruction plus the user turn.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// A text-generation service.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt, tier: ModelTier) -> Result<String>;
}

/// Model access as decided at startup. `Unavailable` skips the network
/// entirely; callers go straight to their fallback text.
#[derive(Clone)]
pub enum Inference {
    Available {
        backend: Arc<dyn InferenceBackend>,
        timeout: Duration,
    },
    Unavailable {
        reason: String,
    },
}

impl Inference {
    pub fn available(backend: Arc<dyn InferenceBackend>, timeout: Duration) -> Self {
        Self::Available { backend, timeout }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Available { backend, timeout } => {
                format!("{} (timeout {}s)", backend.name(), timeout.as_secs())
            },
            Self::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }

    /// One bounded model call. Timeout, transport error and blank output
    /// all come back as `None`.
    pub async fn ask(&self, prompt: &Prompt, tier: ModelTier) -> Option<String> {
        let (backend, timeout) = match self {
            Self::Available { backend, timeout } => (backend, *timeout),
            Self::Unavailable { reason } => {
                debug!(reason = %reason, "inference skipped");
                return None;
            },
        };

        match tokio::time::timeout(timeout, backend.generate(prompt, tier)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!(backend = backend.name(), "inference returned empty output");
                None
            },
            Ok(Err(e)) => {
                warn!(backend = backend.name(), "inference failed: {e:#}");
                None
            },
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    timeout_secs = timeout.as_secs(),
                    "inference timed out"
                );
                None
            },
        }
    }
}
