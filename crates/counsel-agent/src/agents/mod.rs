//! The four specialised responders.
//!
//! Each agent classifies the message into a local sub-intent, gathers case
//! context through [`DocumentContext`], makes at most one model call, and
//! falls back to deterministic text when the model gives nothing back.
//! `respond` never fails: every path ends in a non-empty reply.

mod draft;
mod evidence;
mod general;
mod summary;

use std::sync::Arc;

use async_trait::async_trait;
use counsel_core::{documents::DocumentContext, store::ContentStore, AgentId, HistoryEntry};
use tracing::{debug, warn};

use crate::inference::{Inference, ModelTier, Prompt};

pub use draft::DraftAgent;
pub use evidence::EvidenceAgent;
pub use general::{parse_insights, GeneralAgent, Insights, DISCLAIMER};
pub use summary::{SummaryAgent, NO_CONVERSATION};

/// One inbound turn as seen by an agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub case_id: &'a str,
    pub user_id: &'a str,
    pub message: &'a str,
    pub history: &'a [HistoryEntry],
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn id(&self) -> AgentId;

    async fn respond(&self, req: &AgentRequest<'_>) -> String;
}

/// Collaborators shared by every agent.
#[derive(Clone)]
pub struct AgentDeps {
    pub store: Arc<dyn ContentStore>,
    pub docs: DocumentContext,
    pub inference: Inference,
}

impl AgentDeps {
    pub fn new(store: Arc<dyn ContentStore>, inference: Inference) -> Self {
        Self {
            docs: DocumentContext::new(Arc::clone(&store)),
            store,
            inference,
        }
    }

    /// One model call for `intent`. `None` means the caller answers from
    /// its fallback text.
    pub(crate) async fn generate(
        &self,
        agent: AgentId,
        intent: &str,
        prompt: Prompt,
        tier: ModelTier,
    ) -> Option<String> {
        let reply = self.inference.ask(&prompt, tier).await;
        match &reply {
            Some(text) => debug!(agent = %agent, intent, output_len = text.len(), "model reply"),
            None => warn!(agent = %agent, intent, "no model reply, using fallback response"),
        }
        reply
    }
}

/// Quote used by every fallback so the reply is tied to the request.
pub(crate) fn asked_about(message: &str) -> String {
    format!("I understand you're asking about: \"{}\"", message.trim())
}
