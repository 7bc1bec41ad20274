use std::{sync::Arc, time::Instant};

use counsel_core::{
    confidence,
    router::{recent_agent, Router},
    store::ContentStore,
    AgentId, AgentResponse, ChatMessage, HistoryEntry,
};
use tracing::{error, info, warn};

use crate::{
    agents::{
        AgentCapability, AgentDeps, AgentRequest, DraftAgent, EvidenceAgent, GeneralAgent,
        Insights, SummaryAgent,
    },
    inference::Inference,
};

/// Routes each message to one agent and scores the reply.
pub struct Orchestrator {
    router: Router,
    store: Arc<dyn ContentStore>,
    inference: Inference,
    evidence: EvidenceAgent,
    summary: SummaryAgent,
    draft: DraftAgent,
    general: GeneralAgent,
}

impl Orchestrator {
    pub fn new(deps: AgentDeps, router: Router) -> Self {
        Self {
            router,
            store: Arc::clone(&deps.store),
            inference: deps.inference.clone(),
            evidence: EvidenceAgent::new(deps.clone()),
            summary: SummaryAgent::new(deps.clone()),
            draft: DraftAgent::new(deps.clone()),
            general: GeneralAgent::new(deps),
        }
    }

    pub fn inference(&self) -> &Inference {
        &self.inference
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn agent(&self, id: AgentId) -> &dyn AgentCapability {
        match id {
            AgentId::Evidence => &self.evidence,
            AgentId::Summary => &self.summary,
            AgentId::Draft => &self.draft,
            AgentId::General => &self.general,
        }
    }

    /// One turn: route, respond, score. `None` for blank input or a blank
    /// reply; the gateway sends nothing in that case.
    pub async fn handle(
        &self,
        case_id: &str,
        user_id: &str,
        message: &str,
        history: &[HistoryEntry],
    ) -> Option<AgentResponse> {
        if message.trim().is_empty() {
            return None;
        }
        let started = Instant::now();

        let agent_id = self.router.select(message, recent_agent(history));
        let req = AgentRequest {
            case_id,
            user_id,
            message,
            history,
        };
        let text = self.agent(agent_id).respond(&req).await;
        if text.trim().is_empty() {
            warn!(case_id, agent = %agent_id, "agent returned an empty reply");
            return None;
        }

        let confidence = confidence::score(&text, agent_id);
        let processing_time_s = started.elapsed().as_secs_f64();
        info!(
            case_id,
            agent = %agent_id,
            confidence,
            processing_time_s,
            reply_len = text.len(),
            "agent reply ready"
        );
        Some(AgentResponse {
            text,
            agent: agent_id,
            confidence,
            processing_time_s,
        })
    }

    /// Summary of the last `count` stored messages of a case.
    pub async fn conversation_summary(&self, case_id: &str, count: usize) -> String {
        match self.store.recent_chat_messages(case_id, count, 0).await {
            Ok(messages) => {
                let history: Vec<HistoryEntry> =
                    messages.iter().map(ChatMessage::to_history).collect();
                self.summary.summarize_conversation(&history).await
            },
            Err(e) => {
                error!(case_id, "conversation summary lookup failed: {e:#}");
                "Conversation summary unavailable.".into()
            },
        }
    }

    pub async fn case_insights(&self, case_id: &str) -> Insights {
        self.general.case_insights(case_id).await
    }
}
