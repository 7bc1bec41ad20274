use tracing::debug;

use crate::{
    keywords::KeywordSet,
    types::{AgentId, HistoryEntry, MessageType},
};

const EVIDENCE_TERMS: KeywordSet = KeywordSet(&[
    "evidence", "document", "search", "find", "locate", "extract", "timeline", "chronology",
    "facts", "witness", "testimony", "exhibits", "proof", "analysis", "examine",
]);

const SUMMARY_TERMS: KeywordSet = KeywordSet(&[
    "summary", "summarize", "overview", "status", "progress", "key points", "main issues",
    "brief", "outline", "recap",
]);

const DRAFT_TERMS: KeywordSet = KeywordSet(&[
    "draft", "write", "compose", "create", "letter", "document", "motion", "brief", "contract",
    "agreement", "response", "correspondence", "memo", "proposal",
]);

const GENERAL_TERMS: KeywordSet = KeywordSet(&[
    "advice", "strategy", "legal", "law", "case", "court", "judge", "attorney", "counsel",
    "litigation", "settlement", "rights", "liability", "damages", "jurisdiction",
]);

const EXPLAIN_PHRASES: KeywordSet = KeywordSet(&["what is", "tell me about", "explain"]);
const DISCOVERY_VERBS: KeywordSet = KeywordSet(&["find", "search", "look for"]);
const RECAP_VERBS: KeywordSet = KeywordSet(&["summarize", "overview", "status"]);
const AUTHORING_VERBS: KeywordSet = KeywordSet(&["write", "draft", "create"]);

const PHRASE_BOOST: f64 = 2.0;

/// Default bonus for the agent that answered the previous turn.
pub const DEFAULT_STICKINESS: f64 = 0.5;

/// Maps a free-text message to exactly one agent. Pure and total.
#[derive(Debug, Clone)]
pub struct Router {
    stickiness: f64,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DEFAULT_STICKINESS)
    }
}

impl Router {
    pub fn new(stickiness: f64) -> Self {
        Self { stickiness }
    }

    pub fn stickiness(&self) -> f64 {
        self.stickiness
    }

    /// Per-agent scores in `AgentId::ALL` order.
    pub fn scores(&self, message: &str, recent_agent: Option<AgentId>) -> [(AgentId, f64); 4] {
        let lowered = message.to_lowercase();
        let mut scores = AgentId::ALL.map(|agent| {
            let (terms, boost) = match agent {
                AgentId::Evidence => (EVIDENCE_TERMS, DISCOVERY_VERBS),
                AgentId::Summary => (SUMMARY_TERMS, RECAP_VERBS),
                AgentId::Draft => (DRAFT_TERMS, AUTHORING_VERBS),
                AgentId::General => (GENERAL_TERMS, EXPLAIN_PHRASES),
            };
            let mut score = terms.count_lower(&lowered) as f64;
            if boost.any_lower(&lowered) {
                score += PHRASE_BOOST;
            }
            (agent, score)
        });

        if let Some(recent) = recent_agent {
            for (agent, score) in scores.iter_mut() {
                if *agent == recent {
                    *score += self.stickiness;
                }
            }
        }
        scores
    }

    /// Argmax over the scores. Ties go to the earlier agent in
    /// `AgentId::ALL`; an all-zero board goes to `General`.
    pub fn select(&self, message: &str, recent_agent: Option<AgentId>) -> AgentId {
        let scores = self.scores(message, recent_agent);
        let (best, best_score) = scores
            .iter()
            .copied()
            .fold((AgentId::General, 0.0_f64), |(best, best_score), (agent, score)| {
                if score > best_score {
                    (agent, score)
                } else {
                    (best, best_score)
                }
            });

        let selected = if best_score > 0.0 { best } else { AgentId::General };
        debug!(agent = %selected, ?scores, "router selected agent");
        selected
    }
}

/// The agent that produced the most recent AI turn, if any.
pub fn recent_agent(history: &[HistoryEntry]) -> Option<AgentId> {
    history
        .iter()
        .rev()
        .find(|entry| entry.message_type == MessageType::Ai)
        .and_then(|entry| entry.agent)
}
