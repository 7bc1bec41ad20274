use crate::{keywords::KeywordSet, types::AgentId};

const BASE: f64 = 0.5;
const UNCERTAINTY_PENALTY: f64 = 0.1;

pub const UNCERTAINTY_PHRASES: KeywordSet = KeywordSet(&[
    "i'm not sure",
    "i don't know",
    "unclear",
    "uncertain",
    "maybe",
    "possibly",
    "might be",
    "could be",
]);

fn specialisation_bonus(agent: AgentId) -> f64 {
    match agent {
        AgentId::Evidence | AgentId::Summary | AgentId::Draft => 0.1,
        AgentId::General => 0.05,
    }
}

/// Heuristic confidence for a reply, clamped to [0, 1].
///
/// Not a calibrated probability: length bands, a per-agent bonus, and a
/// penalty for each distinct hedging phrase in the text.
pub fn score(text: &str, agent: AgentId) -> f64 {
    let len = text.chars().count();
    let mut confidence = BASE;
    if len > 50 {
        confidence += 0.2;
    }
    if len > 200 {
        confidence += 0.1;
    }
    confidence += specialisation_bonus(agent);
    confidence -= UNCERTAINTY_PHRASES.count_in(text) as f64 * UNCERTAINTY_PENALTY;
    confidence.clamp(0.0, 1.0)
}
