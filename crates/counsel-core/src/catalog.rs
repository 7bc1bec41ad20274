use serde::Serialize;

use crate::types::AgentId;

/// Public listing entry, as sent to clients on connect and from `/agents`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub capabilities: &'static [&'static str],
}

/// Extended profile for a single agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
    pub best_for: &'static [&'static str],
}

pub fn info(agent: AgentId) -> AgentInfo {
    match agent {
        AgentId::Evidence => AgentInfo {
            id: agent,
            name: "Evidence Analyst",
            description: "Analyzes and searches through case evidence and documents",
            icon: "🔍",
            capabilities: &["Document analysis", "Evidence search", "Fact extraction", "Timeline reconstruction"],
        },
        AgentId::Summary => AgentInfo {
            id: agent,
            name: "Case Summarizer",
            description: "Provides comprehensive case summaries and overviews",
            icon: "📋",
            capabilities: &["Case summarization", "Key points extraction", "Status updates", "Progress tracking"],
        },
        AgentId::Draft => AgentInfo {
            id: agent,
            name: "Document Drafter",
            description: "Helps draft legal documents and correspondence",
            icon: "📝",
            capabilities: &["Legal document drafting", "Letter writing", "Contract reviews", "Motion preparation"],
        },
        AgentId::General => AgentInfo {
            id: agent,
            name: "Legal Assistant",
            description: "General legal assistance and case guidance",
            icon: "⚖️",
            capabilities: &["Legal advice", "Case strategy", "Research assistance", "General guidance"],
        },
    }
}

/// All agents in priority order.
pub fn all() -> Vec<AgentInfo> {
    AgentId::ALL.iter().copied().map(info).collect()
}

pub fn profile(agent: AgentId) -> AgentProfile {
    let (description, capabilities, best_for): (&str, &[&str], &[&str]) = match agent {
        AgentId::Evidence => (
            "Specialized in analyzing case evidence and documents",
            &[
                "Document content analysis",
                "Evidence timeline reconstruction",
                "Fact pattern identification",
                "Witness statement analysis",
                "Exhibit cross-referencing",
                "Contradiction detection",
            ],
            &[
                "Searching through case documents",
                "Finding specific evidence",
                "Analyzing document relationships",
                "Building chronologies",
            ],
        ),
        AgentId::Summary => (
            "Provides comprehensive case overviews and status updates",
            &[
                "Multi-document summarization",
                "Key issue identification",
                "Progress tracking",
                "Status reporting",
                "Milestone tracking",
                "Case overview generation",
            ],
            &[
                "Getting case overviews",
                "Understanding key issues",
                "Tracking progress",
                "Preparing status reports",
            ],
        ),
        AgentId::Draft => (
            "Assists with drafting legal documents and correspondence",
            &[
                "Legal document creation",
                "Motion drafting",
                "Letter composition",
                "Contract review assistance",
                "Brief preparation",
                "Template customization",
            ],
            &[
                "Writing legal documents",
                "Drafting correspondence",
                "Preparing motions",
                "Creating templates",
            ],
        ),
        AgentId::General => (
            "General legal guidance and case strategy assistance",
            &[
                "Legal advice and guidance",
                "Case strategy development",
                "Legal research assistance",
                "Procedural guidance",
                "Risk assessment",
                "Settlement analysis",
            ],
            &[
                "General legal questions",
                "Case strategy discussions",
                "Legal procedure guidance",
                "Risk assessment",
            ],
        ),
    };
    AgentProfile {
        id: agent,
        name: info(agent).name,
        description,
        capabilities,
        best_for,
    }
}
