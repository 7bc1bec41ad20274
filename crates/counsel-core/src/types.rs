use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on a single chat message, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

// ── Agents ───────────────────────────────────────────────────────────────

/// One of the four specialised responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    Evidence,
    Summary,
    Draft,
    General,
}

impl AgentId {
    /// Fixed priority order; also the router's tie-break order.
    pub const ALL: [AgentId; 4] = [
        AgentId::Evidence,
        AgentId::Summary,
        AgentId::Draft,
        AgentId::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Evidence => "evidence",
            AgentId::Summary => "summary",
            AgentId::Draft => "draft",
            AgentId::General => "general",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evidence" => Ok(AgentId::Evidence),
            "summary" => Ok(AgentId::Summary),
            "draft" => Ok(AgentId::Draft),
            "general" => Ok(AgentId::General),
            other => anyhow::bail!("unknown agent id: {other}"),
        }
    }
}

// ── Cases & documents ────────────────────────────────────────────────────

/// A legal matter. Read-only context for the chat core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub case_type: String,
    /// "active" | "closed" | ... (soft delete goes through here)
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub document_count: i64,
    #[serde(default)]
    pub analysis_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub case_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    /// "active" | "deleted"
    pub status: String,
    /// "completed" | "pending" | "error"
    pub extraction_status: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Text pulled out of a document by the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub id: String,
    pub document_id: String,
    pub case_id: String,
    pub filename: String,
    pub text: String,
    #[serde(default)]
    pub page_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseAnalysis {
    pub id: String,
    pub case_id: String,
    pub executive_summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseActivity {
    pub case_id: String,
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

// ── Chat ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Ai,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Ai => "ai",
        }
    }
}

/// A persisted chat message. `agent` and `confidence` are present iff the
/// message was written by an agent; other tooling depends on these field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub case_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChatMessage {
    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry {
            message_type: self.message_type,
            message: self.message.clone(),
            agent: self.agent,
            timestamp: self.timestamp,
            user_id: self.user_id.clone(),
        }
    }
}

/// Insert payload; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub case_id: String,
    pub user_id: String,
    pub message: String,
    pub message_type: MessageType,
    pub agent: Option<AgentId>,
    pub confidence: Option<f64>,
    pub metadata: serde_json::Value,
}

impl NewChatMessage {
    pub fn user(case_id: &str, user_id: &str, message: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            message_type: MessageType::User,
            agent: None,
            confidence: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn ai(case_id: &str, user_id: &str, reply: &AgentResponse, metadata: serde_json::Value) -> Self {
        Self {
            case_id: case_id.to_string(),
            user_id: user_id.to_string(),
            message: reply.text.clone(),
            message_type: MessageType::Ai,
            agent: Some(reply.agent),
            confidence: Some(reply.confidence),
            metadata,
        }
    }
}

/// One prior turn as handed to the orchestrator and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agent: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_id: String,
}

/// Transient result of one orchestrated turn; folded into the AI message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub text: String,
    pub agent: AgentId,
    pub confidence: f64,
    pub processing_time_s: f64,
}

// ── Sessions ─────────────────────────────────────────────────────────────

/// Snapshot of a live per-case chat room. Never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChat {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub client_count: usize,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
}

/// Snapshot of one client connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub user_id: Option<String>,
    /// Case the connection is currently joined to.
    pub case_id: Option<String>,
    pub user_agent: String,
}
