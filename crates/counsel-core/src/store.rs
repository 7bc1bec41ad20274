use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    Case, CaseActivity, CaseAnalysis, ChatMessage, Document, ExtractedDocument, NewChatMessage,
};

/// Batch size for bulk chat deletion.
pub const DELETE_CHUNK: usize = 500;

/// Persistence boundary for cases, documents and chat history.
///
/// Chat messages are append-only from the gateway's side: the only mutation
/// besides insert is the owner's bulk clear.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_case(&self, case_id: &str) -> Result<Option<Case>>;

    /// Documents for a case, excluding soft-deleted ones.
    async fn list_documents(&self, case_id: &str) -> Result<Vec<Document>>;

    /// Extracted text, newest first.
    async fn list_extracted_documents(&self, case_id: &str, limit: usize) -> Result<Vec<ExtractedDocument>>;

    async fn latest_case_analysis(&self, case_id: &str) -> Result<Option<CaseAnalysis>>;

    /// Activity log, newest first.
    async fn list_case_activities(&self, case_id: &str, limit: usize) -> Result<Vec<CaseActivity>>;

    /// Assigns id and timestamp. Timestamps are strictly increasing per store.
    async fn insert_chat_message(&self, msg: NewChatMessage) -> Result<ChatMessage>;

    /// The newest `limit` messages after skipping the `offset` newest,
    /// returned oldest first.
    async fn recent_chat_messages(&self, case_id: &str, limit: usize, offset: usize) -> Result<Vec<ChatMessage>>;

    /// Full history, oldest first.
    async fn all_chat_messages(&self, case_id: &str) -> Result<Vec<ChatMessage>>;

    /// Deletes every message of the case, `chunk` at a time. Each chunk is
    /// all-or-nothing. Returns the number deleted.
    async fn delete_chat_messages(&self, case_id: &str, chunk: usize) -> Result<usize>;

    async fn record_activity(
        &self,
        case_id: &str,
        user_id: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<()>;
}

/// Hands out strictly increasing timestamps and unique message ids.
/// Resolution is one microsecond, matching Postgres `timestamptz`.
#[derive(Debug, Default)]
pub struct MessageClock {
    last_micros: Mutex<i64>,
}

impl MessageClock {
    pub fn next(&self) -> (String, DateTime<Utc>) {
        let mut last = match self.last_micros.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let micros = Utc::now().timestamp_micros().max(*last + 1);
        *last = micros;
        let ts = DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now);
        (format!("msg_{micros:x}"), ts)
    }
}
