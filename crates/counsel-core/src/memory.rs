use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::{
    store::{ContentStore, MessageClock},
    types::{
        Case, CaseActivity, CaseAnalysis, ChatMessage, Document, ExtractedDocument,
        NewChatMessage,
    },
};

#[derive(Default)]
struct Tables {
    cases: HashMap<String, Case>,
    documents: Vec<Document>,
    extracted: Vec<ExtractedDocument>,
    analyses: Vec<CaseAnalysis>,
    activities: Vec<CaseActivity>,
    /// Per case, in insertion (= timestamp) order.
    chat: HashMap<String, Vec<ChatMessage>>,
}

/// In-process store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    clock: MessageClock,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes every subsequent chat write fail. Reads are unaffected.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    // ── Seeding ──────────────────────────────────────────────────────────

    pub fn put_case(&self, case: Case) {
        self.tables().cases.insert(case.id.clone(), case);
    }

    pub fn put_document(&self, doc: Document) {
        self.tables().documents.push(doc);
    }

    pub fn put_extracted(&self, doc: ExtractedDocument) {
        self.tables().extracted.push(doc);
    }

    pub fn put_analysis(&self, analysis: CaseAnalysis) {
        self.tables().analyses.push(analysis);
    }

    pub fn put_activity(&self, activity: CaseActivity) {
        self.tables().activities.push(activity);
    }

    pub fn chat_len(&self, case_id: &str) -> usize {
        self.tables().chat.get(case_id).map_or(0, Vec::len)
    }

    pub fn activities(&self, case_id: &str) -> Vec<CaseActivity> {
        self.tables()
            .activities
            .iter()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<Case>> {
        Ok(self.tables().cases.get(case_id).cloned())
    }

    async fn list_documents(&self, case_id: &str) -> Result<Vec<Document>> {
        Ok(self
            .tables()
            .documents
            .iter()
            .filter(|d| d.case_id == case_id && d.status != "deleted")
            .cloned()
            .collect())
    }

    async fn list_extracted_documents(&self, case_id: &str, limit: usize) -> Result<Vec<ExtractedDocument>> {
        let mut docs: Vec<ExtractedDocument> = self
            .tables()
            .extracted
            .iter()
            .filter(|d| d.case_id == case_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn latest_case_analysis(&self, case_id: &str) -> Result<Option<CaseAnalysis>> {
        Ok(self
            .tables()
            .analyses
            .iter()
            .filter(|a| a.case_id == case_id)
            .max_by_key(|a| a.analyzed_at)
            .cloned())
    }

    async fn list_case_activities(&self, case_id: &str, limit: usize) -> Result<Vec<CaseActivity>> {
        let mut acts = self.activities(case_id);
        acts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        acts.truncate(limit);
        Ok(acts)
    }

    async fn insert_chat_message(&self, msg: NewChatMessage) -> Result<ChatMessage> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("chat store is read-only");
        }
        let (id, timestamp) = self.clock.next();
        let stored = ChatMessage {
            id,
            case_id: msg.case_id,
            user_id: msg.user_id,
            message: msg.message,
            message_type: msg.message_type,
            agent: msg.agent,
            confidence: msg.confidence,
            timestamp,
            metadata: msg.metadata,
        };
        self.tables()
            .chat
            .entry(stored.case_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn recent_chat_messages(&self, case_id: &str, limit: usize, offset: usize) -> Result<Vec<ChatMessage>> {
        let tables = self.tables();
        let Some(all) = tables.chat.get(case_id) else {
            return Ok(Vec::new());
        };
        let end = all.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);
        Ok(all[start..end].to_vec())
    }

    async fn all_chat_messages(&self, case_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.tables().chat.get(case_id).cloned().unwrap_or_default())
    }

    async fn delete_chat_messages(&self, case_id: &str, chunk: usize) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("chat store is read-only");
        }
        let chunk = chunk.max(1);
        let mut deleted = 0;
        loop {
            let mut tables = self.tables();
            let Some(messages) = tables.chat.get_mut(case_id) else {
                break;
            };
            let n = chunk.min(messages.len());
            if n == 0 {
                tables.chat.remove(case_id);
                break;
            }
            messages.drain(..n);
            deleted += n;
        }
        Ok(deleted)
    }

    async fn record_activity(
        &self,
        case_id: &str,
        user_id: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        self.put_activity(CaseActivity {
            case_id: case_id.to_string(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            details,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
