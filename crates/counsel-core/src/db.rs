use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::debug;

use crate::{
    store::{ContentStore, MessageClock},
    types::{
        Case, CaseActivity, CaseAnalysis, ChatMessage, Document, ExtractedDocument, MessageType,
        NewChatMessage,
    },
};

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

const CHAT_COLUMNS: &str = "id, case_id, user_id, message, kind, agent, confidence, ts, metadata";

pub struct PgStore {
    pool: Pool,
    clock: MessageClock,
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_case(row: &Row) -> Case {
    Case {
        id: row.get("id"),
        title: row.get("title"),
        case_type: row.get("case_type"),
        status: row.get("status"),
        priority: row.get("priority"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        document_count: row.get("document_count"),
        analysis_count: row.get("analysis_count"),
    }
}

fn row_to_document(row: &Row) -> Document {
    Document {
        id: row.get("id"),
        case_id: row.get("case_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        size: row.get("size"),
        status: row.get("status"),
        extraction_status: row.get("extraction_status"),
        uploaded_at: row.get("uploaded_at"),
    }
}

fn row_to_extracted(row: &Row) -> ExtractedDocument {
    ExtractedDocument {
        id: row.get("id"),
        document_id: row.get("document_id"),
        case_id: row.get("case_id"),
        filename: row.get("filename"),
        text: row.get("text"),
        page_count: row.get("page_count"),
        created_at: row.get("created_at"),
    }
}

fn row_to_chat(row: &Row) -> ChatMessage {
    let kind: String = row.get("kind");
    let agent: Option<String> = row.get("agent");
    ChatMessage {
        id: row.get("id"),
        case_id: row.get("case_id"),
        user_id: row.get("user_id"),
        message: row.get("message"),
        message_type: if kind == "ai" { MessageType::Ai } else { MessageType::User },
        agent: agent.and_then(|a| a.parse().ok()),
        confidence: row.get("confidence"),
        timestamp: row.get("ts"),
        metadata: row.get("metadata"),
    }
}

// ── PgStore impl ──────────────────────────────────────────────────────────

impl PgStore {
    pub fn connect(url: &str) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("failed to create postgres pool")?;
        Ok(Self {
            pool,
            clock: MessageClock::default(),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        let client = self.pool.get().await.context("migrate: pool")?;
        client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("failed to apply schema migrations")?;
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.context("postgres pool exhausted")
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<Case>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, title, case_type, status, priority, description, created_by, \
                 created_at, updated_at, document_count, analysis_count \
                 FROM cases WHERE id = $1",
                &[&case_id],
            )
            .await
            .context("get_case")?;
        Ok(row.as_ref().map(row_to_case))
    }

    async fn list_documents(&self, case_id: &str) -> Result<Vec<Document>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, case_id, filename, content_type, size, status, extraction_status, \
                 uploaded_at FROM documents \
                 WHERE case_id = $1 AND status <> 'deleted' ORDER BY uploaded_at DESC",
                &[&case_id],
            )
            .await
            .context("list_documents")?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn list_extracted_documents(&self, case_id: &str, limit: usize) -> Result<Vec<ExtractedDocument>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, document_id, case_id, filename, text, page_count, created_at \
                 FROM extracted_documents WHERE case_id = $1 \
                 ORDER BY created_at DESC LIMIT $2",
                &[&case_id, &(limit as i64)],
            )
            .await
            .context("list_extracted_documents")?;
        Ok(rows.iter().map(row_to_extracted).collect())
    }

    async fn latest_case_analysis(&self, case_id: &str) -> Result<Option<CaseAnalysis>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, case_id, executive_summary, key_findings, analyzed_at \
                 FROM case_analyses WHERE case_id = $1 ORDER BY analyzed_at DESC LIMIT 1",
                &[&case_id],
            )
            .await
            .context("latest_case_analysis")?;
        Ok(row.map(|row| {
            let findings: serde_json::Value = row.get("key_findings");
            CaseAnalysis {
                id: row.get("id"),
                case_id: row.get("case_id"),
                executive_summary: row.get("executive_summary"),
                key_findings: serde_json::from_value(findings).unwrap_or_default(),
                analyzed_at: row.get("analyzed_at"),
            }
        }))
    }

    async fn list_case_activities(&self, case_id: &str, limit: usize) -> Result<Vec<CaseActivity>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT case_id, user_id, action, details, ts FROM case_activities \
                 WHERE case_id = $1 ORDER BY ts DESC LIMIT $2",
                &[&case_id, &(limit as i64)],
            )
            .await
            .context("list_case_activities")?;
        Ok(rows
            .iter()
            .map(|row| CaseActivity {
                case_id: row.get("case_id"),
                user_id: row.get("user_id"),
                action: row.get("action"),
                details: row.get("details"),
                timestamp: row.get("ts"),
            })
            .collect())
    }

    async fn insert_chat_message(&self, msg: NewChatMessage) -> Result<ChatMessage> {
        let (id, timestamp) = self.clock.next();
        let client = self.client().await?;
        let agent = msg.agent.map(|a| a.as_str());
        client
            .execute(
                "INSERT INTO chat_messages (id, case_id, user_id, message, kind, agent, \
                 confidence, ts, metadata) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &id,
                    &msg.case_id,
                    &msg.user_id,
                    &msg.message,
                    &msg.message_type.as_str(),
                    &agent,
                    &msg.confidence,
                    &timestamp,
                    &msg.metadata,
                ],
            )
            .await
            .context("insert_chat_message")?;
        Ok(ChatMessage {
            id,
            case_id: msg.case_id,
            user_id: msg.user_id,
            message: msg.message,
            message_type: msg.message_type,
            agent: msg.agent,
            confidence: msg.confidence,
            timestamp,
            metadata: msg.metadata,
        })
    }

    async fn recent_chat_messages(&self, case_id: &str, limit: usize, offset: usize) -> Result<Vec<ChatMessage>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chat_messages WHERE case_id = $1 \
             ORDER BY ts DESC LIMIT $2 OFFSET $3"
        );
        let rows = client
            .query(sql.as_str(), &[&case_id, &(limit as i64), &(offset as i64)])
            .await
            .context("recent_chat_messages")?;
        let mut messages: Vec<ChatMessage> = rows.iter().map(row_to_chat).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn all_chat_messages(&self, case_id: &str) -> Result<Vec<ChatMessage>> {
        let client = self.client().await?;
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chat_messages WHERE case_id = $1 ORDER BY ts ASC");
        let rows = client
            .query(sql.as_str(), &[&case_id])
            .await
            .context("all_chat_messages")?;
        Ok(rows.iter().map(row_to_chat).collect())
    }

    async fn delete_chat_messages(&self, case_id: &str, chunk: usize) -> Result<usize> {
        let chunk = chunk.max(1) as i64;
        let mut client = self.client().await?;
        let mut deleted = 0usize;
        loop {
            let tx = client.transaction().await.context("delete_chat_messages: begin")?;
            let n = tx
                .execute(
                    "DELETE FROM chat_messages WHERE id IN \
                     (SELECT id FROM chat_messages WHERE case_id = $1 ORDER BY ts LIMIT $2)",
                    &[&case_id, &chunk],
                )
                .await
                .context("delete_chat_messages")?;
            tx.commit().await.context("delete_chat_messages: commit")?;
            deleted += n as usize;
            debug!(case_id, batch = n, total = deleted, "deleted chat batch");
            if (n as i64) < chunk {
                break;
            }
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
        let client = self.client().await?;
        let now: DateTime<Utc> = Utc::now();
        client
            .execute(
                "INSERT INTO case_activities (case_id, user_id, action, details, ts) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[&case_id, &user_id, &action, &details, &now],
            )
            .await
            .context("record_activity")?;
        Ok(())
    }
}
