#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use counsel_agent::{agents::AgentDeps, Inference, InferenceBackend, ModelTier, Prompt};
use counsel_core::{
    memory::MemoryStore,
    types::{Case, CaseActivity, Document, ExtractedDocument},
};

pub const TIMEOUT: Duration = Duration::from_secs(30);

// ── Stub backends ────────────────────────────────────────────────────────

pub struct FailingBackend;

#[async_trait]
impl InferenceBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        bail!("connection refused")
    }
}

/// Never answers within any sane timeout.
pub struct StalledBackend;

#[async_trait]
impl InferenceBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".into())
    }
}

pub struct BlankBackend;

#[async_trait]
impl InferenceBackend for BlankBackend {
    fn name(&self) -> &str {
        "blank"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        Ok("  \n ".into())
    }
}

/// Returns a fixed reply and records every call.
pub struct CannedBackend {
    reply: String,
    pub calls: Mutex<Vec<(Prompt, ModelTier)>>,
}

impl CannedBackend {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Prompt, ModelTier)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, prompt: &Prompt, tier: ModelTier) -> Result<String> {
        self.calls.lock().unwrap().push((prompt.clone(), tier));
        Ok(self.reply.clone())
    }
}

pub fn with_backend(backend: Arc<dyn InferenceBackend>) -> Inference {
    Inference::available(backend, TIMEOUT)
}

/// Every way the model can fail to produce text.
pub fn degraded_inferences() -> Vec<(&'static str, Inference)> {
    vec![
        ("failing", with_backend(Arc::new(FailingBackend))),
        ("blank", with_backend(Arc::new(BlankBackend))),
        ("unavailable", Inference::unavailable("no api key")),
    ]
}

// ── Fixtures ─────────────────────────────────────────────────────────────

pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    store.put_case(Case {
        id: "c1".into(),
        title: "Smith v. Jones".into(),
        case_type: "contract".into(),
        status: "active".into(),
        priority: "high".into(),
        description: "Breach of a supply agreement".into(),
        created_by: "owner".into(),
        created_at: now,
        updated_at: now,
        document_count: 1,
        analysis_count: 0,
    });
    store.put_document(Document {
        id: "d1".into(),
        case_id: "c1".into(),
        filename: "Supply Agreement.pdf".into(),
        content_type: "application/pdf".into(),
        size: 2 * 1024 * 1024,
        status: "active".into(),
        extraction_status: "completed".into(),
        uploaded_at: now,
    });
    store.put_extracted(ExtractedDocument {
        id: "e1".into(),
        document_id: "d1".into(),
        case_id: "c1".into(),
        filename: "Supply Agreement.pdf".into(),
        text: "This supply agreement was signed on March 3, 2021. Delivery was due \
               1 June 2022 and the supplier failed to deliver."
            .into(),
        page_count: 3,
        created_at: now,
    });
    store.put_activity(CaseActivity {
        case_id: "c1".into(),
        user_id: "owner".into(),
        action: "document_uploaded".into(),
        details: serde_json::json!({"documentId": "d1"}),
        timestamp: now,
    });
    store
}

pub fn deps(store: Arc<MemoryStore>, inference: Inference) -> AgentDeps {
    AgentDeps::new(store, inference)
}
