#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use counsel_agent::{agents::AgentDeps, Inference, InferenceBackend, ModelTier, Orchestrator, Prompt};
use counsel_core::{
    memory::MemoryStore,
    router::Router as AgentRouter,
    session::SessionRegistry,
    types::{Case, Document, ExtractedDocument},
};
use counsel_server::{
    gateway::{Gateway, GatewaySettings},
    logging::log_channel,
    AppState,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

pub const OWNER: &str = "owner";
pub const WAIT: Duration = Duration::from_secs(5);

// ── Stub backends ────────────────────────────────────────────────────────

pub struct CannedBackend(pub &'static str);

#[async_trait]
impl InferenceBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Holds every call until the gate is opened.
pub struct GatedBackend {
    pub gate: Arc<Notify>,
}

#[async_trait]
impl InferenceBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        self.gate.notified().await;
        Ok("Released answer.".into())
    }
}

pub struct PanickingBackend;

#[async_trait]
impl InferenceBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn generate(&self, _prompt: &Prompt, _tier: ModelTier) -> Result<String> {
        panic!("backend bug")
    }
}

pub fn with_backend(backend: Arc<dyn InferenceBackend>) -> Inference {
    Inference::available(backend, Duration::from_secs(30))
}

// ── Fixtures ─────────────────────────────────────────────────────────────

pub fn case(id: &str, title: &str, owner: &str) -> Case {
    let now = Utc::now();
    Case {
        id: id.into(),
        title: title.into(),
        case_type: "contract".into(),
        status: "active".into(),
        priority: "high".into(),
        description: "Breach of a supply agreement".into(),
        created_by: owner.into(),
        created_at: now,
        updated_at: now,
        document_count: 0,
        analysis_count: 0,
    }
}

pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    store.put_case(case("c1", "Smith v. Jones", OWNER));
    store.put_case(case("c2", "Acme v. Widget", OWNER));
    store.put_case(case("c3", "Someone Else v. State", "other-user"));
    store.put_document(Document {
        id: "d1".into(),
        case_id: "c1".into(),
        filename: "Supply Agreement.pdf".into(),
        content_type: "application/pdf".into(),
        size: 1024 * 1024,
        status: "active".into(),
        extraction_status: "completed".into(),
        uploaded_at: now,
    });
    store.put_extracted(ExtractedDocument {
        id: "e1".into(),
        document_id: "d1".into(),
        case_id: "c1".into(),
        filename: "Supply Agreement.pdf".into(),
        text: "This supply agreement was signed on March 3, 2021.".into(),
        page_count: 2,
        created_at: now,
    });
    store
}

pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub store: Arc<MemoryStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(inference: Inference) -> Self {
        Self::with_store(seeded_store(), inference)
    }

    pub fn with_store(store: Arc<MemoryStore>, inference: Inference) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            AgentDeps::new(store.clone(), inference),
            AgentRouter::default(),
        ));
        let gateway = Arc::new(Gateway::new(
            SessionRegistry::new(),
            store.clone(),
            orchestrator.clone(),
            GatewaySettings::default(),
        ));
        Self {
            gateway,
            store,
            orchestrator,
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        let (log_tx, log_ring) = log_channel();
        Arc::new(AppState {
            gateway: self.gateway.clone(),
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone(),
            start_time: std::time::Instant::now(),
            log_tx,
            log_ring,
        })
    }

    /// Connects a client and consumes its `connected` greeting.
    pub async fn client(&self, user_id: &str) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .gateway
            .connect(Some(user_id.to_string()), "test-agent", tx)
            .await;
        let mut client = Client {
            id,
            user_id: user_id.to_string(),
            rx,
        };
        client.expect("connected").await;
        client
    }

    pub async fn send(&self, client: &Client, event: &str, data: Value) {
        let raw = json!({ "event": event, "data": data }).to_string();
        self.gateway.handle_frame(&client.id, &raw).await;
    }

    /// Joins `case_id` as the client's user and consumes `case_joined`.
    pub async fn join(&self, client: &mut Client, case_id: &str) -> Value {
        let data = json!({ "caseId": case_id, "userId": client.user_id });
        self.send(client, "join_case", data).await;
        client.expect("case_joined").await
    }

    pub async fn say(&self, client: &Client, case_id: &str, message: &str) {
        let data = json!({ "caseId": case_id, "userId": client.user_id, "message": message });
        self.send(client, "send_message", data).await;
    }
}

pub struct Client {
    pub id: String,
    pub user_id: String,
    pub rx: mpsc::UnboundedReceiver<String>,
}

impl Client {
    /// Next frame as `(event, data)`.
    pub async fn next(&mut self) -> (String, Value) {
        let raw = tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("gateway dropped the client");
        let mut v: Value = serde_json::from_str(&raw).unwrap();
        let event = v["event"].as_str().unwrap().to_string();
        (event, v["data"].take())
    }

    /// Next frame, which must be `event`.
    pub async fn expect(&mut self, event: &str) -> Value {
        let (got, data) = self.next().await;
        assert_eq!(got, event, "unexpected frame: {data}");
        data
    }

    /// Frames already delivered, without waiting.
    pub fn pending(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(raw) = self.rx.try_recv() {
            let v: Value = serde_json::from_str(&raw).unwrap();
            events.push(v["event"].as_str().unwrap_or_default().to_string());
        }
        events
    }
}
