//! Realtime chat protocol, independent of the transport.
//!
//! Every frame is a JSON object `{"event": ..., "data": ...}`. Each client
//! owns an unbounded sender; the transport drains the matching receiver
//! onto its socket. Agent replies run on a spawned task so a slow model
//! never holds up delivery to anyone else.

use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use counsel_agent::Orchestrator;
use counsel_core::{
    catalog,
    session::{SessionRegistry, SweepReport},
    store::{ContentStore, DELETE_CHUNK},
    Case, ChatMessage, HistoryEntry, NewChatMessage, MAX_MESSAGE_CHARS,
};
use futures_util::FutureExt;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

pub const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const GENERIC_ERROR: &str = "An unexpected error occurred";
const IDS_REQUIRED: &str = "caseId and userId are required";

type Peers = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<String>>>>;

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("access denied to case {case_id}")]
    AccessDenied { case_id: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AccessDenied { .. } => "access_denied",
            Self::Internal(_) => "internal_error",
        }
    }

    /// What the client sees. Internal details stay in the log.
    pub fn payload(&self) -> Value {
        let message = match self {
            Self::Validation(msg) => msg.clone(),
            Self::AccessDenied { .. } => "Access denied to this case".to_string(),
            Self::Internal(_) => GENERIC_ERROR.to_string(),
        };
        json!({ "error": message, "code": self.code() })
    }
}

fn validation(msg: impl Into<String>) -> GatewayError {
    GatewayError::Validation(msg.into())
}

// ── Inbound events ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinCase(CaseRef),
    LeaveCase(CaseRef),
    SendMessage(MessageBody),
    GetChatHistory(HistoryQuery),
    ClearChatHistory(CaseRef),
    TypingStart(CaseRef),
    TypingStop(CaseRef),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRef {
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub user_id: String,
}

impl CaseRef {
    fn require(&self) -> Result<(), GatewayError> {
        require_ids(&self.case_id, &self.user_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub user_id: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn require_ids(case_id: &str, user_id: &str) -> Result<(), GatewayError> {
    if case_id.trim().is_empty() || user_id.trim().is_empty() {
        return Err(validation(IDS_REQUIRED));
    }
    Ok(())
}

/// Serializes one outbound frame.
pub fn frame(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

fn deliver(peers: &Peers, recipients: &[String], text: &str) {
    let peers = peers.lock().unwrap_or_else(|e| e.into_inner());
    for id in recipients {
        if let Some(tx) = peers.get(id) {
            // A closed receiver means the socket is going away.
            let _ = tx.send(text.to_string());
        }
    }
}

fn presence(user_id: &str, case_id: &str) -> Value {
    json!({ "userId": user_id, "caseId": case_id, "timestamp": Utc::now() })
}

fn new_client_id() -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("client_{n:016x}")
}

// ── Thinking indicator ────────────────────────────────────────────────────

/// Sends `ai_thinking` when created and `ai_thinking_stop` when dropped,
/// to the same recipients, however the agent task ends.
struct ThinkingGuard {
    peers: Peers,
    recipients: Vec<String>,
    stop: String,
}

impl ThinkingGuard {
    fn start(peers: Peers, recipients: Vec<String>, case_id: &str) -> Self {
        let start = frame(
            "ai_thinking",
            json!({ "caseId": case_id, "timestamp": Utc::now() }),
        );
        deliver(&peers, &recipients, &start);
        Self {
            peers,
            recipients,
            stop: frame("ai_thinking_stop", json!({ "caseId": case_id })),
        }
    }
}

impl Drop for ThinkingGuard {
    fn drop(&mut self) {
        deliver(&self.peers, &self.recipients, &self.stop);
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Prior turns handed to the orchestrator.
    pub context_history_limit: usize,
    /// Messages returned in `case_joined`.
    pub join_history_limit: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            context_history_limit: 10,
            join_history_limit: 20,
        }
    }
}

/// One user turn waiting on an agent reply.
struct Turn {
    client_id: String,
    case_id: String,
    user_id: String,
    message: String,
    history: Vec<HistoryEntry>,
    reply_to: String,
}

pub struct Gateway {
    registry: SessionRegistry,
    store: Arc<dyn ContentStore>,
    orchestrator: Arc<Orchestrator>,
    peers: Peers,
    settings: GatewaySettings,
}

impl Gateway {
    pub fn new(
        registry: SessionRegistry,
        store: Arc<dyn ContentStore>,
        orchestrator: Arc<Orchestrator>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            registry,
            store,
            orchestrator,
            peers: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<String>>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a client and greets it with `connected`. Returns its id.
    pub async fn connect(
        &self,
        user_id: Option<String>,
        user_agent: &str,
        tx: mpsc::UnboundedSender<String>,
    ) -> String {
        let client_id = new_client_id();
        let conn = self.registry.connect(&client_id, user_id, user_agent).await;
        self.peers().insert(client_id.clone(), tx);
        info!(client_id = %client_id, user_id = ?conn.user_id, "client connected");

        self.send_to(
            &client_id,
            "connected",
            json!({
                "status": "connected",
                "clientId": client_id,
                "timestamp": conn.connected_at,
                "availableAgents": catalog::all(),
            }),
        );
        client_id
    }

    pub async fn disconnect(&self, client_id: &str) {
        self.peers().remove(client_id);
        let Some(conn) = self.registry.disconnect(client_id).await else {
            return;
        };
        if let Some(case_id) = &conn.case_id {
            let user_id = conn.user_id.clone().unwrap_or_default();
            self.broadcast(case_id, Some(client_id), "user_left", presence(&user_id, case_id))
                .await;
        }
        info!(client_id, case_id = ?conn.case_id, "client disconnected");
    }

    pub async fn sweep(&self, idle_timeout: Duration) -> SweepReport {
        self.sweep_at(Instant::now(), idle_timeout).await
    }

    /// Evicts idle sessions and tells the affected clients. An evicted
    /// connection loses its sender, which ends its socket; a client whose
    /// room went idle gets `case_left` and stays connected.
    pub async fn sweep_at(&self, now: Instant, idle_timeout: Duration) -> SweepReport {
        let report = self.registry.sweep_at(now, idle_timeout).await;
        {
            let mut peers = self.peers();
            for client_id in &report.connections {
                peers.remove(client_id);
            }
        }

        for departure in &report.departures {
            let evicted = report.connections.contains(&departure.client_id);
            if evicted {
                let user_id = departure.user_id.clone().unwrap_or_default();
                self.broadcast(
                    &departure.case_id,
                    Some(&departure.client_id),
                    "user_left",
                    presence(&user_id, &departure.case_id),
                )
                .await;
            } else {
                self.send_to(
                    &departure.client_id,
                    "case_left",
                    json!({
                        "caseId": departure.case_id,
                        "reason": "idle",
                        "timestamp": Utc::now(),
                    }),
                );
            }
        }

        if !report.connections.is_empty() || !report.chats.is_empty() {
            info!(
                connections = report.connections.len(),
                chats = report.chats.len(),
                "evicted idle sessions"
            );
        }
        report
    }

    /// Handles one inbound text frame. Failures end as an `error` event to
    /// the sender; the connection stays up.
    pub async fn handle_frame(self: &Arc<Self>, client_id: &str, raw: &str) {
        self.registry.touch(client_id).await;

        let event = match serde_json::from_str::<ClientEvent>(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(client_id, "unparseable frame: {e}");
                self.send_error(client_id, &validation("Invalid message format"));
                return;
            },
        };

        let outcome = AssertUnwindSafe(self.dispatch(client_id, event))
            .catch_unwind()
            .await;
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(_) => GatewayError::Internal(anyhow!("event handler panicked")),
        };
        match &err {
            GatewayError::Validation(msg) => debug!(client_id, "rejected: {msg}"),
            GatewayError::AccessDenied { case_id } => {
                warn!(client_id, case_id = %case_id, "access denied")
            },
            GatewayError::Internal(e) => error!(client_id, "event failed: {e:#}"),
        }
        self.send_error(client_id, &err);
    }

    async fn dispatch(self: &Arc<Self>, client_id: &str, event: ClientEvent) -> Result<(), GatewayError> {
        match event {
            ClientEvent::JoinCase(req) => self.join_case(client_id, req).await,
            ClientEvent::LeaveCase(req) => self.leave_case(client_id, req).await,
            ClientEvent::SendMessage(req) => self.send_message(client_id, req).await,
            ClientEvent::GetChatHistory(req) => self.chat_history(client_id, req).await,
            ClientEvent::ClearChatHistory(req) => self.clear_chat_history(client_id, req).await,
            ClientEvent::TypingStart(req) => self.relay_typing(client_id, req, "typing_start").await,
            ClientEvent::TypingStop(req) => self.relay_typing(client_id, req, "typing_stop").await,
        }
    }

    /// Only the case owner may use its chat.
    async fn authorize(&self, case_id: &str, user_id: &str) -> Result<Case, GatewayError> {
        let case = self
            .store
            .get_case(case_id)
            .await
            .context("case lookup")?;
        match case {
            Some(case) if case.created_by == user_id => Ok(case),
            _ => Err(GatewayError::AccessDenied {
                case_id: case_id.to_string(),
            }),
        }
    }

    async fn join_case(&self, client_id: &str, req: CaseRef) -> Result<(), GatewayError> {
        req.require()?;
        let case = self.authorize(&req.case_id, &req.user_id).await?;

        let outcome = self.registry.join(client_id, &req.case_id, &req.user_id).await;
        if let Some(previous) = &outcome.left {
            self.broadcast(previous, Some(client_id), "user_left", presence(&req.user_id, previous))
                .await;
        }

        let history = match self
            .store
            .recent_chat_messages(&req.case_id, self.settings.join_history_limit, 0)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(case_id = %req.case_id, "history lookup failed: {e:#}");
                Vec::new()
            },
        };

        self.send_to(
            client_id,
            "case_joined",
            json!({
                "caseId": req.case_id,
                "caseInfo": self.case_info(&case).await,
                "chatHistory": history,
                "activeChat": outcome.chat,
            }),
        );
        if !outcome.rejoined {
            self.broadcast(
                &req.case_id,
                Some(client_id),
                "user_joined",
                presence(&req.user_id, &req.case_id),
            )
            .await;
            self.log_activity(&req.case_id, &req.user_id, "chat_joined", json!({ "clientId": client_id }))
                .await;
        }
        info!(
            client_id,
            case_id = %req.case_id,
            clients = outcome.chat.client_count,
            "joined case"
        );
        Ok(())
    }

    async fn case_info(&self, case: &Case) -> Value {
        let document_count = match self.store.list_documents(&case.id).await {
            Ok(docs) => docs.len() as i64,
            Err(_) => case.document_count,
        };
        json!({
            "id": case.id,
            "title": case.title,
            "type": case.case_type,
            "status": case.status,
            "priority": case.priority,
            "description": case.description,
            "createdAt": case.created_at,
            "updatedAt": case.updated_at,
            "documentCount": document_count,
            "analysisCount": case.analysis_count,
        })
    }

    async fn leave_case(&self, client_id: &str, req: CaseRef) -> Result<(), GatewayError> {
        req.require()?;
        if self.registry.leave(client_id, &req.case_id).await {
            self.broadcast(
                &req.case_id,
                Some(client_id),
                "user_left",
                presence(&req.user_id, &req.case_id),
            )
            .await;
            self.log_activity(&req.case_id, &req.user_id, "chat_left", json!({ "clientId": client_id }))
                .await;
            info!(client_id, case_id = %req.case_id, "left case");
        }
        self.send_to(
            client_id,
            "case_left",
            json!({ "caseId": req.case_id, "timestamp": Utc::now() }),
        );
        Ok(())
    }

    async fn send_message(self: &Arc<Self>, client_id: &str, req: MessageBody) -> Result<(), GatewayError> {
        require_ids(&req.case_id, &req.user_id)?;
        let text = req.message.trim();
        if text.is_empty() {
            return Err(validation("Message cannot be empty"));
        }
        if req.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(validation(format!(
                "Message too long (max {MAX_MESSAGE_CHARS} characters)"
            )));
        }
        self.authorize(&req.case_id, &req.user_id).await?;

        // Context is read before the new message lands.
        let history = match self
            .store
            .recent_chat_messages(&req.case_id, self.settings.context_history_limit, 0)
            .await
        {
            Ok(messages) => messages.iter().map(ChatMessage::to_history).collect(),
            Err(e) => {
                warn!(case_id = %req.case_id, "context lookup failed: {e:#}");
                Vec::new()
            },
        };

        let saved = self
            .save(NewChatMessage::user(&req.case_id, &req.user_id, text))
            .await;
        self.registry.record_message(&req.case_id).await;
        let audience = self.audience(&req.case_id, client_id).await;
        deliver(&self.peers, &audience, &frame("message_received", json!(saved)));
        self.log_activity(
            &req.case_id,
            &req.user_id,
            "chat_message_sent",
            json!({ "messageId": saved.id }),
        )
        .await;

        let turn = Turn {
            client_id: client_id.to_string(),
            case_id: req.case_id,
            user_id: req.user_id,
            message: text.to_string(),
            history,
            reply_to: saved.id,
        };
        let gateway = Arc::clone(self);
        tokio::spawn(async move { gateway.respond(turn).await });
        Ok(())
    }

    /// Background half of `send_message`.
    async fn respond(self: Arc<Self>, turn: Turn) {
        let audience = self.audience(&turn.case_id, &turn.client_id).await;
        let thinking = ThinkingGuard::start(Arc::clone(&self.peers), audience, &turn.case_id);

        let outcome = AssertUnwindSafe(self.orchestrator.handle(
            &turn.case_id,
            &turn.user_id,
            &turn.message,
            &turn.history,
        ))
        .catch_unwind()
        .await;
        drop(thinking);

        let reply = match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!(case_id = %turn.case_id, reply_to = %turn.reply_to, "no agent reply");
                self.send_error(&turn.client_id, &GatewayError::Internal(anyhow!("empty reply")));
                return;
            },
            Err(_) => {
                error!(case_id = %turn.case_id, reply_to = %turn.reply_to, "agent task panicked");
                self.send_error(&turn.client_id, &GatewayError::Internal(anyhow!("agent panicked")));
                return;
            },
        };

        let metadata = json!({
            "agent": reply.agent,
            "confidence": reply.confidence,
            "processingTime": reply.processing_time_s,
            "replyTo": turn.reply_to,
        });
        let saved = self
            .save(NewChatMessage::ai(&turn.case_id, &turn.user_id, &reply, metadata))
            .await;
        self.registry.record_message(&turn.case_id).await;

        let audience = self.audience(&turn.case_id, &turn.client_id).await;
        deliver(&self.peers, &audience, &frame("message_received", json!(saved)));
    }

    /// Persists a message. A failed write yields an `error_<unix micros>`
    /// placeholder so the conversation keeps flowing.
    async fn save(&self, msg: NewChatMessage) -> ChatMessage {
        match self.store.insert_chat_message(msg.clone()).await {
            Ok(saved) => saved,
            Err(e) => {
                let now = Utc::now();
                error!(case_id = %msg.case_id, "saving chat message failed: {e:#}");
                ChatMessage {
                    id: format!("error_{}", now.timestamp_micros()),
                    case_id: msg.case_id,
                    user_id: msg.user_id,
                    message: msg.message,
                    message_type: msg.message_type,
                    agent: msg.agent,
                    confidence: msg.confidence,
                    timestamp: now,
                    metadata: msg.metadata,
                }
            },
        }
    }

    async fn chat_history(&self, client_id: &str, req: HistoryQuery) -> Result<(), GatewayError> {
        require_ids(&req.case_id, &req.user_id)?;
        self.authorize(&req.case_id, &req.user_id).await?;

        let limit = req.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
        let offset = req.offset.unwrap_or(0);
        let messages = self
            .store
            .recent_chat_messages(&req.case_id, limit, offset)
            .await
            .context("chat history lookup")?;
        let has_more = limit > 0 && messages.len() == limit;

        self.send_to(
            client_id,
            "chat_history",
            json!({
                "caseId": req.case_id,
                "messages": messages,
                "limit": limit,
                "offset": offset,
                "hasMore": has_more,
            }),
        );
        Ok(())
    }

    async fn clear_chat_history(&self, client_id: &str, req: CaseRef) -> Result<(), GatewayError> {
        req.require()?;
        self.authorize(&req.case_id, &req.user_id).await?;

        let deleted = self
            .store
            .delete_chat_messages(&req.case_id, DELETE_CHUNK)
            .await
            .context("clearing chat history")?;

        let audience = self.audience(&req.case_id, client_id).await;
        let cleared = frame(
            "chat_history_cleared",
            json!({
                "caseId": req.case_id,
                "clearedBy": req.user_id,
                "deletedCount": deleted,
                "timestamp": Utc::now(),
            }),
        );
        deliver(&self.peers, &audience, &cleared);
        self.log_activity(
            &req.case_id,
            &req.user_id,
            "chat_history_cleared",
            json!({ "deletedCount": deleted }),
        )
        .await;
        info!(case_id = %req.case_id, deleted, "chat history cleared");
        Ok(())
    }

    /// Typing indicators go to the other members of a room the sender is in.
    async fn relay_typing(&self, client_id: &str, req: CaseRef, event: &str) -> Result<(), GatewayError> {
        req.require()?;
        let members = self.registry.members(&req.case_id).await;
        if !members.iter().any(|id| id == client_id) {
            debug!(client_id, case_id = %req.case_id, "typing outside joined case ignored");
            return Ok(());
        }
        let others: Vec<String> = members.into_iter().filter(|id| id != client_id).collect();
        deliver(
            &self.peers,
            &others,
            &frame(event, json!({ "userId": req.user_id, "caseId": req.case_id })),
        );
        Ok(())
    }

    // ── Delivery ──────────────────────────────────────────────────────────

    fn send_to(&self, client_id: &str, event: &str, data: Value) {
        deliver(&self.peers, &[client_id.to_string()], &frame(event, data));
    }

    fn send_error(&self, client_id: &str, err: &GatewayError) {
        self.send_to(client_id, "error", err.payload());
    }

    /// Room members, plus the sender if it has not joined.
    async fn audience(&self, case_id: &str, client_id: &str) -> Vec<String> {
        let mut ids = self.registry.members(case_id).await;
        if !ids.iter().any(|id| id == client_id) {
            ids.push(client_id.to_string());
        }
        ids
    }

    async fn broadcast(&self, case_id: &str, except: Option<&str>, event: &str, data: Value) {
        let recipients: Vec<String> = self
            .registry
            .members(case_id)
            .await
            .into_iter()
            .filter(|id| Some(id.as_str()) != except)
            .collect();
        if recipients.is_empty() {
            return;
        }
        deliver(&self.peers, &recipients, &frame(event, data));
    }

    async fn log_activity(&self, case_id: &str, user_id: &str, action: &str, details: Value) {
        if let Err(e) = self
            .store
            .record_activity(case_id, user_id, action, details)
            .await
        {
            warn!(case_id, action, "activity log failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_hides_internal_detail() {
        let err = GatewayError::Internal(anyhow!("password=hunter2 in connection string"));
        let payload = err.payload();
        assert_eq!(payload["code"], "internal_error");
        assert_eq!(payload["error"], GENERIC_ERROR);
    }

    #[test]
    fn frames_are_tagged_by_event() {
        let parsed: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"caseId":"c1","userId":"u1","message":"hi"}}"#,
        )
        .unwrap();
        match parsed {
            ClientEvent::SendMessage(body) => {
                assert_eq!(body.case_id, "c1");
                assert_eq!(body.message, "hi");
            },
            other => panic!("unexpected {other:?}"),
        }

        let out: Value = serde_json::from_str(&frame("case_left", json!({"caseId": "c1"}))).unwrap();
        assert_eq!(out["event"], "case_left");
        assert_eq!(out["data"]["caseId"], "c1");
    }

    #[test]
    fn unknown_events_do_not_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"shutdown","data":{}}"#).is_err());
    }
}
