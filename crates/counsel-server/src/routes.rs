use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use chrono::{NaiveDate, Utc};
use counsel_core::{catalog, AgentId, ChatMessage, MessageType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

use crate::AppState;

const DEFAULT_SUMMARY_COUNT: usize = 20;
const MAX_SUMMARY_COUNT: usize = 100;

// ── Error helper ──────────────────────────────────────────────────────────

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub count: Option<usize>,
}

// ── Health ────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (connections, chats) = state.registry().counts().await;
    Json(json!({
        "status": "healthy",
        "service": "counsel-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
        "uptime_s": state.start_time.elapsed().as_secs(),
        "active_connections": connections,
        "active_chats": chats,
    }))
}

/// Ready once the store answers. Inference being down only degrades replies.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let store_ok = match state.store.get_case("__readiness__").await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("store not ready: {e:#}");
            false
        },
    };
    let inference = state.orchestrator.inference();
    let (connections, chats) = state.registry().counts().await;
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": store_ok,
            "store": store_ok,
            "inference": inference.is_available(),
            "inference_backend": inference.describe(),
            "active_connections": connections,
            "active_chats": chats,
        })),
    )
}

// ── Agents ────────────────────────────────────────────────────────────────

pub async fn list_agents() -> Json<Value> {
    Json(json!(catalog::all()))
}

pub async fn get_agent(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    let agent: AgentId = id.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    let info = catalog::info(agent);
    let profile = catalog::profile(agent);
    Ok(Json(json!({
        "id": agent,
        "name": info.name,
        "description": info.description,
        "icon": info.icon,
        "capabilities": profile.capabilities,
        "bestFor": profile.best_for,
    })))
}

// ── Cases ─────────────────────────────────────────────────────────────────

pub async fn conversation_summary(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    Query(q): Query<SummaryQuery>,
) -> Json<Value> {
    let count = q
        .count
        .unwrap_or(DEFAULT_SUMMARY_COUNT)
        .clamp(1, MAX_SUMMARY_COUNT);
    let summary = state.orchestrator.conversation_summary(&case_id, count).await;
    Json(json!({
        "caseId": case_id,
        "summary": summary,
        "messageCount": count,
    }))
}

pub async fn case_insights(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Json<Value> {
    let insights = state.orchestrator.case_insights(&case_id).await;
    Json(json!({ "caseId": case_id, "insights": insights }))
}

pub async fn chat_stats(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let messages = state
        .store
        .all_chat_messages(&case_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "caseId": case_id,
        "stats": ChatStats::from_messages(&messages),
    })))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDay {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub ai_messages: usize,
    /// Replies per agent id.
    pub agents: BTreeMap<String, usize>,
    pub most_active_day: Option<ActiveDay>,
    /// Over days with at least one message, to one decimal.
    pub avg_messages_per_day: f64,
}

impl ChatStats {
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let mut agents = BTreeMap::new();
        let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        let mut user_messages = 0;
        let mut ai_messages = 0;

        for m in messages {
            match m.message_type {
                MessageType::User => user_messages += 1,
                MessageType::Ai => ai_messages += 1,
            }
            if let Some(agent) = m.agent {
                *agents.entry(agent.as_str().to_string()).or_insert(0) += 1;
            }
            *days.entry(m.timestamp.date_naive()).or_insert(0) += 1;
        }

        // Earliest day wins a tie.
        let mut most_active_day: Option<ActiveDay> = None;
        for (date, count) in &days {
            if most_active_day.as_ref().map_or(true, |d| *count > d.count) {
                most_active_day = Some(ActiveDay {
                    date: *date,
                    count: *count,
                });
            }
        }

        let avg_messages_per_day = if days.is_empty() {
            0.0
        } else {
            let avg = messages.len() as f64 / days.len() as f64;
            (avg * 10.0).round() / 10.0
        };

        Self {
            total_messages: messages.len(),
            user_messages,
            ai_messages,
            agents,
            most_active_day,
            avg_messages_per_day,
        }
    }
}

// ── SSE logs ──────────────────────────────────────────────────────────────

pub async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting the ring so nothing falls in between.
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
