pub mod gateway;
pub mod logging;
pub mod routes;
pub mod ws;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Instant,
};

use axum::{routing::get, Router};
use counsel_agent::Orchestrator;
use counsel_core::{session::SessionRegistry, store::ContentStore};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::gateway::Gateway;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn ContentStore>,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: Arc<Mutex<VecDeque<String>>>,
}

impl AppState {
    pub fn registry(&self) -> &SessionRegistry {
        self.gateway.registry()
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Realtime
        .route("/ws", get(ws::ws_handler))
        // Agents
        .route("/agents", get(routes::list_agents))
        .route("/agents/:id", get(routes::get_agent))
        // Cases
        .route(
            "/cases/:id/conversation-summary",
            get(routes::conversation_summary),
        )
        .route("/cases/:id/insights", get(routes::case_insights))
        .route("/cases/:id/chat-stats", get(routes::chat_stats))
        // Health
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        // SSE logs
        .route("/logs", get(routes::sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
