//! WebSocket transport for the chat gateway.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::USER_AGENT, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{gateway::Gateway, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let gateway = Arc::clone(&state.gateway);
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, q.user_id, user_agent))
}

/// Runs for the lifetime of one socket: outbound frames from the gateway
/// are pumped onto the socket while inbound text frames are handed to it.
async fn handle_socket(
    socket: WebSocket,
    gateway: Arc<Gateway>,
    user_id: Option<String>,
    user_agent: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client_id = gateway.connect(user_id, &user_agent, tx).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // The gateway dropped this client.
        let _ = sender.send(Message::Close(None)).await;
    });

    let inbound = Arc::clone(&gateway);
    let inbound_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => inbound.handle_frame(&inbound_id, &text).await,
                Ok(Message::Close(_)) => {
                    debug!(client_id = %inbound_id, "client sent close frame");
                    break;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(client_id = %inbound_id, "websocket receive error: {e}");
                    break;
                },
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.disconnect(&client_id).await;
    info!(client_id = %client_id, "websocket closed");
}
