use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use crate::types::{ActiveChat, Connection};

struct ConnState {
    connected_at: DateTime<Utc>,
    user_id: Option<String>,
    /// Joined case. Membership in `ChatState::members` mirrors this.
    case_id: Option<String>,
    user_agent: String,
    last_activity: Instant,
}

struct ChatState {
    created_at: DateTime<Utc>,
    members: HashSet<String>,
    message_count: u64,
    last_activity_at: DateTime<Utc>,
    last_activity: Instant,
}

impl ChatState {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            members: HashSet::new(),
            message_count: 0,
            last_activity_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity_at = Utc::now();
        self.last_activity = Instant::now();
    }

    fn snapshot(&self, case_id: &str) -> ActiveChat {
        ActiveChat {
            case_id: case_id.to_string(),
            created_at: self.created_at,
            client_count: self.members.len(),
            message_count: self.message_count,
            last_activity: self.last_activity_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, ConnState>,
    chats: HashMap<String, ChatState>,
}

impl Inner {
    /// Removes `client_id` from its joined room, dropping the room when it
    /// empties. Returns the case it was in.
    fn detach(&mut self, client_id: &str) -> Option<String> {
        let case_id = self.connections.get_mut(client_id)?.case_id.take()?;
        if let Some(chat) = self.chats.get_mut(&case_id) {
            chat.members.remove(client_id);
            if chat.members.is_empty() {
                self.chats.remove(&case_id);
                debug!(case_id = %case_id, "active chat closed");
            }
        }
        Some(case_id)
    }

    fn ensure_connection(&mut self, client_id: &str) -> &mut ConnState {
        self.connections
            .entry(client_id.to_string())
            .or_insert_with(|| ConnState {
                connected_at: Utc::now(),
                user_id: None,
                case_id: None,
                user_agent: String::new(),
                last_activity: Instant::now(),
            })
    }

    fn snapshot(&self, client_id: &str) -> Option<Connection> {
        self.connections.get(client_id).map(|c| Connection {
            client_id: client_id.to_string(),
            connected_at: c.connected_at,
            user_id: c.user_id.clone(),
            case_id: c.case_id.clone(),
            user_agent: c.user_agent.clone(),
        })
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Case the connection was in before, if it differed.
    pub left: Option<String>,
    /// The connection was already in this case.
    pub rejoined: bool,
    pub chat: ActiveChat,
}

/// A connection taken out of a room by a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub client_id: String,
    pub case_id: String,
    pub user_id: Option<String>,
}

/// What one sweep pass evicted.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub connections: Vec<String>,
    pub chats: Vec<String>,
    /// Every room membership the pass ended, whether the connection itself
    /// was evicted or only its room.
    pub departures: Vec<Departure>,
}

/// Live connections and per-case rooms.
///
/// All state sits behind one lock, so every operation is atomic with respect
/// to the others: a room's client count is always the number of connections
/// joined to it, and a room with no members does not exist.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, client_id: &str, user_id: Option<String>, user_agent: &str) -> Connection {
        let connection = Connection {
            client_id: client_id.to_string(),
            connected_at: Utc::now(),
            user_id,
            case_id: None,
            user_agent: user_agent.to_string(),
        };
        let mut inner = self.inner.lock().await;
        // A reused id starts over; drop any room membership it still holds.
        inner.detach(client_id);
        inner.connections.insert(
            client_id.to_string(),
            ConnState {
                connected_at: connection.connected_at,
                user_id: connection.user_id.clone(),
                case_id: None,
                user_agent: connection.user_agent.clone(),
                last_activity: Instant::now(),
            },
        );
        debug!(client_id, "connection registered");
        connection
    }

    /// Joins `case_id`, leaving any other case first. Joining the case the
    /// connection is already in only refreshes activity. Unknown clients are
    /// registered on the fly.
    pub async fn join(&self, client_id: &str, case_id: &str, user_id: &str) -> JoinOutcome {
        let mut inner = self.inner.lock().await;

        let conn = inner.ensure_connection(client_id);
        conn.user_id = Some(user_id.to_string());
        conn.last_activity = Instant::now();
        let already_here = conn.case_id.as_deref() == Some(case_id);

        let left = if already_here { None } else { inner.detach(client_id) };

        let chat = inner
            .chats
            .entry(case_id.to_string())
            .or_insert_with(ChatState::new);
        chat.members.insert(client_id.to_string());
        chat.touch();
        let snapshot = chat.snapshot(case_id);

        if let Some(conn) = inner.connections.get_mut(client_id) {
            conn.case_id = Some(case_id.to_string());
        }
        debug!(client_id, case_id, clients = snapshot.client_count, "joined case");
        JoinOutcome {
            left,
            rejoined: already_here,
            chat: snapshot,
        }
    }

    /// Leaves `case_id` if the connection is joined to it.
    pub async fn leave(&self, client_id: &str, case_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let joined = inner
            .connections
            .get(client_id)
            .is_some_and(|c| c.case_id.as_deref() == Some(case_id));
        if !joined {
            return false;
        }
        inner.detach(client_id);
        if let Some(conn) = inner.connections.get_mut(client_id) {
            conn.last_activity = Instant::now();
        }
        true
    }

    /// Removes the connection, leaving its case. Returns its final state.
    pub async fn disconnect(&self, client_id: &str) -> Option<Connection> {
        let mut inner = self.inner.lock().await;
        let mut snapshot = inner.snapshot(client_id)?;
        snapshot.case_id = inner.detach(client_id);
        inner.connections.remove(client_id);
        debug!(client_id, "connection removed");
        Some(snapshot)
    }

    /// Marks the connection active, registering it again if a sweep
    /// evicted it.
    pub async fn touch(&self, client_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.ensure_connection(client_id).last_activity = Instant::now();
    }

    /// Records a message in the room, if it is live.
    pub async fn record_message(&self, case_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(chat) = inner.chats.get_mut(case_id) {
            chat.message_count += 1;
            chat.touch();
        }
    }

    pub async fn connection(&self, client_id: &str) -> Option<Connection> {
        self.inner.lock().await.snapshot(client_id)
    }

    pub async fn active_chat(&self, case_id: &str) -> Option<ActiveChat> {
        self.inner
            .lock()
            .await
            .chats
            .get(case_id)
            .map(|c| c.snapshot(case_id))
    }

    pub async fn active_chats(&self) -> Vec<ActiveChat> {
        self.inner
            .lock()
            .await
            .chats
            .iter()
            .map(|(id, c)| c.snapshot(id))
            .collect()
    }

    /// Client ids currently joined to `case_id`.
    pub async fn members(&self, case_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .chats
            .get(case_id)
            .map(|c| c.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// (connections, active chats)
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.connections.len(), inner.chats.len())
    }

    pub async fn sweep(&self, idle_timeout: Duration) -> SweepReport {
        self.sweep_at(Instant::now(), idle_timeout).await
    }

    /// Evicts connections and rooms idle for longer than `idle_timeout` as
    /// of `now`. Evicting a connection leaves its room; evicting a room
    /// detaches its remaining members without disconnecting them.
    pub async fn sweep_at(&self, now: Instant, idle_timeout: Duration) -> SweepReport {
        let mut inner = self.inner.lock().await;
        let mut report = SweepReport::default();

        let stale: Vec<String> = inner
            .connections
            .iter()
            .filter(|(_, c)| now.saturating_duration_since(c.last_activity) > idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for client_id in stale {
            if let Some(conn) = inner.connections.remove(&client_id) {
                if let Some(case_id) = conn.case_id {
                    if let Some(chat) = inner.chats.get_mut(&case_id) {
                        chat.members.remove(&client_id);
                        if chat.members.is_empty() {
                            inner.chats.remove(&case_id);
                        }
                    }
                    report.departures.push(Departure {
                        client_id: client_id.clone(),
                        case_id,
                        user_id: conn.user_id,
                    });
                }
            }
            report.connections.push(client_id);
        }

        let idle_chats: Vec<String> = inner
            .chats
            .iter()
            .filter(|(_, c)| now.saturating_duration_since(c.last_activity) > idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for case_id in idle_chats {
            if let Some(chat) = inner.chats.remove(&case_id) {
                for member in chat.members {
                    if let Some(conn) = inner.connections.get_mut(&member) {
                        conn.case_id = None;
                        report.departures.push(Departure {
                            client_id: member,
                            case_id: case_id.clone(),
                            user_id: conn.user_id.clone(),
                        });
                    }
                }
            }
            report.chats.push(case_id);
        }

        report.connections.sort();
        report.chats.sort();
        report.departures.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        report
    }
}
