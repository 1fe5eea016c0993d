//! Realtime broadcast bridge.
//!
//! Keeps every connected dashboard viewer eventually consistent with store
//! mutations without polling. Mutations executed anywhere — stdio MCP,
//! streamable HTTP MCP, REST, or a WebSocket session itself — are published
//! as [`StoreEvent`]s on a `tokio::sync::broadcast` channel; every open
//! viewer session holds a receiver and forwards events to its socket.
//!
//! Events are published immediately after the mutation commits, while the
//! connection lock is still held: the mutex gives mutations a single global
//! order, publishing under it makes broadcast order equal commit order, and a
//! cancelled caller cannot lose the event of a mutation that already
//! committed. No ordering is guaranteed between a mutation's direct response
//! and its broadcast.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::memory::types::{Edge, Memory};

/// A store mutation worth telling every viewer about.
///
/// Read operations (search, list, stats, traversal) are never broadcast —
/// they answer only the requesting session.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    MemoryAdded(Memory),
    MemoriesCleared { count: u64 },
    EdgeAdded(Edge),
}

impl StoreEvent {
    /// Render as the tagged `{type, data}` envelope viewers consume.
    pub fn envelope(&self) -> Envelope {
        match self {
            Self::MemoryAdded(memory) => Envelope::new(
                "memory_added",
                serde_json::json!({ "memory": memory }),
            ),
            Self::MemoriesCleared { count } => Envelope::new(
                "memories_deleted",
                serde_json::json!({ "count": count }),
            ),
            Self::EdgeAdded(edge) => Envelope::new(
                "edge_added",
                serde_json::json!({ "edge": edge }),
            ),
        }
    }
}

/// Tagged message envelope for the live-update channel. Used both for
/// broadcasts and for per-session request/response frames.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"kind":"dependency_error","message":"serialization failed"}}"#
                .to_string()
        })
    }
}

/// Registry of live viewer sessions plus the mutation event channel.
///
/// Sessions join on connect and are removed on disconnect, write failure, or
/// liveness timeout — never left dangling. A delivery failure to one session
/// only affects that session.
pub struct Bridge {
    events: broadcast::Sender<StoreEvent>,
    sessions: DashMap<String, SessionInfo>,
}

#[derive(Debug)]
pub struct SessionInfo {
    pub connected_at: Instant,
}

impl Bridge {
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer);
        Self {
            events,
            sessions: DashMap::new(),
        }
    }

    /// Publish a mutation event to all open sessions. A send with no
    /// receivers is not an error — there simply are no viewers.
    pub fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// Subscribe to the mutation stream. Call before the session enters its
    /// read loop so no events are missed after join.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn join(&self, session_id: &str) {
        self.sessions.insert(
            session_id.to_string(),
            SessionInfo {
                connected_at: Instant::now(),
            },
        );
        tracing::info!(session = %session_id, viewers = self.sessions.len(), "viewer connected");
    }

    pub fn leave(&self, session_id: &str) {
        self.sessions.remove(session_id);
        tracing::info!(session = %session_id, viewers = self.sessions.len(), "viewer disconnected");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
