//! In-memory presence registry and event fan-out.
//!
//! Maps user ids to their live connections (a user may have several open
//! sessions). Purely process-lifetime state: on restart clients
//! re-register, because this is a presence cache, not a source of truth.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::metrics;

/// Event name for per-transaction status pushes.
pub const TRANSACTION_UPDATE: &str = "transaction:update";
/// Event name for manual-review broadcasts.
pub const ADMIN_ALERT: &str = "admin:alert";

/// Identifier of one live connection.
pub type ConnectionId = Uuid;

struct ConnectionHandle {
    user_id: String,
    sender: mpsc::UnboundedSender<Value>,
}

/// Shared handle to the realtime fan-out registry.
#[derive(Clone, Default)]
pub struct Broadcaster {
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
    users: Arc<DashMap<String, HashSet<ConnectionId>>>,
    rooms: Arc<DashMap<String, HashSet<ConnectionId>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user. Returns the connection id and the
    /// receiving end the transport pumps to the client.
    pub fn register(&self, user_id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<Value>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.connections.insert(
            conn_id,
            ConnectionHandle {
                user_id: user_id.to_string(),
                sender: tx,
            },
        );
        self.users.entry(user_id.to_string()).or_default().insert(conn_id);

        metrics::record_ws_connections(self.connections.len());
        tracing::debug!(user_id = %user_id, connection_id = %conn_id, "Realtime connection registered");
        (conn_id, rx)
    }

    /// Remove a connection (on disconnect). Idempotent.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let user_id = match self.connections.remove(&conn_id) {
            Some((_, handle)) => handle.user_id,
            None => return,
        };

        if let Some(mut conns) = self.users.get_mut(&user_id) {
            conns.remove(&conn_id);
        }
        self.users.remove_if(&user_id, |_, conns| conns.is_empty());
        self.rooms.iter_mut().for_each(|mut members| {
            members.remove(&conn_id);
        });

        metrics::record_ws_connections(self.connections.len());
        tracing::debug!(user_id = %user_id, connection_id = %conn_id, "Realtime connection removed");
    }

    /// Add a connection to a named room.
    pub fn join_room(&self, conn_id: ConnectionId, room: &str) {
        if self.connections.contains_key(&conn_id) {
            self.rooms.entry(room.to_string()).or_default().insert(conn_id);
        }
    }

    /// Emit an event to every connection of one user. Returns the number of
    /// connections reached.
    pub fn emit_to_user(&self, user_id: &str, event: &str, payload: Value) -> usize {
        let targets: Vec<ConnectionId> = self
            .users
            .get(user_id)
            .map(|conns| conns.iter().copied().collect())
            .unwrap_or_default();
        self.deliver(&targets, event, payload)
    }

    /// Emit an event to every member of a named room.
    pub fn emit_to_room(&self, room: &str, event: &str, payload: Value) -> usize {
        let targets: Vec<ConnectionId> = self
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        self.deliver(&targets, event, payload)
    }

    /// Emit an event to every open connection.
    pub fn broadcast(&self, event: &str, payload: Value) -> usize {
        let targets: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        self.deliver(&targets, event, payload)
    }

    /// Whether a user currently has at least one open connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.get(user_id).map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn deliver(&self, targets: &[ConnectionId], event: &str, payload: Value) -> usize {
        let envelope = json!({ "event": event, "data": payload });
        let mut delivered = 0;
        let mut dead = Vec::new();

        for conn_id in targets {
            if let Some(handle) = self.connections.get(conn_id) {
                if handle.sender.send(envelope.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*conn_id);
                }
            }
        }
        // Connections whose transport hung up get reaped here rather than
        // waiting for the socket task to notice.
        for conn_id in dead {
            self.unregister(conn_id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_user_connections() {
        let broadcaster = Broadcaster::new();
        let (_c1, mut rx1) = broadcaster.register("user-1");
        let (_c2, mut rx2) = broadcaster.register("user-1");
        let (_c3, mut rx3) = broadcaster.register("user-2");

        let delivered = broadcaster.emit_to_user("user-1", TRANSACTION_UPDATE, json!({"status": "completed"}));
        assert_eq!(delivered, 2);

        let msg = rx1.try_recv().unwrap();
        assert_eq!(msg["event"], TRANSACTION_UPDATE);
        assert_eq!(msg["data"]["status"], "completed");
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_unregister_clears_presence() {
        let broadcaster = Broadcaster::new();
        let (conn, _rx) = broadcaster.register("user-1");
        assert!(broadcaster.is_online("user-1"));

        broadcaster.unregister(conn);
        assert!(!broadcaster.is_online("user-1"));
        assert_eq!(broadcaster.emit_to_user("user-1", "x", json!({})), 0);

        // Idempotent
        broadcaster.unregister(conn);
    }

    #[test]
    fn test_room_and_broadcast() {
        let broadcaster = Broadcaster::new();
        let (c1, mut rx1) = broadcaster.register("user-1");
        let (_c2, mut rx2) = broadcaster.register("user-2");

        broadcaster.join_room(c1, "admins");
        assert_eq!(broadcaster.emit_to_room("admins", ADMIN_ALERT, json!({"n": 1})), 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());

        assert_eq!(broadcaster.broadcast(ADMIN_ALERT, json!({"n": 2})), 2);
    }

    #[test]
    fn test_dead_connections_are_reaped() {
        let broadcaster = Broadcaster::new();
        let (_conn, rx) = broadcaster.register("user-1");
        drop(rx);

        assert_eq!(broadcaster.emit_to_user("user-1", "x", json!({})), 0);
        assert_eq!(broadcaster.connection_count(), 0);
    }
}
