use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::clock::now_unix;
use crate::player::PlayerId;
use crate::protocol::OutboundMessage;
use crate::session::{SessionStore, ValidateOutcome};

use super::errors::RegistryError;

pub type ConnectionId = u64;

/// What a registered connection's write-side task is told to do. The
/// registry never touches a socket directly — it only ever sends one of
/// these down the per-connection channel (§4.4, §5: connection-local
/// writes are a suspension point owned by the transport-write task).
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Message(OutboundMessage),
    Close { code: &'static str },
}

struct ConnectionEntry {
    player_id: PlayerId,
    room_code: String,
    sender: mpsc::UnboundedSender<ConnectionEvent>,
}

#[derive(Default)]
struct RegistryState {
    by_connection: HashMap<ConnectionId, ConnectionEntry>,
    by_player: HashMap<PlayerId, ConnectionId>,
    next_id: ConnectionId,
}

/// The bidirectional mapping between live connections and logical
/// Players, and the fan-out primitive (§4.4). Guarded by a single
/// fine-grained lock — contended only across connections, never across
/// Rooms' GameBoard work.
pub struct ConnectionRegistry {
    store: Arc<dyn SessionStore>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        ConnectionRegistry { store, state: Mutex::new(RegistryState::default()) }
    }

    /// Register a new connection for `player_id` in `room_code`. A
    /// previous connection for the same Player, if any, is marked
    /// superseded and closed with code `replaced`.
    pub fn attach(
        &self,
        player_id: PlayerId,
        room_code: String,
        sender: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> ConnectionId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;

        if let Some(old_id) = state.by_player.get(&player_id).copied() {
            if let Some(old_entry) = state.by_connection.remove(&old_id) {
                let _ = old_entry.sender.send(ConnectionEvent::Close { code: "replaced" });
            }
        }
        state.by_player.insert(player_id.clone(), id);
        state.by_connection.insert(id, ConnectionEntry { player_id, room_code, sender });
        id
    }

    /// Remove `connection_id` and mark its Player disconnected in the
    /// SessionStore. Idempotent: detaching an already-unknown connection
    /// is an `UnknownConnectionError`, not a panic.
    pub async fn detach(&self, connection_id: ConnectionId) -> Result<(PlayerId, String), RegistryError> {
        let entry = {
            let mut state = self.state.lock().unwrap();
            let entry = state.by_connection.remove(&connection_id).ok_or(RegistryError::UnknownConnection)?;
            if state.by_player.get(&entry.player_id).copied() == Some(connection_id) {
                state.by_player.remove(&entry.player_id);
            }
            entry
        };
        if let Err(err) = self.store.mark_disconnected(&entry.player_id).await {
            tracing::warn!(error = %err, player_id = %entry.player_id, "failed to record disconnect");
        }
        Ok((entry.player_id, entry.room_code))
    }

    pub fn find_by_connection(&self, connection_id: ConnectionId) -> Result<(PlayerId, String), RegistryError> {
        let state = self.state.lock().unwrap();
        state
            .by_connection
            .get(&connection_id)
            .map(|entry| (entry.player_id.clone(), entry.room_code.clone()))
            .ok_or(RegistryError::UnknownConnection)
    }

    pub fn find_by_player(&self, player_id: &str) -> Result<ConnectionId, RegistryError> {
        let state = self.state.lock().unwrap();
        state.by_player.get(player_id).copied().ok_or(RegistryError::NotConnected)
    }

    /// Deliver to every active connection in `room_code` except `except`
    /// (if given). A failed send just drops that recipient; the caller is
    /// expected to reap it via [`ConnectionRegistry::detach`] on its own
    /// read loop noticing the channel close.
    pub fn broadcast(&self, room_code: &str, message: OutboundMessage, except: Option<&str>) {
        let state = self.state.lock().unwrap();
        for entry in state.by_connection.values() {
            if entry.room_code != room_code {
                continue;
            }
            if except.is_some_and(|p| p == entry.player_id) {
                continue;
            }
            if entry.sender.send(ConnectionEvent::Message(message.clone())).is_err() {
                tracing::debug!(player_id = %entry.player_id, "broadcast delivery failed");
            }
        }
    }

    /// Close every live connection with `code`, used during graceful
    /// shutdown (§5: "closes connections with a server-shutting-down
    /// code").
    pub fn close_all(&self, code: &'static str) {
        let state = self.state.lock().unwrap();
        for entry in state.by_connection.values() {
            let _ = entry.sender.send(ConnectionEvent::Close { code });
        }
    }

    pub fn send(&self, player_id: &str, message: OutboundMessage) -> Result<(), RegistryError> {
        let state = self.state.lock().unwrap();
        let id = state.by_player.get(player_id).ok_or(RegistryError::NotConnected)?;
        let entry = state.by_connection.get(id).ok_or(RegistryError::NotConnected)?;
        entry.sender.send(ConnectionEvent::Message(message)).map_err(|_| RegistryError::NotConnected)
    }

    /// The three-tier lookup of §4.4, run for the identity a connection
    /// claims on an inbound message. Tier 1 is a cache hit against the
    /// in-memory registry. Tier 2 re-validates against the SessionStore
    /// and, on success, attaches this connection — this is what makes
    /// reconnection after a server restart transparent. Tier 3 is
    /// rejection.
    pub async fn resolve_or_attach(
        &self,
        connection_id: ConnectionId,
        claimed_player_id: &str,
        heartbeat_interval: Duration,
        sender: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<(PlayerId, String), RegistryError> {
        if let Ok((player_id, room_code)) = self.find_by_connection(connection_id) {
            if player_id == claimed_player_id {
                return Ok((player_id, room_code));
            }
        }

        let record = self
            .store
            .load_session(claimed_player_id)
            .await
            .map_err(|_| RegistryError::Unauthenticated)?;
        let outcome = crate::session::classify_session(record.as_ref(), heartbeat_interval, now_unix());
        match (outcome, record) {
            (ValidateOutcome::Valid, Some(record)) | (ValidateOutcome::Recoverable, Some(record)) => {
                self.attach(claimed_player_id.to_string(), record.room_code.clone(), sender.clone());
                Ok((claimed_player_id.to_string(), record.room_code))
            }
            _ => Err(RegistryError::Unauthenticated),
        }
    }
}
