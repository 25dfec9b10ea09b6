//! CoordinatorManager: the get-or-create map from room code to a running
//! [`RoomHandle`]. Mirrors the shape of a typical in-memory room registry
//! (a single lock around a `HashMap`), but each entry here is a live actor
//! task rather than a directly-shared, lockable struct — the lock below is
//! only ever held for the map lookup/insert, never across a GameBoard
//! transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::actor::{spawn_room, RoomHandle};
use super::CoordinatorConfig;
use crate::connection::ConnectionRegistry;
use crate::room::GameBoard;
use crate::session::SessionStore;

pub struct CoordinatorManager {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn SessionStore>,
    config: CoordinatorConfig,
}

impl CoordinatorManager {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn SessionStore>, config: CoordinatorConfig) -> Self {
        CoordinatorManager { rooms: Mutex::new(HashMap::new()), registry, store, config }
    }

    /// Return the handle for `room_code`, spawning its actor task on first
    /// use. A Room with no prior persisted state starts a fresh lobby
    /// (§3: created implicitly by its first `join`); one that already
    /// exists in the SessionStore resumes from there, so a server restart
    /// does not silently erase an in-progress game.
    pub async fn get_or_create(&self, room_code: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.lock().unwrap().get(room_code) {
            return handle.clone();
        }

        let board = match self.store.load_room_state(room_code).await {
            Ok(room) => GameBoard::from_room(room),
            Err(_) => GameBoard::new(room_code.to_string()),
        };

        let mut rooms = self.rooms.lock().unwrap();
        // Another task may have spawned this Room while we awaited the
        // store lookup above; never replace an already-running actor.
        rooms
            .entry(room_code.to_string())
            .or_insert_with(|| {
                spawn_room(room_code.to_string(), board, self.config.clone(), self.registry.clone(), self.store.clone())
            })
            .clone()
    }
}
