use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::player::{ConnectionStatus, PlayerId, Seat};
use crate::room::Room;

use super::errors::StoreError;

const ROOM_KEY_PREFIX: &str = "room:";
const ROOM_KEY_SUFFIX: &str = ":state";
const SESSION_KEY_PREFIX: &str = "session:";
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(5);

fn room_key(room_code: &str) -> String {
    format!("{ROOM_KEY_PREFIX}{room_code}{ROOM_KEY_SUFFIX}")
}

fn session_key(player_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{player_id}")
}

/// The `session:{player_id}` hash record (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub player_id: PlayerId,
    pub room_code: String,
    pub status: ConnectionStatus,
    pub last_heartbeat: u64,
    pub seat: Seat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateOutcome {
    Valid,
    /// Expired, but within 2x the heartbeat interval — still recoverable.
    Recoverable,
    Expired,
    Missing,
}

pub(crate) fn classify_session(record: Option<&SessionRecord>, heartbeat_interval: Duration, now: u64) -> ValidateOutcome {
    let Some(record) = record else {
        return ValidateOutcome::Missing;
    };
    let age = now.saturating_sub(record.last_heartbeat);
    let interval = heartbeat_interval.as_secs();
    if age <= interval {
        ValidateOutcome::Valid
    } else if age <= interval.saturating_mul(2) {
        ValidateOutcome::Recoverable
    } else {
        ValidateOutcome::Expired
    }
}

/// Checks the invariants of §3 that a deserialized [`Room`] must satisfy
/// before it is trusted. A violation means the record is corrupt, not
/// merely stale.
fn validate_room_invariants(room: &Room) -> Result<(), StoreError> {
    if let Some(round) = &room.round {
        let total_tricks: u32 = round.tricks_won.iter().map(|&c| c as u32).sum();
        if total_tricks > 13 {
            return Err(StoreError::CorruptState(format!(
                "round trick total {total_tricks} exceeds 13"
            )));
        }
        for player in &room.players {
            let contributed = round.tricks_played() as usize;
            if player.hand.len() + contributed > 13 {
                return Err(StoreError::CorruptState(format!(
                    "player {:?} hand+tricks exceeds 13",
                    player.id
                )));
            }
        }
    }
    let round_wins: u32 = room.game.round_wins.iter().map(|&c| c as u32).sum();
    if round_wins != room.game.rounds_completed as u32 {
        return Err(StoreError::CorruptState(
            "round wins do not sum to rounds completed".into(),
        ));
    }
    Ok(())
}

/// Decode transparently across the two representational drifts of §4.3:
/// integer-vs-string map keys (moot once the document is JSON — both
/// arrive as string keys) and list-vs-mapping for per-team counters.
fn normalize_counts(value: &serde_json::Value) -> Result<[u8; 2], StoreError> {
    match value {
        serde_json::Value::Array(items) if items.len() == 2 => {
            let a = items[0].as_u64().ok_or_else(|| StoreError::CorruptState("non-integer team count".into()))?;
            let b = items[1].as_u64().ok_or_else(|| StoreError::CorruptState("non-integer team count".into()))?;
            Ok([a as u8, b as u8])
        }
        serde_json::Value::Object(map) => {
            let a = map
                .get("0")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| StoreError::CorruptState("missing team-0 count".into()))?;
            let b = map
                .get("1")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| StoreError::CorruptState("missing team-1 count".into()))?;
            Ok([a as u8, b as u8])
        }
        _ => Err(StoreError::CorruptState(
            "team counts must be a 2-element array or a {0,1}-keyed mapping".into(),
        )),
    }
}

fn normalize_field(obj: &mut serde_json::Map<String, serde_json::Value>, key: &str) -> Result<(), StoreError> {
    if let Some(raw) = obj.get(key).cloned() {
        let normalized = normalize_counts(&raw)?;
        obj.insert(key.to_string(), serde_json::json!(normalized));
    }
    Ok(())
}

/// Rewrite any drifted team-count fields into the canonical array shape
/// before handing the document to serde's strongly-typed decode — so
/// [`Room`]'s own field types never need to know about the drift.
fn normalize_room_document(mut value: serde_json::Value) -> Result<serde_json::Value, StoreError> {
    if let Some(round) = value.get_mut("round").filter(|v| !v.is_null()) {
        if let Some(round_obj) = round.as_object_mut() {
            normalize_field(round_obj, "tricks_won")?;
        }
    }
    if let Some(game_obj) = value.get_mut("game").and_then(|v| v.as_object_mut()) {
        normalize_field(game_obj, "round_wins")?;
    }
    Ok(value)
}

async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut delay = RETRY_INITIAL_DELAY;
    let mut last_err = None;
    for attempt in 0..RETRY_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < RETRY_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_CAP);
                }
            }
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

/// The persistence adapter: a durable-enough mirror of Room and Session
/// state in an external key-value store (§4.3).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_room_state(&self, room: &Room) -> Result<(), StoreError>;
    async fn load_room_state(&self, room_code: &str) -> Result<Room, StoreError>;
    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError>;
    /// Fetch the raw session row, when present. Used by the
    /// `ConnectionRegistry`'s tier-2 lookup to recover `room_code` and
    /// `seat` for a reattaching connection (§4.4).
    async fn load_session(&self, player_id: &str) -> Result<Option<SessionRecord>, StoreError>;
    async fn touch_heartbeat(&self, player_id: &str, now: u64) -> Result<(), StoreError>;
    async fn validate_session(
        &self,
        player_id: &str,
        heartbeat_interval: Duration,
        now: u64,
    ) -> Result<ValidateOutcome, StoreError>;
    async fn mark_disconnected(&self, player_id: &str) -> Result<(), StoreError>;
    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError>;
    async fn clear_room(&self, room_code: &str) -> Result<(), StoreError>;
}

/// Redis-backed [`SessionStore`]. Grounded in the teacher's own
/// `services/mod.rs`, which names Redis as the intended cache/session
/// backend but never builds it.
pub struct RedisSessionStore {
    manager: redis::aio::ConnectionManager,
    room_ttl: Duration,
    session_ttl: Duration,
}

impl RedisSessionStore {
    pub async fn connect(endpoint: &str, room_ttl: Duration, session_ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(endpoint).map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
        Ok(RedisSessionStore { manager, room_ttl, session_ttl })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save_room_state(&self, room: &Room) -> Result<(), StoreError> {
        let key = room_key(&room.code);
        let body = serde_json::to_string(room)
            .map_err(|e| StoreError::CorruptState(format!("room state does not serialize: {e}")))?;
        let ttl = self.room_ttl.as_secs();
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            let body = body.clone();
            async move {
                conn.set_ex::<_, _, ()>(key, body, ttl)
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))
            }
        })
        .await
    }

    async fn load_room_state(&self, room_code: &str) -> Result<Room, StoreError> {
        let key = room_key(room_code);
        let raw: Option<String> = with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move { conn.get(key).await.map_err(|e| StoreError::StoreUnavailable(e.to_string())) }
        })
        .await?;
        let raw = raw.ok_or(StoreError::NotFound)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::CorruptState(format!("room state is not valid JSON: {e}")))?;
        let value = normalize_room_document(value)?;
        let room: Room = serde_json::from_value(value)
            .map_err(|e| StoreError::CorruptState(format!("room state does not match the schema: {e}")))?;
        validate_room_invariants(&room)?;
        Ok(room)
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let key = session_key(&record.player_id);
        let ttl = self.session_ttl.as_secs();
        let fields = vec![
            ("room_code".to_string(), record.room_code.clone()),
            ("status".to_string(), record.status.as_wire_str().to_string()),
            ("last_heartbeat".to_string(), record.last_heartbeat.to_string()),
            ("seat".to_string(), record.seat.to_string()),
        ];
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            let fields = fields.clone();
            async move {
                conn.hset_multiple::<_, _, _, ()>(&key, &fields)
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
                conn.expire::<_, ()>(&key, ttl as i64)
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))
            }
        })
        .await
    }

    async fn touch_heartbeat(&self, player_id: &str, now: u64) -> Result<(), StoreError> {
        let key = session_key(player_id);
        let ttl = self.session_ttl.as_secs();
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move {
                conn.hset::<_, _, _, ()>(&key, "last_heartbeat", now)
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))?;
                conn.expire::<_, ()>(&key, ttl as i64)
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))
            }
        })
        .await
    }

    async fn load_session(&self, player_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let key = session_key(player_id);
        let fields: HashMap<String, String> = with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move { conn.hgetall(key).await.map_err(|e| StoreError::StoreUnavailable(e.to_string())) }
        })
        .await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let last_heartbeat: u64 = fields
            .get("last_heartbeat")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::CorruptState("session missing last_heartbeat".into()))?;
        let status = match fields.get("status").map(String::as_str) {
            Some("disconnected") => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Active,
        };
        Ok(Some(SessionRecord {
            player_id: player_id.to_string(),
            room_code: fields.get("room_code").cloned().unwrap_or_default(),
            status,
            last_heartbeat,
            seat: fields.get("seat").and_then(|s| s.parse().ok()).unwrap_or(0),
        }))
    }

    async fn validate_session(
        &self,
        player_id: &str,
        heartbeat_interval: Duration,
        now: u64,
    ) -> Result<ValidateOutcome, StoreError> {
        let record = self.load_session(player_id).await?;
        Ok(classify_session(record.as_ref(), heartbeat_interval, now))
    }

    async fn mark_disconnected(&self, player_id: &str) -> Result<(), StoreError> {
        let key = session_key(player_id);
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move {
                conn.hset::<_, _, _, ()>(&key, "status", "disconnected")
                    .await
                    .map_err(|e| StoreError::StoreUnavailable(e.to_string()))
            }
        })
        .await
    }

    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError> {
        let key = session_key(player_id);
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move { conn.del::<_, ()>(key).await.map_err(|e| StoreError::StoreUnavailable(e.to_string())) }
        })
        .await
    }

    async fn clear_room(&self, room_code: &str) -> Result<(), StoreError> {
        let key = room_key(room_code);
        with_retry(|| {
            let mut conn = self.manager.clone();
            let key = key.clone();
            async move { conn.del::<_, ()>(key).await.map_err(|e| StoreError::StoreUnavailable(e.to_string())) }
        })
        .await
    }
}

/// In-memory [`SessionStore`] double used by coordinator and handler
/// tests, and as a degraded-mode fallback is explicitly not a goal here —
/// a real deployment always points at Redis.
#[derive(Default)]
pub struct InMemorySessionStore {
    rooms: Mutex<HashMap<String, Room>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_room_state(&self, room: &Room) -> Result<(), StoreError> {
        self.rooms.lock().unwrap().insert(room.code.clone(), room.clone());
        Ok(())
    }

    async fn load_room_state(&self, room_code: &str) -> Result<Room, StoreError> {
        self.rooms.lock().unwrap().get(room_code).cloned().ok_or(StoreError::NotFound)
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().insert(record.player_id.clone(), record.clone());
        Ok(())
    }

    async fn load_session(&self, player_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(player_id).cloned())
    }

    async fn touch_heartbeat(&self, player_id: &str, now: u64) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        let record = sessions.get_mut(player_id).ok_or(StoreError::NotFound)?;
        record.last_heartbeat = now;
        Ok(())
    }

    async fn validate_session(
        &self,
        player_id: &str,
        heartbeat_interval: Duration,
        now: u64,
    ) -> Result<ValidateOutcome, StoreError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(classify_session(sessions.get(player_id), heartbeat_interval, now))
    }

    async fn mark_disconnected(&self, player_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        let record = sessions.get_mut(player_id).ok_or(StoreError::NotFound)?;
        record.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().remove(player_id);
        Ok(())
    }

    async fn clear_room(&self, room_code: &str) -> Result<(), StoreError> {
        self.rooms.lock().unwrap().remove(room_code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_counts_accepts_array_form() {
        let value = serde_json::json!([7, 3]);
        assert_eq!(normalize_counts(&value).unwrap(), [7, 3]);
    }

    #[test]
    fn normalize_counts_accepts_mapping_form() {
        let value = serde_json::json!({"0": 7, "1": 3});
        assert_eq!(normalize_counts(&value).unwrap(), [7, 3]);
    }

    #[test]
    fn normalize_counts_rejects_malformed_shapes() {
        let value = serde_json::json!("not-a-count");
        assert!(normalize_counts(&value).is_err());
    }

    #[test]
    fn classify_session_distinguishes_valid_recoverable_expired() {
        let interval = Duration::from_secs(30);
        let record = SessionRecord {
            player_id: "p1".into(),
            room_code: "9999".into(),
            status: ConnectionStatus::Active,
            last_heartbeat: 100,
            seat: 0,
        };
        assert_eq!(classify_session(Some(&record), interval, 110), ValidateOutcome::Valid);
        assert_eq!(classify_session(Some(&record), interval, 150), ValidateOutcome::Recoverable);
        assert_eq!(classify_session(Some(&record), interval, 200), ValidateOutcome::Expired);
        assert_eq!(classify_session(None, interval, 200), ValidateOutcome::Missing);
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_room_state() {
        let store = InMemorySessionStore::new();
        let room = Room::new("9999".into());
        store.save_room_state(&room).await.unwrap();
        let loaded = store.load_room_state("9999").await.unwrap();
        assert_eq!(loaded.code, "9999");
    }

    #[tokio::test]
    async fn in_memory_store_reports_not_found_for_unknown_room() {
        let store = InMemorySessionStore::new();
        assert!(matches!(store.load_room_state("0000").await, Err(StoreError::NotFound)));
    }
}
