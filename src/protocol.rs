//! The wire protocol: the closed set of JSON documents exchanged with
//! clients. Every document carries a `type` tag; unknown tags never reach
//! [`InboundMessage`] — they are rejected by serde with `bad_message`
//! before any handler runs.

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit};
use crate::player::{ConnectionStatus, PlayerId, Seat, TeamIndex};
use crate::room::{team_counts_to_map, GameError, Phase, Room, TeamCounts};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Join {
        room_code: String,
        display_name: String,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    ChooseTrump {
        room_code: String,
        player_id: PlayerId,
        suit: String,
    },
    PlayCard {
        room_code: String,
        player_id: PlayerId,
        card: Card,
    },
    Heartbeat {
        player_id: PlayerId,
    },
    Leave {
        room_code: String,
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatAssignment {
    pub seat: Seat,
    pub player_id: PlayerId,
    pub team: TeamIndex,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicPlayerView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub seat: Seat,
    pub team: TeamIndex,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub code: String,
    pub phase: &'static str,
    pub players: Vec<PublicPlayerView>,
}

impl RoomSnapshot {
    pub fn of(room: &Room) -> Self {
        RoomSnapshot {
            code: room.code.clone(),
            phase: room.phase.as_wire_str(),
            players: room
                .players
                .iter()
                .map(|p| PublicPlayerView {
                    player_id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    seat: p.seat,
                    team: p.team(),
                    status: p.status,
                })
                .collect(),
        }
    }
}

/// Everything a reconnecting Player needs to resume without having
/// observed any intervening public events (§4.5, §8 scenario 5).
#[derive(Debug, Clone, Serialize)]
pub struct StateResyncView {
    pub phase: &'static str,
    pub hand: Vec<Card>,
    pub trump: Option<Suit>,
    pub current_trick: Vec<(Seat, Card)>,
    pub current_turn: Option<Seat>,
    pub tricks: serde_json::Value,
    pub round_wins: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    JoinSuccess {
        player_id: PlayerId,
        seat: Seat,
        team: TeamIndex,
        room: RoomSnapshot,
    },
    TeamAssignment {
        seats: Vec<SeatAssignment>,
        hakem: Seat,
    },
    InitialDeal {
        cards: Vec<Card>,
    },
    TrumpPrompt,
    TrumpSelected {
        suit: Suit,
    },
    FinalDeal {
        cards: Vec<Card>,
    },
    TurnStart {
        player_id: PlayerId,
        led_suit: Option<Suit>,
    },
    CardPlayed {
        player_id: PlayerId,
        card: Card,
        led_suit: Option<Suit>,
    },
    TrickComplete {
        winner: PlayerId,
        tricks: serde_json::Value,
    },
    HandComplete {
        winner_team: TeamIndex,
        tricks: serde_json::Value,
        round_wins: serde_json::Value,
    },
    GameComplete {
        winner_team: TeamIndex,
        round_wins: serde_json::Value,
    },
    StateResync {
        view: StateResyncView,
    },
    Error {
        code: &'static str,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_phase: Option<&'static str>,
    },
    /// Not part of §6's table, but a closed tagged union needs a home for
    /// anything that fails to parse at all (§7: "validation" kind).
    BadMessage {
        reason: String,
    },
}

pub fn team_counts_json(counts: TeamCounts) -> serde_json::Value {
    team_counts_to_map(counts)
}

pub fn error_message(err: &GameError) -> OutboundMessage {
    OutboundMessage::Error {
        code: err.wire_code(),
        reason: err.to_string(),
        current_phase: err.current_phase().map(|phase: Phase| phase.as_wire_str()),
    }
}
