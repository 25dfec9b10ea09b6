//! GameBoard: the per-room authoritative state machine. Room, Game, Round,
//! and Trick are plain data; `GameBoard` (in `board`) owns all transitions.

mod board;
mod errors;

pub use board::{GameBoard, PlayOutcome, TrumpOutcome};
pub use errors::GameError;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit};
use crate::player::{Player, PlayerId, Seat, TeamIndex};

/// Room lifecycle phase. See spec §4.2 for the full transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    TeamAssignment,
    InitialDeal,
    TrumpSelection,
    FinalDeal,
    Playing,
    HandComplete,
    GameComplete,
    Abandoned,
}

impl Phase {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::TeamAssignment => "team-assignment",
            Phase::InitialDeal => "initial-deal",
            Phase::TrumpSelection => "trump-selection",
            Phase::FinalDeal => "final-deal",
            Phase::Playing => "playing",
            Phase::HandComplete => "hand-complete",
            Phase::GameComplete => "game-complete",
            Phase::Abandoned => "abandoned",
        }
    }
}

/// An open or closed trick: the ordered plays made this cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trick {
    pub plays: Vec<(Seat, Card)>,
}

impl Trick {
    pub fn led_suit(&self) -> Option<Suit> {
        self.plays.first().map(|(_, card)| card.suit)
    }

    pub fn is_closed(&self) -> bool {
        self.plays.len() == 4
    }
}

/// A per-team trick/round-win counter, normalized to the mapping shape the
/// wire protocol always emits (`{"0": x, "1": y}`).
pub type TeamCounts = [u8; 2];

pub fn team_counts_to_map(counts: TeamCounts) -> serde_json::Value {
    serde_json::json!({
        TeamIndex::Zero.as_key(): counts[0],
        TeamIndex::One.as_key(): counts[1],
    })
}

/// One round (hand): a fresh 13-card deal through to hand-complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub hakem: Seat,
    pub trump: Option<Suit>,
    pub tricks_won: TeamCounts,
    pub closed_tricks: Vec<Trick>,
    pub current_trick: Trick,
}

impl Round {
    fn new(hakem: Seat) -> Self {
        Round {
            hakem,
            trump: None,
            tricks_won: [0, 0],
            closed_tricks: Vec::new(),
            current_trick: Trick::default(),
        }
    }

    pub fn tricks_played(&self) -> u8 {
        self.closed_tricks.len() as u8
    }
}

/// A Room's lifetime container of Rounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Game {
    pub round_wins: TeamCounts,
    pub rounds_completed: u8,
}

/// The authoritative data of one Room. `GameBoard` is the only thing
/// allowed to mutate this; everything else only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub players: Vec<Player>,
    pub phase: Phase,
    pub game: Game,
    pub round: Option<Round>,
    pub current_turn: Option<Seat>,
    pub deck: Vec<Card>,
}

impl Room {
    pub fn new(code: String) -> Self {
        Room {
            code,
            players: Vec::new(),
            phase: Phase::Lobby,
            game: Game::default(),
            round: None,
            current_turn: None,
            deck: Vec::new(),
        }
    }

    pub fn player_by_seat(&self, seat: Seat) -> Option<&Player> {
        self.players.iter().find(|p| p.seat == seat)
    }

    pub fn player_by_seat_mut(&mut self, seat: Seat) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.seat == seat)
    }

    pub fn player_by_id(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_by_id_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn seat_of(&self, id: &str) -> Option<Seat> {
        self.player_by_id(id).map(|p| p.seat)
    }

    pub fn player_id_at(&self, seat: Seat) -> Option<PlayerId> {
        self.player_by_seat(seat).map(|p| p.id.clone())
    }

    pub fn is_full(&self) -> bool {
        self.players.len() == crate::player::SEAT_COUNT
    }
}
