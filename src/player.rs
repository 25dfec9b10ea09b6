//! Player, Team, and seating primitives shared by the GameBoard, the
//! ConnectionRegistry, and the wire protocol.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::cards::Card;

/// Opaque, server-generated player identity. Stable across reconnects:
/// a client that rejoins with the same `PlayerId` resumes its seat.
pub type PlayerId = String;

/// A seat index within a Room, 0..=3. Seats {0, 2} form Team 0, seats
/// {1, 3} form Team 1.
pub type Seat = u8;

pub const SEAT_COUNT: usize = 4;

/// Which of the two teams a seat belongs to.
pub fn team_of(seat: Seat) -> TeamIndex {
    if seat % 2 == 0 {
        TeamIndex::Zero
    } else {
        TeamIndex::One
    }
}

/// The seat clockwise from `seat`.
pub fn next_seat(seat: Seat) -> Seat {
    (seat + 1) % SEAT_COUNT as Seat
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamIndex {
    Zero,
    One,
}

impl Serialize for TeamIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_index() as u8)
    }
}

impl<'de> Deserialize<'de> for TeamIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(TeamIndex::Zero),
            1 => Ok(TeamIndex::One),
            other => Err(de::Error::custom(format!("invalid team index: {other}"))),
        }
    }
}

impl TeamIndex {
    pub fn other(self) -> TeamIndex {
        match self {
            TeamIndex::Zero => TeamIndex::One,
            TeamIndex::One => TeamIndex::Zero,
        }
    }

    pub fn as_index(self) -> usize {
        match self {
            TeamIndex::Zero => 0,
            TeamIndex::One => 1,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            TeamIndex::Zero => "0",
            TeamIndex::One => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

/// A seated Player and everything the GameBoard tracks about them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub seat: Seat,
    pub hand: Vec<Card>,
    pub status: ConnectionStatus,
}

impl Player {
    pub fn new(id: PlayerId, display_name: String, seat: Seat) -> Self {
        Player {
            id,
            display_name,
            seat,
            hand: Vec::new(),
            status: ConnectionStatus::Active,
        }
    }

    pub fn team(&self) -> TeamIndex {
        team_of(self.seat)
    }
}
