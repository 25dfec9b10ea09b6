use thiserror::Error;

use crate::cards::{DealError, IllegalPlayReason};

use super::Phase;

/// The error taxonomy of spec §7 as it applies to GameBoard transitions.
/// Every variant is local: none of these mutate Room state, and all are
/// reported to the originating Player only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("room is full")]
    RoomFull,

    #[error("player {0:?} is not seated in this room")]
    UnknownPlayer(String),

    #[error("action not permitted in phase {phase:?}")]
    IllegalPhase { phase: Phase },

    #[error("it is not player {0:?}'s turn")]
    NotYourTurn(String),

    #[error("only the hakem may choose trump")]
    OnlyHakemMayChooseTrump,

    #[error("{0:?} is not a valid trump suit")]
    InvalidTrump(String),

    #[error("illegal card play: {reason:?}")]
    IllegalCard { reason: IllegalPlayReason },

    #[error("deal failed: {0}")]
    Deal(#[from] DealError),
}

impl GameError {
    /// The wire `error.code` string for this error kind (§6, §7).
    pub fn wire_code(&self) -> &'static str {
        match self {
            GameError::RoomFull => "room_full",
            GameError::UnknownPlayer(_) => "not_in_room",
            GameError::IllegalPhase { .. } => "illegal_phase",
            GameError::NotYourTurn(_) => "not_your_turn",
            GameError::OnlyHakemMayChooseTrump => "only_hakem_may_choose_trump",
            GameError::InvalidTrump(_) => "invalid_trump",
            GameError::IllegalCard { reason } => match reason {
                IllegalPlayReason::NotInHand => "not_in_hand",
                IllegalPlayReason::MustFollowSuit => "must_follow_suit",
            },
            GameError::Deal(_) => "server_error",
        }
    }

    /// The current phase, when the error is phase-shaped, so the client can
    /// re-synchronize (§7: "response includes the current phase").
    pub fn current_phase(&self) -> Option<Phase> {
        match self {
            GameError::IllegalPhase { phase } => Some(*phase),
            _ => None,
        }
    }
}
