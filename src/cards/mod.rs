//! Deck & Rules: pure, side-effect-free primitives over cards, suits, trump,
//! and trick state. Nothing in this module performs I/O or touches a Room.

mod deck;
mod rules;

pub use deck::{Card, Rank, Suit, ALL_SUITS};
pub use rules::{deal, fresh_deck, is_legal_play, trick_winner, DealError, IllegalPlayReason};
