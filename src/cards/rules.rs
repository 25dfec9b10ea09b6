use rand::seq::SliceRandom;
use thiserror::Error;

use super::deck::{Card, Rank, Suit, ALL_SUITS};
use crate::player::Seat;

/// Build a fresh, shuffled 52-card deck using a cryptographically-unbiased
/// uniform permutation (Fisher-Yates over the OS-seeded thread RNG).
pub fn fresh_deck() -> Vec<Card> {
    let mut deck: Vec<Card> = ALL_SUITS
        .iter()
        .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card::new(rank, suit)))
        .collect();
    debug_assert_eq!(deck.len(), 52);
    deck.shuffle(&mut rand::thread_rng());
    deck
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DealError {
    #[error("cannot deal {requested} cards from a deck of {available}")]
    InsufficientCards { requested: usize, available: usize },
}

/// Deal `counts.len()` hands of the requested sizes, consuming `deck` in
/// order. `deck` is drained from the front so repeated calls (initial deal,
/// then final deal) continue from where the previous call left off.
pub fn deal(deck: &mut Vec<Card>, counts: &[usize]) -> Result<Vec<Vec<Card>>, DealError> {
    let requested: usize = counts.iter().sum();
    if requested > deck.len() {
        return Err(DealError::InsufficientCards {
            requested,
            available: deck.len(),
        });
    }
    let mut hands = Vec::with_capacity(counts.len());
    for &count in counts {
        hands.push(deck.drain(0..count).collect());
    }
    Ok(hands)
}

/// Resolve the winner of a closed (or in-progress) trick under `trump`.
/// Among cards of the trump suit, the highest rank wins; if none were
/// played, among cards of the led suit (the suit of the first play), the
/// highest rank wins. Ties are impossible: ranks are unique within a suit
/// and a card appears at most once per round.
pub fn trick_winner(trick: &[(Seat, Card)], trump: Suit) -> Option<Seat> {
    let led_suit = trick.first()?.1.suit;

    let best_of = |suit: Suit| -> Option<Seat> {
        trick
            .iter()
            .filter(|(_, card)| card.suit == suit)
            .max_by_key(|(_, card)| card.rank)
            .map(|(player, _)| *player)
    };

    best_of(trump).or_else(|| best_of(led_suit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IllegalPlayReason {
    NotInHand,
    MustFollowSuit,
}

/// Is `card` a legal play from `hand` given the current `led_suit` (`None`
/// if this card would lead the trick) and `trump`? Trump never overrides
/// the follow-suit obligation; it only matters once the player is free to
/// play any card.
pub fn is_legal_play(
    hand: &[Card],
    card: Card,
    led_suit: Option<Suit>,
    _trump: Suit,
) -> Result<(), IllegalPlayReason> {
    if !hand.contains(&card) {
        return Err(IllegalPlayReason::NotInHand);
    }
    if let Some(led_suit) = led_suit {
        let must_follow = hand.iter().any(|c| c.suit == led_suit);
        if must_follow && card.suit != led_suit {
            return Err(IllegalPlayReason::MustFollowSuit);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Rank;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    #[test]
    fn fresh_deck_has_52_unique_cards() {
        let deck = fresh_deck();
        assert_eq!(deck.len(), 52);
        let unique: std::collections::HashSet<_> = deck.iter().collect();
        assert_eq!(unique.len(), 52);
    }

    #[test]
    fn deal_consumes_deck_in_order_and_leaves_remainder() {
        let mut deck = fresh_deck();
        let original_len = deck.len();
        let hands = deal(&mut deck, &[5, 5, 5, 5]).unwrap();
        assert_eq!(hands.len(), 4);
        for hand in &hands {
            assert_eq!(hand.len(), 5);
        }
        assert_eq!(deck.len(), original_len - 20);
    }

    #[test]
    fn deal_fails_when_deck_is_too_small() {
        let mut deck = fresh_deck();
        let err = deal(&mut deck, &[13, 13, 13, 14]).unwrap_err();
        assert_eq!(
            err,
            DealError::InsufficientCards {
                requested: 53,
                available: 52
            }
        );
    }

    #[test]
    fn trick_winner_prefers_trump_over_led_suit() {
        let trick = vec![
            (0u8, card(Rank::Ten, Suit::Spades)),
            (1u8, card(Rank::King, Suit::Spades)),
            (2u8, card(Rank::Two, Suit::Hearts)),
            (3u8, card(Rank::Ace, Suit::Spades)),
        ];
        assert_eq!(trick_winner(&trick, Suit::Hearts), Some(2));
    }

    #[test]
    fn trick_winner_falls_back_to_led_suit_when_no_trump_played() {
        let trick = vec![
            (0u8, card(Rank::Nine, Suit::Clubs)),
            (1u8, card(Rank::King, Suit::Clubs)),
            (2u8, card(Rank::Two, Suit::Diamonds)),
            (3u8, card(Rank::Ace, Suit::Clubs)),
        ];
        assert_eq!(trick_winner(&trick, Suit::Hearts), Some(3));
    }

    #[test]
    fn is_legal_play_rejects_cards_not_in_hand() {
        let hand = vec![card(Rank::Two, Suit::Clubs)];
        let result = is_legal_play(&hand, card(Rank::Three, Suit::Clubs), None, Suit::Hearts);
        assert_eq!(result, Err(IllegalPlayReason::NotInHand));
    }

    #[test]
    fn is_legal_play_enforces_suit_following() {
        let hand = vec![card(Rank::Seven, Suit::Clubs), card(Rank::Ten, Suit::Spades)];
        let result = is_legal_play(&hand, card(Rank::Seven, Suit::Clubs), Some(Suit::Spades), Suit::Hearts);
        assert_eq!(result, Err(IllegalPlayReason::MustFollowSuit));
    }

    #[test]
    fn is_legal_play_allows_any_card_when_led_suit_absent_from_hand() {
        let hand = vec![card(Rank::Seven, Suit::Clubs), card(Rank::Ten, Suit::Hearts)];
        let result = is_legal_play(&hand, card(Rank::Ten, Suit::Hearts), Some(Suit::Spades), Suit::Hearts);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn is_legal_play_allows_leading_with_any_card() {
        let hand = vec![card(Rank::Seven, Suit::Clubs)];
        let result = is_legal_play(&hand, card(Rank::Seven, Suit::Clubs), None, Suit::Hearts);
        assert_eq!(result, Ok(()));
    }
}
