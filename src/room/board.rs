use rand::Rng;

use crate::cards::{deal, fresh_deck, is_legal_play, trick_winner, Suit};
use crate::cards::Card;
use crate::player::{next_seat, team_of, ConnectionStatus, Player, PlayerId, Seat, TeamIndex, SEAT_COUNT};

use super::{Phase, Room, Round, TeamCounts};
use super::errors::GameError;

const INITIAL_DEAL_SIZE: usize = 5;
const FINAL_DEAL_SIZE: usize = 8;
const TRICKS_TO_WIN_ROUND: u8 = 7;
const ROUNDS_TO_WIN_GAME: u8 = 7;
const TRICKS_PER_ROUND: u8 = 13;

/// What happened as a result of a legal `play_card`.
#[derive(Debug, Clone)]
pub enum PlayOutcome {
    /// The trick is still open; play continues with `next_turn`.
    TrickOpen { next_turn: Seat },
    /// The trick just closed. If the round also ended, `hand_complete`
    /// carries the outcome (and the board has already advanced into the
    /// next round's deal, or into `game-complete`).
    TrickClosed {
        winner: Seat,
        tricks: TeamCounts,
        hand_complete: Option<HandCompleteInfo>,
    },
}

#[derive(Debug, Clone)]
pub struct HandCompleteInfo {
    pub winner_team: TeamIndex,
    pub tricks: TeamCounts,
    pub round_wins: TeamCounts,
    pub game_complete: Option<TeamIndex>,
    /// Present when the game continues: the next round's hakem and
    /// initial 5-card deal have already happened.
    pub next_round_hakem: Option<Seat>,
}

#[derive(Debug, Clone)]
pub struct TrumpOutcome {
    pub suit: Suit,
    pub current_turn: Seat,
}

/// The authoritative per-room state machine. Every public method here is
/// synchronous and either fully applies or fully rejects — there is no
/// partial mutation on error (spec §4.2: "failures do not mutate state").
#[derive(Debug, Clone)]
pub struct GameBoard {
    room: Room,
}

impl GameBoard {
    pub fn new(code: String) -> Self {
        GameBoard { room: Room::new(code) }
    }

    pub fn from_room(room: Room) -> Self {
        GameBoard { room }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn into_room(self) -> Room {
        self.room
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.room.player_by_id(player_id).is_some()
    }

    /// Seat a new Player. Only permitted while the room is in `lobby`.
    /// Seating the fourth Player cascades, in the same call, through
    /// team-assignment, the initial deal, and into `trump-selection` —
    /// those are internal transitions with no suspension point (§4.2).
    pub fn join(&mut self, player_id: PlayerId, display_name: String) -> Result<Seat, GameError> {
        if self.room.phase != Phase::Lobby {
            return Err(GameError::IllegalPhase { phase: self.room.phase });
        }
        if self.room.is_full() {
            return Err(GameError::RoomFull);
        }
        let seat = self.room.players.len() as Seat;
        self.room.players.push(Player::new(player_id, display_name, seat));

        if self.room.is_full() {
            self.room.phase = Phase::TeamAssignment;
            self.assign_teams_and_deal();
        }
        Ok(seat)
    }

    fn assign_teams_and_deal(&mut self) {
        let hakem = rand::thread_rng().gen_range(0..SEAT_COUNT as Seat);
        self.room.phase = Phase::InitialDeal;
        self.start_round(hakem);
        self.room.phase = Phase::TrumpSelection;
    }

    /// Shuffle a fresh deck and deal the first 5 cards per player in seat
    /// order starting at `hakem`.
    fn start_round(&mut self, hakem: Seat) {
        self.room.round = Some(Round::new(hakem));
        self.room.deck = fresh_deck();
        self.deal_from_hakem(hakem, INITIAL_DEAL_SIZE);
    }

    fn deal_from_hakem(&mut self, hakem: Seat, count: usize) {
        let order: Vec<Seat> = (0..SEAT_COUNT as Seat)
            .map(|offset| (hakem + offset) % SEAT_COUNT as Seat)
            .collect();
        let counts = vec![count; order.len()];
        let hands = deal(&mut self.room.deck, &counts)
            .expect("fresh 52-card deck always has enough cards for 4x5 or 4x8");
        for (seat, hand) in order.into_iter().zip(hands) {
            if let Some(player) = self.room.player_by_seat_mut(seat) {
                player.hand.extend(hand);
            }
        }
    }

    /// The hakem submits a trump suit (raw wire token, validated here per
    /// §4.2: "the chosen suit must be one of the four valid suits").
    pub fn choose_trump(&mut self, player_id: &str, suit_token: &str) -> Result<TrumpOutcome, GameError> {
        if self.room.phase != Phase::TrumpSelection {
            return Err(GameError::IllegalPhase { phase: self.room.phase });
        }
        let seat = self.require_seated(player_id)?;
        let hakem = self.room.round.as_ref().expect("round active in trump-selection").hakem;
        if seat != hakem {
            return Err(GameError::OnlyHakemMayChooseTrump);
        }
        let suit = parse_suit(suit_token).ok_or_else(|| GameError::InvalidTrump(suit_token.to_string()))?;

        self.room.round.as_mut().unwrap().trump = Some(suit);
        self.room.phase = Phase::FinalDeal;
        self.deal_from_hakem(hakem, FINAL_DEAL_SIZE);
        self.room.phase = Phase::Playing;
        self.room.current_turn = Some(hakem);

        Ok(TrumpOutcome { suit, current_turn: hakem })
    }

    /// The current-turn Player plays a card. Validation order matches
    /// §4.2 exactly: phase, then turn, then legality.
    pub fn play_card(&mut self, player_id: &str, card: Card) -> Result<PlayOutcome, GameError> {
        if self.room.phase != Phase::Playing {
            return Err(GameError::IllegalPhase { phase: self.room.phase });
        }
        let seat = self.require_seated(player_id)?;
        let current_turn = self.room.current_turn.expect("current_turn set while playing");
        if seat != current_turn {
            return Err(GameError::NotYourTurn(player_id.to_string()));
        }
        self.apply_play(seat, card)
    }

    /// Play `card` on behalf of `seat` without the turn/identity checks —
    /// used by the turn-deadline auto-play path (§4.5), which has
    /// already established that `seat` is the current-turn player.
    pub fn force_play(&mut self, seat: Seat, card: Card) -> Result<PlayOutcome, GameError> {
        if self.room.phase != Phase::Playing {
            return Err(GameError::IllegalPhase { phase: self.room.phase });
        }
        self.apply_play(seat, card)
    }

    /// The lowest-ranked legal card in `seat`'s hand, used to auto-play on
    /// turn-deadline expiry (§4.5: "selects the lowest-index legal card").
    pub fn lowest_legal_card(&self, seat: Seat) -> Option<Card> {
        let round = self.room.round.as_ref()?;
        let trump = round.trump?;
        let led_suit = round.current_trick.led_suit();
        let hand = &self.room.player_by_seat(seat)?.hand;
        hand.iter()
            .copied()
            .filter(|&card| is_legal_play(hand, card, led_suit, trump).is_ok())
            .min_by_key(|card| (card.suit as u8, card.rank))
    }

    fn apply_play(&mut self, seat: Seat, card: Card) -> Result<PlayOutcome, GameError> {
        let round = self.room.round.as_ref().expect("round active while playing");
        let trump = round.trump.expect("trump fixed while playing");
        let led_suit = round.current_trick.led_suit();
        let hand = &self.room.player_by_seat(seat).expect("current-turn seat is occupied").hand;
        is_legal_play(hand, card, led_suit, trump).map_err(|reason| GameError::IllegalCard { reason })?;

        let player = self.room.player_by_seat_mut(seat).unwrap();
        let hand_index = player.hand.iter().position(|&c| c == card).unwrap();
        player.hand.remove(hand_index);

        let round = self.room.round.as_mut().unwrap();
        round.current_trick.plays.push((seat, card));

        if !round.current_trick.is_closed() {
            let next_turn = next_seat(seat);
            self.room.current_turn = Some(next_turn);
            return Ok(PlayOutcome::TrickOpen { next_turn });
        }

        self.close_trick()
    }

    fn close_trick(&mut self) -> Result<PlayOutcome, GameError> {
        let round = self.room.round.as_mut().unwrap();
        let trump = round.trump.unwrap();
        let winner = trick_winner(&round.current_trick.plays, trump)
            .expect("a closed trick always has a winner");
        let winner_team = team_of(winner);
        round.tricks_won[winner_team.as_index()] += 1;
        let tricks = round.tricks_won;

        let closed = std::mem::take(&mut round.current_trick);
        round.closed_tricks.push(closed);
        self.room.current_turn = Some(winner);

        let hand_over = tricks[winner_team.as_index()] >= TRICKS_TO_WIN_ROUND
            || round.tricks_played() >= TRICKS_PER_ROUND;

        if !hand_over {
            return Ok(PlayOutcome::TrickClosed { winner, tricks, hand_complete: None });
        }

        let hand_complete = self.complete_hand(winner_team, tricks);
        Ok(PlayOutcome::TrickClosed {
            winner,
            tricks,
            hand_complete: Some(hand_complete),
        })
    }

    fn complete_hand(&mut self, winner_team: TeamIndex, tricks: TeamCounts) -> HandCompleteInfo {
        let previous_hakem = self.room.round.as_ref().unwrap().hakem;

        self.room.game.round_wins[winner_team.as_index()] += 1;
        self.room.game.rounds_completed += 1;
        let round_wins = self.room.game.round_wins;

        self.room.phase = Phase::HandComplete;

        if round_wins[winner_team.as_index()] >= ROUNDS_TO_WIN_GAME {
            self.room.phase = Phase::GameComplete;
            self.room.current_turn = None;
            return HandCompleteInfo {
                winner_team,
                tricks,
                round_wins,
                game_complete: Some(winner_team),
                next_round_hakem: None,
            };
        }

        let next_hakem = self.next_hakem(previous_hakem, winner_team);
        self.room.phase = Phase::InitialDeal;
        self.start_round(next_hakem);
        self.room.phase = Phase::TrumpSelection;

        HandCompleteInfo {
            winner_team,
            tricks,
            round_wins,
            game_complete: None,
            next_round_hakem: Some(next_hakem),
        }
    }

    /// If the hakem's team won, the hakem is unchanged. Otherwise the seat
    /// rotates to the next seat — in clockwise order from the current
    /// hakem — belonging to the winning team (§4.2, resolved per
    /// DESIGN.md's open-question decision).
    fn next_hakem(&self, current_hakem: Seat, winner_team: TeamIndex) -> Seat {
        if team_of(current_hakem) == winner_team {
            return current_hakem;
        }
        let mut seat = next_seat(current_hakem);
        while team_of(seat) != winner_team {
            seat = next_seat(seat);
        }
        seat
    }

    fn require_seated(&self, player_id: &str) -> Result<Seat, GameError> {
        self.room
            .seat_of(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))
    }

    /// Record a transport-level connection/disconnection. Purely cosmetic
    /// bookkeeping on `Player::status` — it never by itself advances the
    /// phase (that is the coordinator's reconnection-grace timer's job).
    pub fn mark_connection_status(&mut self, player_id: &str, status: ConnectionStatus) {
        if let Some(player) = self.room.player_by_id_mut(player_id) {
            player.status = status;
        }
    }

    /// An explicit `leave` (as opposed to a dropped connection) skips the
    /// reconnection grace window entirely. In the lobby the seat is freed
    /// up for someone else; once a Round is underway Hokm cannot continue
    /// with fewer than four Players, so the Room is abandoned outright.
    pub fn leave(&mut self, player_id: &str) -> Result<(), GameError> {
        match self.room.phase {
            Phase::Lobby => {
                let before = self.room.players.len();
                self.room.players.retain(|p| p.id != player_id);
                if self.room.players.len() == before {
                    return Err(GameError::UnknownPlayer(player_id.to_string()));
                }
                for (index, player) in self.room.players.iter_mut().enumerate() {
                    player.seat = index as Seat;
                }
                Ok(())
            }
            Phase::GameComplete | Phase::Abandoned => Ok(()),
            _ => {
                self.abandon();
                Ok(())
            }
        }
    }

    /// Force the Room into its terminal `abandoned` phase. Idempotent, and
    /// a no-op once the game has already concluded.
    pub fn abandon(&mut self) {
        if !matches!(self.room.phase, Phase::GameComplete | Phase::Abandoned) {
            self.room.phase = Phase::Abandoned;
            self.room.current_turn = None;
        }
    }
}

fn parse_suit(token: &str) -> Option<Suit> {
    match token {
        "hearts" => Some(Suit::Hearts),
        "diamonds" => Some(Suit::Diamonds),
        "clubs" => Some(Suit::Clubs),
        "spades" => Some(Suit::Spades),
        _ => None,
    }
}
