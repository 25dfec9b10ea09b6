//! RoomActor: the single-writer-per-room worker loop of §4.5 and §5. Every
//! GameBoard transition for a given Room happens on this one task, driven
//! by a bounded FIFO of Player actions plus a periodic timer tick. No two
//! Rooms ever share a task, and nothing inside this loop ever calls back
//! into another Room's queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::cards::Card;
use crate::player::{ConnectionStatus, PlayerId, Seat};
use crate::protocol::{error_message, team_counts_json, OutboundMessage, RoomSnapshot, SeatAssignment, StateResyncView};
use crate::room::{GameBoard, Phase, PlayOutcome};
use crate::session::{SessionRecord, SessionStore, ValidateOutcome};
use crate::clock::now_unix;
use crate::connection::ConnectionRegistry;

use super::CoordinatorConfig;

/// What a connection's read loop asks this Room to do. One-to-one with
/// [`crate::protocol::InboundMessage`]'s payload, minus the `room_code`
/// routing that already got us to this actor.
#[derive(Debug, Clone)]
pub enum PlayerAction {
    Join { display_name: String },
    ChooseTrump { suit: String },
    PlayCard { card: Card },
    Heartbeat,
    Leave,
}

/// An envelope the actor's queue carries. `Disconnected` is not a wire
/// message — the transport layer raises it when a read loop ends, so the
/// Room can arm its reconnection-grace timer even though no `leave` was
/// ever sent.
#[derive(Debug, Clone)]
enum Envelope {
    Player { player_id: PlayerId, action: PlayerAction },
    Disconnected { player_id: PlayerId },
}

/// A cheap, cloneable front for submitting work to a Room's actor task.
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<Envelope>,
}

impl RoomHandle {
    pub fn submit(&self, player_id: PlayerId, action: PlayerAction) -> Result<(), super::CoordinatorError> {
        self.sender
            .try_send(Envelope::Player { player_id, action })
            .map_err(|_| super::CoordinatorError::RoomOverloaded)
    }

    /// Best-effort: a Room that is already shutting down simply drops this.
    pub fn notify_disconnected(&self, player_id: PlayerId) {
        let _ = self.sender.try_send(Envelope::Disconnected { player_id });
    }
}

struct RoomActor {
    code: String,
    board: GameBoard,
    queue: mpsc::Receiver<Envelope>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn SessionStore>,
    config: CoordinatorConfig,
    turn_deadline: Option<Instant>,
    reconnect_deadlines: HashMap<PlayerId, Instant>,
}

impl RoomActor {
    fn spawn(
        code: String,
        board: GameBoard,
        config: CoordinatorConfig,
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn SessionStore>,
    ) -> RoomHandle {
        let (sender, receiver) = mpsc::channel(config.room_queue_capacity);
        let actor = RoomActor {
            board,
            code,
            queue: receiver,
            registry,
            store,
            config,
            turn_deadline: None,
            reconnect_deadlines: HashMap::new(),
        };
        tokio::spawn(actor.run());
        RoomHandle { sender }
    }

    async fn run(mut self) {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                envelope = self.queue.recv() => {
                    match envelope {
                        Some(envelope) => self.handle_envelope(envelope).await,
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Player { player_id, action } => self.handle_action(player_id, action).await,
            Envelope::Disconnected { player_id } => self.handle_disconnected(player_id).await,
        }
    }

    async fn handle_action(&mut self, player_id: PlayerId, action: PlayerAction) {
        // §3: a Session is "updated on every action and heartbeat". A
        // standalone `heartbeat` needs nothing further once this runs, so
        // its match arm below is a deliberate no-op.
        self.touch_session(&player_id).await;
        match action {
            PlayerAction::Join { display_name } => self.handle_join(player_id, display_name).await,
            PlayerAction::ChooseTrump { suit } => self.handle_choose_trump(player_id, suit).await,
            PlayerAction::PlayCard { card } => self.handle_play_card(player_id, card).await,
            PlayerAction::Heartbeat => {}
            PlayerAction::Leave => self.handle_leave(player_id).await,
        }
    }

    /// Update only `last_heartbeat`, per §4.3's O(1) contract. A no-op if
    /// the Player has no session row yet — the very first `join` creates
    /// one via [`Self::save_session`] before any later action can touch it.
    async fn touch_session(&self, player_id: &str) {
        if let Err(err) = self.store.touch_heartbeat(player_id, now_unix()).await {
            tracing::debug!(room = %self.code, player_id = %player_id, error = %err, "heartbeat touch failed");
        }
    }

    /// Upsert the full `session:{player_id}` record (§3, §4.3) — used on
    /// first join and on every reconnect, where more than the heartbeat
    /// timestamp changes (status, and potentially room/seat on a fresh
    /// join).
    async fn save_session(&self, player_id: &str, seat: Seat, status: ConnectionStatus) {
        let record = SessionRecord {
            player_id: player_id.to_string(),
            room_code: self.code.clone(),
            status,
            last_heartbeat: now_unix(),
            seat,
        };
        if let Err(err) = self.store.save_session(&record).await {
            tracing::warn!(room = %self.code, player_id = %player_id, error = %err, "failed to persist session record");
        }
    }

    async fn handle_join(&mut self, player_id: PlayerId, display_name: String) {
        if self.board.has_player(&player_id) {
            self.reconnect_deadlines.remove(&player_id);
            self.board.mark_connection_status(&player_id, ConnectionStatus::Active);
            if let Some(player) = self.board.room().player_by_id(&player_id) {
                self.save_session(&player_id, player.seat, ConnectionStatus::Active).await;
            }
            self.send_state_resync(&player_id);
            return;
        }

        match self.board.join(player_id.clone(), display_name) {
            Ok(seat) => {
                let team = crate::player::team_of(seat);
                let room = self.board.room();
                let _ = self.registry.send(
                    &player_id,
                    OutboundMessage::JoinSuccess {
                        player_id: player_id.clone(),
                        seat,
                        team,
                        room: RoomSnapshot::of(room),
                    },
                );
                self.persist().await;
                self.save_session(&player_id, seat, ConnectionStatus::Active).await;
                if self.board.room().phase == Phase::TrumpSelection {
                    self.emit_team_assignment_and_deal();
                }
            }
            Err(err) => self.emit_error(&player_id, &err),
        }
    }

    fn emit_team_assignment_and_deal(&self) {
        let room = self.board.room();
        let round = room.round.as_ref().expect("round active once seats are full");
        let hakem = round.hakem;
        let seats: Vec<SeatAssignment> = room
            .players
            .iter()
            .map(|p| SeatAssignment { seat: p.seat, player_id: p.id.clone(), team: p.team() })
            .collect();
        self.registry.broadcast(&self.code, OutboundMessage::TeamAssignment { seats, hakem }, None);
        self.deal_hands_to_players();
        let hakem_id = room.player_id_at(hakem).expect("hakem seat is occupied");
        let _ = self.registry.send(&hakem_id, OutboundMessage::TrumpPrompt);
    }

    fn deal_hands_to_players(&self) {
        for player in &self.board.room().players {
            let _ = self
                .registry
                .send(&player.id, OutboundMessage::InitialDeal { cards: player.hand.clone() });
        }
    }

    async fn handle_choose_trump(&mut self, player_id: PlayerId, suit: String) {
        match self.board.choose_trump(&player_id, &suit) {
            Ok(outcome) => {
                self.registry.broadcast(&self.code, OutboundMessage::TrumpSelected { suit: outcome.suit }, None);
                for player in &self.board.room().players {
                    let _ = self
                        .registry
                        .send(&player.id, OutboundMessage::FinalDeal { cards: player.hand.clone() });
                }
                let current_id = self
                    .board
                    .room()
                    .player_id_at(outcome.current_turn)
                    .expect("hakem seat is occupied");
                self.registry.broadcast(
                    &self.code,
                    OutboundMessage::TurnStart { player_id: current_id, led_suit: None },
                    None,
                );
                self.arm_turn_deadline();
                self.persist().await;
            }
            Err(err) => self.emit_error(&player_id, &err),
        }
    }

    async fn handle_play_card(&mut self, player_id: PlayerId, card: Card) {
        match self.board.play_card(&player_id, card) {
            Ok(outcome) => self.apply_play_outcome(card, outcome).await,
            Err(err) => self.emit_error(&player_id, &err),
        }
    }

    async fn apply_play_outcome(&mut self, card: Card, outcome: PlayOutcome) {
        let room = self.board.room();
        let led_suit = match &outcome {
            PlayOutcome::TrickOpen { .. } => room.round.as_ref().and_then(|r| r.current_trick.led_suit()),
            PlayOutcome::TrickClosed { .. } => {
                room.round.as_ref().and_then(|r| r.closed_tricks.last()).and_then(|t| t.led_suit())
            }
        };
        let (_, player_id) = room
            .round
            .as_ref()
            .and_then(|r| match &outcome {
                PlayOutcome::TrickOpen { .. } => r.current_trick.plays.last().copied(),
                PlayOutcome::TrickClosed { .. } => r.closed_tricks.last().and_then(|t| t.plays.last().copied()),
            })
            .map(|(seat, c)| (c, room.player_id_at(seat).expect("a seat that just played is occupied")))
            .expect("apply_play_outcome is only called right after a successful play");

        self.registry.broadcast(
            &self.code,
            OutboundMessage::CardPlayed { player_id, card, led_suit },
            None,
        );

        match outcome {
            PlayOutcome::TrickOpen { next_turn } => {
                let next_id = self.board.room().player_id_at(next_turn).expect("next-turn seat is occupied");
                self.registry
                    .broadcast(&self.code, OutboundMessage::TurnStart { player_id: next_id, led_suit }, None);
                self.arm_turn_deadline();
            }
            PlayOutcome::TrickClosed { winner, tricks, hand_complete } => {
                let winner_id = self.board.room().player_id_at(winner).expect("winning seat is occupied");
                self.registry.broadcast(
                    &self.code,
                    OutboundMessage::TrickComplete { winner: winner_id.clone(), tricks: team_counts_json(tricks) },
                    None,
                );
                match hand_complete {
                    None => {
                        self.registry.broadcast(
                            &self.code,
                            OutboundMessage::TurnStart { player_id: winner_id, led_suit: None },
                            None,
                        );
                        self.arm_turn_deadline();
                    }
                    Some(info) => {
                        self.registry.broadcast(
                            &self.code,
                            OutboundMessage::HandComplete {
                                winner_team: info.winner_team,
                                tricks: team_counts_json(info.tricks),
                                round_wins: team_counts_json(info.round_wins),
                            },
                            None,
                        );
                        match info.game_complete {
                            Some(winner_team) => {
                                self.registry.broadcast(
                                    &self.code,
                                    OutboundMessage::GameComplete {
                                        winner_team,
                                        round_wins: team_counts_json(info.round_wins),
                                    },
                                    None,
                                );
                                self.turn_deadline = None;
                            }
                            None => {
                                self.emit_team_assignment_and_deal_after_new_round();
                            }
                        }
                    }
                }
            }
        }
        self.persist().await;
    }

    /// A subsequent round's teams are unchanged, so only the deal and the
    /// trump prompt need repeating — no fresh `team_assignment` event.
    fn emit_team_assignment_and_deal_after_new_round(&self) {
        self.deal_hands_to_players();
        let hakem = self.board.room().round.as_ref().expect("round active after a re-deal").hakem;
        let hakem_id = self.board.room().player_id_at(hakem).expect("hakem seat is occupied");
        let _ = self.registry.send(&hakem_id, OutboundMessage::TrumpPrompt);
    }

    async fn handle_leave(&mut self, player_id: PlayerId) {
        self.reconnect_deadlines.remove(&player_id);
        let was_active = !matches!(self.board.room().phase, Phase::GameComplete | Phase::Abandoned);
        if let Err(err) = self.board.leave(&player_id) {
            self.emit_error(&player_id, &err);
            return;
        }
        let _ = self.store.delete_session(&player_id).await;
        if was_active && self.board.room().phase == Phase::Abandoned {
            self.announce_abandonment().await;
        } else {
            self.persist().await;
        }
    }

    async fn handle_disconnected(&mut self, player_id: PlayerId) {
        if !self.board.has_player(&player_id) {
            return;
        }
        self.board.mark_connection_status(&player_id, ConnectionStatus::Disconnected);
        self.reconnect_deadlines.insert(player_id, Instant::now() + self.config.reconnect_grace);
    }

    fn send_state_resync(&self, player_id: &str) {
        let room = self.board.room();
        let Some(player) = room.player_by_id(player_id) else { return };
        let view = StateResyncView {
            phase: room.phase.as_wire_str(),
            hand: player.hand.clone(),
            trump: room.round.as_ref().and_then(|r| r.trump),
            current_trick: room.round.as_ref().map(|r| r.current_trick.plays.clone()).unwrap_or_default(),
            current_turn: room.current_turn,
            tricks: team_counts_json(room.round.as_ref().map(|r| r.tricks_won).unwrap_or_default()),
            round_wins: team_counts_json(room.game.round_wins),
        };
        let _ = self.registry.send(player_id, OutboundMessage::StateResync { view });
    }

    fn emit_error(&self, player_id: &str, err: &crate::room::GameError) {
        let _ = self.registry.send(player_id, error_message(err));
    }

    async fn persist(&self) {
        if let Err(err) = self.store.save_room_state(self.board.room()).await {
            tracing::warn!(room = %self.code, error = %err, "failed to persist room state");
        }
    }

    fn arm_turn_deadline(&mut self) {
        self.turn_deadline = Some(Instant::now() + self.config.turn_timeout);
    }

    async fn tick(&mut self) {
        self.check_turn_deadline().await;
        self.check_heartbeat_sweep().await;
        self.check_reconnect_grace().await;
    }

    /// Demote a Player who has gone silent into the same disconnect path a
    /// dropped socket would take, even though their connection object is
    /// technically still attached (§4.5's "heartbeat sweep" timer).
    async fn check_heartbeat_sweep(&mut self) {
        let now = now_unix();
        let active: Vec<PlayerId> = self
            .board
            .room()
            .players
            .iter()
            .filter(|p| p.status == ConnectionStatus::Active)
            .map(|p| p.id.clone())
            .filter(|id| !self.reconnect_deadlines.contains_key(id))
            .collect();
        for player_id in active {
            let outcome = self.store.validate_session(&player_id, self.config.heartbeat_interval, now).await;
            if matches!(outcome, Ok(ValidateOutcome::Expired)) {
                self.handle_disconnected(player_id).await;
            }
        }
    }

    /// Auto-play the lowest-index legal card for a Player who has blown
    /// through the turn deadline (§4.5).
    async fn check_turn_deadline(&mut self) {
        let Some(deadline) = self.turn_deadline else { return };
        if Instant::now() < deadline {
            return;
        }
        let Some(seat) = self.board.room().current_turn else { return };
        let Some(card) = self.board.lowest_legal_card(seat) else { return };
        if let Ok(outcome) = self.board.force_play(seat, card) {
            self.apply_play_outcome(card, outcome).await;
        }
    }

    /// Abandon the Room once a disconnected Player has outlasted the
    /// reconnection grace window (§4.5, §9: Hokm cannot continue with
    /// fewer than four Players).
    async fn check_reconnect_grace(&mut self) {
        let now = Instant::now();
        let expired: Vec<PlayerId> =
            self.reconnect_deadlines.iter().filter(|(_, &deadline)| now >= deadline).map(|(id, _)| id.clone()).collect();
        if expired.is_empty() {
            return;
        }
        for player_id in &expired {
            self.reconnect_deadlines.remove(player_id);
        }
        if matches!(self.board.room().phase, Phase::GameComplete | Phase::Abandoned) {
            return;
        }
        self.board.abandon();
        self.announce_abandonment().await;
    }

    async fn announce_abandonment(&self) {
        self.registry.broadcast(
            &self.code,
            OutboundMessage::Error {
                code: "illegal_phase",
                reason: "room abandoned: a player did not reconnect within the grace window".into(),
                current_phase: Some(Phase::Abandoned.as_wire_str()),
            },
            None,
        );
        if let Err(err) = self.store.clear_room(&self.code).await {
            tracing::warn!(room = %self.code, error = %err, "failed to clear abandoned room state");
        }
    }
}

pub(super) fn spawn_room(
    code: String,
    board: GameBoard,
    config: CoordinatorConfig,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn SessionStore>,
) -> RoomHandle {
    RoomActor::spawn(code, board, config, registry, store)
}
