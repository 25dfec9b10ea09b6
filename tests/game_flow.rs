//! End-to-end coverage of the Room lifecycle through the real
//! `ConnectionRegistry` + `CoordinatorManager` pipeline — the same pieces
//! `handlers::ws_handler` wires together, minus an actual socket.

use std::sync::Arc;
use std::time::Duration;

use hokm_server::cards::{Card, Rank, Suit};
use hokm_server::connection::{ConnectionEvent, ConnectionRegistry};
use hokm_server::coordinator::{CoordinatorConfig, CoordinatorManager, PlayerAction};
use hokm_server::player::{Player, PlayerId};
use hokm_server::protocol::OutboundMessage;
use hokm_server::room::{Game, Phase, Room, Round, Trick};
use hokm_server::session::{InMemorySessionStore, SessionStore};
use tokio::sync::mpsc;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        turn_timeout: Duration::from_secs(30),
        reconnect_grace: Duration::from_secs(30),
        heartbeat_interval: Duration::from_secs(30),
        room_queue_capacity: 256,
    }
}

struct Client {
    player_id: PlayerId,
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Client {
    fn attach(registry: &ConnectionRegistry, player_id: &str, room_code: &str) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach(player_id.to_string(), room_code.to_string(), tx);
        Client { player_id: player_id.to_string(), rx }
    }

    /// Wait for the next message, failing the test if none arrives — a
    /// stuck actor or a dropped broadcast shows up as a timeout rather
    /// than a silent hang.
    async fn recv(&mut self) -> OutboundMessage {
        match tokio::time::timeout(Duration::from_millis(500), self.rx.recv()).await {
            Ok(Some(ConnectionEvent::Message(msg))) => msg,
            Ok(Some(ConnectionEvent::Close { code })) => panic!("{}: unexpected close ({code})", self.player_id),
            Ok(None) => panic!("{}: channel closed with no message", self.player_id),
            Err(_) => panic!("{}: timed out waiting for a message", self.player_id),
        }
    }

    fn assert_idle(&mut self) {
        assert!(self.rx.try_recv().is_err(), "{} received an unexpected message", self.player_id);
    }
}

struct Harness {
    registry: Arc<ConnectionRegistry>,
    coordinators: Arc<CoordinatorManager>,
}

impl Harness {
    fn new(store: Arc<dyn SessionStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(store.clone()));
        let coordinators = Arc::new(CoordinatorManager::new(registry.clone(), store, config()));
        Harness { registry, coordinators }
    }

    async fn submit(&self, room_code: &str, player_id: &str, action: PlayerAction) {
        self.coordinators
            .get_or_create(room_code)
            .await
            .submit(player_id.to_string(), action)
            .expect("room queue accepts the action");
    }
}

fn join(display_name: &str) -> PlayerAction {
    PlayerAction::Join { display_name: display_name.to_string() }
}

/// Seat four fresh players into `room_code` and drain the cascade of
/// `join_success` / `team_assignment` / `initial_deal` / `trump_prompt`
/// that the fourth join triggers. Returns each seat's full 5-card initial
/// hand plus which seat holds the hakem.
async fn seat_four_players(
    harness: &Harness,
    room_code: &str,
    clients: &mut [Client; 4],
) -> (u8, [Vec<Card>; 4]) {
    for (seat, client) in clients.iter().enumerate() {
        harness.submit(room_code, &client.player_id, join(&format!("Player {seat}"))).await;
    }
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::JoinSuccess { .. }));
    }

    let mut hakem = None;
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        if let OutboundMessage::TeamAssignment { hakem: h, .. } = msg {
            hakem = Some(h);
        } else {
            panic!("expected team_assignment, got {msg:?}");
        }
    }
    let hakem = hakem.expect("team_assignment broadcast to every seat");

    let mut hands: [Vec<Card>; 4] = Default::default();
    for (seat, client) in clients.iter_mut().enumerate() {
        match client.recv().await {
            OutboundMessage::InitialDeal { cards } => hands[seat] = cards,
            other => panic!("expected initial_deal, got {other:?}"),
        }
    }

    let prompted = clients[hakem as usize].recv().await;
    assert!(matches!(prompted, OutboundMessage::TrumpPrompt));
    for (seat, client) in clients.iter_mut().enumerate() {
        if seat as u8 != hakem {
            client.assert_idle();
        }
    }

    (hakem, hands)
}

/// Choose a trump suit as the hakem and drain `trump_selected` /
/// `final_deal` / `turn_start`. Returns each seat's full 13-card hand.
async fn choose_trump_and_deal(
    harness: &Harness,
    room_code: &str,
    clients: &mut [Client; 4],
    hakem: u8,
    initial_hands: &[Vec<Card>; 4],
    suit: &str,
) -> [Vec<Card>; 4] {
    harness.submit(room_code, &clients[hakem as usize].player_id, PlayerAction::ChooseTrump { suit: suit.into() }).await;

    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::TrumpSelected { .. }));
    }

    let mut full_hands: [Vec<Card>; 4] = Default::default();
    for (seat, client) in clients.iter_mut().enumerate() {
        match client.recv().await {
            OutboundMessage::FinalDeal { cards } => {
                let mut hand = initial_hands[seat].clone();
                hand.extend(cards);
                full_hands[seat] = hand;
            }
            other => panic!("expected final_deal, got {other:?}"),
        }
    }
    assert!(full_hands.iter().all(|h| h.len() == 13));

    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::TurnStart { .. }));
    }

    full_hands
}

#[tokio::test]
async fn happy_path_deal_assigns_teams_and_opens_trump_selection() {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let harness = Harness::new(store);
    let room_code = "9999";

    let mut clients = [
        Client::attach(&harness.registry, "alice", room_code),
        Client::attach(&harness.registry, "bob", room_code),
        Client::attach(&harness.registry, "carol", room_code),
        Client::attach(&harness.registry, "dave", room_code),
    ];

    let (hakem, initial_hands) = seat_four_players(&harness, room_code, &mut clients).await;
    assert!(hakem < 4);
    for hand in &initial_hands {
        assert_eq!(hand.len(), 5);
    }

    let full_hands = choose_trump_and_deal(&harness, room_code, &mut clients, hakem, &initial_hands, "hearts").await;
    for hand in &full_hands {
        assert_eq!(hand.len(), 13);
    }
}

/// Scenario: a player attempts to play a card that does not follow the
/// led suit while holding a card that would. The error is delivered only
/// to the offender, and the hand/turn are unchanged.
#[tokio::test]
async fn suit_following_violation_is_rejected_without_mutating_state() {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let harness = Harness::new(store);
    let room_code = "suit-follow";

    let mut clients = [
        Client::attach(&harness.registry, "p0", room_code),
        Client::attach(&harness.registry, "p1", room_code),
        Client::attach(&harness.registry, "p2", room_code),
        Client::attach(&harness.registry, "p3", room_code),
    ];

    let (hakem, initial_hands) = seat_four_players(&harness, room_code, &mut clients).await;
    let full_hands = choose_trump_and_deal(&harness, room_code, &mut clients, hakem, &initial_hands, "hearts").await;

    let leader = hakem;
    let follower = (leader + 1) % 4;

    let common_suit = full_hands[leader as usize]
        .iter()
        .map(|c| c.suit)
        .find(|&suit| full_hands[follower as usize].iter().any(|c| c.suit == suit))
        .expect("two random 13-card hands share at least one suit");

    let lead_card = *full_hands[leader as usize].iter().find(|c| c.suit == common_suit).unwrap();
    let violating_card = *full_hands[follower as usize]
        .iter()
        .find(|c| c.suit != common_suit)
        .expect("a 13-card hand holding a shared suit also holds an off-suit card");
    let legal_card = *full_hands[follower as usize].iter().find(|c| c.suit == common_suit).unwrap();

    harness.submit(room_code, &clients[leader as usize].player_id, PlayerAction::PlayCard { card: lead_card }).await;
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::CardPlayed { .. }));
    }
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::TurnStart { .. }));
    }

    harness
        .submit(room_code, &clients[follower as usize].player_id, PlayerAction::PlayCard { card: violating_card })
        .await;
    let err = clients[follower as usize].recv().await;
    match err {
        OutboundMessage::Error { code, .. } => assert_eq!(code, "must_follow_suit"),
        other => panic!("expected a must_follow_suit error, got {other:?}"),
    }
    for (seat, client) in clients.iter_mut().enumerate() {
        if seat as u8 != follower {
            client.assert_idle();
        }
    }

    // The turn has not advanced — the same player can still play the
    // legal card that follows suit.
    harness
        .submit(room_code, &clients[follower as usize].player_id, PlayerAction::PlayCard { card: legal_card })
        .await;
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::CardPlayed { .. }));
    }
}

/// Scenario: a player's connection drops and they rejoin with the same
/// identity before the reconnection grace window expires. They receive a
/// `state_resync` carrying exactly their own hand and the room's shared
/// state; nobody else is notified.
#[tokio::test]
async fn disconnect_then_rejoin_within_grace_resyncs_state() {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let harness = Harness::new(store);
    let room_code = "reconnect";

    let mut clients = [
        Client::attach(&harness.registry, "p0", room_code),
        Client::attach(&harness.registry, "p1", room_code),
        Client::attach(&harness.registry, "p2", room_code),
        Client::attach(&harness.registry, "p3", room_code),
    ];

    let (hakem, initial_hands) = seat_four_players(&harness, room_code, &mut clients).await;
    let full_hands = choose_trump_and_deal(&harness, room_code, &mut clients, hakem, &initial_hands, "spades").await;

    let dropped_seat = (hakem + 2) % 4;
    let dropped_id = clients[dropped_seat as usize].player_id.clone();

    harness.coordinators.get_or_create(room_code).await.notify_disconnected(dropped_id.clone());
    // Disconnection is cosmetic bookkeeping; nobody is told about it.
    for client in clients.iter_mut() {
        client.assert_idle();
    }

    // Rejoin: a fresh connection attaches under the same player id, as a
    // returning client's socket would after a successful session lookup.
    let mut rejoined = Client::attach(&harness.registry, &dropped_id, room_code);
    harness.submit(room_code, &dropped_id, join("Player (reconnected)")).await;

    let resync = rejoined.recv().await;
    match resync {
        OutboundMessage::StateResync { view } => {
            assert_eq!(view.phase, "playing");
            assert_eq!(view.hand, full_hands[dropped_seat as usize]);
            assert_eq!(view.current_turn, Some(hakem));
        }
        other => panic!("expected state_resync, got {other:?}"),
    }
    for (seat, client) in clients.iter_mut().enumerate() {
        if seat as u8 != dropped_seat {
            client.assert_idle();
        }
    }
}

fn seated_player(id: &str, seat: u8, hand: Vec<Card>) -> Player {
    let mut player = Player::new(id.to_string(), format!("Player {seat}"), seat);
    player.hand = hand;
    player
}

/// Build a Room one trick away from completing both its hand and the
/// game: team 0 has already won 6 of 7 tricks this round and 6 of 7
/// rounds overall, so closing the next trick in team 0's favor ends the
/// game outright.
fn near_game_complete_room(code: &str) -> Room {
    let hands = [
        vec![
            Card::new(Rank::Ten, Suit::Clubs),
            Card::new(Rank::Two, Suit::Spades),
            Card::new(Rank::Three, Suit::Spades),
            Card::new(Rank::Four, Suit::Spades),
            Card::new(Rank::Five, Suit::Spades),
            Card::new(Rank::Six, Suit::Spades),
            Card::new(Rank::Seven, Suit::Spades),
        ],
        vec![
            Card::new(Rank::Two, Suit::Clubs),
            Card::new(Rank::Eight, Suit::Spades),
            Card::new(Rank::Nine, Suit::Spades),
            Card::new(Rank::Ten, Suit::Spades),
            Card::new(Rank::Jack, Suit::Spades),
            Card::new(Rank::Queen, Suit::Spades),
            Card::new(Rank::King, Suit::Spades),
        ],
        vec![
            Card::new(Rank::Ace, Suit::Hearts),
            Card::new(Rank::Three, Suit::Diamonds),
            Card::new(Rank::Four, Suit::Diamonds),
            Card::new(Rank::Five, Suit::Diamonds),
            Card::new(Rank::Six, Suit::Diamonds),
            Card::new(Rank::Seven, Suit::Diamonds),
            Card::new(Rank::Eight, Suit::Diamonds),
        ],
        vec![
            Card::new(Rank::Two, Suit::Diamonds),
            Card::new(Rank::Nine, Suit::Diamonds),
            Card::new(Rank::Ten, Suit::Diamonds),
            Card::new(Rank::Jack, Suit::Diamonds),
            Card::new(Rank::Queen, Suit::Diamonds),
            Card::new(Rank::King, Suit::Diamonds),
            Card::new(Rank::Ace, Suit::Diamonds),
        ],
    ];

    Room {
        code: code.to_string(),
        players: hands
            .into_iter()
            .enumerate()
            .map(|(seat, hand)| seated_player(&format!("p{seat}"), seat as u8, hand))
            .collect(),
        phase: Phase::Playing,
        game: Game { round_wins: [6, 0], rounds_completed: 6 },
        round: Some(Round {
            hakem: 0,
            trump: Some(Suit::Hearts),
            tricks_won: [6, 0],
            closed_tricks: vec![Trick::default(); 6],
            current_trick: Trick::default(),
        }),
        current_turn: Some(0),
        deck: Vec::new(),
    }
}

/// Scenario: resuming a Room from persisted state (rather than a fresh
/// lobby) and playing its final trick emits `hand_complete` then
/// `game_complete`, after which further play is rejected as
/// `illegal_phase`. Also exercises `CoordinatorManager::get_or_create`
/// loading a Room that was never joined through this process.
#[tokio::test]
async fn resuming_persisted_room_completes_the_game_and_locks_further_play() {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let room_code = "game-complete";
    store.save_room_state(&near_game_complete_room(room_code)).await.unwrap();

    let harness = Harness::new(store);
    let mut clients = [
        Client::attach(&harness.registry, "p0", room_code),
        Client::attach(&harness.registry, "p1", room_code),
        Client::attach(&harness.registry, "p2", room_code),
        Client::attach(&harness.registry, "p3", room_code),
    ];

    let plays = [
        Card::new(Rank::Ten, Suit::Clubs),
        Card::new(Rank::Two, Suit::Clubs),
        Card::new(Rank::Ace, Suit::Hearts),
        Card::new(Rank::Two, Suit::Diamonds),
    ];
    for (seat, card) in plays.iter().enumerate() {
        harness.submit(room_code, &clients[seat].player_id, PlayerAction::PlayCard { card: *card }).await;
        for client in clients.iter_mut() {
            let msg = client.recv().await;
            assert!(matches!(msg, OutboundMessage::CardPlayed { .. }));
        }
        if seat < 3 {
            // The trick is still open after the first three plays, so each
            // carries its own turn_start in addition to card_played.
            for client in clients.iter_mut() {
                let msg = client.recv().await;
                assert!(matches!(msg, OutboundMessage::TurnStart { .. }));
            }
        }
    }

    for client in clients.iter_mut() {
        let msg = client.recv().await;
        match msg {
            OutboundMessage::TrickComplete { tricks, .. } => assert_eq!(tricks, serde_json::json!({"0": 7, "1": 0})),
            other => panic!("expected trick_complete, got {other:?}"),
        }
    }
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        match msg {
            OutboundMessage::HandComplete { winner_team, round_wins, .. } => {
                assert_eq!(serde_json::to_value(winner_team).unwrap(), serde_json::json!(0));
                assert_eq!(round_wins, serde_json::json!({"0": 7, "1": 0}));
            }
            other => panic!("expected hand_complete, got {other:?}"),
        }
    }
    for client in clients.iter_mut() {
        let msg = client.recv().await;
        assert!(matches!(msg, OutboundMessage::GameComplete { .. }));
    }

    harness
        .submit(room_code, &clients[2].player_id, PlayerAction::PlayCard { card: Card::new(Rank::Nine, Suit::Hearts) })
        .await;
    let err = clients[2].recv().await;
    match err {
        OutboundMessage::Error { code, current_phase, .. } => {
            assert_eq!(code, "illegal_phase");
            assert_eq!(current_phase, Some("game-complete"));
        }
        other => panic!("expected illegal_phase error, got {other:?}"),
    }
}
