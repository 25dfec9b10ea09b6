//! The single `/ws` endpoint: upgrade, bind the connection to a Player
//! identity via the [`crate::connection::ConnectionRegistry`], and pump
//! messages between the socket and that Player's Room actor.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::ConnectionEvent;
use crate::coordinator::PlayerAction;
use crate::protocol::{InboundMessage, OutboundMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<crate::AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: crate::AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ConnectionEvent>();

    // The very first message on a connection must be `join` — it is the
    // only message that carries enough information (room code, and
    // optionally a returning Player's identity) to bind this socket to a
    // logical Player (§6).
    let first = loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => break Some(text),
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };
    let Some(first) = first else { return };

    let (room_code, display_name, claimed_player_id) = match serde_json::from_str::<InboundMessage>(&first) {
        Ok(InboundMessage::Join { room_code, display_name, player_id }) => (room_code, display_name, player_id),
        _ => {
            let _ = ws_sink
                .send(Message::Text(
                    serde_json::to_string(&OutboundMessage::BadMessage {
                        reason: "the first message on a connection must be `join`".into(),
                    })
                    .unwrap()
                    .into(),
                ))
                .await;
            return;
        }
    };

    let player_id = match claimed_player_id {
        Some(claimed) => {
            // Placeholder connection id: this socket has never been
            // attached, so tier 1 of the lookup is guaranteed to miss and
            // fall through to the SessionStore-backed tier 2 (§4.4).
            match state
                .registry
                .resolve_or_attach(u64::MAX, &claimed, state.config.heartbeat_interval, &tx)
                .await
            {
                Ok((player_id, _room_code)) => player_id,
                Err(_) => {
                    let _ = ws_sink
                        .send(Message::Text(
                            serde_json::to_string(&OutboundMessage::Error {
                                code: "unauthenticated",
                                reason: "session could not be re-validated".into(),
                                current_phase: None,
                            })
                            .unwrap()
                            .into(),
                        ))
                        .await;
                    return;
                }
            }
        }
        None => {
            let player_id = Uuid::new_v4().to_string();
            state.registry.attach(player_id.clone(), room_code.clone(), tx.clone());
            player_id
        }
    };

    let connection_id = match state.registry.find_by_player(&player_id) {
        Ok(id) => id,
        Err(_) => return,
    };

    if state
        .coordinators
        .get_or_create(&room_code)
        .await
        .submit(player_id.clone(), PlayerAction::Join { display_name })
        .is_err()
    {
        let _ = state.registry.send(
            &player_id,
            OutboundMessage::Error { code: "server_error", reason: "room is overloaded".into(), current_phase: None },
        );
    }

    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let outcome = match event {
                ConnectionEvent::Message(message) => {
                    let text = serde_json::to_string(&message).expect("OutboundMessage always serializes");
                    ws_sink.send(Message::Text(text.into())).await
                }
                ConnectionEvent::Close { code } => {
                    let frame = CloseFrame { code: 1000, reason: code.into() };
                    let _ = ws_sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            };
            if outcome.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            message = ws_stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => handle_inbound(&state, &room_code, &player_id, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
            _ = &mut write_task => break,
        }
    }

    write_task.abort();
    if let Ok((player_id, room_code)) = state.registry.detach(connection_id).await {
        state.coordinators.get_or_create(&room_code).await.notify_disconnected(player_id);
    }
}

/// Route one parsed inbound frame to the Player's Room actor. The
/// connection's own bound identity is always used for routing — the
/// message's embedded `player_id`/`room_code` fields (present for parity
/// with the wire format) are never trusted over it.
async fn handle_inbound(state: &crate::AppState, room_code: &str, player_id: &str, text: &str) {
    let parsed: Result<InboundMessage, _> = serde_json::from_str(text);
    let action = match parsed {
        Ok(InboundMessage::Join { display_name, .. }) => PlayerAction::Join { display_name },
        Ok(InboundMessage::ChooseTrump { suit, .. }) => PlayerAction::ChooseTrump { suit },
        Ok(InboundMessage::PlayCard { card, .. }) => PlayerAction::PlayCard { card },
        Ok(InboundMessage::Heartbeat { .. }) => PlayerAction::Heartbeat,
        Ok(InboundMessage::Leave { .. }) => PlayerAction::Leave,
        Err(err) => {
            let _ = state.registry.send(
                player_id,
                OutboundMessage::BadMessage { reason: format!("could not parse message: {err}") },
            );
            return;
        }
    };

    if state.coordinators.get_or_create(room_code).await.submit(player_id.to_string(), action).is_err() {
        let _ = state.registry.send(
            player_id,
            OutboundMessage::Error { code: "server_error", reason: "room is overloaded".into(), current_phase: None },
        );
    }
}
