//! Relay websocket
//!
//! One socket per party. Caretakers and patients use the same endpoint; a
//! connection becomes "the patient for PIN x" only by registering.

use std::sync::Arc;

use assent_api::{ClientCommand, ServerEvent};
use assent_core::id::{ConnectionId, Pin};
use assent_core::router::{ChannelEndpoint, DeliveryOutcome, DropReason, RelayEvent};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Queue depth per connection before events are dropped
const OUTBOUND_BUFFER: usize = 64;

pub async fn relay_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::generate();
    let (endpoint, events) = ChannelEndpoint::channel(OUTBOUND_BUFFER);
    state.router.attach(connection, Arc::new(endpoint));
    info!("Relay connection {} opened", connection);

    let (sink, mut incoming) = socket.split();
    let (replies_tx, replies) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(write_events(sink, events, replies));

    while let Some(message) = incoming.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Relay connection {} errored: {}", connection, e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => handle_command(&state, connection, command).await,
            Err(e) => {
                debug!("Unreadable frame from {}: {}", connection, e);
                Some(ServerEvent::error(format!("unrecognized message: {e}")))
            }
        };
        if let Some(reply) = reply {
            if replies_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    // Detaching drops the endpoint, which closes the event queue; with the
    // reply sender gone too the writer drains and exits
    state.router.detach(connection);
    drop(replies_tx);
    let _ = writer.await;
    info!("Relay connection {} closed", connection);
}

async fn write_events(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut events: mpsc::Receiver<RelayEvent>,
    mut replies: mpsc::Receiver<ServerEvent>,
) {
    loop {
        let event = tokio::select! {
            Some(event) = events.recv() => ServerEvent::from(event),
            Some(reply) = replies.recv() => reply,
            else => break,
        };
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode relay event: {}", e);
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

/// Apply one command. Returns the direct reply to this connection, if any;
/// routed events travel through the router instead.
async fn handle_command(
    state: &AppState,
    connection: ConnectionId,
    command: ClientCommand,
) -> Option<ServerEvent> {
    match command {
        ClientCommand::RegisterPatient { pin } => {
            let pin = match Pin::parse(&pin) {
                Ok(pin) => pin,
                Err(e) => return Some(ServerEvent::error(e.to_string())),
            };
            // The router acknowledges on the connection's own queue
            state.router.register(connection, &pin).await;
            None
        }

        ClientCommand::SendQuestion { pin, question } => {
            let pin = match Pin::parse(&pin) {
                Ok(pin) => pin,
                Err(e) => return Some(ServerEvent::error(e.to_string())),
            };
            let outcome = state.router.send_question(connection, &pin, &question);
            question_reply(state, pin, outcome)
        }

        ClientCommand::SendAnswer {
            pin,
            answer,
            question_id,
        } => {
            let pin = match Pin::parse(&pin) {
                Ok(pin) => pin,
                Err(e) => return Some(ServerEvent::error(e.to_string())),
            };
            if let Some(answered) = question_id {
                let pending = state.router.pending_question(&pin).map(|c| c.id);
                if pending.is_some_and(|id| id != answered) {
                    debug!(
                        "Dropping answer for superseded question {} (PIN {})",
                        answered, pin
                    );
                    return None;
                }
            }
            let outcome = state.router.send_answer(connection, &pin, answer);
            debug!("Answer from {} for PIN {}: {:?}", connection, pin, outcome);
            None
        }

        ClientCommand::Ping => Some(ServerEvent::Pong),
    }
}

fn question_reply(state: &AppState, pin: Pin, outcome: DeliveryOutcome) -> Option<ServerEvent> {
    let fire_and_forget = state.config.server.fire_and_forget;
    match outcome {
        DeliveryOutcome::Delivered {
            question_id: Some(question_id),
            ..
        } if !fire_and_forget => Some(ServerEvent::QuestionDelivered { pin, question_id }),
        DeliveryOutcome::NotFound | DeliveryOutcome::Dropped(DropReason::Unreachable)
            if !fire_and_forget =>
        {
            Some(ServerEvent::QuestionUndelivered { pin })
        }
        _ => None,
    }
}
