//! Gesture feed endpoints
//!
//! `POST /gesture` is for the classifier, `GET /gesture` and
//! `DELETE /gesture` for poll clients and `GET /gesture/stream` (websocket)
//! for push clients.

use assent_api::{ApiError, requests::PublishGestureRequest};
use assent_core::gesture::GestureReading;
use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// Return and clear the pending detection
pub async fn take_gesture(State(state): State<AppState>) -> Json<GestureReading> {
    Json(state.gestures.take())
}

/// Drop the pending detection; poll clients call this when listening begins
pub async fn clear_gesture(State(state): State<AppState>) -> StatusCode {
    state.gestures.clear();
    StatusCode::NO_CONTENT
}

pub async fn publish_gesture(
    State(state): State<AppState>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let reading: PublishGestureRequest = serde_json::from_str(&body)?;
    state.gestures.publish(reading);
    Ok(StatusCode::ACCEPTED)
}

pub async fn gesture_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_readings(socket, state))
}

async fn stream_readings(socket: WebSocket, state: AppState) {
    let (mut sink, mut incoming) = socket.split();
    let mut readings = BroadcastStream::new(state.gestures.subscribe());
    debug!("Gesture stream subscriber connected");

    loop {
        tokio::select! {
            reading = readings.next() => {
                let reading = match reading {
                    Some(Ok(reading)) => reading,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!("Gesture stream subscriber lagged, skipped {} readings", skipped);
                        continue;
                    }
                    None => break,
                };
                let text = match serde_json::to_string(&reading) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode gesture reading: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Gesture stream subscriber disconnected");
}
