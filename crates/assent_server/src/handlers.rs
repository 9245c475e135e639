//! HTTP and WebSocket request handlers

use axum::{
    Router,
    routing::get,
};

pub mod gesture;
pub mod health;
pub mod patients;
pub mod relay;

use crate::state::AppState;

/// Build all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(relay::relay_socket))
        .route(
            "/gesture",
            get(gesture::take_gesture)
                .post(gesture::publish_gesture)
                .delete(gesture::clear_gesture),
        )
        .route("/gesture/stream", get(gesture::gesture_stream))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::enroll_patient),
        )
}
