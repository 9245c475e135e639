//! Assent relay server library
//!
//! HTTP/WebSocket front end for the session relay: the relay socket, the
//! gesture feed and the patient directory.

pub mod classifier;
pub mod error;
pub mod gesture_feed;
pub mod handlers;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use gesture_feed::GestureFeed;
pub use state::AppState;

use assent_core::config::AssentConfig;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router around `state`
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(assent_api::API_PREFIX, handlers::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until ctrl-c
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> ServerResult<()> {
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down relay");
        })
        .await?;
    Ok(())
}

/// Start the Assent relay server
pub async fn start_server(config: AssentConfig) -> ServerResult<()> {
    use std::net::SocketAddr;

    tracing::info!("Starting Assent relay on {}", config.server.bind_address);

    // Held for the lifetime of the server; dropping it stops the classifier
    let _classifier = config
        .server
        .classifier_command
        .as_deref()
        .and_then(classifier::spawn_classifier);

    let addr: SocketAddr = config.server.bind_address.parse()?;
    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state).await
}
