//! Websocket link to the relay server

use assent_api::{ClientCommand, ServerEvent};
use futures::{SinkExt, StreamExt};
use miette::{IntoDiagnostic, Result, miette};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:4000/api/v1/ws";

/// Sending half of a relay connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RelaySender {
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl RelaySender {
    /// A sender backed by a plain channel instead of a socket
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    pub fn send(&self, command: ClientCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| miette!("relay connection closed"))
    }
}

/// Connect to the relay. Events arrive on the returned receiver until the
/// server closes the socket.
pub async fn connect(url: &str) -> Result<(RelaySender, mpsc::UnboundedReceiver<ServerEvent>)> {
    let (socket, _) = connect_async(url).await.into_diagnostic()?;
    info!("Connected to relay at {}", url);
    let (mut sink, mut stream) = socket.split();

    let (relay, mut commands_rx) = RelaySender::channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(command) = commands_rx.recv().await {
            let text = match serde_json::to_string(&command) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode relay command: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                warn!("Relay send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Relay connection lost: {}", e);
                    break;
                }
            };
            match serde_json::from_str::<ServerEvent>(&text) {
                Ok(event) => {
                    if events_tx.send(event).is_err() {
                        break;
                    }
                }
                // Unknown events are dropped, not fatal
                Err(e) => debug!("Ignoring unreadable relay event: {}", e),
            }
        }
        debug!("Relay reader finished");
    });

    Ok((relay, events_rx))
}
