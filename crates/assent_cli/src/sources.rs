//! Gesture sources the CLI can listen to

use std::time::Duration;

use assent_core::error::SignalSourceError;
use assent_core::gesture::{
    ChannelGestureSource, Gesture, GestureReading, GestureSource, ScriptedGestureSource,
    SourceMode,
};
use clap::ValueEnum;
use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_URL: &str = "http://localhost:4000/api/v1/gesture";
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:4000/api/v1/gesture/stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Poll the relay's gesture endpoint over HTTP
    Poll,
    /// Listen to a websocket stream of readings or raw tokens
    Push,
    /// Type y or n on stdin
    Keyboard,
    /// Replay `--script`
    Script,
}

#[derive(Debug, Clone, clap::Args)]
pub struct GestureArgs {
    /// Where gestures come from
    #[arg(long = "gesture", value_enum, default_value_t = SourceKind::Poll)]
    pub kind: SourceKind,

    /// Poll or stream URL (defaults to the local relay)
    #[arg(long = "gesture-url")]
    pub url: Option<String>,

    /// Comma separated tokens for `--gesture script`, e.g. "none,yes,no"
    #[arg(long, default_value = "")]
    pub script: String,
}

impl GestureArgs {
    pub fn build(&self) -> Box<dyn GestureSource> {
        let url = self.url.clone();
        match self.kind {
            SourceKind::Poll => Box::new(HttpGestureSource::new(
                url.unwrap_or_else(|| DEFAULT_POLL_URL.to_string()),
            )),
            SourceKind::Push => Box::new(WebSocketGestureSource::new(
                url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            )),
            SourceKind::Keyboard => Box::new(keyboard_source()),
            SourceKind::Script => Box::new(scripted_source(&self.script)),
        }
    }
}

/// Polls `GET <url>` for `{detected, gesture}`. When listening begins it
/// sends `DELETE <url>` so a detection left over from settling is dropped.
#[derive(Debug, Clone)]
pub struct HttpGestureSource {
    client: reqwest::Client,
    url: String,
}

impl HttpGestureSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl GestureSource for HttpGestureSource {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SignalSourceError::Unreachable(e.to_string()))?;
        response
            .json::<GestureReading>()
            .await
            .map_err(|e| SignalSourceError::Malformed(e.to_string()))
    }

    async fn discard_pending(&mut self) {
        let cleared = self
            .client
            .delete(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = cleared {
            warn!("Could not clear pending gesture at {}: {}", self.url, e);
        }
    }

    fn source_type(&self) -> &'static str {
        "http"
    }
}

/// Push source reading a websocket. Frames are either a JSON reading or a
/// bare `yes`/`no` token. Reconnects on the next sample after a drop.
pub struct WebSocketGestureSource {
    url: String,
    socket: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketGestureSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket: None,
        }
    }
}

/// Decode one text frame from a classifier
pub fn parse_frame(text: &str) -> Result<GestureReading, SignalSourceError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|e| SignalSourceError::Malformed(e.to_string()));
    }
    Ok(Gesture::from_token(trimmed)
        .map(GestureReading::detected)
        .unwrap_or_default())
}

#[async_trait::async_trait]
impl GestureSource for WebSocketGestureSource {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        if self.socket.is_none() {
            let (socket, _) = connect_async(self.url.as_str())
                .await
                .map_err(|e| SignalSourceError::Unreachable(e.to_string()))?;
            info!("Connected to gesture stream at {}", self.url);
            self.socket = Some(socket);
        }
        let Some(socket) = self.socket.as_mut() else {
            return Err(SignalSourceError::Closed);
        };

        let frame = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break Ok(text),
                Some(Ok(Message::Close(_))) | None => break Err("gesture stream closed".to_string()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(e.to_string()),
            }
        };

        match frame {
            Ok(text) => parse_frame(&text),
            Err(reason) => {
                // Reconnect on the next sample
                self.socket = None;
                Err(SignalSourceError::Unreachable(reason))
            }
        }
    }

    async fn discard_pending(&mut self) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        let mut dropped = 0usize;
        while let Some(Some(Ok(_))) = socket.next().now_or_never() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} buffered gesture frames", dropped);
        }
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Push
    }

    fn source_type(&self) -> &'static str {
        "websocket"
    }
}

/// `y`/`n` typed on stdin, one per line
pub fn keyboard_source() -> ChannelGestureSource {
    let (tx, source) = ChannelGestureSource::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(token) = keyboard_token(&line) else {
                continue;
            };
            if tx.send(token.to_string()).await.is_err() {
                break;
            }
        }
    });
    source
}

fn keyboard_token(line: &str) -> Option<&'static str> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some("yes"),
        "n" | "no" => Some("no"),
        _ => None,
    }
}

/// Fixed script of tokens, for demos without a classifier
pub fn scripted_source(tokens: &str) -> ScriptedGestureSource {
    ScriptedGestureSource::from_tokens(tokens.split(',').map(str::trim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_frame_accepts_json_and_tokens() {
        assert_eq!(
            parse_frame(r#"{"detected":true,"gesture":"yes"}"#)
                .unwrap()
                .accepted(),
            Some(Gesture::Yes)
        );
        assert_eq!(parse_frame("no\n").unwrap().accepted(), Some(Gesture::No));
        assert_eq!(parse_frame("blink").unwrap(), GestureReading::none());
        assert!(matches!(
            parse_frame("{broken"),
            Err(SignalSourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_keyboard_tokens() {
        assert_eq!(keyboard_token("y"), Some("yes"));
        assert_eq!(keyboard_token(" N "), Some("no"));
        assert_eq!(keyboard_token("maybe"), None);
    }

    #[tokio::test]
    async fn test_unreachable_poll_endpoint_is_transient() {
        let mut source = HttpGestureSource::new("http://127.0.0.1:1/api/v1/gesture");
        assert!(matches!(
            source.sample().await,
            Err(SignalSourceError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_poll_source_ignores_detection_made_before_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = assent_server::build_app(assent_server::AppState::new(Default::default()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = format!("http://{addr}/api/v1/gesture");

        // The classifier saw a YES while the patient was still settling
        let status = reqwest::Client::new()
            .post(&url)
            .json(&GestureReading::detected(Gesture::Yes))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 202);

        let mut source = HttpGestureSource::new(url);
        source.discard_pending().await;
        assert_eq!(source.sample().await.unwrap(), GestureReading::none());
    }

    #[tokio::test]
    async fn test_scripted_source_from_list() {
        let mut source = scripted_source("none, yes");
        assert_eq!(source.sample().await.unwrap().accepted(), None);
        assert_eq!(source.sample().await.unwrap().accepted(), Some(Gesture::Yes));
    }
}
