//! Gesture values and the sources that produce them
//!
//! A source is anything that, over time, yields zero or more readings. The
//! acquisition loop accepts at most one of them per question. Pull sources
//! (an HTTP endpoint) are sampled on a fixed interval; push sources (a token
//! stream) are awaited directly.

use std::collections::VecDeque;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SignalSourceError;

/// A yes/no answer derived from a physical gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    Yes,
    No,
}

impl Gesture {
    /// Parse a raw classification token. Anything but `yes`/`no` is ignored.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading from a gesture source, in the shape the poll endpoint returns
/// (`{detected, gesture}`). The gesture is kept raw so unexpected values are
/// skipped rather than failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GestureReading {
    #[serde(default)]
    pub detected: bool,
    #[serde(default)]
    pub gesture: Option<String>,
}

impl GestureReading {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn detected(gesture: Gesture) -> Self {
        Self {
            detected: true,
            gesture: Some(gesture.as_str().to_string()),
        }
    }

    /// The gesture, if this reading is acceptable as an answer
    pub fn accepted(&self) -> Option<Gesture> {
        if !self.detected {
            return None;
        }
        self.gesture.as_deref().and_then(Gesture::from_token)
    }
}

/// How the acquisition loop should drive a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Sample once per poll interval
    Poll,
    /// `sample` waits for the next pushed event
    Push,
}

#[async_trait::async_trait]
pub trait GestureSource: Send {
    /// Read one sample. Errors are transient; the caller retries next tick.
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError>;

    /// Drop anything buffered so far, locally or upstream. Called when
    /// listening begins, so events emitted while the subject was still
    /// settling never count.
    async fn discard_pending(&mut self) {}

    fn mode(&self) -> SourceMode {
        SourceMode::Poll
    }

    fn source_type(&self) -> &'static str;
}

#[async_trait::async_trait]
impl<S: GestureSource + ?Sized> GestureSource for Box<S> {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        (**self).sample().await
    }

    async fn discard_pending(&mut self) {
        (**self).discard_pending().await
    }

    fn mode(&self) -> SourceMode {
        (**self).mode()
    }

    fn source_type(&self) -> &'static str {
        (**self).source_type()
    }
}

/// Push source fed with raw classification tokens over a channel
#[derive(Debug)]
pub struct ChannelGestureSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelGestureSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Convenience constructor returning the sending half as well
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait::async_trait]
impl GestureSource for ChannelGestureSource {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        match self.rx.recv().await {
            Some(token) => Ok(match Gesture::from_token(&token) {
                Some(gesture) => GestureReading::detected(gesture),
                None => GestureReading::none(),
            }),
            None => Err(SignalSourceError::Closed),
        }
    }

    async fn discard_pending(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Push
    }

    fn source_type(&self) -> &'static str {
        "channel"
    }
}

/// Poll source that replays a fixed script, then reports nothing detected
/// forever. Used for demos and tests.
#[derive(Debug, Default)]
pub struct ScriptedGestureSource {
    script: VecDeque<Result<GestureReading, SignalSourceError>>,
    samples_taken: usize,
}

impl ScriptedGestureSource {
    pub fn new(script: impl IntoIterator<Item = Result<GestureReading, SignalSourceError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            samples_taken: 0,
        }
    }

    /// Build a script from tokens: `yes`, `no`, anything else is "not detected",
    /// `error` is a transient source failure
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(tokens.into_iter().map(|token| {
            if token.trim().eq_ignore_ascii_case("error") {
                Err(SignalSourceError::Unreachable("scripted failure".to_string()))
            } else {
                Ok(Gesture::from_token(token)
                    .map(GestureReading::detected)
                    .unwrap_or_default())
            }
        }))
    }

    pub fn push(&mut self, reading: Result<GestureReading, SignalSourceError>) {
        self.script.push_back(reading);
    }

    pub fn samples_taken(&self) -> usize {
        self.samples_taken
    }
}

#[async_trait::async_trait]
impl GestureSource for ScriptedGestureSource {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        self.samples_taken += 1;
        self.script.pop_front().unwrap_or_else(|| Ok(GestureReading::none()))
    }

    fn source_type(&self) -> &'static str {
        "scripted"
    }
}
