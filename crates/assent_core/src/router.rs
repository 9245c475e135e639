//! Question/answer routing between caretaker and patient connections
//!
//! Questions are always addressed: the router resolves the PIN through the
//! registry and hands the event to exactly one connection. Answers are either
//! directed back to the caretaker that asked (default) or broadcast to every
//! other connection (legacy mode, receivers filter by PIN).
//!
//! Nothing here raises an error to the caller. Every call returns a
//! [`DeliveryOutcome`] which callers may report or ignore.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::gesture::Gesture;
use crate::id::{ConnectionId, Pin, QuestionId};
use crate::registry::{ConnectionRegistry, RegistrationResult};

/// Events the router hands to connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Acknowledges a registration attempt
    Registered { pin: Pin, success: bool },
    /// A question for the patient behind this connection
    Question {
        question_id: QuestionId,
        text: String,
    },
    /// A patient's answer
    Answer {
        pin: Pin,
        answer: Gesture,
        question_id: Option<QuestionId>,
    },
}

/// How answers travel back to caretakers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerDelivery {
    /// Only the connection that issued the pending question receives the answer
    #[default]
    Directed,
    /// Every connection except the sender receives it
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The question text was empty
    EmptyQuestion,
    /// No question is pending for this PIN
    NoPendingQuestion,
    /// The sender is not the connection registered for the PIN
    SenderNotBound,
    /// The target connection has gone away or its queue is full
    Unreachable,
}

/// What happened to a routed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        recipients: usize,
        question_id: Option<QuestionId>,
    },
    /// No live connection is registered for the PIN
    NotFound,
    Dropped(DropReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("connection closed")]
    Closed,
    #[error("connection queue full")]
    Full,
}

/// A live connection the router can push events to. Delivery must not block.
pub trait ConnectionEndpoint: Send + Sync {
    fn deliver(&self, event: RelayEvent) -> Result<(), EndpointError>;

    fn endpoint_type(&self) -> &'static str;
}

/// Endpoint backed by a bounded channel; the transport task drains the
/// receiving half
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    tx: mpsc::Sender<RelayEvent>,
}

impl ChannelEndpoint {
    pub fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RelayEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

impl ConnectionEndpoint for ChannelEndpoint {
    fn deliver(&self, event: RelayEvent) -> Result<(), EndpointError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EndpointError::Full,
            mpsc::error::TrySendError::Closed(_) => EndpointError::Closed,
        })
    }

    fn endpoint_type(&self) -> &'static str {
        "channel"
    }
}

/// The question currently outstanding for a patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionContext {
    pub id: QuestionId,
    pub source: ConnectionId,
    pub text: String,
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    connections: RwLock<HashMap<ConnectionId, Arc<dyn ConnectionEndpoint>>>,
    contexts: Mutex<HashMap<Pin, QuestionContext>>,
    delivery: AnswerDelivery,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("registry", &self.registry)
            .field("connections", &self.connections.read().len())
            .field("delivery", &self.delivery)
            .finish()
    }
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, delivery: AnswerDelivery) -> Self {
        Self {
            registry,
            connections: RwLock::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            delivery,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn delivery(&self) -> AnswerDelivery {
        self.delivery
    }

    /// Make a connection reachable
    pub fn attach(&self, connection: ConnectionId, endpoint: Arc<dyn ConnectionEndpoint>) {
        debug!("Attached {} ({})", connection, endpoint.endpoint_type());
        self.connections.write().insert(connection, endpoint);
    }

    /// Forget a connection on disconnect: its registry bindings go, as do
    /// questions it was still waiting on and questions addressed to it
    pub fn detach(&self, connection: ConnectionId) -> Vec<Pin> {
        self.connections.write().remove(&connection);
        let released = self.registry.release(connection);
        self.contexts.lock().retain(|pin, context| {
            context.source != connection && !released.contains(pin)
        });
        released
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Register `connection` as the patient for `pin` and acknowledge it
    pub async fn register(&self, connection: ConnectionId, pin: &Pin) -> RegistrationResult {
        let result = self.registry.register(pin, connection).await;
        let ack = RelayEvent::Registered {
            pin: pin.clone(),
            success: result.is_success(),
        };
        if let Err(e) = self.deliver_to(connection, ack) {
            debug!("Registration ack for {} not delivered: {}", connection, e);
        }
        result
    }

    /// Deliver a question to the patient registered for `pin`. Supersedes any
    /// question still pending for that patient.
    pub fn send_question(&self, from: ConnectionId, pin: &Pin, text: &str) -> DeliveryOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("Dropping empty question from {}", from);
            return DeliveryOutcome::Dropped(DropReason::EmptyQuestion);
        }

        let Some(target) = self.registry.resolve(pin) else {
            info!("Question for PIN {} dropped: no patient connected", pin);
            return DeliveryOutcome::NotFound;
        };

        let context = QuestionContext {
            id: QuestionId::generate(),
            source: from,
            text: text.to_string(),
        };
        let question_id = context.id;
        if let Some(previous) = self.contexts.lock().insert(pin.clone(), context) {
            debug!("Question {} for PIN {} superseded", previous.id, pin);
        }

        let event = RelayEvent::Question {
            question_id,
            text: text.to_string(),
        };
        match self.deliver_to(target, event) {
            Ok(()) => {
                info!("Question {} delivered to PIN {}", question_id, pin);
                DeliveryOutcome::Delivered {
                    recipients: 1,
                    question_id: Some(question_id),
                }
            }
            Err(e) => {
                warn!("Question for PIN {} not delivered: {}", pin, e);
                let mut contexts = self.contexts.lock();
                // A newer question may have replaced ours in the meantime
                if contexts.get(pin).map(|c| c.id) == Some(question_id) {
                    contexts.remove(pin);
                }
                DeliveryOutcome::Dropped(DropReason::Unreachable)
            }
        }
    }

    /// Route a patient's answer back according to the delivery mode
    pub fn send_answer(&self, from: ConnectionId, pin: &Pin, answer: Gesture) -> DeliveryOutcome {
        match self.delivery {
            AnswerDelivery::Directed => self.send_answer_directed(from, pin, answer),
            AnswerDelivery::Broadcast => self.broadcast_answer(from, pin, answer),
        }
    }

    fn send_answer_directed(
        &self,
        from: ConnectionId,
        pin: &Pin,
        answer: Gesture,
    ) -> DeliveryOutcome {
        if self.registry.resolve(pin) != Some(from) {
            debug!("Answer for PIN {} from unbound {}", pin, from);
            return DeliveryOutcome::Dropped(DropReason::SenderNotBound);
        }

        let Some(context) = self.contexts.lock().remove(pin) else {
            debug!("Answer for PIN {} with no pending question", pin);
            return DeliveryOutcome::Dropped(DropReason::NoPendingQuestion);
        };

        let event = RelayEvent::Answer {
            pin: pin.clone(),
            answer,
            question_id: Some(context.id),
        };
        match self.deliver_to(context.source, event) {
            Ok(()) => {
                info!(
                    "Answer {} for question {} sent to {}",
                    answer, context.id, context.source
                );
                DeliveryOutcome::Delivered {
                    recipients: 1,
                    question_id: Some(context.id),
                }
            }
            Err(e) => {
                warn!("Answer for PIN {} not delivered: {}", pin, e);
                DeliveryOutcome::Dropped(DropReason::Unreachable)
            }
        }
    }

    fn broadcast_answer(&self, from: ConnectionId, pin: &Pin, answer: Gesture) -> DeliveryOutcome {
        let question_id = self.contexts.lock().get(pin).map(|c| c.id);
        let event = RelayEvent::Answer {
            pin: pin.clone(),
            answer,
            question_id,
        };

        let recipients = {
            let connections = self.connections.read();
            connections
                .iter()
                .filter(|(id, _)| **id != from)
                .filter(|(id, endpoint)| match endpoint.deliver(event.clone()) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Broadcast to {} failed: {}", id, e);
                        false
                    }
                })
                .count()
        };
        info!(
            "Answer {} for PIN {} broadcast to {} connections",
            answer, pin, recipients
        );
        DeliveryOutcome::Delivered {
            recipients,
            question_id,
        }
    }

    /// The question still awaiting an answer for `pin`, if any
    pub fn pending_question(&self, pin: &Pin) -> Option<QuestionContext> {
        self.contexts.lock().get(pin).cloned()
    }

    fn deliver_to(&self, connection: ConnectionId, event: RelayEvent) -> Result<(), EndpointError> {
        let endpoint = self
            .connections
            .read()
            .get(&connection)
            .cloned()
            .ok_or(EndpointError::Closed)?;
        endpoint.deliver(event)
    }
}

/// Caretaker-side guard that keeps only answers for the tracked patient and
/// the question actually being waited on
#[derive(Debug, Clone)]
pub struct AnswerFilter {
    pin: Pin,
    awaiting: Option<Awaiting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Any,
    Question(QuestionId),
}

impl AnswerFilter {
    pub fn new(pin: Pin) -> Self {
        Self {
            pin,
            awaiting: None,
        }
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    /// Switch to another patient, dropping anything pending
    pub fn track(&mut self, pin: Pin) {
        self.pin = pin;
        self.awaiting = None;
    }

    /// A question was sent; the next matching answer is wanted. Replaces
    /// whatever was pending before.
    pub fn expect_answer(&mut self, question_id: Option<QuestionId>) {
        self.awaiting = Some(match question_id {
            Some(id) => Awaiting::Question(id),
            None => Awaiting::Any,
        });
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Returns the answer if it belongs to this caretaker's pending question
    pub fn accept(
        &mut self,
        pin: &Pin,
        answer: Gesture,
        question_id: Option<QuestionId>,
    ) -> Option<Gesture> {
        if *pin != self.pin {
            debug!("Ignoring answer for PIN {} (tracking {})", pin, self.pin);
            return None;
        }
        match (self.awaiting, question_id) {
            (None, _) => {
                debug!("Ignoring answer for PIN {}: nothing pending", pin);
                None
            }
            (Some(Awaiting::Question(expected)), Some(got)) if expected != got => {
                debug!("Ignoring stale answer for question {}", got);
                None
            }
            _ => {
                self.awaiting = None;
                Some(answer)
            }
        }
    }
}
