//! WebSocket message types for the relay
//!
//! Every frame is a JSON text message tagged with `type`.

use assent_core::gesture::Gesture;
use assent_core::id::{Pin, QuestionId};
use assent_core::router::RelayEvent;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Bind this connection to a patient PIN
    RegisterPatient { pin: String },

    /// Ask the patient behind `pin` a question
    SendQuestion { pin: String, question: String },

    /// Report the patient's answer
    SendAnswer {
        pin: String,
        answer: Gesture,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question_id: Option<QuestionId>,
    },

    Ping,
}

/// Frames the relay sends to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges `register_patient`
    Registered { pin: Pin, success: bool },

    /// The question reached the patient
    QuestionDelivered { pin: Pin, question_id: QuestionId },

    /// Nobody is registered for the PIN, the question went nowhere
    QuestionUndelivered { pin: Pin },

    /// A question for the patient on this connection
    ReceiveQuestion {
        question_id: QuestionId,
        question: String,
    },

    /// A patient's answer
    ReceiveAnswer {
        pin: Pin,
        answer: Gesture,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question_id: Option<QuestionId>,
    },

    /// The frame could not be understood
    Error { message: String },

    Pong,
}

impl From<RelayEvent> for ServerEvent {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Registered { pin, success } => Self::Registered { pin, success },
            RelayEvent::Question { question_id, text } => Self::ReceiveQuestion {
                question_id,
                question: text,
            },
            RelayEvent::Answer {
                pin,
                answer,
                question_id,
            } => Self::ReceiveAnswer {
                pin,
                answer,
                question_id,
            },
        }
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_command_wire_format() {
        let command: ClientCommand =
            serde_json::from_str(r#"{"type":"register_patient","pin":"123456"}"#).unwrap();
        assert_eq!(
            command,
            ClientCommand::RegisterPatient {
                pin: "123456".to_string()
            }
        );

        let command: ClientCommand =
            serde_json::from_str(r#"{"type":"send_answer","pin":"123456","answer":"yes"}"#)
                .unwrap();
        assert_eq!(
            command,
            ClientCommand::SendAnswer {
                pin: "123456".to_string(),
                answer: Gesture::Yes,
                question_id: None
            }
        );

        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_relay_event_conversion() {
        let pin = Pin::parse("123456").unwrap();
        let event = ServerEvent::from(RelayEvent::Answer {
            pin: pin.clone(),
            answer: Gesture::No,
            question_id: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "receive_answer", "pin": "123456", "answer": "no"})
        );
    }

    #[test]
    fn test_question_event_carries_id() {
        let question_id = QuestionId::generate();
        let event = ServerEvent::from(RelayEvent::Question {
            question_id,
            text: "Are you dizzy?".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back,
            ServerEvent::ReceiveQuestion {
                question_id,
                question: "Are you dizzy?".to_string()
            }
        );
    }
}
