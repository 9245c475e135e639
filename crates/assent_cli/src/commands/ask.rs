//! Caretaker side: ask one question and wait for the answer

use std::time::Duration;

use assent_api::{ClientCommand, ServerEvent};
use assent_core::gesture::Gesture;
use assent_core::id::Pin;
use assent_core::router::AnswerFilter;
use miette::{Result, miette};
use tokio::sync::mpsc;
use tracing::debug;

use crate::output::Output;
use crate::relay::{self, RelaySender};

/// How a single question ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskOutcome {
    Answered(Gesture),
    /// No patient is connected under the PIN
    Undelivered,
    TimedOut,
    /// The relay went away
    Disconnected,
}

/// Send `question` to `filter`'s patient and wait for the matching answer
pub async fn ask_once(
    relay: &RelaySender,
    events: &mut mpsc::UnboundedReceiver<ServerEvent>,
    filter: &mut AnswerFilter,
    question: &str,
    timeout: Option<Duration>,
) -> Result<AskOutcome> {
    relay.send(ClientCommand::SendQuestion {
        pin: filter.pin().to_string(),
        question: question.to_string(),
    })?;
    // Any answer for this PIN until the relay tells us the question id
    filter.expect_answer(None);

    let wait = async {
        loop {
            let Some(event) = events.recv().await else {
                return AskOutcome::Disconnected;
            };
            match event {
                ServerEvent::QuestionDelivered { pin, question_id } if pin == *filter.pin() => {
                    filter.expect_answer(Some(question_id));
                }
                ServerEvent::QuestionUndelivered { pin } if pin == *filter.pin() => {
                    return AskOutcome::Undelivered;
                }
                ServerEvent::ReceiveAnswer {
                    pin,
                    answer,
                    question_id,
                } => {
                    if let Some(answer) = filter.accept(&pin, answer, question_id) {
                        return AskOutcome::Answered(answer);
                    }
                }
                other => debug!("Ignoring relay event {:?}", other),
            }
        }
    };

    Ok(match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .unwrap_or(AskOutcome::TimedOut),
        None => wait.await,
    })
}

pub async fn run(pin: &str, question: &str, relay_url: &str, timeout_secs: Option<u64>) -> Result<()> {
    let output = Output::new();
    let pin = Pin::parse(pin)?;
    if question.trim().is_empty() {
        return Err(miette!("question must not be empty"));
    }

    let (relay, mut events) = relay::connect(relay_url).await?;
    let mut filter = AnswerFilter::new(pin.clone());

    output.question("Asking:", question);
    let outcome = ask_once(
        &relay,
        &mut events,
        &mut filter,
        question,
        timeout_secs.map(Duration::from_secs),
    )
    .await?;

    match outcome {
        AskOutcome::Answered(answer) => output.answer(answer),
        AskOutcome::Undelivered => {
            output.warning(&format!("No patient is connected with PIN {}", pin))
        }
        AskOutcome::TimedOut => output.warning("No answer before the timeout"),
        AskOutcome::Disconnected => output.error("Relay connection closed"),
    }
    Ok(())
}
