//! Ordered question sessions
//!
//! With a PIN the session is driven from the caretaker side over the relay;
//! without one it runs the acquisition machine locally against a gesture
//! source.

use std::sync::Arc;
use std::time::Duration;

use assent_core::acquisition::{AcquisitionConfig, GestureAcquisition};
use assent_core::error::CoreError;
use assent_core::gesture::GestureSource;
use assent_core::id::Pin;
use assent_core::router::AnswerFilter;
use assent_core::session::{SessionSummary, SessionSupervisor};
use miette::{Result, miette};

use crate::commands::ask::{AskOutcome, ask_once};
use crate::output::{ConsoleObserver, Output};
use crate::relay;

/// Run the whole set locally and print the summary
pub async fn run_local(
    questions: Vec<String>,
    source: Box<dyn GestureSource>,
    acquisition: AcquisitionConfig,
) -> Result<()> {
    let output = Output::new();
    let mut session = SessionSupervisor::start(questions)?;

    output.section("Session");
    output.kv("Questions", &session.len().to_string());
    output.kv("Gesture source", source.source_type());

    let mut machine = GestureAcquisition::new(acquisition, source)
        .with_observer(Arc::new(ConsoleObserver::new()));
    let handle = machine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    match machine.run_session(&mut session).await {
        Ok(summary) => {
            output.summary(&summary);
            Ok(())
        }
        Err(CoreError::AcquisitionStopped) => {
            output.warning("Session stopped before completion");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask each question of the set through the relay, one at a time
pub async fn run_remote(
    pin: &str,
    relay_url: &str,
    questions: Vec<String>,
    answer_timeout: Option<Duration>,
) -> Result<()> {
    let output = Output::new();
    let pin = Pin::parse(pin)?;
    let mut session = SessionSupervisor::start(questions)?;
    let (relay, mut events) = relay::connect(relay_url).await?;
    let mut filter = AnswerFilter::new(pin.clone());

    output.section("Remote session");
    output.kv("PIN", pin.as_str());
    output.kv("Questions", &session.len().to_string());

    let total = session.len();
    while let Some((index, question)) = session.current() {
        let question = question.to_string();
        output.question(&format!("Question {} of {}:", index + 1, total), &question);

        match ask_once(&relay, &mut events, &mut filter, &question, answer_timeout).await? {
            AskOutcome::Answered(answer) => {
                output.answer(answer);
                session.record_answer(index, answer)?;
            }
            AskOutcome::TimedOut => output.warning("No answer, moving on"),
            AskOutcome::Undelivered => {
                return Err(miette!(
                    code = "assent_cli::patient_offline",
                    help = format!("The patient must be running `assent patient --pin {pin}`"),
                    "No patient is connected with PIN {}",
                    pin
                ));
            }
            AskOutcome::Disconnected => return Err(miette!("relay connection closed")),
        }
        session.advance();
    }

    let summary: SessionSummary = session.summary()?;
    output.summary(&summary);
    Ok(())
}
