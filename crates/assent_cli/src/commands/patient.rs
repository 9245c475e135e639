//! Patient side: register a PIN and answer questions with gestures

use std::sync::Arc;

use assent_api::{ClientCommand, ServerEvent};
use assent_core::acquisition::{
    AcquisitionConfig, AnswerReporter, GestureAcquisition, PresentedQuestion,
};
use assent_core::gesture::{Gesture, GestureSource};
use assent_core::id::Pin;
use miette::{Result, miette};
use owo_colors::OwoColorize;
use tracing::{debug, info};

use crate::output::{ConsoleObserver, Output};
use crate::relay::{self, RelaySender};

/// Sends each accepted gesture back through the relay
struct RelayReporter {
    relay: RelaySender,
    pin: Pin,
}

#[async_trait::async_trait]
impl AnswerReporter for RelayReporter {
    async fn report(&self, question: &PresentedQuestion, answer: Gesture) {
        let command = ClientCommand::SendAnswer {
            pin: self.pin.to_string(),
            answer,
            question_id: question.question_id,
        };
        if let Err(e) = self.relay.send(command) {
            tracing::warn!("Answer not sent: {}", e);
        }
    }
}

pub async fn run(
    pin: &str,
    relay_url: &str,
    source: Box<dyn GestureSource>,
    acquisition: AcquisitionConfig,
) -> Result<()> {
    let output = Output::new();
    let pin = Pin::parse(pin)?;

    output.section("Patient");
    output.kv("PIN", pin.as_str());
    output.kv("Gesture source", source.source_type());

    let (relay, mut events) = relay::connect(relay_url).await?;
    relay.send(ClientCommand::RegisterPatient {
        pin: pin.to_string(),
    })?;

    // Wait for the registration verdict before listening for questions
    loop {
        match events.recv().await {
            Some(ServerEvent::Registered { success: true, .. }) => {
                output.success(&format!("Registered as {}", pin.as_str().bright_cyan()));
                break;
            }
            Some(ServerEvent::Registered { success: false, .. }) => {
                return Err(miette!(
                    code = "assent_cli::unknown_pin",
                    help = "Ask the caretaker for the PIN shown when you were enrolled",
                    "PIN {} is not a known patient",
                    pin
                ));
            }
            Some(ServerEvent::Error { message }) => return Err(miette!("{}", message)),
            Some(other) => debug!("Ignoring {:?} while registering", other),
            None => return Err(miette!("relay closed before registration completed")),
        }
    }
    output.status("Waiting for questions… (ctrl-c to quit)");

    let mut machine = GestureAcquisition::new(acquisition, source)
        .with_observer(Arc::new(ConsoleObserver::new()));
    let handle = machine.handle();

    // Questions drive the machine; the socket closing or ctrl-c stops it
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ServerEvent::ReceiveQuestion { question_id, question }) => {
                        info!("Question received: {}", question);
                        handle.present(PresentedQuestion {
                            question_id: Some(question_id),
                            text: question,
                        });
                    }
                    Some(other) => debug!("Ignoring relay event {:?}", other),
                    None => {
                        info!("Relay closed");
                        handle.stop();
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.stop();
                    break;
                }
            }
        }
    });

    let reporter = RelayReporter { relay, pin };
    machine.run_relay(&reporter).await?;
    output.status("Stopped");
    Ok(())
}
