//! End-to-end scenarios across the registry, router and acquisition machine
//!
//! These wire a caretaker and a patient to one router through channel
//! endpoints, the same way the server wires websocket connections.

use std::sync::Arc;
use std::time::Duration;

use assent_core::acquisition::{AcquisitionConfig, AnswerReporter, PresentedQuestion};
use assent_core::prelude::*;
use assent_core::{
    AnswerFilter, ChannelEndpoint, ChannelGestureSource, DropReason, InMemoryDirectory,
    PatientRecord, ScriptedGestureSource,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn pin(s: &str) -> Pin {
    Pin::parse(s).unwrap()
}

fn router(delivery: AnswerDelivery) -> Arc<MessageRouter> {
    let directory = InMemoryDirectory::with_patients([PatientRecord {
        name: "Ada".to_string(),
        pin: pin("123456"),
    }]);
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(directory)));
    Arc::new(MessageRouter::new(registry, delivery))
}

fn connect(router: &MessageRouter) -> (ConnectionId, mpsc::Receiver<RelayEvent>) {
    let id = ConnectionId::generate();
    let (endpoint, rx) = ChannelEndpoint::channel(16);
    router.attach(id, Arc::new(endpoint));
    (id, rx)
}

/// Reports answers straight into the router, as the patient's relay link does
struct RouterReporter {
    router: Arc<MessageRouter>,
    connection: ConnectionId,
    pin: Pin,
}

#[async_trait::async_trait]
impl AnswerReporter for RouterReporter {
    async fn report(&self, _question: &PresentedQuestion, answer: Gesture) {
        self.router.send_answer(self.connection, &self.pin, answer);
    }
}

#[tokio::test(start_paused = true)]
async fn question_round_trip_through_acquisition() {
    let router = router(AnswerDelivery::Directed);
    let (caretaker, mut caretaker_rx) = connect(&router);
    let (patient, mut patient_rx) = connect(&router);

    assert!(router.register(patient, &pin("123456")).await.is_success());
    assert_eq!(
        patient_rx.recv().await,
        Some(RelayEvent::Registered {
            pin: pin("123456"),
            success: true
        })
    );

    let (gesture_tx, source) = ChannelGestureSource::channel(8);
    let mut machine = GestureAcquisition::new(AcquisitionConfig::default(), source);
    let handle = machine.handle();
    let reporter = RouterReporter {
        router: router.clone(),
        connection: patient,
        pin: pin("123456"),
    };
    let patient_task = tokio::spawn(async move {
        machine.run_relay(&reporter).await.unwrap();
    });

    // Patient side: forward questions into the machine
    let forward = tokio::spawn(async move {
        while let Some(event) = patient_rx.recv().await {
            if let RelayEvent::Question { question_id, text } = event {
                handle.present(PresentedQuestion {
                    question_id: Some(question_id),
                    text,
                });
            }
        }
        handle
    });

    let mut filter = AnswerFilter::new(pin("123456"));
    let outcome = router.send_question(caretaker, &pin("123456"), "Are you dizzy?");
    let DeliveryOutcome::Delivered { question_id, .. } = outcome else {
        panic!("question not delivered: {outcome:?}");
    };
    filter.expect_answer(question_id);

    // A gesture during the settle window must not count
    sleep(Duration::from_secs(2)).await;
    gesture_tx.send("no".to_string()).await.unwrap();
    sleep(Duration::from_secs(4)).await;
    gesture_tx.send("yes".to_string()).await.unwrap();

    let Some(RelayEvent::Answer {
        pin: answered,
        answer,
        question_id: answered_id,
    }) = caretaker_rx.recv().await
    else {
        panic!("caretaker got no answer");
    };
    assert_eq!(filter.accept(&answered, answer, answered_id), Some(Gesture::Yes));
    assert_eq!(router.pending_question(&pin("123456")), None);

    router.detach(patient);
    let handle = forward.await.unwrap();
    handle.stop();
    patient_task.await.unwrap();
    drop(gesture_tx);
}

#[tokio::test]
async fn question_for_absent_patient_is_reported() {
    let router = router(AnswerDelivery::Directed);
    let (caretaker, mut caretaker_rx) = connect(&router);

    assert_eq!(
        router.send_question(caretaker, &pin("123456"), "Hello?"),
        DeliveryOutcome::NotFound
    );
    assert!(caretaker_rx.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_then_reconnect_restores_routing() {
    let router = router(AnswerDelivery::Directed);
    let (caretaker, _caretaker_rx) = connect(&router);
    let (patient, _patient_rx) = connect(&router);
    router.register(patient, &pin("123456")).await;

    router.send_question(caretaker, &pin("123456"), "Rest?");
    router.detach(patient);
    assert_eq!(
        router.send_question(caretaker, &pin("123456"), "Rest?"),
        DeliveryOutcome::NotFound
    );
    // The dead patient can no longer answer
    assert_eq!(
        router.send_answer(patient, &pin("123456"), Gesture::Yes),
        DeliveryOutcome::Dropped(DropReason::SenderNotBound)
    );

    let (again, mut again_rx) = connect(&router);
    router.register(again, &pin("123456")).await;
    assert!(router
        .send_question(caretaker, &pin("123456"), "Rest now?")
        .is_delivered());
    again_rx.recv().await.unwrap();
    assert!(matches!(
        again_rx.recv().await,
        Some(RelayEvent::Question { text, .. }) if text == "Rest now?"
    ));
}

#[tokio::test]
async fn broadcast_mode_reaches_every_other_connection() {
    let router = router(AnswerDelivery::Broadcast);
    let (_first, mut first_rx) = connect(&router);
    let (_second, mut second_rx) = connect(&router);
    let (patient, mut patient_rx) = connect(&router);
    router.register(patient, &pin("123456")).await;

    let outcome = router.send_answer(patient, &pin("123456"), Gesture::No);
    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            recipients: 2,
            question_id: None
        }
    );
    for rx in [&mut first_rx, &mut second_rx] {
        assert_eq!(
            rx.recv().await,
            Some(RelayEvent::Answer {
                pin: pin("123456"),
                answer: Gesture::No,
                question_id: None
            })
        );
    }
    // Only the registration ack, never its own answer
    patient_rx.recv().await.unwrap();
    assert!(patient_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn stalled_second_question_waits_until_restart() {
    let config = AcquisitionConfig::default();
    let mut machine =
        GestureAcquisition::new(config, ScriptedGestureSource::from_tokens(["yes"]));
    let handle = machine.handle();
    let mut session = SessionSupervisor::start(["Q1", "Q2"]).unwrap();

    let controller = tokio::spawn(async move {
        // Q1 answered around 5.4s, Q2 listening from 11.4s and never answered
        sleep(Duration::from_secs(60)).await;
        handle.restart();
        sleep(Duration::from_secs(1)).await;
        handle.stop();
    });

    let err = machine.run_session(&mut session).await.unwrap_err();
    assert!(matches!(err, CoreError::AcquisitionStopped));
    // The restart cleared Q1's answer and went back to the first question
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.answer(0), None);
    assert!(!session.is_completed());
    controller.await.unwrap();
}
