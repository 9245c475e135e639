//! Relay round trips over real sockets

use std::net::SocketAddr;
use std::time::Duration;

use assent_api::{ClientCommand, ServerEvent};
use assent_core::acquisition::{AcquisitionConfig, CycleOutcome, GestureAcquisition};
use assent_core::config::AssentConfig;
use assent_core::directory::PatientRecord;
use assent_core::error::SignalSourceError;
use assent_core::gesture::{Gesture, GestureReading, GestureSource};
use assent_core::id::Pin;
use assent_server::{AppState, build_app};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_relay(config: AssentConfig) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_app(AppState::new(config));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_with_patient() -> AssentConfig {
    AssentConfig {
        patients: vec![PatientRecord {
            name: "Ada".to_string(),
            pin: Pin::parse("123456").unwrap(),
        }],
        ..Default::default()
    }
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/api/v1/ws")).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, command: ClientCommand) {
    let text = serde_json::to_string(&command).unwrap();
    socket.send(Message::Text(text)).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for relay event")
            .expect("relay closed the socket")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn question_and_answer_round_trip() {
    let addr = spawn_relay(config_with_patient()).await;
    let pin = Pin::parse("123456").unwrap();

    let mut patient = connect(addr).await;
    send(
        &mut patient,
        ClientCommand::RegisterPatient {
            pin: " 123456 ".to_string(),
        },
    )
    .await;
    assert_eq!(
        next_event(&mut patient).await,
        ServerEvent::Registered {
            pin: pin.clone(),
            success: true
        }
    );

    let mut caretaker = connect(addr).await;
    send(
        &mut caretaker,
        ClientCommand::SendQuestion {
            pin: "123456".to_string(),
            question: "Do you want to rest?".to_string(),
        },
    )
    .await;

    let ServerEvent::QuestionDelivered { question_id, .. } = next_event(&mut caretaker).await
    else {
        panic!("expected delivery ack");
    };
    assert_eq!(
        next_event(&mut patient).await,
        ServerEvent::ReceiveQuestion {
            question_id,
            question: "Do you want to rest?".to_string()
        }
    );

    send(
        &mut patient,
        ClientCommand::SendAnswer {
            pin: "123456".to_string(),
            answer: Gesture::Yes,
            question_id: Some(question_id),
        },
    )
    .await;
    assert_eq!(
        next_event(&mut caretaker).await,
        ServerEvent::ReceiveAnswer {
            pin,
            answer: Gesture::Yes,
            question_id: Some(question_id)
        }
    );
}

#[tokio::test]
async fn unknown_pin_is_reported_not_fatal() {
    let addr = spawn_relay(config_with_patient()).await;

    let mut patient = connect(addr).await;
    send(
        &mut patient,
        ClientCommand::RegisterPatient {
            pin: "999999".to_string(),
        },
    )
    .await;
    assert_eq!(
        next_event(&mut patient).await,
        ServerEvent::Registered {
            pin: Pin::parse("999999").unwrap(),
            success: false
        }
    );

    let mut caretaker = connect(addr).await;
    send(
        &mut caretaker,
        ClientCommand::SendQuestion {
            pin: "999999".to_string(),
            question: "Hello?".to_string(),
        },
    )
    .await;
    assert_eq!(
        next_event(&mut caretaker).await,
        ServerEvent::QuestionUndelivered {
            pin: Pin::parse("999999").unwrap()
        }
    );

    // The connection is still usable
    send(&mut caretaker, ClientCommand::Ping).await;
    assert_eq!(next_event(&mut caretaker).await, ServerEvent::Pong);
}

#[tokio::test]
async fn malformed_frames_get_an_error_reply() {
    let addr = spawn_relay(config_with_patient()).await;
    let mut socket = connect(addr).await;

    socket
        .send(Message::Text("{\"type\":\"shout\"}".to_string()))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut socket).await, ServerEvent::Error { .. }));

    send(
        &mut socket,
        ClientCommand::RegisterPatient {
            pin: "12ab".to_string(),
        },
    )
    .await;
    assert!(matches!(next_event(&mut socket).await, ServerEvent::Error { .. }));
}

#[tokio::test]
async fn gesture_feed_poll_clears_after_read() {
    let addr = spawn_relay(AssentConfig::default()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/gesture");

    let empty: GestureReading = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(empty, GestureReading::none());

    let status = client
        .post(&url)
        .json(&GestureReading::detected(Gesture::No))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 202);

    let reading: GestureReading = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(reading.accepted(), Some(Gesture::No));
    let reading: GestureReading = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(reading, GestureReading::none());

    let status = client.post(&url).body("not json").send().await.unwrap().status();
    assert_eq!(status.as_u16(), 400);
}

/// Poll client for the relay's gesture mailbox
struct MailboxSource {
    client: reqwest::Client,
    url: String,
}

#[async_trait::async_trait]
impl GestureSource for MailboxSource {
    async fn sample(&mut self) -> Result<GestureReading, SignalSourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SignalSourceError::Unreachable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| SignalSourceError::Malformed(e.to_string()))
    }

    async fn discard_pending(&mut self) {
        let status = self.client.delete(&self.url).send().await.unwrap().status();
        assert_eq!(status.as_u16(), 204);
    }

    fn source_type(&self) -> &'static str {
        "mailbox"
    }
}

#[tokio::test]
async fn gesture_published_while_settling_is_not_an_answer() {
    let addr = spawn_relay(AssentConfig::default()).await;
    let url = format!("http://{addr}/api/v1/gesture");
    let config = AcquisitionConfig {
        settle_ms: 1000,
        poll_interval_ms: 50,
        listen_timeout_ms: Some(3000),
        ..Default::default()
    };
    let mut machine = GestureAcquisition::new(
        config,
        MailboxSource {
            client: reqwest::Client::new(),
            url: url.clone(),
        },
    );

    let classifier = tokio::spawn(async move {
        let client = reqwest::Client::new();
        tokio::time::sleep(Duration::from_millis(200)).await;
        client
            .post(&url)
            .json(&GestureReading::detected(Gesture::Yes))
            .send()
            .await
            .unwrap();
        // Listening from about 1s on
        tokio::time::sleep(Duration::from_millis(1300)).await;
        client
            .post(&url)
            .json(&GestureReading::detected(Gesture::No))
            .send()
            .await
            .unwrap();
    });

    let outcome = machine.run_cycle("Do you feel safe?", 0, None).await;
    assert_eq!(outcome, CycleOutcome::Answered(Gesture::No));
    classifier.await.unwrap();
}
