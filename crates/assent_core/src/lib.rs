//! Assent Core - PIN session relay and gesture-response protocol
//!
//! This crate holds the protocol logic shared by the relay server and the
//! patient/caretaker clients: the PIN registry, the message router, the
//! session supervisor and the gesture acquisition state machine.

pub mod acquisition;
pub mod config;
pub mod directory;
pub mod error;
pub mod gesture;
pub mod id;
pub mod question_bank;
pub mod registry;
pub mod router;
pub mod session;

pub use acquisition::{
    AcquisitionConfig, AcquisitionHandle, AcquisitionObserver, AcquisitionPhase, AnswerReporter,
    CycleOutcome, GestureAcquisition, Interrupt, ListenTimeout, PresentedQuestion,
    TracingObserver,
};
pub use config::AssentConfig;
pub use directory::{InMemoryDirectory, PatientDirectory, PatientRecord};
pub use error::{CoreError, Result, SignalSourceError};
pub use gesture::{
    ChannelGestureSource, Gesture, GestureReading, GestureSource, ScriptedGestureSource,
    SourceMode,
};
pub use id::{ConnectionId, Id, IdType, Pin, QuestionId};
pub use question_bank::{QuestionBank, default_questions};
pub use registry::{ConnectionRegistry, RegistrationResult};
pub use router::{
    AnswerDelivery, AnswerFilter, ChannelEndpoint, ConnectionEndpoint, DeliveryOutcome,
    DropReason, EndpointError, MessageRouter, RelayEvent,
};
pub use session::{SessionSummary, SessionSupervisor, SummaryAnswer, SummaryEntry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        AcquisitionConfig, AnswerDelivery, AssentConfig, ConnectionId, ConnectionRegistry,
        CoreError, DeliveryOutcome, Gesture, GestureAcquisition, GestureReading, GestureSource,
        MessageRouter, PatientDirectory, Pin, QuestionId, RelayEvent, Result, SessionSupervisor,
    };
}
