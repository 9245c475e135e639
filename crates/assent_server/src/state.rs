//! Application state

use std::sync::Arc;
use std::time::Instant;

use assent_core::config::AssentConfig;
use assent_core::directory::{InMemoryDirectory, PatientDirectory};
use assent_core::registry::ConnectionRegistry;
use assent_core::router::MessageRouter;
use tracing::info;

use crate::gesture_feed::GestureFeed;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AssentConfig>,
    pub directory: Arc<dyn PatientDirectory>,
    pub router: Arc<MessageRouter>,
    pub gestures: Arc<GestureFeed>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AssentConfig) -> Self {
        let directory: Arc<dyn PatientDirectory> =
            Arc::new(InMemoryDirectory::with_patients(config.patients.clone()));
        info!("Patient directory seeded with {} patients", config.patients.len());

        let registry = Arc::new(ConnectionRegistry::new(directory.clone()));
        let router = Arc::new(MessageRouter::new(
            registry,
            config.server.answer_delivery,
        ));

        Self {
            config: Arc::new(config),
            directory,
            router,
            gestures: Arc::new(GestureFeed::default()),
            started_at: Instant::now(),
        }
    }
}
