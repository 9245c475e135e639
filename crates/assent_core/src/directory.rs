//! Patient directory
//!
//! The registry consults a directory to decide whether a PIN belongs to a
//! known patient. Persistence is someone else's problem; the in-memory
//! implementation is seeded from configuration.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::id::Pin;

/// A patient known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub name: String,
    pub pin: Pin,
}

/// Answers "is this PIN a known patient" for the registry
#[async_trait::async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn is_known(&self, pin: &Pin) -> bool;

    /// Enroll a new patient under a freshly generated, unique PIN
    async fn enroll(&self, name: &str) -> PatientRecord;

    async fn patients(&self) -> Vec<PatientRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<Pin, PatientRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patients(records: impl IntoIterator<Item = PatientRecord>) -> Self {
        let directory = Self::new();
        {
            let mut map = directory.records.write();
            for record in records {
                map.insert(record.pin.clone(), record);
            }
        }
        directory
    }
}

#[async_trait::async_trait]
impl PatientDirectory for InMemoryDirectory {
    async fn is_known(&self, pin: &Pin) -> bool {
        self.records.read().contains_key(pin)
    }

    async fn enroll(&self, name: &str) -> PatientRecord {
        let mut records = self.records.write();
        let pin = loop {
            let candidate = Pin::generate();
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = PatientRecord {
            name: name.to_string(),
            pin: pin.clone(),
        };
        records.insert(pin, record.clone());
        debug!("Enrolled patient {} with PIN {}", record.name, record.pin);
        record
    }

    async fn patients(&self) -> Vec<PatientRecord> {
        let mut all: Vec<_> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.pin.cmp(&b.pin));
        all
    }
}
