//! HTTP response bodies

use assent_core::directory::PatientRecord;
use assent_core::router::AnswerDelivery;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub registered_patients: usize,
    pub answer_delivery: AnswerDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PatientResponse {
    pub name: String,
    pub pin: String,
}

impl From<PatientRecord> for PatientResponse {
    fn from(record: PatientRecord) -> Self {
        Self {
            name: record.name,
            pin: record.pin.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PatientListResponse {
    pub patients: Vec<PatientResponse>,
}
