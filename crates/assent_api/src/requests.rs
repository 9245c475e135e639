//! HTTP request bodies

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `POST /api/v1/patients`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnrollPatientRequest {
    pub name: String,
}

/// `POST /api/v1/gesture`, sent by the classifier for each detection.
///
/// This is the same shape `GET /api/v1/gesture` returns, so a classifier can
/// forward its readings unchanged.
pub type PublishGestureRequest = assent_core::gesture::GestureReading;
