//! Assent API types and definitions
//!
//! Wire types for the relay: websocket commands and events, the HTTP
//! request/response bodies, and the error body. Shared between the server and
//! the clients.

pub mod error;
pub mod events;
pub mod requests;
pub mod responses;

pub use error::ApiError;
pub use events::{ClientCommand, ServerEvent};

// Re-export common types from assent-core
pub use assent_core::gesture::{Gesture, GestureReading};
pub use assent_core::id::{Pin, QuestionId};

/// API version constant
pub const API_VERSION: &str = "v1";

/// Path prefix every HTTP route lives under
pub const API_PREFIX: &str = "/api/v1";

/// Common metadata included in all responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseMetadata {
    pub version: String,
    pub request_id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self {
            version: API_VERSION.to_string(),
            request_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Standard API response wrapper
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub meta: ResponseMetadata,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            meta: ResponseMetadata::default(),
            data,
        }
    }
}
