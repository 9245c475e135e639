//! API error types

use miette::{Diagnostic, JSONReportHandler};
use serde::{Deserialize, Serialize};

/// API error response
#[derive(Debug, thiserror::Error, Diagnostic, Serialize, Deserialize)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation failed: {message}")]
    #[diagnostic(
        code(api::validation_error),
        help("Check the request body against the API documentation")
    )]
    ValidationError { message: String },

    /// Resource not found
    #[error("Resource not found: {resource_type}")]
    #[diagnostic(
        code(api::not_found),
        help("The {resource_type} '{resource_id}' does not exist")
    )]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// Core error from assent-core
    #[error("{message}")]
    #[diagnostic(code(api::core_error), help("Core operation failed"))]
    Core { message: String, json: String },

    /// JSON error
    #[error("{message}")]
    #[diagnostic(
        code(api::json_error),
        help("Check that your JSON is valid and matches the expected schema")
    )]
    Json { message: String, json: String },

    /// Service temporarily unavailable
    #[error("Service temporarily unavailable")]
    #[diagnostic(
        code(api::service_unavailable),
        help("The relay is shutting down or not yet ready")
    )]
    ServiceUnavailable { retry_after_seconds: Option<u64> },
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ValidationError { .. } => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::ServiceUnavailable { .. } => 503,
            ApiError::Core { .. } => 500,
            ApiError::Json { .. } => 400,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Core { .. } => "core_error",
            ApiError::Json { .. } => "json_error",
            ApiError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl From<assent_core::error::CoreError> for ApiError {
    fn from(err: assent_core::error::CoreError) -> Self {
        use assent_core::error::CoreError;

        // Bad input is the caller's fault, not a server failure
        if let CoreError::InvalidPin { reason, .. } = &err {
            return Self::validation(format!("invalid PIN: {reason}"));
        }

        let handler = JSONReportHandler::new();

        let message = format!("{}", err);
        let mut json = String::new();

        let err: Box<dyn Diagnostic> = Box::new(err);
        handler
            .render_report(&mut json, err.as_ref())
            .unwrap_or_default();

        Self::Core { message, json }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        let diagnostic = miette::miette!(
            code = "json::parse_error",
            help = "Check that your JSON is valid",
            "{}",
            err
        );

        let handler = JSONReportHandler::new();
        let message = err.to_string();
        let mut json = String::new();

        handler
            .render_report(&mut json, diagnostic.as_ref())
            .unwrap_or_default();

        Self::Json { message, json }
    }
}

// Server-side response conversion
#[cfg(feature = "server")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let detail = match &self {
            ApiError::Core { json, .. } | ApiError::Json { json, .. } => Some(json.clone()),
            _ => None,
        };

        let mut error_obj = serde_json::json!({
            "type": self.error_type(),
            "message": self.to_string(),
        });

        if let Some(d) = detail {
            error_obj["detail"] = serde_json::Value::String(d);
        }

        let body = serde_json::json!({
            "error": error_obj,
            "timestamp": chrono::Utc::now(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assent_core::error::CoreError;

    #[test]
    fn test_invalid_pin_is_a_validation_error() {
        let err = ApiError::from(CoreError::invalid_pin("12", "too short"));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Validation failed: invalid PIN: too short");
    }

    #[test]
    fn test_core_error_keeps_rendered_report() {
        let err = ApiError::from(CoreError::EmptyQuestionSet);
        assert_eq!(err.status_code(), 500);
        match err {
            ApiError::Core { message, json } => {
                assert_eq!(message, "Question set is empty");
                assert!(json.contains("assent_core::empty_question_set"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_json_error_status() {
        let err: ApiError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_type(), "json_error");
    }
}
