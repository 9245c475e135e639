use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Question set is empty")]
    #[diagnostic(
        code(assent_core::empty_question_set),
        help("A session needs at least one question before it can start")
    )]
    EmptyQuestionSet,

    #[error("Invalid PIN")]
    #[diagnostic(
        code(assent_core::invalid_pin),
        help("A PIN is exactly six ASCII digits, e.g. 123456")
    )]
    InvalidPin {
        #[source_code]
        src: String,
        #[label("{reason}")]
        span: (usize, usize),
        reason: String,
    },

    #[error("No patient connected for PIN {pin}")]
    #[diagnostic(
        code(assent_core::unknown_target),
        help("The patient has not registered this PIN yet, or has disconnected")
    )]
    UnknownTarget { pin: String },

    #[error("Session has not completed")]
    #[diagnostic(
        code(assent_core::session_not_completed),
        help("The summary is only available once question {current} of {total} has been passed")
    )]
    SessionNotCompleted { current: usize, total: usize },

    #[error("Question index {index} is out of range")]
    #[diagnostic(
        code(assent_core::question_index_out_of_range),
        help("The session has {total} questions (indices 0..{total})")
    )]
    QuestionIndexOutOfRange { index: usize, total: usize },

    #[error("Question bank is empty")]
    #[diagnostic(
        code(assent_core::question_bank_empty),
        help("Check that {path} contains at least one entry with non-blank question text")
    )]
    QuestionBankEmpty { path: String },

    #[error("Gesture acquisition was stopped")]
    #[diagnostic(
        code(assent_core::acquisition_stopped),
        help("The acquisition loop was stopped before the session completed")
    )]
    AcquisitionStopped,

    #[error("Configuration error")]
    #[diagnostic(
        code(assent_core::configuration_error),
        help("Check configuration file at {config_path}")
    )]
    ConfigurationError {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: ConfigError,
    },

    #[error("Serialization error")]
    #[diagnostic(
        code(assent_core::serialization_error),
        help("Failed to serialize/deserialize {data_type}")
    )]
    SerializationError {
        data_type: String,
        #[source]
        cause: serde_json::Error,
    },
}

/// Lower-level causes for configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Transient failures while reading the gesture signal.
///
/// These never abort a session; the acquisition loop reports them as status
/// text and tries again on the next tick.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum SignalSourceError {
    #[error("Gesture source unreachable: {0}")]
    #[diagnostic(
        code(assent_core::signal_unreachable),
        help("Is the gesture classifier running?")
    )]
    Unreachable(String),

    #[error("Gesture source returned malformed data: {0}")]
    #[diagnostic(code(assent_core::signal_malformed))]
    Malformed(String),

    #[error("Gesture source closed")]
    #[diagnostic(
        code(assent_core::signal_closed),
        help("The push channel was closed by the producer")
    )]
    Closed,
}

impl CoreError {
    pub fn invalid_pin(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPin {
            src: input.to_string(),
            span: (0, input.len()),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pin_labels_whole_input() {
        let err = CoreError::invalid_pin("12ab56", "non-digit characters");
        match err {
            CoreError::InvalidPin { src, span, reason } => {
                assert_eq!(src, "12ab56");
                assert_eq!(span, (0, 6));
                assert_eq!(reason, "non-digit characters");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_target_message_names_pin() {
        let err = CoreError::UnknownTarget {
            pin: "999999".to_string(),
        };
        assert_eq!(err.to_string(), "No patient connected for PIN 999999");
    }
}
