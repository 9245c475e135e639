//! Configuration for the relay server and the patient/caretaker clients
//!
//! Everything has a default, so an empty file
//! (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionConfig;
use crate::directory::PatientRecord;
use crate::error::{ConfigError, CoreError, Result};
use crate::question_bank::{DEFAULT_SESSION_LIMIT, QuestionBank, default_questions};
use crate::router::AnswerDelivery;

/// Resolve `path` against `base_dir` unless it is already absolute
fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssentConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Patients known to the in-memory directory at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patients: Vec<PatientRecord>,

    #[serde(default)]
    pub questions: QuestionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    /// Where answers go: back to the asking caretaker, or to everyone
    pub answer_delivery: AnswerDelivery,

    /// Don't tell caretakers when a question had no patient to go to
    pub fire_and_forget: bool,

    /// Program and arguments for the gesture classifier, spawned at startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_command: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            answer_delivery: AnswerDelivery::default(),
            fire_and_forget: false,
            classifier_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionsConfig {
    /// Question bank file; the built-in questions are used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<PathBuf>,

    /// Maximum questions per session
    pub limit: usize,
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            bank: None,
            limit: DEFAULT_SESSION_LIMIT,
        }
    }
}

impl QuestionsConfig {
    /// The ordered question list for one session
    pub async fn session_questions(&self) -> Result<Vec<String>> {
        match &self.bank {
            Some(path) => Ok(QuestionBank::load(path).await?.select(self.limit)),
            None => Ok(default_questions().into_iter().take(self.limit).collect()),
        }
    }
}

impl AssentConfig {
    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |field: &str, expected: &str, value: String| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            cause: ConfigError::InvalidValue(value),
        };

        if self.questions.limit == 0 {
            return Err(invalid(
                "questions.limit",
                "at least 1",
                self.questions.limit.to_string(),
            ));
        }
        if self.acquisition.poll_interval_ms == 0 {
            return Err(invalid(
                "acquisition.poll_interval_ms",
                "a positive interval",
                "0".to_string(),
            ));
        }
        if let Some(command) = &self.server.classifier_command {
            if command.is_empty() {
                return Err(invalid(
                    "server.classifier_command",
                    "a program followed by its arguments",
                    "[]".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub async fn load() -> Result<Self> {
        load_config_from_standard_locations().await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        load_config(path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        save_config(self, path).await
    }

    /// Save to the first standard location whose directory exists
    pub async fn save(&self) -> Result<()> {
        let config_path = config_paths()
            .into_iter()
            .find(|p| p.parent().is_some_and(|parent| parent.exists()))
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("assent")
                    .join("config.toml")
            });

        self.save_to(&config_path).await
    }
}

/// Load configuration from a TOML file
pub async fn load_config(path: &Path) -> Result<AssentConfig> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::ConfigurationError {
                config_path: path.display().to_string(),
                field: "file".to_string(),
                expected: "readable TOML file".to_string(),
                cause: ConfigError::Io(e.to_string()),
            })?;

    let mut config: AssentConfig =
        toml::from_str(&content).map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "content".to_string(),
            expected: "valid TOML configuration".to_string(),
            cause: ConfigError::TomlParse(e.to_string()),
        })?;

    config.validate(path)?;

    // Bank paths are relative to the config file
    let base_dir = path.parent().unwrap_or(Path::new("."));
    if let Some(bank) = &config.questions.bank {
        config.questions.bank = Some(resolve_path(base_dir, bank));
    }

    Ok(config)
}

/// Save configuration to a TOML file
pub async fn save_config(config: &AssentConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::ConfigurationError {
                config_path: parent.display().to_string(),
                field: "directory".to_string(),
                expected: "writable directory".to_string(),
                cause: ConfigError::Io(e.to_string()),
            })?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| CoreError::ConfigurationError {
        config_path: path.display().to_string(),
        field: "serialization".to_string(),
        expected: "serializable config structure".to_string(),
        cause: ConfigError::TomlSerialize(e.to_string()),
    })?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "file".to_string(),
            expected: "writable file location".to_string(),
            cause: ConfigError::Io(e.to_string()),
        })?;

    Ok(())
}

/// Standard config file locations, most specific first
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("assent.toml"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("assent").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".assent").join("config.toml"));
    }

    paths
}

/// Load the first config found in a standard location, or the defaults
pub async fn load_config_from_standard_locations() -> Result<AssentConfig> {
    for path in config_paths() {
        if path.exists() {
            return load_config(&path).await;
        }
    }

    Ok(AssentConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Pin;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AssentConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:4000");
        assert_eq!(config.server.answer_delivery, AnswerDelivery::Directed);
        assert!(!config.server.fire_and_forget);
        assert_eq!(config.acquisition, AcquisitionConfig::default());
        assert_eq!(config.questions.limit, 10);
        assert!(config.patients.is_empty());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: AssentConfig = toml::from_str("").unwrap();
        assert_eq!(config, AssentConfig::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = AssentConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[acquisition]"));
        assert!(toml.contains("answer_delivery = \"directed\""));
    }

    #[tokio::test]
    async fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assent.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
answer_delivery = "broadcast"

[acquisition]
settle_ms = 3000
listen_timeout_ms = 20000

[questions]
bank = "questions.toml"

[[patients]]
name = "Ada"
pin = "123456"
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.server.answer_delivery, AnswerDelivery::Broadcast);
        assert_eq!(config.server.bind_address, "0.0.0.0:4000");
        assert_eq!(config.acquisition.settle_ms, 3000);
        assert_eq!(config.acquisition.poll_interval_ms, 400);
        assert_eq!(config.acquisition.listen_timeout_ms, Some(20000));
        assert_eq!(config.questions.bank, Some(dir.path().join("questions.toml")));
        assert_eq!(config.patients[0].pin, Pin::parse("123456").unwrap());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AssentConfig::default();
        config.server.classifier_command =
            Some(vec!["python3".to_string(), "classifier.py".to_string()]);
        config.save_to(&path).await.unwrap();

        let loaded = AssentConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[questions]\nlimit = 0\n").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        match err {
            CoreError::ConfigurationError { field, cause, .. } => {
                assert_eq!(field, "questions.limit");
                assert!(matches!(cause, ConfigError::InvalidValue(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConfigurationError {
                cause: ConfigError::Io(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_session_questions_default_to_builtins() {
        let questions = QuestionsConfig {
            bank: None,
            limit: 3,
        };
        let selected = questions.session_questions().await.unwrap();
        assert_eq!(selected, default_questions()[..3].to_vec());
    }

    #[test]
    fn test_config_paths() {
        let paths = config_paths();
        assert_eq!(paths[0], PathBuf::from("assent.toml"));
    }
}
