//! Prioritized question bank
//!
//! Caretakers can keep a TOML file of candidate questions. A session draws
//! from it with higher-priority questions first; order within one priority
//! level is randomized.

use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, CoreError, Result};

/// Questions asked when no bank is configured
pub const DEFAULT_QUESTIONS: [&str; 10] = [
    "Are you experiencing pain right now?",
    "Do you need assistance with drinking water?",
    "Are you feeling dizzy?",
    "Do you want to rest?",
    "Do you feel safe?",
    "Do you need to call a caregiver?",
    "Are you comfortable with the current temperature?",
    "Do you need medication now?",
    "Are you having trouble breathing?",
    "Do you want to continue?",
];

pub const DEFAULT_SESSION_LIMIT: usize = 10;

pub fn default_questions() -> Vec<String> {
    DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub question: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default, rename = "question")]
    pub entries: Vec<BankEntry>,
}

impl QuestionBank {
    pub fn new(entries: Vec<BankEntry>) -> Self {
        Self { entries }
    }

    /// Parse a bank from TOML. Blank questions are dropped here so an
    /// all-blank file is reported as empty.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        let mut bank: QuestionBank =
            toml::from_str(content).map_err(|e| CoreError::ConfigurationError {
                config_path: origin.to_string(),
                field: "question".to_string(),
                expected: "[[question]] tables with question text and priority".to_string(),
                cause: ConfigError::TomlParse(e.to_string()),
            })?;

        let before = bank.entries.len();
        bank.entries.retain(|e| !e.question.trim().is_empty());
        if bank.entries.len() != before {
            warn!(
                "Dropped {} blank questions from {}",
                before - bank.entries.len(),
                origin
            );
        }

        if bank.entries.is_empty() {
            return Err(CoreError::QuestionBankEmpty {
                path: origin.to_string(),
            });
        }
        Ok(bank)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::ConfigurationError {
                config_path: path.display().to_string(),
                field: "file".to_string(),
                expected: "readable question bank".to_string(),
                cause: ConfigError::Io(e.to_string()),
            }
        })?;
        let bank = Self::from_toml(&content, &path.display().to_string())?;
        debug!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draw up to `limit` questions for one session
    pub fn select(&self, limit: usize) -> Vec<String> {
        self.select_with_rng(limit, &mut rand::thread_rng())
    }

    pub fn select_with_rng<R: Rng + ?Sized>(&self, limit: usize, rng: &mut R) -> Vec<String> {
        let mut entries: Vec<&BankEntry> = self.entries.iter().collect();
        entries.shuffle(rng);
        // Stable sort keeps the shuffled order inside each priority level
        entries.sort_by_key(|e| e.priority);

        entries
            .into_iter()
            .take(limit)
            .map(|e| e.question.trim().to_string())
            .collect()
    }
}
