//! Session supervisor: ordered traversal of a question set
//!
//! Owns the question list, the current index and the answers recorded so
//! far, and renders the end-of-session summary.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::gesture::Gesture;

#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    questions: Vec<String>,
    current_index: usize,
    answers: Vec<Option<Gesture>>,
}

impl SessionSupervisor {
    /// Begin a session at question 0. Blank entries are skipped; a set with
    /// nothing left fails with `EmptyQuestionSet`.
    pub fn start<I, Q>(questions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        let mut kept = Vec::new();
        for question in questions {
            let question: String = question.into();
            let trimmed = question.trim();
            if trimmed.is_empty() {
                warn!("Skipping blank question");
                continue;
            }
            kept.push(trimmed.to_string());
        }

        if kept.is_empty() {
            return Err(CoreError::EmptyQuestionSet);
        }

        debug!("Session started with {} questions", kept.len());
        Ok(Self {
            answers: vec![None; kept.len()],
            questions: kept,
            current_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The question being asked, or `None` once the set is exhausted
    pub fn current(&self) -> Option<(usize, &str)> {
        self.questions
            .get(self.current_index)
            .map(|q| (self.current_index, q.as_str()))
    }

    /// Store an answer. Calling twice for one index keeps the later value.
    pub fn record_answer(&mut self, index: usize, answer: Gesture) -> Result<()> {
        let total = self.questions.len();
        let slot = self
            .answers
            .get_mut(index)
            .ok_or(CoreError::QuestionIndexOutOfRange { index, total })?;
        if let Some(previous) = slot.replace(answer) {
            debug!("Answer for question {} overwritten ({} -> {})", index, previous, answer);
        }
        Ok(())
    }

    pub fn answer(&self, index: usize) -> Option<Gesture> {
        self.answers.get(index).copied().flatten()
    }

    /// Move to the next question, returning its index if there is one
    pub fn advance(&mut self) -> Option<usize> {
        if self.current_index < self.questions.len() {
            self.current_index += 1;
        }
        (self.current_index < self.questions.len()).then_some(self.current_index)
    }

    pub fn is_completed(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    /// Back to question 0 with every answer cleared
    pub fn reset(&mut self) {
        self.current_index = 0;
        self.answers.iter_mut().for_each(|a| *a = None);
    }

    pub fn summary(&self) -> Result<SessionSummary> {
        if !self.is_completed() {
            return Err(CoreError::SessionNotCompleted {
                current: self.current_index + 1,
                total: self.questions.len(),
            });
        }

        let entries = self
            .questions
            .iter()
            .zip(&self.answers)
            .enumerate()
            .map(|(index, (question, answer))| SummaryEntry {
                index,
                question: question.clone(),
                answer: answer.map_or(SummaryAnswer::NoAnswer, SummaryAnswer::from),
            })
            .collect();
        Ok(SessionSummary { entries })
    }
}

/// The recorded outcome for one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryAnswer {
    Yes,
    No,
    NoAnswer,
}

impl From<Gesture> for SummaryAnswer {
    fn from(gesture: Gesture) -> Self {
        match gesture {
            Gesture::Yes => Self::Yes,
            Gesture::No => Self::No,
        }
    }
}

impl fmt::Display for SummaryAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::NoAnswer => "NO ANSWER",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub index: usize,
    pub question: String,
    pub answer: SummaryAnswer,
}

impl fmt::Display for SummaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}: {} → {}", self.index + 1, self.question, self.answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub entries: Vec<SummaryEntry>,
}

impl SessionSummary {
    pub fn answered(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.answer != SummaryAnswer::NoAnswer)
            .count()
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
