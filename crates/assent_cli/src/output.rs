use std::io::Write;

use assent_core::acquisition::{AcquisitionObserver, AcquisitionPhase};
use assent_core::gesture::Gesture;
use assent_core::session::{SessionSummary, SummaryAnswer};
use owo_colors::OwoColorize;

/// Standard output formatting for the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    /// Print a system/status message (indented)
    pub fn status(&self, message: &str) {
        println!("  {}", message.dimmed());
    }

    /// Print an info message (indented)
    pub fn info(&self, label: &str, value: &str) {
        println!("  {} {}", label.bright_blue(), value);
    }

    /// Print a success message (indented)
    pub fn success(&self, message: &str) {
        println!("  {} {}", "✓".bright_green(), message);
    }

    /// Print an error message (indented)
    pub fn error(&self, message: &str) {
        println!("  {} {}", "✗".bright_red(), message);
    }

    /// Print a warning message (indented)
    pub fn warning(&self, message: &str) {
        println!("  {} {}", "⚠".yellow(), message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        println!();
        println!("{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
    }

    /// Print a key-value pair (indented)
    pub fn kv(&self, key: &str, value: &str) {
        println!("  {} {}", format!("{}:", key).dimmed(), value);
    }

    pub fn question(&self, label: &str, text: &str) {
        println!();
        println!("{} {}", label.bright_cyan().bold(), text.bold());
    }

    pub fn answer(&self, answer: Gesture) {
        match answer {
            Gesture::Yes => println!("  {} {}", "→".dimmed(), "YES".bright_green().bold()),
            Gesture::No => println!("  {} {}", "→".dimmed(), "NO".bright_red().bold()),
        }
    }

    pub fn summary(&self, summary: &SessionSummary) {
        self.section("Session summary");
        for entry in &summary.entries {
            let answer = match entry.answer {
                SummaryAnswer::Yes => entry.answer.to_string().bright_green().to_string(),
                SummaryAnswer::No => entry.answer.to_string().bright_red().to_string(),
                SummaryAnswer::NoAnswer => entry.answer.to_string().dimmed().to_string(),
            };
            println!("  Q{}: {} → {}", entry.index + 1, entry.question, answer);
        }
        println!();
        self.kv(
            "Answered",
            &format!("{} of {}", summary.answered(), summary.entries.len()),
        );
    }
}

/// Renders the acquisition machine on the terminal
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    output: Output,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AcquisitionObserver for ConsoleObserver {
    fn on_phase(&self, phase: &AcquisitionPhase) {
        if let AcquisitionPhase::Announcing {
            index,
            total,
            question,
        } = phase
        {
            let label = match total {
                Some(total) => format!("Question {} of {}:", index + 1, total),
                None => "Question:".to_string(),
            };
            self.output.question(&label, question);
        }
    }

    fn on_countdown(&self, text: &str) {
        // Rewrite one line in place
        print!("\r\x1b[2K  {}", text.yellow());
        if text.is_empty() {
            print!("\r");
        }
        let _ = std::io::stdout().flush();
    }

    fn on_status(&self, status: &str) {
        print!("\r\x1b[2K");
        self.output.status(status);
    }

    fn on_answer(&self, _index: usize, answer: Gesture) {
        self.output.answer(answer);
    }
}
