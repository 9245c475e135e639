//! Gesture classifier child process
//!
//! The classifier is an external program (typically a Python script reading
//! the camera). The relay only starts it and mirrors its output into the log.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// Spawn `command` (program followed by arguments). Failure to start is
/// logged and returns `None`; the relay keeps running without it.
pub fn spawn_classifier(command: &[String]) -> Option<Child> {
    let (program, args) = command.split_first()?;

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!("Failed to start gesture classifier {}: {}", program, e);
            return None;
        }
    };

    info!(
        "Started gesture classifier {} (pid {})",
        program,
        child.id().map_or_else(|| "?".to_string(), |id| id.to_string())
    );

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "assent_server::classifier", "{}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "assent_server::classifier", "{}", line);
            }
        });
    }

    Some(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command_starts_nothing() {
        assert!(spawn_classifier(&[]).is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_not_fatal() {
        let command = vec!["/nonexistent/assent-classifier".to_string()];
        assert!(spawn_classifier(&command).is_none());
    }
}
