//! Reindexing through an external command.

use crate::core::{StagerError, StagerResult, SubmissionLog};
use crate::di::ContentRefresher;
use async_trait::async_trait;
use tokio::process::Command;

/// Runs the configured refresh command after every content change.
///
/// An empty command turns refreshing into a no-op, for deployments where
/// the index is rebuilt out of band.
pub struct CommandRefresher {
    command: Vec<String>,
}

impl CommandRefresher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ContentRefresher for CommandRefresher {
    async fn refresh_database(&self, log: &SubmissionLog) -> StagerResult<()> {
        let Some((program, args)) = self.command.split_first() else {
            log.info("No refresh command configured, skipping reindex");
            return Ok(());
        };

        log.info(format!("Refreshing database with {}", self.command.join(" ")));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| StagerError::Refresh(format!("Failed to run {}: {}", program, e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log.info(line.to_string());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log.error(format!("Refresh exited with {}", output.status));
            return Err(StagerError::Refresh(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
