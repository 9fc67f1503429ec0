use std::process::Output;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::model::LanguageModel;

#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable to run, looked up on PATH unless absolute.
    pub program: String,
    pub model: String,
    /// Upper bound for one completion, process start to exit.
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Language model served by the local `claude` binary in print mode.
pub struct ClaudeCli {
    config: ClaudeCliConfig,
}

impl ClaudeCli {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    fn command(&self, system_prompt: &str, user_prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-p")
            .arg(user_prompt)
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--output-format")
            .arg("text")
            .kill_on_drop(true);
        cmd
    }

    /// True when the program starts and reports a version.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.program)
            .arg("--version")
            .output()
            .await
            .is_ok_and(|out| out.status.success())
    }
}

fn reply_text(output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "claude exited with failure");
        return Err(AgentError::Backend(format!(
            "claude exited {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() {
        return Err(AgentError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for ClaudeCli {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        let started = Instant::now();
        let limit = self.config.timeout;

        let output = tokio::time::timeout(limit, self.command(system_prompt, user_prompt).output())
            .await
            .map_err(|_| AgentError::Timeout(limit.as_secs()))?
            .map_err(|e| {
                AgentError::Backend(format!("cannot start {}: {e}", self.config.program))
            })?;

        let text = reply_text(output)?;
        debug!(
            model = %self.config.model,
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "claude replied"
        );
        Ok(text)
    }
}
