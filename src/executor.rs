//! Shell-command phase executor.
//!
//! Runs one configured command per phase through `sh -c`, with the run's
//! identity in the environment and the phase context as JSON on stdin.
//! Exit code 0 = completed, 2 during evaluate = NO-GO, anything else (or a
//! timeout) = failed.

use async_trait::async_trait;
use runway_common::{
    AutonomyLevel, PhaseContext, PhaseExecution, PhaseExecutor, PhaseName, PhaseReport,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const ENV_RUN_ID: &str = "RUNWAY_RUN_ID";
pub const ENV_PHASE: &str = "RUNWAY_PHASE";
pub const ENV_WORKFLOW: &str = "RUNWAY_WORKFLOW";
pub const ENV_WORK_ITEM: &str = "RUNWAY_WORK_ITEM";
pub const ENV_ATTEMPT: &str = "RUNWAY_ATTEMPT";

/// Exit code a phase command uses to reject the build (evaluate NO-GO).
pub const EXIT_NO_GO: i32 = 2;

/// Keep at most this much of a command's output in the execution record.
const MAX_OUTPUT_CHARS: usize = 4000;

pub struct CommandExecutor {
    command: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_command(&self, context: &PhaseContext) -> PhaseExecution {
        let start = Instant::now();
        let context_json = match serde_json::to_string(context) {
            Ok(json) => json,
            Err(e) => {
                return PhaseExecution::new(
                    PhaseReport::failed("executor_error", &format!("failed to serialize context: {}", e)),
                    start.elapsed(),
                );
            }
        };

        debug!(
            run_id = %context.run_id,
            phase = %context.phase,
            command = %self.command,
            "spawning phase command"
        );

        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env(ENV_RUN_ID, context.run_id.to_string())
            .env(ENV_PHASE, context.phase.as_str())
            .env(ENV_WORKFLOW, &context.workflow_id)
            .env(ENV_WORK_ITEM, context.work_item_id.as_deref().unwrap_or(""))
            .env(ENV_ATTEMPT, context.attempt.to_string())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return PhaseExecution::new(
                    PhaseReport::failed(
                        "spawn_failed",
                        &format!("failed to spawn '{}': {}", self.command, e),
                    ),
                    start.elapsed(),
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // A command that never reads stdin closes the pipe early; that is fine.
            let _ = stdin.write_all(context_json.as_bytes()).await;
        }

        let waited = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        run_id = %context.run_id,
                        phase = %context.phase,
                        timeout_secs = limit.as_secs(),
                        "phase command timed out"
                    );
                    return PhaseExecution::new(
                        PhaseReport::failed(
                            "timeout",
                            &format!("phase command timed out after {} seconds", limit.as_secs()),
                        ),
                        start.elapsed(),
                    );
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                return PhaseExecution::new(
                    PhaseReport::failed("executor_error", &format!("failed to wait for command: {}", e)),
                    start.elapsed(),
                );
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if !stderr.is_empty() { &stderr } else { &stdout };

        let report = match exit_code {
            0 => PhaseReport::Completed,
            EXIT_NO_GO if context.phase == PhaseName::Evaluate => PhaseReport::NoGo {
                reason: (!detail.is_empty()).then(|| truncate(detail)),
            },
            code => PhaseReport::failed(
                "command_failed",
                &if detail.is_empty() {
                    format!("phase command exited with code {}", code)
                } else {
                    format!("phase command exited with code {}: {}", code, truncate(detail))
                },
            ),
        };

        debug!(
            run_id = %context.run_id,
            phase = %context.phase,
            exit_code,
            outcome = report.as_str(),
            "phase command finished"
        );

        PhaseExecution {
            report,
            exit_code: Some(exit_code),
            duration: start.elapsed(),
            output: (!stdout.is_empty()).then(|| truncate(&stdout)),
        }
    }
}

#[async_trait]
impl PhaseExecutor for CommandExecutor {
    async fn execute(&self, context: &PhaseContext) -> PhaseExecution {
        if context.autonomy_level == AutonomyLevel::DryRun {
            debug!(run_id = %context.run_id, phase = %context.phase, "dry run; not spawning");
            let mut execution = PhaseExecution::new(PhaseReport::Completed, Duration::ZERO);
            execution.output = Some(format!("dry run: would execute '{}'", self.command));
            return execution;
        }
        self.run_command(context).await
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{}...", kept)
}
