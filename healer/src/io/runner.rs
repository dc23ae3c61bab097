//! Single-attempt shell command execution.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::types::ExecutionResult;
use crate::error::HealError;
use crate::exit_codes;
use crate::io::process::{Termination, run_command_with_timeout, shell_command};

/// Runs one command once and reports what happened.
///
/// Implementations must never return `Err` for an ordinary failure of the
/// command itself (non-zero exit, timeout, cancellation, spawn failure); those
/// are reported through [`ExecutionResult`]. `Err` is reserved for misuse such
/// as an empty command.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, timeout: Duration, cancel: &CancelToken)
    -> Result<ExecutionResult>;
}

/// Runs commands through `sh -c` with bounded output capture.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    output_limit_bytes: usize,
}

impl ShellRunner {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(crate::io::config::DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

impl CommandRunner for ShellRunner {
    #[instrument(skip_all, fields(command = %command, timeout_ms = timeout.as_millis() as u64))]
    fn run(
        &self,
        command: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        if command.trim().is_empty() {
            return Err(HealError::EmptyCommand.into());
        }

        let timestamp = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let output = match run_command_with_timeout(
            shell_command(command),
            timeout,
            self.output_limit_bytes,
            cancel,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to start command");
                return Ok(ExecutionResult::new(
                    command,
                    exit_codes::FAILURE,
                    "",
                    format!("{err:#}"),
                    start.elapsed(),
                    timestamp,
                ));
            }
        };
        let duration = start.elapsed();

        let mut stderr = output.stderr_lossy();
        match output.termination {
            Termination::TimedOut => {
                push_line(
                    &mut stderr,
                    &format!("Command timed out after {} seconds", timeout.as_secs_f64()),
                );
            }
            Termination::Cancelled => push_line(&mut stderr, "Command cancelled"),
            Termination::Exited(_) => {}
        }

        let result = ExecutionResult::new(
            command,
            output.exit_code(),
            output.stdout_lossy(),
            stderr,
            duration,
            timestamp,
        );
        debug!(
            exit_code = result.exit_code,
            duration_ms = duration.as_millis() as u64,
            "command finished"
        );
        Ok(result)
    }
}

fn push_line(text: &mut String, line: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
}
