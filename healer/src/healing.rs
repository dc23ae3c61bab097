//! The self-healing loop: run, classify, remediate, back off, retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::backoff::backoff_delay;
use crate::core::classifier::classify;
use crate::core::remediation::{ErrorContext, is_mechanically_applicable};
use crate::core::safety::rejection_reason;
use crate::core::types::{ErrorType, ExecutionResult, RemediationAction};
use crate::error::HealError;
use crate::exit_codes;
use crate::io::config::HealerConfig;
use crate::io::distro::detect_distro;
use crate::io::inference::InferenceProvider;
use crate::io::installer::{Installer, ToolInstaller};
use crate::io::memory::{KnowledgeQuery, KnowledgeRecord, MemoryStore, NoopMemory, spawn_commit};
use crate::io::runner::{CommandRunner, ShellRunner};
use crate::remediation::RemediationGenerator;

/// One healing session's input. Unset fields fall back to [`HealerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealRequest {
    pub command: String,
    pub distro: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl HealRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            distro: None,
            timeout: None,
            max_retries: None,
        }
    }

    pub fn with_distro(mut self, distro: impl Into<String>) -> Self {
        self.distro = Some(distro.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Reason why a healing session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealStop {
    /// The last attempt exited 0.
    Success,
    /// Every allowed attempt failed.
    ExceededRetries { max_retries: u32 },
    /// The failure has no applicable remediation; the session gave up early.
    CannotRemediate { error_type: ErrorType },
    /// A remediation proposed a command that failed the safety gate.
    UnsafeRemediation { command: String },
    /// The caller cancelled the session.
    Cancelled,
}

/// Summary of a healing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealOutcome {
    pub result: ExecutionResult,
    pub stop: HealStop,
}

/// Orchestrates healing sessions over injected collaborators.
///
/// Sessions share no mutable state, so one `Healer` may serve several
/// threads at once.
pub struct Healer {
    runner: Box<dyn CommandRunner>,
    installer: Box<dyn Installer>,
    memory: Arc<dyn MemoryStore>,
    generator: RemediationGenerator,
    config: HealerConfig,
    distro: String,
}

impl Healer {
    /// Build a healer with the real shell runner and package installer, no
    /// memory store and no inference provider.
    ///
    /// The distro comes from `config.distro`, or `/etc/os-release` if unset.
    pub fn new(config: HealerConfig) -> Self {
        let distro = config.distro.clone().unwrap_or_else(detect_distro);
        Self {
            runner: Box::new(ShellRunner::new(config.output_limit_bytes)),
            installer: Box::new(
                ToolInstaller::new(&config.install).with_output_limit(config.output_limit_bytes),
            ),
            memory: Arc::new(NoopMemory),
            generator: RemediationGenerator::default(),
            config,
            distro,
        }
    }

    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_installer(mut self, installer: impl Installer + 'static) -> Self {
        self.installer = Box::new(installer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_inference(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.generator = RemediationGenerator::new(Some(provider));
        self
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn config(&self) -> &HealerConfig {
        &self.config
    }

    /// Run `command` once, after the safety gate, without healing.
    pub fn execute(&self, command: &str) -> Result<ExecutionResult> {
        let command = ensure_safe(command)?;
        self.runner
            .run(command, self.config.default_timeout(), &CancelToken::new())
    }

    /// Heal `command` with the configured defaults and return the final result.
    pub fn execute_with_healing(&self, command: &str) -> Result<ExecutionResult> {
        let outcome = self.heal(&HealRequest::new(command), &CancelToken::new())?;
        Ok(outcome.result)
    }

    /// Run a healing session.
    ///
    /// Fails with [`HealError`] only when the initial command is rejected by
    /// the safety gate or a remediation needs a package manager the distro
    /// does not have. Every other failure is reported in the outcome.
    #[instrument(skip_all, fields(command = %request.command))]
    pub fn heal(&self, request: &HealRequest, cancel: &CancelToken) -> Result<HealOutcome> {
        let original = ensure_safe(&request.command)?;
        let distro = request.distro.as_deref().unwrap_or(&self.distro);
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config.default_timeout());
        let max_retries = request.max_retries.unwrap_or(self.config.max_retries);

        if self.config.use_memory_search {
            self.log_prior_solutions(original, distro);
        }

        let mut session = Session {
            original,
            distro,
            current: original.to_string(),
            applied: Vec::new(),
        };

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                info!(attempt, "session cancelled before attempt");
                return Ok(session.cancelled(cancelled_result(&session.current), attempt));
            }

            debug!(attempt, command = %session.current, "running attempt");
            let result = self.runner.run(&session.current, timeout, cancel)?;

            if cancel.is_cancelled() {
                info!(attempt, "session cancelled during attempt");
                let result = if result.success {
                    cancelled_result(&session.current)
                } else {
                    result
                };
                return Ok(session.cancelled(result, attempt));
            }

            if result.success {
                info!(attempt, "command succeeded");
                let result = session.finish(result, attempt);
                spawn_commit(self.memory.clone(), session.success_record(&result));
                return Ok(HealOutcome {
                    result,
                    stop: HealStop::Success,
                });
            }

            info!(
                attempt = attempt + 1,
                total = max_retries.saturating_add(1),
                exit_code = result.exit_code,
                "command failed"
            );

            if attempt >= max_retries {
                warn!(command = %original, "max retries exceeded");
                return Ok(self.give_up(
                    &session,
                    result,
                    attempt,
                    HealStop::ExceededRetries { max_retries },
                ));
            }

            let error_type = classify(&result.stderr, result.exit_code);
            debug!(%error_type, "classified failure");
            let ctx = ErrorContext::new(&session.current, &result.stderr, result.exit_code, distro);
            let strategy = self.generator.generate_with_inference(error_type, &ctx)?;

            let applied = if error_type == ErrorType::MissingTool {
                self.install_missing_tool(ctx.tool.as_deref(), distro, cancel)?
            } else if is_mechanically_applicable(error_type) {
                strategy.has_command()
            } else {
                strategy.use_fallback_ai && self.generator.has_inference()
            };

            if cancel.is_cancelled() {
                info!(attempt, "session cancelled during remediation");
                return Ok(session.cancelled(result, attempt));
            }

            if !applied {
                warn!(%error_type, "cannot remediate");
                return Ok(self.give_up(
                    &session,
                    result,
                    attempt,
                    HealStop::CannotRemediate { error_type },
                ));
            }

            if error_type != ErrorType::MissingTool && strategy.has_command() {
                if let Some(reason) = rejection_reason(&strategy.command) {
                    error!(command = %strategy.command, reason, "refusing unsafe remediation");
                    return Ok(self.give_up(
                        &session,
                        result,
                        attempt,
                        HealStop::UnsafeRemediation {
                            command: strategy.command,
                        },
                    ));
                }
                info!(action = %strategy.action, next = %strategy.command, "rewriting command");
                session.current = strategy.command;
            } else {
                info!(action = %strategy.action, "remediation applied");
            }

            let delay = backoff_delay(
                self.config.initial_retry_delay(),
                attempt,
                self.config.max_retry_delay(),
            );
            debug!(delay_ms = delay.as_millis() as u64, "backing off");
            if !cancel.sleep(delay) {
                info!(attempt, "session cancelled during backoff");
                return Ok(session.cancelled(result, attempt));
            }
            session.applied.push(strategy.action);
            attempt += 1;
        }
    }

    fn install_missing_tool(
        &self,
        tool: Option<&str>,
        distro: &str,
        cancel: &CancelToken,
    ) -> Result<bool, HealError> {
        let Some(tool) = tool else {
            warn!("could not extract tool name from error");
            return Ok(false);
        };
        if !self.installer.is_safe_to_install(tool) {
            warn!(tool, "tool not in safe list, skipping auto-install");
            return Ok(false);
        }

        info!(tool, "auto-installing missing tool");
        match self.installer.install(tool, distro, cancel) {
            Ok(installed) if installed.success => Ok(true),
            Ok(installed) => {
                error!(tool, exit_code = installed.exit_code, "failed to install tool");
                Ok(false)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!(tool, error = %err, "failed to install tool");
                Ok(false)
            }
        }
    }

    fn give_up(
        &self,
        session: &Session<'_>,
        result: ExecutionResult,
        attempt: u32,
        stop: HealStop,
    ) -> HealOutcome {
        let result = session.finish(result, attempt);
        spawn_commit(self.memory.clone(), session.failure_record(&result));
        HealOutcome { result, stop }
    }

    fn log_prior_solutions(&self, command: &str, distro: &str) {
        let query = KnowledgeQuery {
            query: command.to_string(),
            limit: self.config.memory.search_limit,
            distro: Some(distro.to_string()),
            min_score: self.config.memory.min_score,
        };
        match self.memory.search_knowledge(&query) {
            Ok(hits) if hits.is_empty() => debug!("no prior solutions"),
            Ok(hits) => {
                for hit in &hits {
                    info!(
                        score = hit.score,
                        success_rate = hit.success_rate,
                        solution = %hit.solution,
                        "prior solution found"
                    );
                }
            }
            Err(err) => warn!(error = %format!("{err:#}"), "memory search failed"),
        }
    }
}

impl fmt::Debug for Healer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Healer")
            .field("generator", &self.generator)
            .field("config", &self.config)
            .field("distro", &self.distro)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one session.
struct Session<'a> {
    original: &'a str,
    distro: &'a str,
    current: String,
    applied: Vec<RemediationAction>,
}

impl Session<'_> {
    fn finish(&self, result: ExecutionResult, attempt: u32) -> ExecutionResult {
        result.with_healing(attempt, self.applied.clone())
    }

    fn cancelled(&self, result: ExecutionResult, attempt: u32) -> HealOutcome {
        HealOutcome {
            result: self.finish(result, attempt),
            stop: HealStop::Cancelled,
        }
    }

    fn success_record(&self, result: &ExecutionResult) -> KnowledgeRecord {
        let mut solution = result.command.clone();
        if !self.applied.is_empty() {
            let chain: Vec<&str> = self.applied.iter().map(|action| action.as_str()).collect();
            solution.push_str(&format!(" (after: {})", chain.join(", ")));
        }
        KnowledgeRecord {
            problem: format!("Execute: {}", self.original),
            solution,
            distro: self.distro.to_string(),
            success_rate: 1.0,
        }
    }

    fn failure_record(&self, result: &ExecutionResult) -> KnowledgeRecord {
        KnowledgeRecord {
            problem: format!("Failed: {}", self.original),
            solution: result.stderr.clone(),
            distro: self.distro.to_string(),
            success_rate: 0.0,
        }
    }
}

fn ensure_safe(command: &str) -> Result<&str, HealError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(HealError::EmptyCommand);
    }
    if let Some(reason) = rejection_reason(command) {
        error!(command, reason, "refusing dangerous command");
        return Err(HealError::SafetyRejected {
            command: command.to_string(),
        });
    }
    Ok(command)
}

fn cancelled_result(command: &str) -> ExecutionResult {
    ExecutionResult::new(
        command,
        exit_codes::CANCELLED,
        "",
        "Command cancelled",
        Duration::ZERO,
        chrono::Utc::now().to_rfc3339(),
    )
}
