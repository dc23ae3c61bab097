//! Test-only scripted collaborators and result builders.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::cancel::CancelToken;
use crate::core::types::{ExecutionResult, InstallationResult};
use crate::error::HealError;
use crate::exit_codes;
use crate::io::inference::{InferenceProvider, InferenceResponse};
use crate::io::installer::Installer;
use crate::io::memory::{KnowledgeHit, KnowledgeQuery, KnowledgeRecord, MemoryStore};
use crate::io::runner::CommandRunner;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A zero-exit result with `stdout`. The runner fills in the command.
pub fn success(stdout: &str) -> ExecutionResult {
    ExecutionResult::new("", 0, stdout, "", Duration::from_millis(1), "test")
}

/// A failed result with `exit_code` and `stderr`. The runner fills in the command.
pub fn failure(exit_code: i32, stderr: &str) -> ExecutionResult {
    ExecutionResult::new("", exit_code, "", stderr, Duration::from_millis(1), "test")
}

/// [`CommandRunner`] that replays queued results in order.
///
/// Records every command it is asked to run and when each attempt started.
/// Running past the end of the script is an error.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<ExecutionResult>>,
    commands: Arc<Mutex<Vec<String>>>,
    starts: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<ExecutionResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Shared view of the commands run so far; stays valid after the runner
    /// is moved into a healer.
    pub fn commands_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.commands)
    }

    pub fn starts_handle(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.starts)
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        command: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        lock(&self.starts).push(Instant::now());
        lock(&self.commands).push(command.to_string());
        let mut result = lock(&self.script)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted runner exhausted at command {command:?}"))?;
        result.command = command.to_string();
        Ok(result)
    }
}

/// [`Installer`] with a fixed verdict and install outcome.
#[derive(Debug, Clone)]
pub struct ScriptedInstaller {
    safe: bool,
    outcome: Result<i32, HealError>,
    hang: bool,
    installs: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedInstaller {
    /// Every tool is safe and installs with exit code 0.
    pub fn succeeding() -> Self {
        Self::with_outcome(true, Ok(0))
    }

    /// Every tool is safe but the package manager exits with `exit_code`.
    pub fn failing(exit_code: i32) -> Self {
        Self::with_outcome(true, Ok(exit_code))
    }

    /// No tool is safe to install.
    pub fn refusing() -> Self {
        Self::with_outcome(false, Ok(0))
    }

    /// Every tool is safe but `install` fails with `err`.
    pub fn erroring(err: HealError) -> Self {
        Self::with_outcome(true, Err(err))
    }

    /// Every tool is safe, but the install only returns once cancelled, with
    /// the cancellation exit code.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::succeeding()
        }
    }

    fn with_outcome(safe: bool, outcome: Result<i32, HealError>) -> Self {
        Self {
            safe,
            outcome,
            hang: false,
            installs: Arc::default(),
        }
    }

    /// `(tool, distro)` pairs passed to `install`.
    pub fn installs_handle(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.installs)
    }
}

impl Installer for ScriptedInstaller {
    fn is_installed(&self, _tool: &str) -> bool {
        false
    }

    fn is_safe_to_install(&self, _tool: &str) -> bool {
        self.safe
    }

    fn install(
        &self,
        tool: &str,
        distro: &str,
        cancel: &CancelToken,
    ) -> Result<InstallationResult, HealError> {
        lock(&self.installs).push((tool.to_string(), distro.to_string()));
        if self.hang {
            while cancel.sleep(Duration::from_secs(60)) {}
            return Ok(InstallationResult::new(tool, exit_codes::CANCELLED, "", ""));
        }
        let exit_code = self.outcome.clone()?;
        Ok(InstallationResult::new(tool, exit_code, "", ""))
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    commit_calls: usize,
    records: Vec<KnowledgeRecord>,
    queries: Vec<KnowledgeQuery>,
}

/// [`MemoryStore`] that keeps every commit in memory.
///
/// Commits arrive on detached threads, so tests wait for them with
/// [`wait_for_commits`](Self::wait_for_commits).
#[derive(Debug, Default)]
pub struct RecordingMemory {
    log: Mutex<MemoryLog>,
    changed: Condvar,
    fail: bool,
    hits: Vec<KnowledgeHit>,
}

impl RecordingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// A store whose searches return `hits`.
    pub fn with_hits(hits: Vec<KnowledgeHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<KnowledgeRecord> {
        lock(&self.log).records.clone()
    }

    pub fn queries(&self) -> Vec<KnowledgeQuery> {
        lock(&self.log).queries.clone()
    }

    /// Block until at least `count` commits were attempted (successful or
    /// not) or `timeout` passes. Returns the number attempted.
    pub fn wait_for_commits(&self, count: usize, timeout: Duration) -> usize {
        let guard = lock(&self.log);
        let (guard, _) = match self
            .changed
            .wait_timeout_while(guard, timeout, |log| log.commit_calls < count)
        {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.commit_calls
    }
}

impl MemoryStore for RecordingMemory {
    fn commit_knowledge(&self, record: &KnowledgeRecord) -> Result<String> {
        let mut log = lock(&self.log);
        log.commit_calls += 1;
        let outcome = if self.fail {
            Err(anyhow!("memory store unavailable"))
        } else {
            log.records.push(record.clone());
            Ok(format!("record-{}", log.records.len()))
        };
        drop(log);
        self.changed.notify_all();
        outcome
    }

    fn search_knowledge(&self, query: &KnowledgeQuery) -> Result<Vec<KnowledgeHit>> {
        lock(&self.log).queries.push(query.clone());
        if self.fail {
            return Err(anyhow!("memory store unavailable"));
        }
        Ok(self.hits.clone())
    }
}

/// [`InferenceProvider`] that replays queued answers and records prompts.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    answers: Mutex<VecDeque<Result<InferenceResponse>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInference {
    pub fn new(answers: Vec<Result<InferenceResponse>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl InferenceProvider for ScriptedInference {
    fn infer(&self, prompt: &str) -> Result<InferenceResponse> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.answers)
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted inference answer left")))
    }
}

/// Write `contents` to `healer.toml` inside a fresh temp dir.
///
/// Keep the returned [`TempDir`] alive for as long as the path is used.
pub fn temp_config(contents: &str) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("healer.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}
