//! Shared value types for the healer.
//!
//! These types carry no behaviour beyond construction helpers. Classification
//! and remediation are recomputed from them on every attempt.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a command failed, as decided by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    MissingTool,
    PermissionDenied,
    SyntaxError,
    NetworkError,
    Timeout,
    FileNotFound,
    Unknown,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::MissingTool => "missing_tool",
            ErrorType::PermissionDenied => "permission_denied",
            ErrorType::SyntaxError => "syntax_error",
            ErrorType::NetworkError => "network_error",
            ErrorType::Timeout => "timeout",
            ErrorType::FileNotFound => "file_not_found",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of corrective action a remediation proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    InstallPackage,
    ManualInstall,
    AddSudo,
    ManualReview,
    CheckNetwork,
    VerifyPath,
    CreateFile,
    IncreaseTimeout,
    FallbackAnalysis,
    AiSuggestedFix,
}

impl RemediationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationAction::InstallPackage => "install_package",
            RemediationAction::ManualInstall => "manual_install",
            RemediationAction::AddSudo => "add_sudo",
            RemediationAction::ManualReview => "manual_review",
            RemediationAction::CheckNetwork => "check_network",
            RemediationAction::VerifyPath => "verify_path",
            RemediationAction::CreateFile => "create_file",
            RemediationAction::IncreaseTimeout => "increase_timeout",
            RemediationAction::FallbackAnalysis => "fallback_analysis",
            RemediationAction::AiSuggestedFix => "ai_suggested_fix",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed fix for a classified failure.
///
/// `confidence` is informational; the loop never branches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationStrategy {
    pub action: RemediationAction,
    /// Replacement command to try next. Empty when the strategy has none.
    pub command: String,
    pub description: String,
    pub requires_manual_review: bool,
    /// Keep retrying even without a concrete fix, if an inference provider
    /// is available to act on the failure.
    pub use_fallback_ai: bool,
    pub confidence: f32,
}

impl RemediationStrategy {
    pub fn new(action: RemediationAction, description: impl Into<String>) -> Self {
        Self {
            action,
            command: String::new(),
            description: description.into(),
            requires_manual_review: false,
            use_fallback_ai: false,
            confidence: 1.0,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn manual_review(mut self) -> Self {
        self.requires_manual_review = true;
        self
    }

    pub fn fallback_ai(mut self) -> Self {
        self.use_fallback_ai = true;
        self
    }

    pub fn has_command(&self) -> bool {
        !self.command.trim().is_empty()
    }
}

/// Terminal outcome of running a command, possibly after healing.
///
/// `success` is derived from `exit_code` at construction and never set
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// RFC 3339 / ISO-8601 start time in UTC.
    pub timestamp: String,
    pub success: bool,
    /// Healing iterations consumed before this outcome.
    pub retries: u32,
    pub remediations_applied: Vec<RemediationAction>,
}

impl ExecutionResult {
    pub fn new(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
            timestamp: timestamp.into(),
            success: exit_code == 0,
            retries: 0,
            remediations_applied: Vec::new(),
        }
    }

    /// Attach healing bookkeeping to a single-attempt result.
    pub fn with_healing(mut self, retries: u32, applied: Vec<RemediationAction>) -> Self {
        self.retries = retries;
        self.remediations_applied = applied;
        self
    }

    pub fn failed(&self) -> bool {
        !self.success
    }
}

/// Outcome of one package-manager invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationResult {
    pub tool: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl InstallationResult {
    pub fn new(
        tool: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            success: exit_code == 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// An installation that never reached the package manager.
    pub fn refused(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(tool, crate::exit_codes::FAILURE, "", reason)
    }
}
