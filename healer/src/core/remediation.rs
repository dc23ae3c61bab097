//! Per-type remediation policy.
//!
//! Maps a classified failure to a [`RemediationStrategy`] without touching
//! the host. The inference-assisted path lives in [`crate::remediation`].

use std::sync::LazyLock;

use regex::Regex;

use crate::core::classifier::{extract_missing_file, extract_missing_tool};
use crate::core::packages::{package_for_tool, package_manager_for};
use crate::core::types::{ErrorType, RemediationAction, RemediationStrategy};
use crate::error::HealError;

/// Everything the policy needs to know about a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub command: String,
    pub stderr: String,
    pub exit_code: i32,
    pub distro: String,
    /// Tool name extracted from stderr, if any.
    pub tool: Option<String>,
    /// File path extracted from stderr, if any.
    pub file: Option<String>,
}

impl ErrorContext {
    /// Build a context, extracting the tool and file names from `stderr`.
    pub fn new(
        command: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
        distro: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        Self {
            command: command.into(),
            tool: extract_missing_tool(&stderr),
            file: extract_missing_file(&stderr),
            stderr,
            exit_code,
            distro: distro.into(),
        }
    }
}

/// Whether a failure of this type can be fixed without human or AI input.
///
/// `MissingTool` additionally requires that a tool name was extracted and
/// that the tool installs cleanly. The other applicable types need a rewrite
/// command, which [`strategy_for`] omits when there is nothing to add.
pub fn is_mechanically_applicable(error_type: ErrorType) -> bool {
    match error_type {
        ErrorType::MissingTool | ErrorType::PermissionDenied => true,
        ErrorType::SyntaxError
        | ErrorType::NetworkError
        | ErrorType::FileNotFound
        | ErrorType::Timeout
        | ErrorType::Unknown => false,
    }
}

/// Render the install command for `tool` on `distro`.
pub fn install_command(tool: &str, distro: &str) -> Result<String, HealError> {
    let manager = package_manager_for(distro).ok_or_else(|| HealError::UnsupportedDistro {
        distro: distro.to_string(),
    })?;
    Ok(manager
        .install_argv(&package_for_tool(tool, manager))
        .join(" "))
}

/// Strategy for an `Unknown` failure when no inference answer is available.
pub fn unknown_strategy() -> RemediationStrategy {
    RemediationStrategy::new(
        RemediationAction::FallbackAnalysis,
        "Unknown error - requires AI analysis",
    )
    .manual_review()
    .fallback_ai()
    .with_confidence(0.2)
}

/// Produce the deterministic strategy for a classified failure.
///
/// Fails only when a tool install is proposed for a distro with no package
/// manager mapping.
pub fn strategy_for(
    error_type: ErrorType,
    ctx: &ErrorContext,
) -> Result<RemediationStrategy, HealError> {
    let strategy = match error_type {
        ErrorType::MissingTool => match ctx.tool.as_deref() {
            Some(tool) => RemediationStrategy::new(
                RemediationAction::InstallPackage,
                format!("Install missing tool: {tool}"),
            )
            .with_command(install_command(tool, &ctx.distro)?)
            .with_confidence(0.9),
            None => RemediationStrategy::new(
                RemediationAction::ManualInstall,
                "Install missing tool manually",
            )
            .manual_review()
            .with_confidence(0.5),
        },
        ErrorType::PermissionDenied if runs_with_sudo(&ctx.command) => RemediationStrategy::new(
            RemediationAction::ManualReview,
            "Command already runs with sudo privileges",
        )
        .manual_review()
        .with_confidence(0.3),
        ErrorType::PermissionDenied => RemediationStrategy::new(
            RemediationAction::AddSudo,
            "Retry command with sudo privileges",
        )
        .with_command(format!("sudo {}", ctx.command.trim()))
        .with_confidence(0.85),
        ErrorType::SyntaxError => RemediationStrategy::new(
            RemediationAction::ManualReview,
            "Syntax error requires manual correction",
        )
        .manual_review()
        .fallback_ai()
        .with_confidence(0.3),
        ErrorType::NetworkError => RemediationStrategy::new(
            RemediationAction::CheckNetwork,
            "Verify network connectivity and DNS configuration",
        )
        .with_command("ping -c 3 8.8.8.8 && cat /etc/resolv.conf")
        .manual_review()
        .with_confidence(0.6),
        ErrorType::FileNotFound => match ctx.file.as_deref() {
            Some(path) => RemediationStrategy::new(
                RemediationAction::VerifyPath,
                format!("Verify file path: {path}"),
            )
            .with_command(format!(
                "ls -la {path} 2>/dev/null || echo 'File does not exist'"
            ))
            .manual_review()
            .with_confidence(0.5),
            None => RemediationStrategy::new(
                RemediationAction::CreateFile,
                "Create missing file or verify path",
            )
            .manual_review()
            .with_confidence(0.4),
        },
        ErrorType::Timeout => RemediationStrategy::new(
            RemediationAction::IncreaseTimeout,
            "Command timed out - consider increasing timeout or optimizing",
        )
        .manual_review()
        .with_confidence(0.7),
        ErrorType::Unknown => unknown_strategy(),
    };
    Ok(strategy)
}

fn runs_with_sudo(command: &str) -> bool {
    command.split_whitespace().next() == Some("sudo")
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:bash|sh|shell|console)?[ \t]*\r?\n(.+?)\r?\n[ \t]*```")
        .expect("valid fence regex")
});
static PROMPT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\$\s*(.+)$").expect("valid prompt regex"));

/// Pull an executable command out of a free-form inference answer.
///
/// Preference order: first fenced code block, first `$`-prefixed line, first
/// line that looks like a command (non-comment, contains a space), then the
/// whole trimmed answer.
pub fn extract_command(answer: &str) -> String {
    if let Some(body) = FENCED_BLOCK
        .captures(answer)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
    {
        return body.to_string();
    }

    if let Some(line) = PROMPT_LINE
        .captures(answer)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|line| !line.is_empty())
    {
        return line.to_string();
    }

    answer
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && line.contains(' '))
        .unwrap_or_else(|| answer.trim())
        .to_string()
}
