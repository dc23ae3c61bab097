//! Contract with the external inference provider and the diagnostic prompt.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use crate::core::remediation::ErrorContext;

const DIAGNOSE_TEMPLATE: &str = include_str!("prompts/diagnose.md");

/// Only the tail of stderr is sent; the final lines usually carry the error.
pub const PROMPT_STDERR_LIMIT_BYTES: usize = 4000;

/// Answer from an inference provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub success: bool,
    pub content: String,
}

impl InferenceResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
        }
    }
}

/// Single-call inference contract.
///
/// Any cascading across providers, retries or timeouts are the provider's
/// concern. The call may block; it is bounded by the provider, not by the
/// healer.
pub trait InferenceProvider: Send + Sync {
    fn infer(&self, prompt: &str) -> Result<InferenceResponse>;
}

/// Render the prompt asking a provider to diagnose a failed command.
pub fn render_diagnosis_prompt(ctx: &ErrorContext) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("diagnose", DIAGNOSE_TEMPLATE)
        .context("load diagnose template")?;
    let template = env.get_template("diagnose")?;

    let stderr = ctx.stderr.trim();
    let tail = tail_bytes(stderr, PROMPT_STDERR_LIMIT_BYTES);
    let rendered = template
        .render(context! {
            command => ctx.command.trim(),
            exit_code => ctx.exit_code,
            distro => ctx.distro.as_str(),
            stderr => (!tail.is_empty()).then_some(tail),
            stderr_truncated => tail.len() < stderr.len(),
            stderr_limit => PROMPT_STDERR_LIMIT_BYTES,
        })
        .context("render diagnose prompt")?;
    Ok(rendered)
}

/// Last `limit` bytes of `text`, moved forward to a char boundary.
fn tail_bytes(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_command_exit_code_and_stderr() {
        let ctx = ErrorContext::new("deploy --fast", "segfault in module xyz", 139, "debian");
        let prompt = render_diagnosis_prompt(&ctx).expect("render");
        assert!(prompt.contains("deploy --fast"));
        assert!(prompt.contains("Exit code: 139"));
        assert!(prompt.contains("segfault in module xyz"));
        assert!(prompt.contains("debian"));
        assert!(!prompt.contains("last 4000 bytes"));
    }

    #[test]
    fn prompt_keeps_only_stderr_tail() {
        let stderr = format!("{}THE-END", "x".repeat(10_000));
        let ctx = ErrorContext::new("build", stderr, 1, "alpine");
        let prompt = render_diagnosis_prompt(&ctx).expect("render");
        assert!(prompt.contains("THE-END"));
        assert!(prompt.contains("last 4000 bytes"));
        assert!(prompt.len() < 6000);
    }

    #[test]
    fn empty_stderr_is_called_out() {
        let ctx = ErrorContext::new("false", "", 1, "debian");
        let prompt = render_diagnosis_prompt(&ctx).expect("render");
        assert!(prompt.contains("no error output"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ééééé";
        let tail = tail_bytes(text, 3);
        assert_eq!(tail, "é");
    }
}
