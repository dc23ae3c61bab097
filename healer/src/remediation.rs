//! Remediation generation, including the inference-assisted path.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::remediation::{ErrorContext, extract_command, strategy_for, unknown_strategy};
use crate::core::types::{ErrorType, RemediationAction, RemediationStrategy};
use crate::error::HealError;
use crate::io::inference::{InferenceProvider, render_diagnosis_prompt};

/// Characters of the raw answer kept in an AI strategy's description.
const SUGGESTION_PREVIEW_CHARS: usize = 200;

/// Produces a [`RemediationStrategy`] for a classified failure.
#[derive(Clone, Default)]
pub struct RemediationGenerator {
    inference: Option<Arc<dyn InferenceProvider>>,
}

impl RemediationGenerator {
    pub fn new(inference: Option<Arc<dyn InferenceProvider>>) -> Self {
        Self { inference }
    }

    pub fn has_inference(&self) -> bool {
        self.inference.is_some()
    }

    /// Deterministic strategy; never consults the provider.
    pub fn generate(
        &self,
        error_type: ErrorType,
        ctx: &ErrorContext,
    ) -> Result<RemediationStrategy, HealError> {
        strategy_for(error_type, ctx)
    }

    /// Like [`generate`](Self::generate), but an `Unknown` failure is sent to
    /// the inference provider when one is configured.
    ///
    /// Blocks for the duration of the provider call. Provider failures fall
    /// back to the deterministic strategy and are never returned.
    pub fn generate_with_inference(
        &self,
        error_type: ErrorType,
        ctx: &ErrorContext,
    ) -> Result<RemediationStrategy, HealError> {
        match (error_type, self.inference.as_deref()) {
            (ErrorType::Unknown, Some(provider)) => Ok(self.ask_provider(provider, ctx)),
            _ => self.generate(error_type, ctx),
        }
    }

    fn ask_provider(
        &self,
        provider: &dyn InferenceProvider,
        ctx: &ErrorContext,
    ) -> RemediationStrategy {
        let prompt = match render_diagnosis_prompt(ctx) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to render diagnosis prompt");
                return unknown_strategy();
            }
        };

        debug!(prompt_bytes = prompt.len(), "requesting inference diagnosis");
        match provider.infer(&prompt) {
            Ok(response) if response.success && !response.content.trim().is_empty() => {
                let command = extract_command(&response.content);
                let preview: String = response
                    .content
                    .trim()
                    .chars()
                    .take(SUGGESTION_PREVIEW_CHARS)
                    .collect();
                info!(suggested = %command, "inference suggested a fix");
                RemediationStrategy::new(
                    RemediationAction::AiSuggestedFix,
                    format!("AI suggestion: {preview}"),
                )
                .with_command(command)
                .fallback_ai()
                .with_confidence(0.6)
            }
            Ok(_) => {
                warn!("inference provider returned no usable answer");
                unknown_strategy()
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "inference provider failed");
                unknown_strategy()
            }
        }
    }
}

impl std::fmt::Debug for RemediationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationGenerator")
            .field("inference", &self.inference.is_some())
            .finish()
    }
}
