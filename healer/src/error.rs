//! Hard failures that escape the healer instead of being reported as data.

/// Conditions the caller must see as errors rather than as a failed
/// [`ExecutionResult`](crate::core::types::ExecutionResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealError {
    #[error("refusing to execute dangerous command: {command}")]
    SafetyRejected { command: String },

    #[error("unsupported distribution: {distro}")]
    UnsupportedDistro { distro: String },

    #[error("refusing to install dangerous package: {package}")]
    DangerousPackage { package: String },

    #[error("command must be non-empty")]
    EmptyCommand,
}

impl HealError {
    /// Whether this error is a configuration problem that should abort a
    /// healing session rather than be absorbed into its result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HealError::SafetyRejected { .. }
                | HealError::UnsupportedDistro { .. }
                | HealError::EmptyCommand
        )
    }
}
