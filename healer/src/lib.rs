//! Self-healing shell command execution.
//!
//! A command is checked against a safety gate, run with a timeout, and on
//! failure driven through classify → remediate → retry with exponential
//! backoff until it succeeds, the retry budget is spent, or nothing more can
//! be done. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (safety patterns, error
//!   classification, remediation policy, package tables, backoff).
//! - **[`io`]**: Side-effecting operations (process execution, package
//!   installation, configuration, and the memory/inference contracts).
//!   Isolated behind traits to enable scripted doubles in tests.
//!
//! Orchestration modules ([`remediation`], [`healing`]) coordinate the two.

pub mod cancel;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod healing;
pub mod io;
pub mod logging;
pub mod remediation;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cancel::CancelToken;
pub use error::HealError;
pub use healing::{HealOutcome, HealRequest, HealStop, Healer};
