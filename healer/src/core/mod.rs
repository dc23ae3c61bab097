//! Deterministic, pure logic shared by the healer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and fixed lookup tables and return deterministic outputs suitable for
//! tests.

pub mod backoff;
pub mod classifier;
pub mod packages;
pub mod remediation;
pub mod safety;
pub mod types;
