//! Exit codes with a fixed meaning for the healer.
//!
//! Shells and coreutils use these values by convention; the runner also
//! synthesizes some of them for failures that never reached a real exit.

/// Command succeeded.
pub const OK: i32 = 0;
/// Generic failure. Also used when the shell could not be spawned at all.
pub const FAILURE: i32 = 1;
/// Shell builtin misuse, usually a syntax error.
pub const SHELL_MISUSE: i32 = 2;
/// Command exceeded its time limit (matches coreutils `timeout`).
pub const TIMEOUT: i32 = 124;
/// Command found but not executable.
pub const NOT_EXECUTABLE: i32 = 126;
/// Command not found.
pub const NOT_FOUND: i32 = 127;
/// Base added to a signal number when a child is killed by a signal.
pub const SIGNAL_BASE: i32 = 128;
/// Command was cancelled by the caller (128 + SIGINT).
pub const CANCELLED: i32 = 130;
