//! Cooperative cancellation for healing sessions.
//!
//! A [`CancelToken`] is shared between the caller and the session. Process
//! waits poll it and backoff sleeps block on it, so cancelling wakes a
//! sleeping session immediately and kills an in-flight child.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cloneable, thread-safe cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = match self.state.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cancelled = true;
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        match self.state.cancelled.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was
    /// (or became) cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let guard = match self.state.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (guard, _timeout) = match self
            .state
            .wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
        {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        !*guard
    }
}
