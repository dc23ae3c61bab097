//! Exponential backoff between healing attempts.

use std::time::Duration;

/// Delay to wait after the failed attempt with 0-based index `attempt`.
///
/// `initial × 2^attempt`, saturating, and never more than `cap`.
pub fn backoff_delay(initial: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let initial = Duration::from_millis(10);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(initial, 0, cap), Duration::from_millis(10));
        assert_eq!(backoff_delay(initial, 1, cap), Duration::from_millis(20));
        assert_eq!(backoff_delay(initial, 2, cap), Duration::from_millis(40));
    }

    #[test]
    fn saturates_at_cap() {
        let cap = Duration::from_secs(5);
        assert_eq!(backoff_delay(Duration::from_secs(1), 10, cap), cap);
        assert_eq!(backoff_delay(Duration::from_secs(1), 200, cap), cap);
    }
}
