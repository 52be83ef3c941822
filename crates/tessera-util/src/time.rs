//! Wall-clock timestamps in the epoch-ms form used throughout the
//! archive/module model.

use std::time::{SystemTime, UNIX_EPOCH};

/// The current time as epoch milliseconds.
///
/// Saturates to `i64::MAX` rather than panicking if the system clock is
/// implausibly far in the future; falls back to `0` if the clock reads
/// before the epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_positive_and_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }
}
