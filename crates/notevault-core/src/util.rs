//! Shared utility functions used across multiple modules.

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Whole days remaining until `deadline_ms`, rounded up.
pub fn days_until(deadline_ms: i64, now_ms: i64) -> i64 {
    let remaining = deadline_ms - now_ms;
    if remaining <= 0 {
        return 0;
    }
    (remaining + DAY_MS - 1) / DAY_MS
}

/// Percentage of `quota` occupied by `used`; zero when there is no quota.
#[allow(clippy::cast_precision_loss)]
pub fn percent_of(used: u64, quota: u64) -> f64 {
    if quota == 0 {
        return 0.0;
    }
    used as f64 / quota as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_until_rounds_up_partial_days() {
        assert_eq!(days_until(DAY_MS * 30, 0), 30);
        assert_eq!(days_until(DAY_MS * 30, 1), 30);
        assert_eq!(days_until(DAY_MS, DAY_MS - 1), 1);
        assert_eq!(days_until(DAY_MS, DAY_MS), 0);
        assert_eq!(days_until(0, DAY_MS), 0);
    }

    #[test]
    fn percent_of_handles_zero_quota() {
        assert!((percent_of(50, 200) - 25.0).abs() < f64::EPSILON);
        assert!(percent_of(10, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn compact_text_truncates() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
        assert_eq!(compact_text("  hi  "), "hi");
    }
}
