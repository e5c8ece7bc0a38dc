//! Wall-clock helpers. All persisted timestamps are UTC epoch milliseconds.

/// Current UTC time in epoch milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
