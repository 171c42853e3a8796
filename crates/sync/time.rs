use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, swappable in tests.
pub trait TimeProvider: Send + Sync {
    /// Unix seconds.
    fn now(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}
