use std::fmt;

/// Point-in-time view of the watcher, as reported by the liveness endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Engine phase, e.g. `waiting` or `done`.
    pub phase: String,
    /// Targets that have not answered 200 yet.
    pub pending: usize,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Uptime monitor is running. Engine: {}. Pending targets: {}",
            self.phase, self.pending
        )
    }
}

/// Anything that can describe the current state of the watcher.
///
/// The endpoint only reads through this trait, so it never contends with the
/// engine beyond a short read lock.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn snapshot(&self) -> StatusSnapshot;
}
