use comeback_server::{StatusSnapshot, StatusSource};
use tokio::sync::watch;

use crate::monitoring::{EngineState, PendingSet};

/// Liveness view over the running engine.
pub struct WatcherStatus {
    pending: PendingSet,
    state: watch::Receiver<EngineState>,
}

impl WatcherStatus {
    pub fn new(pending: PendingSet, state: watch::Receiver<EngineState>) -> Self {
        Self { pending, state }
    }
}

#[async_trait::async_trait]
impl StatusSource for WatcherStatus {
    async fn snapshot(&self) -> StatusSnapshot {
        let phase = self.state.borrow().to_string();
        StatusSnapshot { phase, pending: self.pending.len().await }
    }
}
