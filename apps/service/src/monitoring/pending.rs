use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::types::Target;

/// Targets that have not answered 200 yet.
///
/// The set only ever shrinks: it is filled once at startup and entries leave
/// through [`PendingSet::remove`], the single mutation point. Clones share
/// the same underlying set, so the liveness endpoint can read counts while
/// the engine owns the removals.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<RwLock<BTreeSet<Target>>>,
}

impl PendingSet {
    /// Build the set from the configured targets; duplicates collapse.
    pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
        Self { inner: Arc::new(RwLock::new(targets.into_iter().collect())) }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn contains(&self, target: &Target) -> bool {
        self.inner.read().await.contains(target)
    }

    /// Copy of the current targets, in sorted order.
    pub async fn snapshot(&self) -> Vec<Target> {
        self.inner.read().await.iter().cloned().collect()
    }

    /// Remove `target` if present. Returns whether it was still pending.
    pub async fn remove(&self, target: &Target) -> bool {
        self.inner.write().await.remove(target)
    }
}
