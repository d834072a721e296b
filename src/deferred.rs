//! Buffers left over from an expired revert pass

use indexmap::IndexSet;
use std::collections::HashSet;

use crate::buffer::BufferId;

/// FIFO of buffers whose revert was deferred.
///
/// A buffer appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredReverts {
    queue: IndexSet<BufferId>,
}

impl DeferredReverts {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue with the given buffers, keeping the first of any duplicates
    pub fn from_ids(ids: impl IntoIterator<Item = BufferId>) -> Self {
        Self {
            queue: ids.into_iter().collect(),
        }
    }

    /// Queue without the buffers in `handled`, followed by `leftover`.
    ///
    /// This is how a pass over `handled` folds its unprocessed tail back in.
    pub fn reconciled(&self, handled: &[BufferId], leftover: &[BufferId]) -> Self {
        let handled: HashSet<&BufferId> = handled.iter().collect();
        Self::from_ids(
            self.queue
                .iter()
                .filter(|id| !handled.contains(id))
                .chain(leftover)
                .copied(),
        )
    }

    /// Queued buffers, oldest first
    pub fn ids(&self) -> Vec<BufferId> {
        self.queue.iter().copied().collect()
    }
}
