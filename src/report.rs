//! Revert pass results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a single revert pass did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertReport {
    /// When the pass started
    pub started_at: DateTime<Utc>,
    /// Explicit reverting was disabled, nothing was captured or reverted
    pub skipped: bool,
    /// Number of paths in the pending set
    pub pending: usize,
    /// Buffers reloaded from disk
    pub reverted: Vec<PathBuf>,
    /// Buffers whose file had not changed
    pub unchanged: Vec<PathBuf>,
    /// Buffers left alone because of unsaved edits
    pub skipped_modified: Vec<PathBuf>,
    /// Buffers that failed to revert, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Buffers pushed to the deferred queue, in order
    pub deferred: Vec<PathBuf>,
    /// The pass stopped early
    pub budget_exhausted: bool,
}

impl RevertReport {
    /// Empty report stamped now
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            skipped: false,
            pending: 0,
            reverted: Vec::new(),
            unchanged: Vec::new(),
            skipped_modified: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            budget_exhausted: false,
        }
    }

    /// Report for a pass that did not run
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::new()
        }
    }

    /// Buffers the pass got to, whatever the outcome
    pub fn processed(&self) -> usize {
        self.reverted.len() + self.unchanged.len() + self.skipped_modified.len() + self.failed.len()
    }

    /// One-line description for logs and status lines
    pub fn summary(&self) -> String {
        if self.skipped {
            return "Revert skipped".to_string();
        }

        let mut summary = format!("Reverted {} of {} buffers", self.reverted.len(), self.processed());
        if !self.failed.is_empty() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        if !self.deferred.is_empty() {
            summary.push_str(&format!(", {} deferred", self.deferred.len()));
        }
        summary
    }
}

impl Default for RevertReport {
    fn default() -> Self {
        Self::new()
    }
}
