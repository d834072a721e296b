//! Status snapshot cache
//!
//! One batch query before and one after a mutating operation replace the
//! per-buffer status queries a revert pass would otherwise issue.

use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::TetherError;
use crate::git::StatusSource;
use crate::status::{StatusSnapshot, StatusTag};

/// Capture a snapshot of every changed path under `root`
pub async fn capture(
    source: &dyn StatusSource,
    root: &Path,
    tracked_only: bool,
) -> Result<StatusSnapshot, TetherError> {
    let entries = source.list_status(root, tracked_only).await?;
    let snapshot = StatusSnapshot::from_entries(root, entries);

    debug!(
        root = %root.display(),
        tracked_only,
        paths = snapshot.len(),
        "Captured status snapshot"
    );
    Ok(snapshot)
}

/// Status of `file`, from `snapshot` when it covers the file.
///
/// Falls back to a per-file query otherwise. A failed query yields `None`.
pub async fn lookup_or_refresh(
    source: &dyn StatusSource,
    root: &Path,
    file: &Path,
    snapshot: Option<&StatusSnapshot>,
) -> Option<StatusTag> {
    if let Some(tag) = snapshot.and_then(|s| s.get(file)) {
        return Some(tag);
    }

    match source.file_status(root, file).await {
        Ok(tag) => Some(tag),
        Err(e) => {
            warn!(file = %file.display(), error = %e, "Status query failed");
            None
        }
    }
}

/// Paths that may need reverting: `pre` then `post`, first occurrence wins
pub fn pending_revert_set(pre: Option<&StatusSnapshot>, post: &StatusSnapshot) -> Vec<PathBuf> {
    let set: IndexSet<&PathBuf> = pre
        .into_iter()
        .flat_map(|s| s.paths())
        .chain(post.paths())
        .collect();

    set.into_iter().cloned().collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::status::StatusEntry;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted status backend that counts its queries
    #[derive(Default)]
    pub(crate) struct FakeStatus {
        pub entries: Mutex<Vec<StatusEntry>>,
        pub files: Mutex<HashMap<PathBuf, StatusTag>>,
        pub tracked: Mutex<HashMap<PathBuf, bool>>,
        pub fail: Mutex<bool>,
        pub list_calls: AtomicUsize,
        pub file_calls: AtomicUsize,
    }

    impl FakeStatus {
        pub fn set_entries(&self, entries: &[(&str, &str)]) {
            *self.entries.lock() = entries
                .iter()
                .map(|(path, code)| StatusEntry::new(*path, *code))
                .collect();
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn file_calls(&self) -> usize {
            self.file_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for FakeStatus {
        async fn list_status(
            &self,
            _root: &Path,
            tracked_only: bool,
        ) -> Result<Vec<StatusEntry>, TetherError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock() {
                return Err(TetherError::StatusQuery("repository missing".into()));
            }
            let entries = self.entries.lock().clone();
            Ok(entries
                .into_iter()
                .filter(|e| !tracked_only || e.tag().is_tracked())
                .collect())
        }

        async fn file_status(&self, _root: &Path, file: &Path) -> Result<StatusTag, TetherError> {
            self.file_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock() {
                return Err(TetherError::StatusQuery("repository missing".into()));
            }
            Ok(self
                .files
                .lock()
                .get(file)
                .copied()
                .unwrap_or(StatusTag::UpToDate))
        }

        async fn is_tracked(&self, _root: &Path, file: &Path) -> Result<bool, TetherError> {
            if *self.fail.lock() {
                return Err(TetherError::StatusQuery("repository missing".into()));
            }
            Ok(self.tracked.lock().get(file).copied().unwrap_or(false))
        }
    }

    fn snapshot(entries: &[(&str, StatusTag)]) -> StatusSnapshot {
        entries
            .iter()
            .map(|(path, tag)| (PathBuf::from(path), *tag))
            .collect()
    }

    // === Capture Tests ===

    #[tokio::test]
    async fn test_capture_roots_paths() {
        let source = FakeStatus::default();
        source.set_entries(&[("a.txt", " M"), ("sub/b.txt", "A ")]);

        let snap = capture(&source, Path::new("/repo"), false).await.unwrap();

        assert_eq!(snap.get(Path::new("/repo/a.txt")), Some(StatusTag::Modified));
        assert_eq!(snap.get(Path::new("/repo/sub/b.txt")), Some(StatusTag::Added));
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_capture_tracked_only() {
        let source = FakeStatus::default();
        source.set_entries(&[("a.txt", " M"), ("new.txt", "??"), ("build.log", "!!")]);

        let snap = capture(&source, Path::new("/repo"), true).await.unwrap();

        assert_eq!(snap.len(), 1);
        assert!(snap.contains(Path::new("/repo/a.txt")));
    }

    #[tokio::test]
    async fn test_capture_failure() {
        let source = FakeStatus::default();
        *source.fail.lock() = true;

        let err = capture(&source, Path::new("/repo"), false).await.unwrap_err();
        assert!(matches!(err, TetherError::StatusQuery(_)));
    }

    // === Lookup Tests ===

    #[tokio::test]
    async fn test_lookup_hits_snapshot_without_query() {
        let source = FakeStatus::default();
        let snap = snapshot(&[("/repo/a.txt", StatusTag::Conflict)]);

        let tag = lookup_or_refresh(&source, Path::new("/repo"), Path::new("/repo/a.txt"), Some(&snap))
            .await;

        assert_eq!(tag, Some(StatusTag::Conflict));
        assert_eq!(source.file_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_miss_falls_back_to_query() {
        let source = FakeStatus::default();
        source
            .files
            .lock()
            .insert(PathBuf::from("/repo/b.txt"), StatusTag::Removed);
        let snap = snapshot(&[("/repo/a.txt", StatusTag::Modified)]);

        let tag = lookup_or_refresh(&source, Path::new("/repo"), Path::new("/repo/b.txt"), Some(&snap))
            .await;

        assert_eq!(tag, Some(StatusTag::Removed));
        assert_eq!(source.file_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_without_snapshot() {
        let source = FakeStatus::default();
        let tag = lookup_or_refresh(&source, Path::new("/repo"), Path::new("/repo/a.txt"), None).await;

        assert_eq!(tag, Some(StatusTag::UpToDate));
        assert_eq!(source.file_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_query_failure_is_unknown() {
        let source = FakeStatus::default();
        *source.fail.lock() = true;

        let tag = lookup_or_refresh(&source, Path::new("/repo"), Path::new("/repo/a.txt"), None).await;
        assert_eq!(tag, None);
    }

    // === Pending Set Tests ===

    #[test]
    fn test_pending_set_dedups_in_first_seen_order() {
        let pre = snapshot(&[("/r/a.txt", StatusTag::Modified), ("/r/b.txt", StatusTag::Added)]);
        let post = snapshot(&[("/r/a.txt", StatusTag::Modified), ("/r/b.txt", StatusTag::Modified)]);

        assert_eq!(
            pending_revert_set(Some(&pre), &post),
            vec![PathBuf::from("/r/a.txt"), PathBuf::from("/r/b.txt")]
        );
    }

    #[test]
    fn test_pending_set_overlap_appends_new_post_paths() {
        let pre = snapshot(&[("/r/c", StatusTag::Modified), ("/r/a", StatusTag::Modified)]);
        let post = snapshot(&[
            ("/r/b", StatusTag::Added),
            ("/r/a", StatusTag::UpToDate),
            ("/r/d", StatusTag::Removed),
        ]);

        assert_eq!(
            pending_revert_set(Some(&pre), &post),
            vec![
                PathBuf::from("/r/c"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r/b"),
                PathBuf::from("/r/d"),
            ]
        );
    }

    #[test]
    fn test_pending_set_without_pre() {
        let post = snapshot(&[("/r/x", StatusTag::Modified)]);
        assert_eq!(pending_revert_set(None, &post), vec![PathBuf::from("/r/x")]);
    }

    #[test]
    fn test_pending_set_empty() {
        assert!(pending_revert_set(None, &StatusSnapshot::new()).is_empty());
    }
}
