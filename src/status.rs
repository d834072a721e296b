//! Status tags and snapshots

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A file's state relative to its last recorded commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTag {
    /// Tracked, no changes
    UpToDate,
    /// Changed in the index or working tree
    Modified,
    /// Newly added, renamed or copied into the index
    Added,
    /// Deleted from the index or working tree
    Removed,
    /// Unmerged
    Conflict,
    /// Matched by an ignore rule
    Ignored,
    /// Not known to version control
    Unregistered,
}

impl StatusTag {
    /// Classify a porcelain `XY` status code.
    pub fn from_porcelain(code: &str) -> Self {
        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');

        match (x, y) {
            ('?', '?') => Self::Unregistered,
            ('!', '!') => Self::Ignored,
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => Self::Conflict,
            ('D', _) | (_, 'D') => Self::Removed,
            ('A' | 'R' | 'C', _) => Self::Added,
            ('M' | 'T', _) | (_, 'M' | 'T') => Self::Modified,
            _ => Self::UpToDate,
        }
    }

    /// Whether the file is registered in version control
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Ignored | Self::Unregistered)
    }

    /// Short label used in buffer annotations
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpToDate => "up-to-date",
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Conflict => "conflict",
            Self::Ignored => "ignored",
            Self::Unregistered => "unregistered",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of a batch status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Raw status code, at least two characters
    pub code: String,
}

impl StatusEntry {
    /// Create an entry from a relative path and its code
    pub fn new(path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }

    /// Tag for this entry's code
    pub fn tag(&self) -> StatusTag {
        StatusTag::from_porcelain(&self.code)
    }
}

/// Point-in-time mapping of absolute paths to status tags.
///
/// Insertion order is the order the status query reported the paths in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    entries: IndexMap<PathBuf, StatusTag>,
}

impl StatusSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from query entries rooted at `root`
    pub fn from_entries(root: &Path, entries: impl IntoIterator<Item = StatusEntry>) -> Self {
        entries
            .into_iter()
            .map(|entry| (root.join(&entry.path), entry.tag()))
            .collect()
    }

    /// Record a tag. A path seen again keeps its original position.
    pub fn insert(&mut self, path: PathBuf, tag: StatusTag) {
        self.entries.insert(path, tag);
    }

    /// Cached tag for a path
    pub fn get(&self, path: &Path) -> Option<StatusTag> {
        self.entries.get(path).copied()
    }

    /// Whether the snapshot covers a path
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Paths in query order
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    /// Number of paths covered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(PathBuf, StatusTag)> for StatusSnapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, StatusTag)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (path, tag) in iter {
            snapshot.insert(path, tag);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Porcelain Classification Tests ===

    #[test]
    fn test_untracked_and_ignored() {
        assert_eq!(StatusTag::from_porcelain("??"), StatusTag::Unregistered);
        assert_eq!(StatusTag::from_porcelain("!!"), StatusTag::Ignored);
    }

    #[test]
    fn test_conflicts() {
        for code in ["UU", "AU", "UD", "AA", "DD"] {
            assert_eq!(StatusTag::from_porcelain(code), StatusTag::Conflict, "{code}");
        }
    }

    #[test]
    fn test_removed() {
        assert_eq!(StatusTag::from_porcelain("D "), StatusTag::Removed);
        assert_eq!(StatusTag::from_porcelain(" D"), StatusTag::Removed);
        assert_eq!(StatusTag::from_porcelain("AD"), StatusTag::Removed);
    }

    #[test]
    fn test_added() {
        assert_eq!(StatusTag::from_porcelain("A "), StatusTag::Added);
        assert_eq!(StatusTag::from_porcelain("AM"), StatusTag::Added);
        assert_eq!(StatusTag::from_porcelain("R "), StatusTag::Added);
        assert_eq!(StatusTag::from_porcelain("C "), StatusTag::Added);
    }

    #[test]
    fn test_modified() {
        assert_eq!(StatusTag::from_porcelain("M "), StatusTag::Modified);
        assert_eq!(StatusTag::from_porcelain(" M"), StatusTag::Modified);
        assert_eq!(StatusTag::from_porcelain("MM"), StatusTag::Modified);
        assert_eq!(StatusTag::from_porcelain(" T"), StatusTag::Modified);
    }

    #[test]
    fn test_unknown_code_is_up_to_date() {
        assert_eq!(StatusTag::from_porcelain("  "), StatusTag::UpToDate);
        assert_eq!(StatusTag::from_porcelain(""), StatusTag::UpToDate);
    }

    #[test]
    fn test_is_tracked() {
        assert!(StatusTag::Modified.is_tracked());
        assert!(StatusTag::UpToDate.is_tracked());
        assert!(!StatusTag::Unregistered.is_tracked());
        assert!(!StatusTag::Ignored.is_tracked());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusTag::UpToDate.to_string(), "up-to-date");
        assert_eq!(StatusTag::Conflict.to_string(), "conflict");
    }

    // === Snapshot Tests ===

    #[test]
    fn test_snapshot_from_entries_is_rooted() {
        let root = PathBuf::from("/repo");
        let snapshot = StatusSnapshot::from_entries(
            &root,
            vec![
                StatusEntry::new("src/a.txt", " M"),
                StatusEntry::new("b.txt", "??"),
            ],
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(Path::new("/repo/src/a.txt")), Some(StatusTag::Modified));
        assert_eq!(snapshot.get(Path::new("/repo/b.txt")), Some(StatusTag::Unregistered));
        assert!(!snapshot.contains(Path::new("src/a.txt")));
    }

    #[test]
    fn test_snapshot_preserves_query_order() {
        let root = PathBuf::from("/repo");
        let snapshot = StatusSnapshot::from_entries(
            &root,
            vec![
                StatusEntry::new("z.txt", " M"),
                StatusEntry::new("a.txt", " M"),
                StatusEntry::new("m.txt", " M"),
            ],
        );

        let paths: Vec<_> = snapshot.paths().cloned().collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/repo/z.txt"),
                PathBuf::from("/repo/a.txt"),
                PathBuf::from("/repo/m.txt"),
            ]
        );
    }

    #[test]
    fn test_snapshot_reinsert_keeps_position() {
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert(PathBuf::from("/a"), StatusTag::Added);
        snapshot.insert(PathBuf::from("/b"), StatusTag::Added);
        snapshot.insert(PathBuf::from("/a"), StatusTag::Modified);

        let paths: Vec<_> = snapshot.paths().cloned().collect();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(snapshot.get(Path::new("/a")), Some(StatusTag::Modified));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = StatusSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.get(Path::new("/a")), None);
    }
}
