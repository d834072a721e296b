//! File-visiting buffers
//!
//! [`BufferRegistry`] is how the coordinator finds, reverts and annotates
//! buffers. [`FileBuffers`] is an in-memory implementation where a buffer is
//! a copy of a file's content and reverting re-reads it from disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::TetherError;
use crate::status::StatusTag;

/// Identifies an open buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId(Uuid);

impl BufferId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether a buffer is watched for on-disk changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitorState {
    /// Not watched
    #[default]
    Unmonitored,
    /// Reverted automatically when its file changes
    Monitored,
}

/// The file a buffer visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFile {
    /// Absolute, canonical path
    pub path: PathBuf,
    /// Registered in version control, once checked
    pub tracked: Option<bool>,
}

/// Result of reverting one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    /// Content was reloaded from disk
    Reverted,
    /// Disk content already matched the buffer
    Unchanged,
    /// Buffer has unsaved edits and was left alone
    SkippedModified,
}

/// Access to the open buffers
#[async_trait]
pub trait BufferRegistry: Send + Sync {
    /// Buffer visiting `path`, if one is open
    fn find_buffer_for_file(&self, path: &Path) -> Option<BufferId>;

    /// File visited by a buffer
    fn path_of(&self, id: BufferId) -> Option<PathBuf>;

    /// All open buffers, oldest first
    fn buffers(&self) -> Vec<BufferId>;

    /// Reload a buffer from disk
    async fn revert_buffer(&self, id: BufferId) -> Result<RevertOutcome, TetherError>;

    /// Record the buffer's version-control status annotation
    fn set_status(&self, id: BufferId, tag: Option<StatusTag>);

    /// Record the monitoring decision for a buffer
    fn set_monitor(&self, id: BufferId, state: MonitorState, tracked: Option<bool>);

    /// Current monitoring state
    fn monitor_state(&self, id: BufferId) -> Option<MonitorState>;

    /// Number of monitored buffers
    fn watched_count(&self) -> usize;
}

/// An open buffer
#[derive(Debug, Clone)]
pub struct FileBuffer {
    /// Buffer id
    pub id: BufferId,
    /// Visited file
    pub file: WatchedFile,
    /// Current content
    pub content: String,
    /// Has unsaved edits
    pub modified: bool,
    /// Version-control status annotation
    pub status: Option<StatusTag>,
    /// Monitoring state
    pub monitor: MonitorState,
    /// Modification time of the file when last loaded or saved
    pub disk_mtime: Option<SystemTime>,
    /// When the buffer was opened
    pub opened_at: DateTime<Utc>,
    /// Last time a revert reloaded content
    pub last_reverted: Option<DateTime<Utc>>,
}

/// In-memory buffers backed by files on disk
pub struct FileBuffers {
    buffers: RwLock<IndexMap<BufferId, FileBuffer>>,
    by_path: RwLock<HashMap<PathBuf, BufferId>>,
}

impl FileBuffers {
    /// Create an empty buffer table
    pub fn new() -> Self {
        Self {
            buffers: RwLock::new(IndexMap::new()),
            by_path: RwLock::new(HashMap::new()),
        }
    }

    /// Visit a file. Opening an already visited file returns its buffer.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<BufferId, TetherError> {
        let path = tokio::fs::canonicalize(path.as_ref()).await?;

        if let Some(id) = self.by_path.read().get(&path).copied() {
            return Ok(id);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let disk_mtime = mtime(&path).await;
        let id = BufferId::new();

        let buffer = FileBuffer {
            id,
            file: WatchedFile {
                path: path.clone(),
                tracked: None,
            },
            content,
            modified: false,
            status: None,
            monitor: MonitorState::Unmonitored,
            disk_mtime,
            opened_at: Utc::now(),
            last_reverted: None,
        };

        // A concurrent open of the same file may have won the race
        let mut by_path = self.by_path.write();
        if let Some(existing) = by_path.get(&path).copied() {
            return Ok(existing);
        }
        by_path.insert(path.clone(), id);
        self.buffers.write().insert(id, buffer);

        debug!(buffer_id = %id, path = %path.display(), "Opened buffer");
        Ok(id)
    }

    /// Replace a buffer's content without saving
    pub fn edit(&self, id: BufferId, content: impl Into<String>) -> Result<(), TetherError> {
        let mut buffers = self.buffers.write();
        let buffer = buffers.get_mut(&id).ok_or(TetherError::BufferNotFound(id))?;
        buffer.content = content.into();
        buffer.modified = true;
        Ok(())
    }

    /// Write a buffer's content to its file
    pub async fn save(&self, id: BufferId) -> Result<(), TetherError> {
        let (path, content) = {
            let buffers = self.buffers.read();
            let buffer = buffers.get(&id).ok_or(TetherError::BufferNotFound(id))?;
            (buffer.file.path.clone(), buffer.content.clone())
        };

        tokio::fs::write(&path, &content).await?;
        let disk_mtime = mtime(&path).await;

        if let Some(buffer) = self.buffers.write().get_mut(&id) {
            buffer.modified = false;
            buffer.disk_mtime = disk_mtime;
        }
        Ok(())
    }

    /// Close a buffer
    pub fn close(&self, id: BufferId) -> Option<FileBuffer> {
        let buffer = self.buffers.write().shift_remove(&id)?;
        self.by_path.write().remove(&buffer.file.path);
        debug!(buffer_id = %id, "Closed buffer");
        Some(buffer)
    }

    /// Snapshot of a buffer
    pub fn get(&self, id: BufferId) -> Option<FileBuffer> {
        self.buffers.read().get(&id).cloned()
    }

    /// Current content of a buffer
    pub fn content(&self, id: BufferId) -> Option<String> {
        self.buffers.read().get(&id).map(|b| b.content.clone())
    }

    /// Status annotation of a buffer
    pub fn status(&self, id: BufferId) -> Option<StatusTag> {
        self.buffers.read().get(&id).and_then(|b| b.status)
    }

    /// Number of open buffers
    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    /// Whether no buffers are open
    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

impl Default for FileBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BufferRegistry for FileBuffers {
    fn find_buffer_for_file(&self, path: &Path) -> Option<BufferId> {
        self.by_path.read().get(path).copied()
    }

    fn path_of(&self, id: BufferId) -> Option<PathBuf> {
        self.buffers.read().get(&id).map(|b| b.file.path.clone())
    }

    fn buffers(&self) -> Vec<BufferId> {
        self.buffers.read().keys().copied().collect()
    }

    async fn revert_buffer(&self, id: BufferId) -> Result<RevertOutcome, TetherError> {
        let path = {
            let buffers = self.buffers.read();
            let buffer = buffers.get(&id).ok_or(TetherError::BufferNotFound(id))?;
            if buffer.modified {
                return Ok(RevertOutcome::SkippedModified);
            }
            buffer.file.path.clone()
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TetherError::Revert {
                path: path.clone(),
                source,
            })?;
        let disk_mtime = mtime(&path).await;

        let mut buffers = self.buffers.write();
        let buffer = buffers.get_mut(&id).ok_or(TetherError::BufferNotFound(id))?;

        // Edited while the read was in flight
        if buffer.modified {
            return Ok(RevertOutcome::SkippedModified);
        }

        buffer.disk_mtime = disk_mtime;
        if buffer.content == content {
            return Ok(RevertOutcome::Unchanged);
        }

        buffer.content = content;
        buffer.last_reverted = Some(Utc::now());
        Ok(RevertOutcome::Reverted)
    }

    fn set_status(&self, id: BufferId, tag: Option<StatusTag>) {
        if let Some(buffer) = self.buffers.write().get_mut(&id) {
            buffer.status = tag;
        }
    }

    fn set_monitor(&self, id: BufferId, state: MonitorState, tracked: Option<bool>) {
        if let Some(buffer) = self.buffers.write().get_mut(&id) {
            buffer.monitor = state;
            if tracked.is_some() {
                buffer.file.tracked = tracked;
            }
        }
    }

    fn monitor_state(&self, id: BufferId) -> Option<MonitorState> {
        self.buffers.read().get(&id).map(|b| b.monitor)
    }

    fn watched_count(&self) -> usize {
        self.buffers
            .read()
            .values()
            .filter(|b| b.monitor == MonitorState::Monitored)
            .count()
    }
}

async fn mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
