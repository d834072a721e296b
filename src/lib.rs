//! # Tether
//!
//! Keeps open file buffers in step with the working tree across Git operations.
//!
//! This crate provides:
//! - Per-buffer decisions on whether to monitor a file for on-disk changes
//! - Status snapshots taken right before and after a repository-mutating operation
//! - A time-boxed batch revert of every buffer those snapshots mention
//! - A deferred queue for buffers the budget did not reach
//! - Version-control status annotations served from the snapshot cache
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  RevertCoordinator                    │
//! │                                                       │
//! │  before_operation()  ──►  pre  StatusSnapshot         │
//! │        git checkout / stash / reset ...               │
//! │  after_operation()   ──►  post StatusSnapshot         │
//! │                              │                        │
//! │                              ▼                        │
//! │            pending_revert_set(pre, post)              │
//! │                              │                        │
//! │                              ▼                        │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │  revert pass (FIFO, RevertBudget)               │  │
//! │  │  [a.txt] → [b.txt] → ... ──expired──► Deferred  │  │
//! │  └─────────────────────────────────────────────────┘  │
//! │         │                         │                   │
//! │         ▼                         ▼                   │
//! │   BufferRegistry            StatusSource              │
//! │   (FileBuffers)             (GitCli)                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether::{FileBuffers, GitCli, RevertConfig, RevertCoordinator};
//!
//! let buffers = Arc::new(FileBuffers::new());
//! let coordinator = RevertCoordinator::for_git("/path/to/repo", RevertConfig::default(), buffers.clone());
//!
//! let id = buffers.open("/path/to/repo/src/main.rs").await?;
//! coordinator.buffer_opened(id).await;
//!
//! let git = GitCli::new();
//! let (result, report) = coordinator
//!     .with_operation(git.run(coordinator.repo_root(), &["checkout", "feature"]))
//!     .await;
//! result?;
//! println!("{}", report.summary());
//! ```

pub mod buffer;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod deferred;
pub mod error;
pub mod git;
pub mod report;
pub mod status;

pub use buffer::{BufferId, BufferRegistry, FileBuffer, FileBuffers, MonitorState, RevertOutcome, WatchedFile};
pub use config::{RevertBudget, RevertConfig};
pub use coordinator::{should_monitor, InputProbe, MonitorCandidate, NoInput, RevertCoordinator};
pub use deferred::DeferredReverts;
pub use error::TetherError;
pub use git::{GitCli, RepoLocator, StatusSource};
pub use report::RevertReport;
pub use status::{StatusEntry, StatusSnapshot, StatusTag};
