//! Revert coordinator - keeps buffers in step with repository operations

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::buffer::{BufferId, BufferRegistry, MonitorState, RevertOutcome};
use crate::cache;
use crate::config::{RevertBudget, RevertConfig};
use crate::deferred::DeferredReverts;
use crate::git::{GitCli, RepoLocator, StatusSource};
use crate::report::RevertReport;
use crate::status::{StatusSnapshot, StatusTag};

/// Reports whether interactive input is waiting.
///
/// Consulted between buffers when the budget is [`RevertBudget::StopOnInput`].
pub trait InputProbe: Send + Sync {
    /// True when input is pending
    fn input_pending(&self) -> bool;
}

/// Probe for hosts without interactive input
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputProbe for NoInput {
    fn input_pending(&self) -> bool {
        false
    }
}

/// Facts about a file gathered for the monitoring decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorCandidate {
    /// The file can be read
    pub readable: bool,
    /// Working tree containing the file
    pub repo_root: Option<PathBuf>,
    /// Registered in version control
    pub tracked: bool,
}

/// Whether a buffer visiting `candidate` should be monitored.
///
/// Never true while the generic revert-everything mode is active, since that
/// mode already covers every buffer.
pub fn should_monitor(config: &RevertConfig, candidate: &MonitorCandidate) -> bool {
    !config.global_revert
        && candidate.readable
        && candidate.repo_root.is_some()
        && (!config.tracked_only || candidate.tracked)
}

/// Coordinates status snapshots and buffer reverts around Git operations
pub struct RevertCoordinator {
    repo_root: PathBuf,
    config: RwLock<RevertConfig>,
    status: Arc<dyn StatusSource>,
    locator: Arc<dyn RepoLocator>,
    buffers: Arc<dyn BufferRegistry>,
    input: Arc<dyn InputProbe>,
    /// Snapshot taken by `before_operation`, consumed by `after_operation`
    pre: Mutex<Option<StatusSnapshot>>,
    deferred: Mutex<DeferredReverts>,
}

impl RevertCoordinator {
    /// Create a coordinator for the repository at `repo_root`
    pub fn new(
        repo_root: impl Into<PathBuf>,
        config: RevertConfig,
        status: Arc<dyn StatusSource>,
        locator: Arc<dyn RepoLocator>,
        buffers: Arc<dyn BufferRegistry>,
    ) -> Self {
        Self {
            repo_root: resolve_root(repo_root.into()),
            config: RwLock::new(config),
            status,
            locator,
            buffers,
            input: Arc::new(NoInput),
            pre: Mutex::new(None),
            deferred: Mutex::new(DeferredReverts::new()),
        }
    }

    /// Coordinator backed by the `git` executable
    pub fn for_git(
        repo_root: impl Into<PathBuf>,
        config: RevertConfig,
        buffers: Arc<dyn BufferRegistry>,
    ) -> Self {
        let git = Arc::new(GitCli::new().with_timeout(config.git_timeout));
        Self::new(repo_root, config, git.clone(), git, buffers)
    }

    /// Use `probe` to detect pending input
    pub fn with_input_probe(mut self, probe: Arc<dyn InputProbe>) -> Self {
        self.input = probe;
        self
    }

    /// Repository this coordinator snapshots
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Current configuration
    pub fn config(&self) -> RevertConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. Takes effect from the next operation.
    pub fn set_config(&self, config: RevertConfig) {
        *self.config.write() = config;
    }

    /// Buffers waiting for a later pass, oldest first
    pub fn deferred(&self) -> Vec<BufferId> {
        self.deferred.lock().ids()
    }

    /// Whether a pre-operation snapshot is being held
    pub fn has_pending_snapshot(&self) -> bool {
        self.pre.lock().is_some()
    }

    /// Whether snapshots and batch reverts run at all
    pub fn explicit_revert_enabled(&self, config: &RevertConfig) -> bool {
        config.revert_immediately
            && (config.global_revert || (config.monitoring && self.buffers.watched_count() > 0))
    }

    // === Monitoring ===

    /// A buffer was opened: decide monitoring and annotate its status
    pub async fn buffer_opened(&self, id: BufferId) -> MonitorState {
        let config = self.config();
        let state = if config.monitoring {
            self.turn_on_if_desired(id, &config).await
        } else {
            MonitorState::Unmonitored
        };
        self.refresh_status(id, None).await;
        state
    }

    /// Repeat the monitoring decision, e.g. after the file was staged
    pub async fn reevaluate(&self, id: BufferId) -> MonitorState {
        let config = self.config();
        if !config.monitoring {
            return self.buffers.monitor_state(id).unwrap_or_default();
        }
        self.turn_on_if_desired(id, &config).await
    }

    /// Turn on local monitoring and evaluate every open buffer.
    ///
    /// Returns the number of monitored buffers.
    pub async fn enable_monitoring(&self) -> usize {
        let config = {
            let mut config = self.config.write();
            config.monitoring = true;
            config.clone()
        };

        let mut monitored = 0;
        for id in self.buffers.buffers() {
            if self.turn_on_if_desired(id, &config).await == MonitorState::Monitored {
                monitored += 1;
            }
        }

        info!(buffers = monitored, "Turned on monitoring");
        monitored
    }

    /// Turn off local monitoring. Every buffer becomes unmonitored.
    pub fn disable_monitoring(&self) -> usize {
        self.config.write().monitoring = false;

        let mut released = 0;
        for id in self.buffers.buffers() {
            if self.buffers.monitor_state(id) == Some(MonitorState::Monitored) {
                self.buffers.set_monitor(id, MonitorState::Unmonitored, None);
                released += 1;
            }
        }

        info!(buffers = released, "Turned off monitoring");
        released
    }

    async fn turn_on_if_desired(&self, id: BufferId, config: &RevertConfig) -> MonitorState {
        if self.buffers.monitor_state(id) == Some(MonitorState::Monitored) {
            return MonitorState::Monitored;
        }
        let Some(path) = self.buffers.path_of(id) else {
            return MonitorState::Unmonitored;
        };
        if config.global_revert {
            return MonitorState::Unmonitored;
        }

        let readable = tokio::fs::File::open(&path).await.is_ok();
        let repo_root = if readable {
            self.locator.toplevel_of(&path).await
        } else {
            None
        };

        let tracked = match (&repo_root, config.tracked_only) {
            (Some(root), true) => match self.status.is_tracked(root, &path).await {
                Ok(tracked) => Some(tracked),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Tracked check failed");
                    None
                }
            },
            _ => None,
        };

        let candidate = MonitorCandidate {
            readable,
            repo_root,
            tracked: tracked.unwrap_or(false),
        };
        let state = if should_monitor(config, &candidate) {
            MonitorState::Monitored
        } else {
            MonitorState::Unmonitored
        };

        self.buffers.set_monitor(id, state, tracked);
        debug!(
            buffer_id = %id,
            path = %path.display(),
            readable = candidate.readable,
            in_repo = candidate.repo_root.is_some(),
            tracked = ?tracked,
            state = ?state,
            "Monitoring decision"
        );
        state
    }

    // === Status ===

    /// Refresh a buffer's status annotation.
    ///
    /// Uses `snapshot` when it covers the file, otherwise queries the file.
    pub async fn refresh_status(
        &self,
        id: BufferId,
        snapshot: Option<&StatusSnapshot>,
    ) -> Option<StatusTag> {
        let path = self.buffers.path_of(id)?;
        let tag = match self.root_for(&path).await {
            Some(root) => cache::lookup_or_refresh(&*self.status, &root, &path, snapshot).await,
            None => None,
        };
        self.buffers.set_status(id, tag);
        tag
    }

    async fn root_for(&self, path: &Path) -> Option<PathBuf> {
        if path.starts_with(&self.repo_root) {
            Some(self.repo_root.clone())
        } else {
            self.locator.toplevel_of(path).await
        }
    }

    async fn capture(&self, config: &RevertConfig) -> Option<StatusSnapshot> {
        match cache::capture(&*self.status, &self.repo_root, config.tracked_only).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(root = %self.repo_root.display(), error = %e, "Status snapshot failed");
                None
            }
        }
    }

    // === Operations ===

    /// Snapshot repository state ahead of a mutating operation
    pub async fn before_operation(&self) {
        let config = self.config();
        if !self.explicit_revert_enabled(&config) {
            *self.pre.lock() = None;
            debug!("Explicit revert disabled, no pre-operation snapshot");
            return;
        }

        let snapshot = self.capture(&config).await;
        *self.pre.lock() = snapshot;
    }

    /// Snapshot again and revert every buffer either snapshot mentions
    pub async fn after_operation(&self) -> RevertReport {
        let config = self.config();
        let pre = self.pre.lock().take();

        if !self.explicit_revert_enabled(&config) {
            debug!("Explicit revert disabled, skipping revert pass");
            return RevertReport::skipped();
        }

        let post = self.capture(&config).await.unwrap_or_default();
        let paths = cache::pending_revert_set(pre.as_ref(), &post);
        let batch: IndexSet<BufferId> = paths
            .iter()
            .filter_map(|path| self.buffers.find_buffer_for_file(path))
            .collect();

        let mut report = RevertReport::new();
        report.pending = paths.len();
        self.run_pass(batch.into_iter().collect(), &config, Some(&post), &mut report)
            .await;

        info!(
            pending = report.pending,
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            "Revert pass finished"
        );
        report
    }

    /// Run `op` between `before_operation` and `after_operation`.
    ///
    /// The after hook runs whatever `op` returns. If this future is dropped
    /// while `op` is in flight, the pre-operation snapshot is discarded.
    pub async fn with_operation<F, T>(&self, op: F) -> (T, RevertReport)
    where
        F: Future<Output = T>,
    {
        self.before_operation().await;
        let _scope = SnapshotScope { pre: &self.pre };
        let output = op.await;
        let report = self.after_operation().await;
        (output, report)
    }

    /// Continue reverting the deferred queue under the configured budget
    pub async fn revert_deferred(&self) -> RevertReport {
        let config = self.config();
        let batch = self.deferred.lock().ids();

        let mut report = RevertReport::new();
        if batch.is_empty() {
            return report;
        }

        report.pending = batch.len();
        self.run_pass(batch, &config, None, &mut report).await;

        info!(
            reverted = report.reverted.len(),
            deferred = report.deferred.len(),
            "Deferred revert pass finished"
        );
        report
    }

    async fn run_pass(
        &self,
        batch: Vec<BufferId>,
        config: &RevertConfig,
        snapshot: Option<&StatusSnapshot>,
        report: &mut RevertReport,
    ) {
        let mut pass = PassGuard {
            deferred: &self.deferred,
            batch,
            done: 0,
        };
        let started = Instant::now();

        while pass.done < pass.batch.len() {
            if self.budget_exhausted(&config.budget, started) {
                report.budget_exhausted = true;
                break;
            }

            let id = pass.batch[pass.done];
            self.revert_one(id, snapshot, report).await;
            pass.done += 1;
        }

        report.deferred = pass.batch[pass.done..]
            .iter()
            .filter_map(|id| self.buffers.path_of(*id))
            .collect();

        if report.budget_exhausted {
            debug!(
                processed = pass.done,
                deferred = report.deferred.len(),
                "Revert budget exhausted"
            );
        }
    }

    fn budget_exhausted(&self, budget: &RevertBudget, started: Instant) -> bool {
        match budget {
            RevertBudget::Timeout(limit) => started.elapsed() >= *limit,
            RevertBudget::StopOnInput => self.input.input_pending(),
        }
    }

    async fn revert_one(
        &self,
        id: BufferId,
        snapshot: Option<&StatusSnapshot>,
        report: &mut RevertReport,
    ) {
        let Some(path) = self.buffers.path_of(id) else {
            debug!(buffer_id = %id, "Buffer closed before revert");
            return;
        };

        match self.buffers.revert_buffer(id).await {
            Ok(RevertOutcome::Reverted) => report.reverted.push(path),
            Ok(RevertOutcome::Unchanged) => report.unchanged.push(path),
            Ok(RevertOutcome::SkippedModified) => {
                debug!(path = %path.display(), "Unsaved edits, not reverting");
                report.skipped_modified.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Revert failed");
                report.failed.push((path, e.to_string()));
            }
        }

        self.refresh_status(id, snapshot).await;
    }
}

/// Canonical form of the repository root.
///
/// Snapshot paths are joined onto this root and must compare equal to the
/// canonical paths buffers are opened under.
fn resolve_root(root: PathBuf) -> PathBuf {
    match std::fs::canonicalize(&root) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Could not resolve repository root");
            root
        }
    }
}

/// Folds the unprocessed tail of a pass back into the deferred queue.
///
/// Runs on drop so a cancelled pass reconciles too.
struct PassGuard<'a> {
    deferred: &'a Mutex<DeferredReverts>,
    batch: Vec<BufferId>,
    done: usize,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut deferred = self.deferred.lock();
        let next = deferred.reconciled(&self.batch, &self.batch[self.done..]);
        *deferred = next;
    }
}

/// Clears the pre-operation snapshot when an operation scope ends
struct SnapshotScope<'a> {
    pre: &'a Mutex<Option<StatusSnapshot>>,
}

impl Drop for SnapshotScope<'_> {
    fn drop(&mut self) {
        self.pre.lock().take();
    }
}
