//! Git status backend
//!
//! [`StatusSource`] and [`RepoLocator`] are the seams the coordinator talks
//! to. [`GitCli`] implements both by shelling out to `git`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::DEFAULT_GIT_TIMEOUT;
use crate::error::TetherError;
use crate::status::{StatusEntry, StatusTag};

/// Repository status queries
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// List changed paths under `root` with their status codes.
    ///
    /// With `tracked_only`, untracked and ignored paths are omitted.
    async fn list_status(
        &self,
        root: &Path,
        tracked_only: bool,
    ) -> Result<Vec<StatusEntry>, TetherError>;

    /// Status of a single file
    async fn file_status(&self, root: &Path, file: &Path) -> Result<StatusTag, TetherError>;

    /// Whether a file is registered in version control
    async fn is_tracked(&self, root: &Path, file: &Path) -> Result<bool, TetherError>;
}

/// Repository discovery
#[async_trait]
pub trait RepoLocator: Send + Sync {
    /// Root of the working tree containing `path`, if any
    async fn toplevel_of(&self, path: &Path) -> Option<PathBuf>;
}

/// Status backend that runs the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    timeout: Duration,
}

impl GitCli {
    /// Backend using `git` from `PATH`
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Use a different git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Limit each invocation to `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run git in `cwd` and return its stdout.
    ///
    /// This is also the entry point for repository-mutating commands such as
    /// `checkout` or `stash pop`; wrap those in
    /// [`RevertCoordinator::with_operation`](crate::RevertCoordinator::with_operation).
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, TetherError> {
        let output = self.output(cwd, args).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(TetherError::Git {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Like [`run`](Self::run), reporting a failed command as a status query
    /// failure
    async fn query(&self, cwd: &Path, args: &[&str]) -> Result<String, TetherError> {
        self.run(cwd, args).await.map_err(status_failure)
    }

    async fn output(&self, cwd: &Path, args: &[&str]) -> Result<std::process::Output, TetherError> {
        debug!(cwd = %cwd.display(), args = ?args, "Running git");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| TetherError::Git {
                args: args.join(" "),
                stderr: format!("failed to run {}: {e}", self.program.display()),
            }),
            Err(_) => Err(TetherError::GitTimeout {
                args: args.join(" "),
                timeout: self.timeout,
            }),
        }
    }

    fn relative<'a>(root: &Path, file: &'a Path) -> Result<&'a Path, TetherError> {
        file.strip_prefix(root)
            .map_err(|_| TetherError::NotARepository(file.to_path_buf()))
    }
}

fn status_failure(e: TetherError) -> TetherError {
    match e {
        TetherError::Git { .. } => TetherError::StatusQuery(e.to_string()),
        other => other,
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSource for GitCli {
    async fn list_status(
        &self,
        root: &Path,
        tracked_only: bool,
    ) -> Result<Vec<StatusEntry>, TetherError> {
        let args: &[&str] = if tracked_only {
            &["status", "--porcelain", "-z", "--untracked-files=no"]
        } else {
            &["status", "--porcelain", "-z", "--untracked-files=all", "--ignored"]
        };
        let output = self.query(root, args).await?;
        Ok(parse_porcelain_z(&output))
    }

    async fn file_status(&self, root: &Path, file: &Path) -> Result<StatusTag, TetherError> {
        let rel = Self::relative(root, file)?.to_string_lossy().into_owned();
        let output = self
            .query(
                root,
                &["status", "--porcelain", "-z", "--untracked-files=all", "--ignored", "--", rel.as_str()],
            )
            .await?;

        if let Some(entry) = parse_porcelain_z(&output).first() {
            return Ok(entry.tag());
        }

        if self.is_tracked(root, file).await? {
            Ok(StatusTag::UpToDate)
        } else {
            Ok(StatusTag::Unregistered)
        }
    }

    async fn is_tracked(&self, root: &Path, file: &Path) -> Result<bool, TetherError> {
        let rel = Self::relative(root, file)?.to_string_lossy().into_owned();
        let output = self
            .output(root, &["ls-files", "--error-unmatch", "--", rel.as_str()])
            .await
            .map_err(status_failure)?;
        Ok(output.status.success())
    }
}

#[async_trait]
impl RepoLocator for GitCli {
    async fn toplevel_of(&self, path: &Path) -> Option<PathBuf> {
        let dir = if path.is_dir() { path } else { path.parent()? };
        let output = self.run(dir, &["rev-parse", "--show-toplevel"]).await.ok()?;
        let root = output.trim();
        if root.is_empty() {
            None
        } else {
            Some(PathBuf::from(root))
        }
    }
}

/// Parse `git status --porcelain -z` output.
///
/// Rename and copy entries are followed by their origin path, which is
/// skipped.
pub fn parse_porcelain_z(output: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');

    while let Some(field) = fields.next() {
        if field.len() < 4 {
            continue;
        }

        let code = &field[..2];
        entries.push(StatusEntry::new(&field[3..], code));

        if code.starts_with('R') || code.starts_with('C') {
            fields.next();
        }
    }

    entries
}
