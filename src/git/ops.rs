use crate::exec::{DEFAULT_TIMEOUT, ExecutionRequest, ExecutionResult, ProcessExecutor};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the stage + commit sequence
#[derive(Debug, Error, Clone)]
pub enum GitOpsError {
    #[error("Staging failed (exit code {}): {}", .0.code_display(), .0.stderr)]
    StageFailed(ExecutionResult),

    #[error("Commit failed (exit code {}): {}", .0.code_display(), commit_detail(.0))]
    CommitFailed(ExecutionResult),

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),
}

// git reports "nothing to commit" on stdout, not stderr
fn commit_detail(result: &ExecutionResult) -> &str {
    if result.stderr.trim().is_empty() {
        result.stdout.trim()
    } else {
        result.stderr.trim()
    }
}

/// Both steps of a successful commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub stage: ExecutionResult,
    pub commit: ExecutionResult,
}

/// Walk up from `start` to the nearest directory containing `.git`
pub fn discover_root<P: AsRef<Path>>(start: P) -> Result<PathBuf, GitOpsError> {
    let mut current = start.as_ref().to_path_buf();

    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }

        if !current.pop() {
            return Err(GitOpsError::NotARepository(start.as_ref().to_path_buf()));
        }
    }
}

/// Version-control operations on the managed repository
///
/// All invocations go through the [`ProcessExecutor`], so the `git`
/// subcommands used here must be present in its allowlist.
#[derive(Debug, Clone)]
pub struct GitOps {
    executor: ProcessExecutor,
    repo_root: PathBuf,
    timeout: Duration,
}

impl GitOps {
    pub fn new(executor: ProcessExecutor, repo_root: impl AsRef<Path>) -> Self {
        Self {
            executor,
            repo_root: repo_root.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Short status with branch header
    pub async fn status(&self) -> ExecutionResult {
        self.git(["status", "--porcelain=v1", "-b"]).await
    }

    /// Per-file change summary of the working tree
    pub async fn diff_stat(&self) -> ExecutionResult {
        self.git(["diff", "--stat"]).await
    }

    /// Full working-tree diff
    pub async fn diff_full(&self) -> ExecutionResult {
        self.git(["diff"]).await
    }

    /// Stage everything, then commit with `message`
    pub async fn commit(&self, message: &str) -> Result<CommitOutcome, GitOpsError> {
        let stage = self.git(["add", "-A"]).await;
        if !stage.ok {
            warn!(stderr = %stage.stderr, "git add failed");
            return Err(GitOpsError::StageFailed(stage));
        }

        let commit = self.git(["commit", "-m", message]).await;
        if !commit.ok {
            warn!(exit_code = ?commit.exit_code, "git commit failed");
            return Err(GitOpsError::CommitFailed(commit));
        }

        info!(message, "committed changes");
        Ok(CommitOutcome { stage, commit })
    }

    async fn git<const N: usize>(&self, args: [&str; N]) -> ExecutionResult {
        let request =
            ExecutionRequest::new("git", args, &self.repo_root).with_timeout(self.timeout);
        self.executor.execute(&request).await
    }
}
