use crate::exec::{DEFAULT_TIMEOUT, ExecutionRequest, ProcessExecutor};
use crate::patch::error::PatchError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Scratch copies of the original and candidate content of one patch
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshots {
    pub original: PathBuf,
    pub candidate: PathBuf,
}

impl Snapshots {
    /// Remove both scratch files; failures are logged, never raised
    pub async fn remove(&self) {
        for path in [&self.original, &self.candidate] {
            if let Err(e) = tokio::fs::remove_file(path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "failed to remove snapshot");
            }
        }
    }
}

/// A rendered preview together with the files it was rendered from
#[derive(Debug, Clone)]
pub struct Preview {
    pub snapshots: Snapshots,
    pub diff_text: String,
}

/// Renders a reviewable diff between original and candidate content
///
/// Both versions are persisted to the scratch area and compared with
/// `git diff --no-index`, which needs no repository history.
#[derive(Debug, Clone)]
pub struct DiffPreviewer {
    executor: ProcessExecutor,
    repo_root: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl DiffPreviewer {
    pub fn new(
        executor: ProcessExecutor,
        repo_root: impl AsRef<Path>,
        scratch_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            executor,
            repo_root: repo_root.as_ref().to_path_buf(),
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Persist both versions under `patch_id` and render their diff
    pub async fn preview(
        &self,
        patch_id: &str,
        file_name: &str,
        original: &str,
        candidate: &str,
    ) -> Result<Preview, PatchError> {
        let snapshots = self.write_snapshots(patch_id, file_name, original, candidate).await?;

        match self.render(&snapshots).await {
            Ok(diff_text) => Ok(Preview {
                snapshots,
                diff_text,
            }),
            Err(e) => {
                snapshots.remove().await;
                Err(e)
            }
        }
    }

    async fn write_snapshots(
        &self,
        patch_id: &str,
        file_name: &str,
        original: &str,
        candidate: &str,
    ) -> Result<Snapshots, PatchError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let snapshots = Snapshots {
            original: self
                .scratch_dir
                .join(format!("orig_{}_{}", patch_id, file_name)),
            candidate: self
                .scratch_dir
                .join(format!("new_{}_{}", patch_id, file_name)),
        };

        tokio::fs::write(&snapshots.original, original).await?;
        tokio::fs::write(&snapshots.candidate, candidate).await?;

        debug!(
            original = %snapshots.original.display(),
            candidate = %snapshots.candidate.display(),
            "wrote patch snapshots"
        );
        Ok(snapshots)
    }

    /// Compare two snapshot files; exit 0 (identical) and 1 (different) both succeed
    pub async fn render(&self, snapshots: &Snapshots) -> Result<String, PatchError> {
        let request = ExecutionRequest::new(
            "git",
            [
                "diff".to_string(),
                "--no-index".to_string(),
                "--no-color".to_string(),
                "--".to_string(),
                snapshots.original.display().to_string(),
                snapshots.candidate.display().to_string(),
            ],
            &self.repo_root,
        )
        .with_timeout(self.timeout);

        let result = self.executor.execute(&request).await;

        match result.exit_code {
            Some(0) | Some(1) if !result.timed_out => Ok(result.stdout),
            _ => {
                let reason = if result.stderr.trim().is_empty() {
                    format!("exit code {}", result.code_display())
                } else {
                    result.stderr.trim().to_string()
                };
                Err(PatchError::DiffPreviewFailed(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CommandAllowlist;
    use tempfile::TempDir;

    fn previewer(root: &Path, allowlist: CommandAllowlist) -> DiffPreviewer {
        DiffPreviewer::new(ProcessExecutor::new(allowlist), root, root.join("workspace"))
    }

    #[tokio::test]
    async fn test_preview_shows_inserted_line() {
        let temp = TempDir::new().unwrap();
        let previewer = previewer(temp.path(), CommandAllowlist::with_defaults());

        let preview = previewer
            .preview("abcd1234", "index.js", "a\nb\n", "a\nping\nb\n")
            .await
            .unwrap();

        assert!(preview.diff_text.contains("+ping"));
        assert!(preview.snapshots.original.ends_with("workspace/orig_abcd1234_index.js"));
        assert!(preview.snapshots.candidate.ends_with("workspace/new_abcd1234_index.js"));
        assert_eq!(
            std::fs::read_to_string(&preview.snapshots.candidate).unwrap(),
            "a\nping\nb\n"
        );
    }

    #[tokio::test]
    async fn test_identical_content_is_success() {
        let temp = TempDir::new().unwrap();
        let previewer = previewer(temp.path(), CommandAllowlist::with_defaults());

        let preview = previewer
            .preview("same0001", "index.js", "a\n", "a\n")
            .await
            .unwrap();
        assert!(preview.diff_text.trim().is_empty());
    }

    #[tokio::test]
    async fn test_denied_diff_fails_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let previewer = previewer(temp.path(), CommandAllowlist::new());

        let err = previewer
            .preview("deny0001", "index.js", "a\n", "b\n")
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::DiffPreviewFailed(_)));
        assert!(!temp.path().join("workspace/orig_deny0001_index.js").exists());
        assert!(!temp.path().join("workspace/new_deny0001_index.js").exists());
    }

    #[tokio::test]
    async fn test_snapshot_removal_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let previewer = previewer(temp.path(), CommandAllowlist::with_defaults());

        let preview = previewer
            .preview("gone0001", "index.js", "a\n", "b\n")
            .await
            .unwrap();
        preview.snapshots.remove().await;
        preview.snapshots.remove().await;

        assert!(!preview.snapshots.original.exists());
        assert!(!preview.snapshots.candidate.exists());
    }
}
