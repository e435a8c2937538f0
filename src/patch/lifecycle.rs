use crate::audit::{AuditLogger, PatchEvent};
use crate::exec::{ExecutionResult, Supervisor};
use crate::git::{CommitOutcome, GitOps, GitOpsError};
use crate::llm::{FileContext, LLMError, PatchPlanner};
use crate::patch::error::PatchError;
use crate::patch::ops::{apply_operations, check_shrink};
use crate::patch::preview::{DiffPreviewer, Snapshots};
use crate::patch::spec::PatchSpec;
use crate::security::PathGuard;
use crate::verify::{VerificationReport, VerificationRunner};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_SHRINK_RATIO: f64 = 0.7;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 180_000;

/// Source of timestamps for pending patches
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of pending patch identifiers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Short random hex ids
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string().chars().take(8).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Empty,
    Prepared,
    /// Transient; the session is back to `Empty` once apply returns
    Applied,
}

/// A validated, previewed patch awaiting confirmation
#[derive(Debug, Clone)]
pub struct PendingPatch {
    pub id: String,
    pub spec: PatchSpec,
    pub target: PathBuf,
    pub snapshots: Snapshots,
    pub diff_text: String,
    pub created_at: DateTime<Utc>,
    pub state: LifecycleState,
}

/// Per-operator patch slot
///
/// Holds at most one pending patch. Callers own the session and pass it to
/// every lifecycle operation; concurrent operators need one session each or
/// a lock around it.
#[derive(Debug, Default)]
pub struct PatchSession {
    pending: Option<PendingPatch>,
}

impl PatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        match self.pending {
            Some(_) => LifecycleState::Prepared,
            None => LifecycleState::Empty,
        }
    }

    pub fn pending(&self) -> Option<&PendingPatch> {
        self.pending.as_ref()
    }
}

/// Limits applied to every proposal
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPolicy {
    /// Repository-relative files a proposal may target
    pub allowed_files: Vec<String>,
    pub shrink_ratio: f64,
    pub max_file_bytes: u64,
}

impl Default for PatchPolicy {
    fn default() -> Self {
        Self {
            allowed_files: vec!["index.js".to_string(), "telegram_bridge.js".to_string()],
            shrink_ratio: DEFAULT_SHRINK_RATIO,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("No pending patch.")]
    NoPendingPatch,

    #[error("Patch request cancelled.")]
    Cancelled,

    #[error("Empty patch instruction.")]
    EmptyInstruction,

    #[error("{0}")]
    Patch(#[from] PatchError),

    #[error("AI error: {0}")]
    Llm(LLMError),

    #[error("{0}")]
    Git(#[from] GitOpsError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<LLMError> for LifecycleError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Cancelled => LifecycleError::Cancelled,
            other => LifecycleError::Llm(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Discarded(String),
    NothingPending,
}

/// Everything that happened during a successful apply
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub patch_id: String,
    pub target: PathBuf,
    pub commit_message: String,
    pub commit: CommitOutcome,
    pub restart: ExecutionResult,
    pub verification: VerificationReport,
}

/// Drives a patch from instruction to committed, restarted, verified change
///
/// States: `Empty` → `propose` → `Prepared` → `apply` → `Empty`. A second
/// `propose` replaces the pending patch; `cancel` discards it. Applying
/// writes the candidate over the target with no rollback; recovery is
/// through version-control history.
pub struct PatchLifecycle {
    planner: PatchPlanner,
    previewer: DiffPreviewer,
    guard: PathGuard,
    git: GitOps,
    supervisor: Supervisor,
    verifier: VerificationRunner,
    policy: PatchPolicy,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    audit: Option<Arc<AuditLogger>>,
}

impl PatchLifecycle {
    pub fn new(
        planner: PatchPlanner,
        previewer: DiffPreviewer,
        guard: PathGuard,
        git: GitOps,
        supervisor: Supervisor,
        verifier: VerificationRunner,
    ) -> Self {
        Self {
            planner,
            previewer,
            guard,
            git,
            supervisor,
            verifier,
            policy: PatchPolicy::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
            audit: None,
        }
    }

    pub fn with_policy(mut self, policy: PatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &PatchPolicy {
        &self.policy
    }

    pub fn git(&self) -> &GitOps {
        &self.git
    }

    /// Ask for a patch, validate it and store it as the pending patch
    ///
    /// On success any previous pending patch is discarded. A cancelled request
    /// leaves the session as it was; every other failure leaves it empty.
    pub async fn propose<'s>(
        &self,
        session: &'s mut PatchSession,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<&'s PendingPatch, LifecycleError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(LifecycleError::EmptyInstruction);
        }

        match self.prepare(instruction, cancel).await {
            Ok(patch) => {
                self.discard(session).await;
                info!(
                    id = %patch.id,
                    target = %patch.spec.path,
                    operations = patch.spec.operations.len(),
                    "patch prepared"
                );
                self.audit(
                    PatchEvent::Proposed,
                    Some(&patch.id),
                    Some(&patch.spec.path),
                    instruction,
                );
                Ok(&*session.pending.insert(patch))
            }
            Err(LifecycleError::Cancelled) => {
                info!("patch proposal cancelled");
                Err(LifecycleError::Cancelled)
            }
            Err(e) => {
                self.discard(session).await;
                warn!(error = %e, "patch proposal rejected");
                self.audit(
                    PatchEvent::Rejected,
                    None,
                    None,
                    &format!("{} | {}", instruction, e),
                );
                Err(e)
            }
        }
    }

    async fn prepare(
        &self,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<PendingPatch, LifecycleError> {
        let files = self.file_contexts().await;
        let prompt = PatchPlanner::build_prompt(instruction, &self.policy.allowed_files, &files);
        let raw = self.planner.request(&prompt, cancel).await?;

        let spec = PatchSpec::parse(&raw)?;
        let relative = spec.path.trim_start_matches("./");
        if !self.policy.allowed_files.iter().any(|f| f == relative) {
            return Err(PatchError::FileNotAllowlisted(spec.path.clone()).into());
        }

        let target = self.guard.resolve(relative).map_err(PatchError::from)?;
        let original = self.read_target(&target, &spec.path).await?;

        let candidate = apply_operations(&original, &spec.operations)?;
        check_shrink(&original, &candidate, self.policy.shrink_ratio)?;

        let id = self.ids.next_id();
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());
        let preview = self
            .previewer
            .preview(&id, &file_name, &original, &candidate)
            .await?;

        Ok(PendingPatch {
            id,
            spec,
            target,
            snapshots: preview.snapshots,
            diff_text: preview.diff_text,
            created_at: self.clock.now(),
            state: LifecycleState::Prepared,
        })
    }

    async fn read_target(&self, target: &Path, display: &str) -> Result<String, PatchError> {
        let metadata = match tokio::fs::metadata(target).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(PatchError::FileNotFound(display.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PatchError::FileNotFound(display.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.len() > self.policy.max_file_bytes {
            return Err(PatchError::FileTooLarge {
                path: display.to_string(),
                bytes: metadata.len(),
            });
        }

        Ok(tokio::fs::read_to_string(target).await?)
    }

    /// Current contents of every patchable file that exists and fits the size bound
    async fn file_contexts(&self) -> Vec<FileContext> {
        let mut files = Vec::new();
        for path in &self.policy.allowed_files {
            let Ok(target) = self.guard.resolve(path) else {
                warn!(path = %path, "patchable file rejected by path guard");
                continue;
            };
            match self.read_target(&target, path).await {
                Ok(content) => files.push(FileContext {
                    path: path.clone(),
                    content,
                }),
                Err(e) => debug!(path = %path, error = %e, "skipping file context"),
            }
        }
        files
    }

    /// Discard the pending patch, if any
    pub async fn cancel(&self, session: &mut PatchSession) -> CancelOutcome {
        match self.discard(session).await {
            Some(patch) => {
                info!(id = %patch.id, "patch cancelled");
                self.audit(
                    PatchEvent::Cancelled,
                    Some(&patch.id),
                    Some(&patch.spec.path),
                    "cancelled by operator",
                );
                CancelOutcome::Discarded(patch.id)
            }
            None => CancelOutcome::NothingPending,
        }
    }

    /// Run the verification battery; state is left untouched
    pub async fn test(&self) -> VerificationReport {
        self.verifier.run().await
    }

    /// Write, commit, restart and verify the pending patch
    ///
    /// The session is empty afterwards whatever the outcome. A failed commit
    /// stops the sequence before the restart; the written file stays in place.
    pub async fn apply(&self, session: &mut PatchSession) -> Result<ApplyReport, LifecycleError> {
        let Some(mut patch) = session.pending.take() else {
            return Err(LifecycleError::NoPendingPatch);
        };
        patch.state = LifecycleState::Applied;

        // Snapshots go before the commit stages the whole tree
        let candidate = tokio::fs::read_to_string(&patch.snapshots.candidate).await;
        patch.snapshots.remove().await;

        let outcome = match candidate {
            Ok(candidate) => self.apply_pending(&patch, candidate).await,
            Err(e) => Err(e.into()),
        };

        match &outcome {
            Ok(report) => {
                info!(
                    id = %patch.id,
                    verified = report.verification.all_passed(),
                    "patch applied"
                );
                self.audit(
                    PatchEvent::Applied,
                    Some(&patch.id),
                    Some(&patch.spec.path),
                    &patch.spec.commit_message,
                );
            }
            Err(e) => {
                warn!(id = %patch.id, error = %e, "patch apply failed");
                self.audit(
                    PatchEvent::ApplyFailed,
                    Some(&patch.id),
                    Some(&patch.spec.path),
                    &e.to_string(),
                );
            }
        }

        outcome
    }

    async fn apply_pending(
        &self,
        patch: &PendingPatch,
        candidate: String,
    ) -> Result<ApplyReport, LifecycleError> {
        tokio::fs::write(&patch.target, candidate).await?;

        let commit = self.git.commit(&patch.spec.commit_message).await?;
        let restart = self.supervisor.restart().await;
        if !restart.ok {
            warn!(
                app = %self.supervisor.app_name(),
                exit_code = ?restart.exit_code,
                "restart failed"
            );
        }
        let verification = self.verifier.run().await;

        Ok(ApplyReport {
            patch_id: patch.id.clone(),
            target: patch.target.clone(),
            commit_message: patch.spec.commit_message.clone(),
            commit,
            restart,
            verification,
        })
    }

    async fn discard(&self, session: &mut PatchSession) -> Option<PendingPatch> {
        let patch = session.pending.take()?;
        patch.snapshots.remove().await;
        Some(patch)
    }

    fn audit(&self, event: PatchEvent, id: Option<&str>, target: Option<&str>, detail: &str) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.log_patch_event(event, id, target, detail)
        {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}
