use crate::audit::AuditLogger;
use crate::bridge::commands::OperatorCommand;
use crate::config::Config;
use crate::error::AppError;
use crate::error_translation::ErrorTranslator;
use crate::exec::{ExecutionRequest, ExecutionResult, ProcessExecutor, Supervisor};
use crate::git::GitOps;
use crate::llm::{Advisor, GenerativeClient, PatchPlanner};
use crate::patch::{
    ApplyReport, CancelOutcome, Clock, DiffPreviewer, LifecycleError, PatchLifecycle,
    PatchSession, PendingPatch, SystemClock,
};
use crate::security::{CommandAllowlist, PathGuard, is_run_blocked};
use crate::verify::{VerificationReport, VerificationRunner, default_probes};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Hard limit of the chat transport
pub const MAX_REPLY_CHARS: usize = 3900;
pub const FREE_TEXT_COOLDOWN: Duration = Duration::from_secs(2);

const FULL_DIFF_CHARS: usize = 3500;
const PREVIEW_DIFF_CHARS: usize = 3200;
const SHORT_GREETINGS: &[&str] = &["hello", "hi", "hey", "yo", "test", "ok", "salut", "allo"];

const HELP: &str = "✅ Commands:\n\
/git status\n\
/git diff\n\
/git diff full\n\
/git commit <message>\n\
/patch <instruction>\n\
/patch apply\n\
/patch test\n\
/patch cancel\n\
/run <cmd> ...";

const GREETING: &str = "👋 Hi! Tell me what you want to do:\n\
1) /git status\n\
2) /patch <instruction>\n\
3) Ask a question (e.g. 'summarize this log' or 'what next')";

/// Cut `text` to `max` characters, marking the cut
pub fn clamp(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("\n…(truncated)…");
    out
}

/// Fit a reply to the transport limit; never empty
pub fn fit_reply(text: &str) -> String {
    let out: String = text.chars().take(MAX_REPLY_CHARS).collect();
    if out.is_empty() { "—".to_string() } else { out }
}

fn or_dash(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() { "—" } else { trimmed }
}

/// Turns operator messages into actions and reply text
///
/// One bridge serves one operator; the pending patch lives in its session.
/// Messages must be handled one at a time.
pub struct OperatorBridge {
    operator_id: String,
    lifecycle: PatchLifecycle,
    executor: ProcessExecutor,
    advisor: Advisor,
    session: PatchSession,
    repo_root: PathBuf,
    run_timeout: Duration,
    clock: Arc<dyn Clock>,
    last_free_text: Option<DateTime<Utc>>,
}

impl OperatorBridge {
    pub fn new(
        operator_id: impl Into<String>,
        lifecycle: PatchLifecycle,
        executor: ProcessExecutor,
        advisor: Advisor,
    ) -> Self {
        let repo_root = lifecycle.git().repo_root().to_path_buf();
        Self {
            operator_id: operator_id.into(),
            lifecycle,
            executor,
            advisor,
            session: PatchSession::new(),
            repo_root,
            run_timeout: crate::exec::DEFAULT_TIMEOUT,
            clock: Arc::new(SystemClock),
            last_free_text: None,
        }
    }

    /// Wire every component from the configuration
    pub fn from_config(
        config: &Config,
        client: Arc<dyn GenerativeClient>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let root = config.repo.root.canonicalize()?;
        let exec_timeout = config.exec_timeout();

        let mut executor = ProcessExecutor::new(CommandAllowlist::with_defaults())
            .with_output_cap(config.exec.output_cap);
        if let Some(audit) = &audit {
            executor = executor.with_audit(Arc::clone(audit));
        }

        let guard = PathGuard::new(&root).forbid_prefix(config.repo.scratch_dir.as_str());
        let scratch = root.join(&config.repo.scratch_dir);
        let previewer =
            DiffPreviewer::new(executor.clone(), &root, scratch).with_timeout(exec_timeout);
        let git = GitOps::new(executor.clone(), &root).with_timeout(exec_timeout);
        let supervisor = Supervisor::new(
            executor.clone(),
            config.supervisor.binary.as_str(),
            config.supervisor.app_name.as_str(),
            &root,
        )
        .with_timeout(exec_timeout);
        let verifier = VerificationRunner::new(executor.clone(), &root)
            .with_probes(default_probes(&config.verify.base_url, &config.supervisor.binary))
            .with_retry(config.verify.attempts, config.verify_spacing());

        let planner = PatchPlanner::new(Arc::clone(&client)).with_timeout(config.llm_timeout());
        let advisor = Advisor::new(client).with_timeout(config.llm_timeout());

        let mut lifecycle =
            PatchLifecycle::new(planner, previewer, guard, git, supervisor, verifier)
                .with_policy(config.patch_policy());
        if let Some(audit) = audit {
            lifecycle = lifecycle.with_audit(audit);
        }

        info!(
            root = %root.display(),
            operator = %config.operator.id,
            "operator bridge ready"
        );

        Ok(Self::new(config.operator.id.clone(), lifecycle, executor, advisor)
            .with_run_timeout(exec_timeout))
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &PatchSession {
        &self.session
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Handle one inbound message; `None` means nothing to reply
    pub async fn handle(
        &mut self,
        sender: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let command = OperatorCommand::parse(text)?;

        if sender != self.operator_id {
            warn!(sender, "message from unknown sender refused");
            return Some("⛔ Access denied.".to_string());
        }

        let reply = match command {
            OperatorCommand::GitStatus => {
                let r = self.lifecycle.git().status().await;
                format!("📌 /git status\n\n{}", render_output(&r))
            }
            OperatorCommand::GitDiff => {
                let r = self.lifecycle.git().diff_stat().await;
                format!("📌 /git diff (stat)\n\n{}", render_output(&r))
            }
            OperatorCommand::GitDiffFull => {
                let r = self.lifecycle.git().diff_full().await;
                format!(
                    "📌 /git diff (full)\n\n{}",
                    clamp(&render_output(&r), FULL_DIFF_CHARS)
                )
            }
            OperatorCommand::GitCommit(message) => self.git_commit(&message).await,
            OperatorCommand::PatchPropose(instruction) => self.propose(&instruction, cancel).await,
            OperatorCommand::PatchApply => self.apply().await,
            OperatorCommand::PatchTest => {
                let report = self.lifecycle.test().await;
                render_verification("🧪 Patch tests:", &report, 800)
            }
            OperatorCommand::PatchCancel => match self.lifecycle.cancel(&mut self.session).await {
                CancelOutcome::Discarded(id) => format!("✅ Patch {} cancelled.", id),
                CancelOutcome::NothingPending => {
                    "ℹ️ No pending patch; nothing to cancel.".to_string()
                }
            },
            OperatorCommand::Run { command, args } => self.run(&command, args).await,
            OperatorCommand::FreeText(text) => self.free_text(&text).await,
            OperatorCommand::Help => HELP.to_string(),
        };

        Some(fit_reply(&reply))
    }

    async fn git_commit(&self, message: &str) -> String {
        if message.is_empty() {
            return "⛔ Missing message. Example: /git commit fix: update bot".to_string();
        }

        match self.lifecycle.git().commit(message).await {
            Ok(outcome) => format!("✅ Commit OK\n\n{}", or_dash(&outcome.commit.stdout)),
            Err(e) => ErrorTranslator::translate_git(&e).render(),
        }
    }

    async fn propose(&mut self, instruction: &str, cancel: &CancellationToken) -> String {
        if instruction.is_empty() {
            return "⛔ Usage: /patch <instruction>".to_string();
        }

        match self
            .lifecycle
            .propose(&mut self.session, instruction, cancel)
            .await
        {
            Ok(patch) => render_preview(patch),
            Err(e) => render_lifecycle_error(&e),
        }
    }

    async fn apply(&mut self) -> String {
        match self.lifecycle.apply(&mut self.session).await {
            Ok(report) => render_apply(&report),
            Err(e) => render_lifecycle_error(&e),
        }
    }

    async fn run(&self, command: &str, args: Vec<String>) -> String {
        if is_run_blocked(command, &args) {
            warn!(command, "blocked /run request");
            return "⛔ Command refused.".to_string();
        }

        let request =
            ExecutionRequest::new(command, args, &self.repo_root).with_timeout(self.run_timeout);
        let r = self.executor.execute(&request).await;
        format!(
            "🛠 CMD: {}\nOK: {} | CODE: {} | TIMEOUT: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            r.command_line,
            r.ok,
            r.code_display(),
            r.timed_out,
            or_dash(&r.stdout),
            or_dash(&r.stderr)
        )
    }

    async fn free_text(&mut self, text: &str) -> String {
        let now = self.clock.now();
        if let Some(last) = self.last_free_text
            && let Ok(elapsed) = (now - last).to_std()
            && elapsed < FREE_TEXT_COOLDOWN
        {
            return "⏳ Wait 2 seconds.".to_string();
        }
        self.last_free_text = Some(now);

        if SHORT_GREETINGS.contains(&text.to_lowercase().as_str()) || text.chars().count() < 5 {
            return GREETING.to_string();
        }

        self.advisor.advise(text).await.render()
    }
}

fn render_output(result: &ExecutionResult) -> String {
    if result.ok {
        return or_dash(&result.stdout).to_string();
    }
    format!(
        "❌ {} failed (code {}{})\n\n{}",
        result.command_line,
        result.code_display(),
        if result.timed_out { ", timed out" } else { "" },
        or_dash(&result.stderr)
    )
}

fn render_lifecycle_error(error: &LifecycleError) -> String {
    ErrorTranslator::translate_lifecycle(error).render()
}

fn render_preview(patch: &PendingPatch) -> String {
    format!(
        "🧩 Patch ID: {}\nTarget: {}\nNotes: {}\nCommit: {}\n\n{}\n\n✅ Apply: /patch apply\n🧪 Test: /patch test\n❌ Cancel: /patch cancel",
        patch.id,
        patch.spec.path,
        or_dash(&patch.spec.notes),
        patch.spec.commit_message,
        clamp(patch.diff_text.trim_end(), PREVIEW_DIFF_CHARS)
    )
}

fn render_verification(title: &str, report: &VerificationReport, clamp_at: usize) -> String {
    let mut lines = vec![title.to_string()];
    if report.checks.is_empty() {
        lines.push("—".to_string());
    }
    for check in &report.checks {
        lines.push(format!(
            "- {}: ok={} code={} attempts={}",
            check.name,
            check.result.ok,
            check.result.code_display(),
            check.attempts
        ));
        if !check.result.stdout.trim().is_empty() {
            lines.push(format!("  out: {}", clamp(check.result.stdout.trim(), clamp_at)));
        }
        if !check.result.stderr.trim().is_empty() {
            lines.push(format!("  err: {}", clamp(check.result.stderr.trim(), clamp_at)));
        }
    }
    lines.join("\n")
}

fn render_apply(report: &ApplyReport) -> String {
    let mut lines = vec![
        format!("✅ Patch applied & committed: {}", report.patch_id),
        format!("Commit msg: {}", report.commit_message),
        String::new(),
        format!(
            "Restart: ok={} code={}",
            report.restart.ok,
            report.restart.code_display()
        ),
    ];
    if !report.restart.stderr.trim().is_empty() {
        lines.push(format!("ERR:\n{}", clamp(report.restart.stderr.trim(), 600)));
    }
    lines.push(String::new());
    lines.push(render_verification("🧪 Tests:", &report.verification, 600));
    lines.push(String::new());
    lines.push("Git commit output:".to_string());
    lines.push(clamp(or_dash(&report.commit.commit.stdout), 800));
    lines.join("\n")
}
