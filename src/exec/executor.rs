use crate::audit::AuditLogger;
use crate::security::CommandAllowlist;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Maximum characters kept from each of stdout and stderr
pub const DEFAULT_OUTPUT_CAP: usize = 4000;

/// Default runtime bound for a spawned process
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long output readers may linger after the process is gone
const READER_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// Typed view of a failed execution
#[derive(Debug, Error, Clone)]
pub enum ExecError {
    #[error("Command not allowed: {0}")]
    ExecutionDenied(String),

    #[error("Command timed out: {0}")]
    ExecutionTimeout(String),

    #[error("Command '{command_line}' failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        command_line: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// A request to spawn one allowlisted process
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl ExecutionRequest {
    pub fn new<I, S>(command: impl Into<String>, args: I, working_dir: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable echo of the invocation
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.trim().to_string()
    }
}

/// Result of executing a process; always produced, never an error
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub ok: bool,
    /// `None` when the process was denied, never started, or died from a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub denied: bool,
    pub command_line: String,
    pub working_dir: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    fn denied(request: &ExecutionRequest, working_dir: PathBuf) -> Self {
        let command_line = request.command_line();
        Self {
            ok: false,
            exit_code: None,
            timed_out: false,
            denied: true,
            stderr: format!("Command not allowed: {}", command_line),
            command_line,
            working_dir,
            stdout: String::new(),
        }
    }

    fn not_started(request: &ExecutionRequest, working_dir: PathBuf, reason: String) -> Self {
        Self {
            ok: false,
            exit_code: None,
            timed_out: false,
            denied: false,
            command_line: request.command_line(),
            working_dir,
            stdout: String::new(),
            stderr: reason,
        }
    }

    /// Exit code rendered for operator replies
    pub fn code_display(&self) -> String {
        self.exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Convert a non-ok result into the matching [`ExecError`]
    pub fn into_result(self) -> Result<Self, ExecError> {
        if self.ok {
            return Ok(self);
        }

        if self.denied {
            return Err(ExecError::ExecutionDenied(self.command_line));
        }

        if self.timed_out {
            return Err(ExecError::ExecutionTimeout(self.command_line));
        }

        Err(ExecError::ExecutionFailed {
            command_line: self.command_line,
            exit_code: self.exit_code,
            stderr: self.stderr,
        })
    }
}

/// Spawns allowlisted processes with bounded runtime and bounded output
///
/// Cloning is cheap; each call owns its own buffers so any number of
/// executions may run concurrently.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    allowlist: Arc<CommandAllowlist>,
    output_cap: usize,
    audit: Option<Arc<AuditLogger>>,
}

impl ProcessExecutor {
    /// Create an executor with the given allowlist and default output cap
    pub fn new(allowlist: CommandAllowlist) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
            output_cap: DEFAULT_OUTPUT_CAP,
            audit: None,
        }
    }

    pub fn with_output_cap(mut self, output_cap: usize) -> Self {
        self.output_cap = output_cap;
        self
    }

    /// Record every execution in the audit trail
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn allowlist(&self) -> &CommandAllowlist {
        &self.allowlist
    }

    pub fn output_cap(&self) -> usize {
        self.output_cap
    }

    /// Execute a process; never fails, every outcome is folded into the result
    ///
    /// The process is spawned directly without a shell. On timeout it is
    /// killed and the result is marked `timed_out`.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let working_dir = absolute(&request.working_dir);

        if !self.allowlist.is_allowed(&request.command, &request.args) {
            warn!(command = %request.command_line(), "execution denied by allowlist");
            let result = ExecutionResult::denied(request, working_dir);
            self.record(&result);
            return result;
        }

        debug!(command = %request.command_line(), cwd = %working_dir.display(), "spawning process");

        let mut child = match Command::new(&request.command)
            .args(&request.args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command_line(), error = %e, "failed to spawn process");
                let result = ExecutionResult::not_started(
                    request,
                    working_dir,
                    format!("Failed to execute {}: {}", request.command, e),
                );
                self.record(&result);
                return result;
            }
        };

        // Keep enough bytes to fill the character cap even with multi-byte text
        let byte_budget = self.output_cap.saturating_mul(4);
        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, stdout.clone(), byte_budget)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, stderr.clone(), byte_budget)));

        let mut timed_out = false;
        let mut wait_error = None;
        let status = match tokio::time::timeout(request.timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                wait_error = Some(e.to_string());
                None
            }
            Err(_) => {
                timed_out = true;
                warn!(
                    command = %request.command_line(),
                    timeout_ms = request.timeout.as_millis() as u64,
                    "process timed out, killing"
                );
                let _ = child.start_kill();
                child.wait().await.ok()
            }
        };

        settle([stdout_task, stderr_task]).await;
        let stdout = stdout.take();
        let mut stderr = stderr.take();
        if let Some(e) = wait_error {
            if !stderr.is_empty() {
                stderr.push(b'\n');
            }
            stderr.extend_from_slice(format!("Failed to wait for process: {}", e).as_bytes());
        }

        let exit_code = status.and_then(|s| s.code());
        let ok = !timed_out && status.map(|s| s.success()).unwrap_or(false);

        let result = ExecutionResult {
            ok,
            exit_code,
            timed_out,
            denied: false,
            command_line: request.command_line(),
            working_dir,
            stdout: bound(&stdout, self.output_cap),
            stderr: bound(&stderr, self.output_cap),
        };

        debug!(
            command = %result.command_line,
            ok = result.ok,
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            "process finished"
        );
        self.record(&result);
        result
    }

    fn record(&self, result: &ExecutionResult) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.log_command(
                &result.command_line,
                &result.working_dir,
                result.exit_code.unwrap_or(-1),
            )
        {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}

/// Bytes captured from one pipe, readable even while its reader is still running
#[derive(Debug, Clone, Default)]
struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    fn extend(&self, bytes: &[u8], keep: usize) {
        let mut kept = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let room = keep.saturating_sub(kept.len());
        kept.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Read a pipe to the end, keeping at most `keep` bytes in `out`
async fn drain<R: AsyncRead + Unpin>(mut reader: R, out: OutputBuffer, keep: usize) {
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend(&chunk[..n], keep),
        }
    }
}

/// Wait for the reader tasks under one shared deadline
///
/// An orphaned grandchild can hold a pipe open forever; readers still running
/// at the deadline are aborted and whatever they captured so far is kept.
async fn settle(tasks: [Option<JoinHandle<()>>; 2]) {
    let [mut stdout, mut stderr] = tasks;

    let finished = tokio::time::timeout(READER_GRACE, async {
        tokio::join!(
            async {
                if let Some(task) = stdout.as_mut() {
                    let _ = task.await;
                }
            },
            async {
                if let Some(task) = stderr.as_mut() {
                    let _ = task.await;
                }
            }
        )
    })
    .await;

    if finished.is_err() {
        for task in [stdout, stderr].into_iter().flatten() {
            task.abort();
        }
    }
}

/// Decode lossily and cap at `cap` characters
fn bound(bytes: &[u8], cap: usize) -> String {
    String::from_utf8_lossy(bytes).chars().take(cap).collect()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_executor() -> ProcessExecutor {
        let mut allowlist = CommandAllowlist::new();
        allowlist.allow("sh", Vec::<String>::new());
        allowlist.allow("sleep", Vec::<String>::new());
        allowlist.allow("git", ["status", "--version"]);
        allowlist.allow("definitely-not-a-binary-xyz", Vec::<String>::new());
        ProcessExecutor::new(allowlist)
    }

    fn sh(script: &str, dir: &Path) -> ExecutionRequest {
        ExecutionRequest::new("sh", ["-c", script], dir)
    }

    #[tokio::test]
    async fn test_execute_success() {
        let temp = TempDir::new().unwrap();
        let result = test_executor().execute(&sh("echo hello", temp.path())).await;

        assert!(result.ok);
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.command_line, "sh -c echo hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_ok() {
        let temp = TempDir::new().unwrap();
        let result = test_executor()
            .execute(&sh("echo oops >&2; exit 3", temp.path()))
            .await;

        assert!(!result.ok);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "oops");

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, ExecError::ExecutionFailed { exit_code: Some(3), .. }));
    }

    #[tokio::test]
    async fn test_denied_command_never_spawns() {
        let temp = TempDir::new().unwrap();
        let request = ExecutionRequest::new("git", ["push", "--force"], temp.path());
        let result = test_executor().execute(&request).await;

        assert!(!result.ok);
        assert!(result.denied);
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("Command not allowed: git push --force"));
        assert!(matches!(
            result.into_result(),
            Err(ExecError::ExecutionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let request = ExecutionRequest::new("sleep", ["5"], temp.path())
            .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = test_executor().execute(&request).await;

        assert!(result.timed_out);
        assert!(!result.ok);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(matches!(
            result.into_result(),
            Err(ExecError::ExecutionTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        let temp = TempDir::new().unwrap();
        let script = "i=0; while [ $i -lt 2000 ]; do echo 0123456789; echo abcdefghij >&2; i=$((i+1)); done";
        let result = test_executor().execute(&sh(script, temp.path())).await;

        assert!(result.ok);
        assert_eq!(result.stdout.chars().count(), DEFAULT_OUTPUT_CAP);
        assert_eq!(result.stderr.chars().count(), DEFAULT_OUTPUT_CAP);
    }

    #[tokio::test]
    async fn test_output_survives_backgrounded_grandchild() {
        let temp = TempDir::new().unwrap();
        let started = std::time::Instant::now();
        let result = test_executor()
            .execute(&sh("echo started; echo warming >&2; sleep 5 &", temp.path()))
            .await;

        assert!(result.ok);
        assert_eq!(result.stdout.trim(), "started");
        assert_eq!(result.stderr.trim(), "warming");
        // one shared grace period for both pipes
        assert!(started.elapsed() < READER_GRACE + Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_custom_output_cap() {
        let temp = TempDir::new().unwrap();
        let executor = test_executor().with_output_cap(10);
        let result = executor.execute(&sh("echo 0123456789abcdef", temp.path())).await;

        assert_eq!(result.stdout, "0123456789");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let request =
            ExecutionRequest::new("definitely-not-a-binary-xyz", Vec::<String>::new(), temp.path());
        let result = test_executor().execute(&request).await;

        assert!(!result.ok);
        assert!(!result.denied);
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("Failed to execute"));
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_isolated() {
        let temp = TempDir::new().unwrap();
        let executor = test_executor();
        let first = sh("echo one", temp.path());
        let second = sh("echo two", temp.path());

        let (a, b) = tokio::join!(executor.execute(&first), executor.execute(&second));
        assert_eq!(a.stdout.trim(), "one");
        assert_eq!(b.stdout.trim(), "two");
    }

    #[tokio::test]
    async fn test_working_directory_is_echoed() {
        let temp = TempDir::new().unwrap();
        let result = test_executor().execute(&sh("pwd", temp.path())).await;

        assert_eq!(result.working_dir, temp.path());
        assert!(result.ok);
    }

    #[test]
    fn test_command_line_echo() {
        let request = ExecutionRequest::new("git", ["commit", "-m", "fix"], "/tmp");
        assert_eq!(request.command_line(), "git commit -m fix");

        let bare = ExecutionRequest::new("pm2", Vec::<String>::new(), "/tmp");
        assert_eq!(bare.command_line(), "pm2");
    }

    #[test]
    fn test_bound_respects_char_boundaries() {
        let text = "éééé".as_bytes();
        assert_eq!(bound(text, 2), "éé");
    }
}
