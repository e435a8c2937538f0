use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Lifecycle events worth a forensic record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchEvent {
    Proposed,
    Rejected,
    Cancelled,
    Applied,
    ApplyFailed,
}

impl PatchEvent {
    fn tag(self) -> &'static str {
        match self {
            PatchEvent::Proposed => "PATCH-PROPOSED",
            PatchEvent::Rejected => "PATCH-REJECTED",
            PatchEvent::Cancelled => "PATCH-CANCELLED",
            PatchEvent::Applied => "PATCH-APPLIED",
            PatchEvent::ApplyFailed => "PATCH-APPLY-FAILED",
        }
    }
}

/// Append-only audit trail of executed commands and patch lifecycle events
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
    operator: String,
    // Serializes rotate + append across concurrent executions
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create an AuditLogger with the default log path
    pub fn new(operator: impl Into<String>) -> std::io::Result<Self> {
        Self::with_path(Self::default_log_path()?, operator)
    }

    /// Create an AuditLogger with a custom log path
    pub fn with_path<P: AsRef<Path>>(
        path: P,
        operator: impl Into<String>,
    ) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            log_path,
            operator: operator.into(),
            write_lock: Mutex::new(()),
        })
    }

    /// Get the default log path: ~/.config/opsbridge/audit.log
    fn default_log_path() -> std::io::Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            )
        })?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("opsbridge")
            .join("audit.log"))
    }

    /// Log a command execution
    pub fn log_command(&self, command: &str, cwd: &Path, exit_code: i32) -> std::io::Result<()> {
        let log_entry = format!(
            "[{}] [{}] [{}] [exit:{}] {}\n",
            Utc::now().to_rfc3339(),
            self.operator,
            cwd.display(),
            exit_code,
            command
        );

        self.append(&log_entry)
    }

    /// Log a patch lifecycle event
    ///
    /// Rejections are recorded with the instruction and reason so that model
    /// misbehavior and probing attempts stay visible after the fact.
    pub fn log_patch_event(
        &self,
        event: PatchEvent,
        patch_id: Option<&str>,
        target: Option<&str>,
        detail: &str,
    ) -> std::io::Result<()> {
        let log_entry = format!(
            "[{}] [{}] [{}] id={} target={} detail=\"{}\"\n",
            Utc::now().to_rfc3339(),
            self.operator,
            event.tag(),
            patch_id.unwrap_or("-"),
            target.unwrap_or("-"),
            detail.replace('\n', " ")
        );

        self.append(&log_entry)
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Check and rotate log if needed
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: audit.log -> audit.log.1
            let backup_path = self.log_path.with_extension("log.1");
            fs::rename(&self.log_path, backup_path)?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
