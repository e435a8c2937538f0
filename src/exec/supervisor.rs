use crate::exec::executor::{DEFAULT_TIMEOUT, ExecutionRequest, ExecutionResult, ProcessExecutor};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Invokes the external process supervisor through the executor
#[derive(Debug, Clone)]
pub struct Supervisor {
    executor: ProcessExecutor,
    binary: String,
    app_name: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl Supervisor {
    pub fn new(
        executor: ProcessExecutor,
        binary: impl Into<String>,
        app_name: impl Into<String>,
        working_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            executor,
            binary: binary.into(),
            app_name: app_name.into(),
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Restart the managed service by name
    pub async fn restart(&self) -> ExecutionResult {
        info!(app = %self.app_name, "restarting service");
        self.run(["restart", self.app_name.as_str()]).await
    }

    /// List supervised processes
    pub async fn list(&self) -> ExecutionResult {
        self.run(["list"]).await
    }

    async fn run<const N: usize>(&self, args: [&str; N]) -> ExecutionResult {
        let request = ExecutionRequest::new(self.binary.as_str(), args, &self.working_dir)
            .with_timeout(self.timeout);
        self.executor.execute(&request).await
    }
}
