use crate::exec::{ExecutionRequest, ExecutionResult, ProcessExecutor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ATTEMPTS: u32 = 6;
pub const DEFAULT_SPACING: Duration = Duration::from_secs(1);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One read-only health probe
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Probe {
    pub fn new<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// GET `url` with curl, failing on HTTP errors
    pub fn http_get(name: impl Into<String>, url: &str) -> Self {
        Self::new(name, "curl", ["-s", "-S", "-f", "--max-time", "5", url])
    }

    /// POST a JSON body to `url` with curl
    pub fn http_post_json(name: impl Into<String>, url: &str, body: &str) -> Self {
        Self::new(
            name,
            "curl",
            [
                "-s",
                "-S",
                "-f",
                "--max-time",
                "5",
                "-X",
                "POST",
                "-H",
                "Content-Type: application/json",
                "-d",
                body,
                url,
            ],
        )
    }
}

/// Probes run after a deploy: liveness, version, one functional call, supervisor listing
pub fn default_probes(base_url: &str, supervisor_binary: &str) -> Vec<Probe> {
    let base = base_url.trim_end_matches('/');
    vec![
        Probe::http_get("health", &format!("{}/health", base)),
        Probe::http_get("version", &format!("{}/version", base)),
        Probe::http_post_json(
            "orchestrate",
            &format!("{}/orchestrate", base),
            r#"{"text":"ping"}"#,
        ),
        Probe::new("supervisor", supervisor_binary, ["list"]),
    ]
}

/// Outcome of one probe after its retries
#[derive(Debug, Clone, Serialize)]
pub struct VerificationCheck {
    pub name: String,
    pub command_line: String,
    pub result: ExecutionResult,
    pub attempts: u32,
}

impl VerificationCheck {
    pub fn passed(&self) -> bool {
        self.result.ok
    }
}

/// Aggregated result of the verification battery
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<VerificationCheck>,
}

impl VerificationReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(VerificationCheck::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed()).count()
    }
}

/// Runs the verification battery; results are informational and never raise
#[derive(Debug, Clone)]
pub struct VerificationRunner {
    executor: ProcessExecutor,
    working_dir: PathBuf,
    probes: Vec<Probe>,
    attempts: u32,
    spacing: Duration,
    probe_timeout: Duration,
}

impl VerificationRunner {
    pub fn new(executor: ProcessExecutor, working_dir: impl AsRef<Path>) -> Self {
        Self {
            executor,
            working_dir: working_dir.as_ref().to_path_buf(),
            probes: Vec::new(),
            attempts: DEFAULT_ATTEMPTS,
            spacing: DEFAULT_SPACING,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probes(mut self, probes: Vec<Probe>) -> Self {
        self.probes = probes;
        self
    }

    /// Attempts per probe; at least one attempt is always made
    pub fn with_retry(mut self, attempts: u32, spacing: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.spacing = spacing;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub async fn run(&self) -> VerificationReport {
        let mut checks = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            checks.push(self.run_probe(probe).await);
        }

        let report = VerificationReport { checks };
        info!(
            passed = report.passed_count(),
            total = report.checks.len(),
            "verification finished"
        );
        report
    }

    async fn run_probe(&self, probe: &Probe) -> VerificationCheck {
        let request = ExecutionRequest::new(
            probe.command.as_str(),
            probe.args.iter().cloned(),
            &self.working_dir,
        )
        .with_timeout(self.probe_timeout);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.executor.execute(&request).await;

            // Denied probes will never pass; skip the retries
            if result.ok || result.denied || attempt >= self.attempts {
                if !result.ok {
                    warn!(
                        probe = %probe.name,
                        attempt,
                        exit_code = ?result.exit_code,
                        "probe failed"
                    );
                }
                return VerificationCheck {
                    name: probe.name.clone(),
                    command_line: request.command_line(),
                    result,
                    attempts: attempt,
                };
            }

            debug!(probe = %probe.name, attempt, "probe not ready, retrying");
            tokio::time::sleep(self.spacing).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CommandAllowlist;
    use tempfile::TempDir;

    fn executor() -> ProcessExecutor {
        let mut allowlist = CommandAllowlist::new();
        allowlist.allow("sh", Vec::<String>::new());
        ProcessExecutor::new(allowlist)
    }

    fn sh(name: &str, script: &str) -> Probe {
        Probe::new(name, "sh", ["-c", script])
    }

    #[test]
    fn test_default_probes() {
        let probes = default_probes("http://127.0.0.1:3000/", "pm2");
        let names: Vec<&str> = probes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["health", "version", "orchestrate", "supervisor"]);
        assert_eq!(probes[0].args.last().unwrap(), "http://127.0.0.1:3000/health");
        assert!(probes[2].args.contains(&r#"{"text":"ping"}"#.to_string()));
        assert_eq!(probes[3].command, "pm2");
        assert_eq!(probes[3].args, vec!["list".to_string()]);
    }

    #[tokio::test]
    async fn test_passing_probe_runs_once() {
        let dir = TempDir::new().unwrap();
        let runner = VerificationRunner::new(executor(), dir.path())
            .with_probes(vec![sh("ok", "echo alive")])
            .with_retry(3, Duration::from_millis(10));

        let report = runner.run().await;
        assert!(report.all_passed());
        assert_eq!(report.checks[0].attempts, 1);
        assert!(report.checks[0].result.stdout.contains("alive"));
    }

    #[tokio::test]
    async fn test_failing_probe_exhausts_attempts() {
        let dir = TempDir::new().unwrap();
        let runner = VerificationRunner::new(executor(), dir.path())
            .with_probes(vec![sh("down", "exit 7")])
            .with_retry(3, Duration::from_millis(10));

        let report = runner.run().await;
        assert!(!report.all_passed());
        assert_eq!(report.passed_count(), 0);
        assert_eq!(report.checks[0].attempts, 3);
        assert_eq!(report.checks[0].result.exit_code, Some(7));
    }

    #[tokio::test]
    async fn test_probe_recovers_after_retries() {
        let dir = TempDir::new().unwrap();
        // Fails until the marker file has been touched twice
        let script = "echo x >> marker; [ $(wc -l < marker) -ge 3 ]";
        let runner = VerificationRunner::new(executor(), dir.path())
            .with_probes(vec![sh("warming", script)])
            .with_retry(6, Duration::from_millis(10));

        let report = runner.run().await;
        assert!(report.all_passed());
        assert_eq!(report.checks[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_denied_probe_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let runner = VerificationRunner::new(executor(), dir.path())
            .with_probes(vec![Probe::http_get("health", "http://127.0.0.1:1/health")])
            .with_retry(6, Duration::from_millis(10));

        let report = runner.run().await;
        assert_eq!(report.checks[0].attempts, 1);
        assert!(report.checks[0].result.denied);
    }

    #[tokio::test]
    async fn test_mixed_report() {
        let dir = TempDir::new().unwrap();
        let runner = VerificationRunner::new(executor(), dir.path())
            .with_probes(vec![sh("a", "true"), sh("b", "false")])
            .with_retry(1, Duration::from_millis(0));

        let report = runner.run().await;
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.passed_count(), 1);
        assert!(!report.all_passed());
    }
}
