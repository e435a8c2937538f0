#![allow(dead_code)]

use async_trait::async_trait;
use opsbridge::exec::{ProcessExecutor, Supervisor};
use opsbridge::git::GitOps;
use opsbridge::llm::{Advisor, GenerativeClient, LLMError, PatchPlanner, Prompt};
use opsbridge::patch::{DiffPreviewer, PatchLifecycle};
use opsbridge::security::{CommandAllowlist, PathGuard};
use opsbridge::verify::{Probe, VerificationRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const HEALTH_LINE: &str = "app.get('/health', (req, res) => res.json({ ok: true }));";

/// Helper to create a test git repository
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    // Initialize git repo
    Command::new("git")
        .args(["init"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to init git repo");

    // Configure git
    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to set git user.name");

    Command::new("git")
        .args(["config", "user.email", "test@example.com"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to set git user.email");

    (temp_dir, repo_path)
}

/// Helper to create a commit
pub fn create_commit(repo_path: &Path, file: &str, content: &str, message: &str) {
    let file_path = repo_path.join(file);
    fs::write(&file_path, content).expect("Failed to write file");

    Command::new("git")
        .args(["add", "-A"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to add file");

    Command::new("git")
        .args(["commit", "-m", message])
        .current_dir(repo_path)
        .output()
        .expect("Failed to commit");
}

/// A repository with a committed express-style `index.js`
pub fn create_service_repo() -> (TempDir, PathBuf) {
    let (dir, path) = create_test_repo();
    let mut content = String::from("const express = require('express');\nconst app = express();\n");
    for i in 0..8 {
        content.push_str(&format!("// route {}\n", i));
    }
    content.push_str(HEALTH_LINE);
    content.push_str("\napp.listen(3000);\n");
    create_commit(&path, "index.js", &content, "initial");
    (dir, path)
}

/// Subject lines of the repository history, newest first
pub fn commit_subjects(repo_path: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["log", "--format=%s"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to read log");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Paths touched by the newest commit
pub fn head_files(repo_path: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["show", "--name-only", "--format=", "HEAD"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to show HEAD");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Generative client that replays queued responses
pub struct ScriptedClient {
    responses: Mutex<Vec<Result<String, LLMError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedClient {
    pub fn new<I: IntoIterator<Item = String>>(responses: I) -> Self {
        let mut queued: Vec<Result<String, LLMError>> = responses.into_iter().map(Ok).collect();
        queued.reverse();
        Self {
            responses: Mutex::new(queued),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(LLMError::ApiError("no scripted response".to_string())))
    }
}

/// Patch spec JSON with a single operation on `index.js`
pub fn single_op_patch(op: &str, needle: Option<&str>, text: &str, commit_message: &str) -> String {
    let mut operation = serde_json::json!({ "op": op, "text": text });
    if let Some(needle) = needle {
        operation["match"] = serde_json::Value::String(needle.to_string());
    }
    serde_json::json!({
        "commit_message": commit_message,
        "notes": "test patch",
        "files": [{ "path": "index.js", "ops": [operation] }]
    })
    .to_string()
}

pub fn ping_patch() -> String {
    single_op_patch(
        "insert_after",
        Some(HEALTH_LINE),
        "\napp.get('/ping', (req, res) => res.send('pong'));",
        "feat: add ping endpoint",
    )
}

/// Default allowlist plus stand-ins for the supervisor and probes
pub fn test_executor() -> ProcessExecutor {
    let mut allowlist = CommandAllowlist::with_defaults();
    allowlist
        .allow("echo", Vec::<String>::new())
        .allow("sh", Vec::<String>::new());
    ProcessExecutor::new(allowlist)
}

/// Lifecycle wired against `repo_path`, with `echo` standing in for the supervisor
pub fn build_lifecycle(repo_path: &Path, client: Arc<dyn GenerativeClient>) -> PatchLifecycle {
    let executor = test_executor();
    PatchLifecycle::new(
        PatchPlanner::new(client).with_timeout(Duration::from_secs(5)),
        DiffPreviewer::new(executor.clone(), repo_path, repo_path.join("workspace")),
        PathGuard::new(repo_path),
        GitOps::new(executor.clone(), repo_path),
        Supervisor::new(executor.clone(), "echo", "orchestrator", repo_path),
        VerificationRunner::new(executor, repo_path)
            .with_probes(vec![Probe::new("health", "sh", ["-c", "echo ok"])])
            .with_retry(2, Duration::from_millis(10)),
    )
}

pub fn build_advisor(client: Arc<dyn GenerativeClient>) -> Advisor {
    Advisor::new(client).with_timeout(Duration::from_secs(5))
}
