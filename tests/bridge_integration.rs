mod helpers;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use helpers::*;
use opsbridge::OperatorBridge;
use opsbridge::bridge::MAX_REPLY_CHARS;
use opsbridge::llm::GenerativeClient;
use opsbridge::patch::{Clock, LifecycleState};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const OPERATOR: &str = "1001";

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()))
    }

    fn advance(&self, millis: i64) {
        let mut now = self.0.lock().unwrap();
        *now += ChronoDuration::milliseconds(millis);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn bridge(repo: &Path, client: Arc<dyn GenerativeClient>) -> OperatorBridge {
    OperatorBridge::new(
        OPERATOR,
        build_lifecycle(repo, client.clone()),
        test_executor(),
        build_advisor(client),
    )
}

async fn send(bridge: &mut OperatorBridge, text: &str) -> String {
    bridge
        .handle(OPERATOR, text, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unknown_sender_is_refused() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = bridge
        .handle("666", "/run git status", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, "⛔ Access denied.");
}

#[tokio::test]
async fn test_empty_message_gets_no_reply() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = bridge.handle(OPERATOR, "   ", &CancellationToken::new()).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_unknown_command_shows_help() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "/start").await;
    assert!(reply.starts_with("✅ Commands:"));
    assert!(reply.contains("/patch cancel"));
}

#[tokio::test]
async fn test_git_status_and_diff() {
    let (_dir, repo) = create_service_repo();
    fs::write(repo.join("index.js"), "changed\n").unwrap();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let status = send(&mut bridge, "/git status").await;
    assert!(status.starts_with("📌 /git status"));
    assert!(status.contains(" M index.js"));

    let diff = send(&mut bridge, "/git diff").await;
    assert!(diff.contains("index.js"));

    let full = send(&mut bridge, "/git diff full").await;
    assert!(full.contains("+changed"));
}

#[tokio::test]
async fn test_git_commit_requires_message() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "/git commit").await;
    assert!(reply.starts_with("⛔ Missing message"));
}

#[tokio::test]
async fn test_git_commit() {
    let (_dir, repo) = create_service_repo();
    fs::write(repo.join("README.md"), "hello\n").unwrap();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "/git commit docs: readme").await;
    assert!(reply.starts_with("✅ Commit OK"));
    assert_eq!(commit_subjects(&repo)[0], "docs: readme");

    let reply = send(&mut bridge, "/git commit again").await;
    assert!(reply.contains("No changes to commit"));
}

#[tokio::test]
async fn test_patch_flow() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::new([ping_patch()])));

    let preview = send(&mut bridge, "/patch add a ping endpoint").await;
    assert!(preview.starts_with("🧩 Patch ID: "));
    assert!(preview.contains("Commit: feat: add ping endpoint"));
    assert!(preview.contains("+app.get('/ping'"));
    assert!(preview.contains("/patch apply"));
    assert_eq!(bridge.session().state(), LifecycleState::Prepared);

    let applied = send(&mut bridge, "/patch apply").await;
    assert!(applied.starts_with("✅ Patch applied & committed: "));
    assert!(applied.contains("Restart: ok=true code=0"));
    assert!(applied.contains("- health: ok=true code=0 attempts=1"));
    assert_eq!(bridge.session().state(), LifecycleState::Empty);
    assert_eq!(commit_subjects(&repo)[0], "feat: add ping endpoint");
}

#[tokio::test]
async fn test_patch_errors_are_replies() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::new(["not json".to_string()])));

    let reply = send(&mut bridge, "/patch do something").await;
    assert!(reply.starts_with("❌ The AI returned an unusable patch."));

    let reply = send(&mut bridge, "/patch apply").await;
    assert!(reply.starts_with("❌ No pending patch."));

    let reply = send(&mut bridge, "/patch").await;
    assert_eq!(reply, "⛔ Usage: /patch <instruction>");
}

#[tokio::test]
async fn test_patch_cancel() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::new([ping_patch()])));

    let reply = send(&mut bridge, "/patch cancel").await;
    assert!(reply.contains("nothing to cancel"));

    send(&mut bridge, "/patch add a ping endpoint").await;
    let reply = send(&mut bridge, "/patch cancel").await;
    assert!(reply.starts_with("✅ Patch "));
    assert!(reply.ends_with(" cancelled."));
    assert_eq!(bridge.session().state(), LifecycleState::Empty);
}

#[tokio::test]
async fn test_patch_test_reports_checks() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "/patch test").await;
    assert!(reply.starts_with("🧪 Patch tests:"));
    assert!(reply.contains("- health: ok=true"));
    assert!(reply.contains("  out: ok"));
}

#[tokio::test]
async fn test_run_allowed_command() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "/run git rev-parse --is-inside-work-tree").await;
    assert!(reply.starts_with("🛠 CMD: git rev-parse --is-inside-work-tree"));
    assert!(reply.contains("OK: true | CODE: 0 | TIMEOUT: false"));
    assert!(reply.contains("STDOUT:\ntrue"));
}

#[tokio::test]
async fn test_run_blocklist_and_allowlist() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    assert_eq!(send(&mut bridge, "/run rm -rf /").await, "⛔ Command refused.");
    assert_eq!(send(&mut bridge, "/run printenv").await, "⛔ Command refused.");
    assert_eq!(send(&mut bridge, "/run git show HEAD:.env").await, "⛔ Command refused.");

    // not blocked, but not on the allowlist either
    let reply = send(&mut bridge, "/run git push origin main").await;
    assert!(reply.contains("OK: false | CODE: none"));
    assert!(reply.contains("Command not allowed"));
}

#[tokio::test]
async fn test_free_text_advisory_and_throttle() {
    let (_dir, repo) = create_service_repo();
    let advice = r#"Sure: {"intent":"infra","summary":"Memory is fine.","actions":["Check pm2 logs"],"next_step":"Run /patch test."}"#;
    let clock = Arc::new(ManualClock::new());
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::new([advice.to_string()])))
        .with_clock(clock.clone());

    let reply = send(&mut bridge, "how is the service doing").await;
    assert!(reply.starts_with("Memory is fine."));
    assert!(reply.contains("• Check pm2 logs"));

    clock.advance(500);
    assert_eq!(send(&mut bridge, "and now what?").await, "⏳ Wait 2 seconds.");

    clock.advance(2500);
    assert!(send(&mut bridge, "hey").await.starts_with("👋"));
}

#[tokio::test]
async fn test_free_text_fallback_when_model_fails() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, "summarize the last deploy").await;
    assert!(reply.contains("advisory service failed"));
}

#[tokio::test]
async fn test_replies_fit_transport_limit() {
    let (_dir, repo) = create_service_repo();
    let mut bridge = bridge(&repo, Arc::new(ScriptedClient::failing()));

    let reply = send(&mut bridge, &format!("/run echo {}", "y".repeat(6000))).await;
    assert!(reply.chars().count() <= MAX_REPLY_CHARS);
}
