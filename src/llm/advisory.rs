use crate::llm::client::{GenerativeClient, Prompt};
use crate::llm::planner::DEFAULT_GENERATION_TIMEOUT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const MAX_ACTIONS: usize = 6;

const DEFAULT_INTENT: &str = "general";
const DEFAULT_SUMMARY: &str = "Received.";
const DEFAULT_NEXT_STEP: &str = "Tell me your goal and I will lay out the plan.";

/// General advisory answer for free-text operator messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub intent: String,
    pub summary: String,
    pub actions: Vec<String>,
    pub next_step: String,
}

impl Advisory {
    /// Fill defaults and cap the action list from loosely shaped JSON
    pub fn normalize(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let actions = value
            .get("actions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(MAX_ACTIONS)
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            intent: text("intent").unwrap_or_else(|| DEFAULT_INTENT.to_string()),
            summary: text("summary").unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            actions,
            next_step: text("next_step").unwrap_or_else(|| DEFAULT_NEXT_STEP.to_string()),
        }
    }

    fn fallback(summary: &str, actions: &[&str], next_step: &str) -> Self {
        Self {
            intent: DEFAULT_INTENT.to_string(),
            summary: summary.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            next_step: next_step.to_string(),
        }
    }

    /// Render as an operator reply
    pub fn render(&self) -> String {
        let mut lines = vec![self.summary.clone(), String::new(), "Actions:".to_string()];
        if self.actions.is_empty() {
            lines.push("-".to_string());
        } else {
            lines.extend(self.actions.iter().map(|a| format!("• {}", a)));
        }
        lines.push(String::new());
        lines.push(format!("Next: {}", self.next_step));
        lines.join("\n")
    }
}

/// Lenient JSON extraction: the whole text, else the outermost `{...}` slice
pub fn safe_json_parse(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Some(value);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<Value>(&raw[start..=end]).ok()
}

/// Answers free-text operator messages; never fails
#[derive(Clone)]
pub struct Advisor {
    client: Arc<dyn GenerativeClient>,
    timeout: Duration,
}

impl Advisor {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_prompt(text: &str) -> Prompt {
        let system = [
            "You are the operations advisor for a small self-hosted service.",
            "Style: direct, concrete, no filler.",
            "",
            "IMPORTANT: Reply ONLY with valid JSON. No markdown. No text outside the JSON.",
            "Strict schema:",
            "{ \"intent\":\"infra|patch|git|general\", \"summary\":\"string\", \"actions\":[\"string\"], \"next_step\":\"string\" }",
            "",
            "Rules:",
            "- summary: 1-2 sentences.",
            "- actions: 0 to 6 concrete steps, measurable where possible.",
            "- next_step: one immediate, short action.",
        ]
        .join("\n");

        Prompt::new(system, format!("Message:\n{}", text.trim()))
    }

    pub async fn advise(&self, text: &str) -> Advisory {
        let prompt = Self::build_prompt(text);

        let raw = match tokio::time::timeout(self.timeout, self.client.complete(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "advisory request failed");
                return Advisory::fallback(
                    "The advisory service failed (key, model, quota or network).",
                    &[
                        "Check that the API key is set and valid.",
                        "Check the configured model name.",
                        "Check quota and billing if applicable.",
                        "Read the service logs for the failing request.",
                    ],
                    "Open the logs and look for the advisory error line.",
                );
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "advisory request timed out");
                return Advisory::fallback(
                    "The advisory service did not answer in time.",
                    &["Retry in a moment."],
                    "Resend the question.",
                );
            }
        };

        info!(raw_preview = %raw.chars().take(500).collect::<String>(), "advisory response");

        match safe_json_parse(&raw) {
            Some(value) => Advisory::normalize(&value),
            None => Advisory::fallback(
                "The advisory answer was not valid JSON.",
                &["Tighten the prompt or force strict JSON output on the model side."],
                "Retry with a more precise question (context + constraint).",
            ),
        }
    }
}
