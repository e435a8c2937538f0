use crate::llm::client::{GenerativeClient, LLMError, Prompt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Current content of a file the model may edit
#[derive(Debug, Clone)]
pub struct FileContext {
    pub path: String,
    pub content: String,
}

/// Asks the generative collaborator for a structured patch proposal
///
/// Every request is bounded by a timeout and can be aborted through a
/// cancellation token; neither outcome touches any lifecycle state.
#[derive(Clone)]
pub struct PatchPlanner {
    client: Arc<dyn GenerativeClient>,
    timeout: Duration,
}

impl PatchPlanner {
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

    /// Build the system + user prompt for an instruction
    pub fn build_prompt(
        instruction: &str,
        allowed_files: &[String],
        files: &[FileContext],
    ) -> Prompt {
        let system = [
            "Return ONLY valid JSON. No markdown. No extra text.",
            "You are a coding agent. You MUST NOT output a diff.",
            "You must output JSON instructions for minimal edits.",
            "",
            "STRICT RULES:",
            format!("1) Only modify these files: {}", allowed_files.join(", ")).as_str(),
            "2) Use ops: insert_after | insert_before | replace_once | append",
            "3) match must be an exact substring present in the file content",
            "4) Keep changes minimal; do NOT delete/replace large chunks",
            "5) Target exactly one file",
            "",
            "JSON schema:",
            "{",
            "  \"commit_message\": \"<= 80 chars\",",
            "  \"notes\": \"short\",",
            "  \"files\": [",
            "    { \"path\": \"<file>\", \"ops\": [",
            "        {\"op\":\"insert_after\",\"match\":\"...\",\"text\":\"...\"}",
            "    ] }",
            "  ]",
            "}",
        ]
        .join("\n");

        let mut user = format!("INSTRUCTION:\n{}\n\nCURRENT FILE CONTENTS:\n", instruction.trim());
        for file in files {
            user.push_str(&format!("FILE: {}\n-----\n{}\n-----\n", file.path, file.content));
        }

        Prompt::new(system, user)
    }

    /// Send the prompt, bounded by the timeout and the cancellation token
    pub async fn request(
        &self,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> Result<String, LLMError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LLMError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.client.complete(prompt)) => {
                outcome.map_err(|_| LLMError::Timeout)?
            }
        }
    }
}
