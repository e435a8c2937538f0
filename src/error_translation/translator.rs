use crate::error::AppError;
use crate::exec::ExecError;
use crate::git::GitOpsError;
use crate::llm::LLMError;
use crate::patch::{LifecycleError, PatchError};
use crate::security::PathError;

#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub simple_message: String,
    pub suggestion: Option<String>,
    pub raw_error: String,
}

impl UserFriendlyError {
    fn new(simple_message: &str, suggestion: Option<&str>, raw_error: String) -> Self {
        Self {
            simple_message: simple_message.to_string(),
            suggestion: suggestion.map(str::to_string),
            raw_error,
        }
    }

    /// Render as an operator reply
    pub fn render(&self) -> String {
        let mut out = format!("❌ {}", self.simple_message);
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\n→ {}", suggestion));
        }
        if self.raw_error != self.simple_message {
            out.push_str(&format!("\n\n{}", self.raw_error));
        }
        out
    }
}

pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Translate an AppError into a user-friendly error message
    pub fn translate_app_error(error: &AppError) -> UserFriendlyError {
        match error {
            AppError::Config(e) => UserFriendlyError::new(
                "Configuration error.",
                Some("Check ~/.config/opsbridge/config.toml or $OPSBRIDGE_CONFIG"),
                e.to_string(),
            ),
            AppError::Llm(e) => Self::translate_llm(e),
            AppError::Patch(e) => Self::translate_patch(e),
            AppError::Path(e) => Self::translate_path(e),
            AppError::Git(e) => Self::translate_git(e),
            AppError::Exec(e) => Self::translate_exec(e),
            AppError::Lifecycle(e) => Self::translate_lifecycle(e),
            AppError::Io(e) => UserFriendlyError::new(
                "I/O error occurred.",
                Some("Check file permissions and disk space"),
                e.to_string(),
            ),
        }
    }

    pub fn translate_lifecycle(error: &LifecycleError) -> UserFriendlyError {
        match error {
            LifecycleError::NoPendingPatch => UserFriendlyError::new(
                "No pending patch.",
                Some("Propose one with: /patch <instruction>"),
                error.to_string(),
            ),
            LifecycleError::Cancelled => {
                UserFriendlyError::new("Patch request cancelled.", None, error.to_string())
            }
            LifecycleError::EmptyInstruction => UserFriendlyError::new(
                "Missing patch instruction.",
                Some("Usage: /patch <instruction>"),
                error.to_string(),
            ),
            LifecycleError::Patch(e) => Self::translate_patch(e),
            LifecycleError::Llm(e) => Self::translate_llm(e),
            LifecycleError::Git(e) => Self::translate_git(e),
            LifecycleError::Io(e) => UserFriendlyError::new(
                "I/O error while handling the patch.",
                Some("Check file permissions and disk space"),
                e.to_string(),
            ),
        }
    }

    pub fn translate_patch(error: &PatchError) -> UserFriendlyError {
        let raw = error.to_string();
        match error {
            PatchError::NoMatchFound { .. } | PatchError::MissingMatch { .. } => {
                UserFriendlyError::new(
                    "The proposed edit does not fit the current file.",
                    Some("Retry /patch with a more precise instruction"),
                    raw,
                )
            }
            PatchError::UnsupportedOperation(_)
            | PatchError::EmptyOperations
            | PatchError::NonJsonResponse(_)
            | PatchError::InvalidSchema(_)
            | PatchError::MultiFileRejected(_) => UserFriendlyError::new(
                "The AI returned an unusable patch.",
                Some("Retry /patch; ask for a single-file, minimal change"),
                raw,
            ),
            PatchError::ShrinkGuardTripped { .. } => UserFriendlyError::new(
                "Refused: the edit would delete too much of the file.",
                Some("Ask for a smaller, additive change"),
                raw,
            ),
            PatchError::FileNotAllowlisted(_) => UserFriendlyError::new(
                "That file may not be patched.",
                Some("Only the configured patch.allowed_files can be edited"),
                raw,
            ),
            PatchError::FileNotFound(_) | PatchError::FileTooLarge { .. } => {
                UserFriendlyError::new("The target file cannot be patched.", None, raw)
            }
            PatchError::DiffPreviewFailed(_) => UserFriendlyError::new(
                "Could not render the diff preview.",
                Some("Check that git is installed and the scratch directory is writable"),
                raw,
            ),
            PatchError::Path(e) => Self::translate_path(e),
            PatchError::Io(_) => UserFriendlyError::new(
                "I/O error while preparing the patch.",
                Some("Check file permissions and disk space"),
                raw,
            ),
        }
    }

    pub fn translate_path(error: &PathError) -> UserFriendlyError {
        UserFriendlyError::new(
            "Refused: the path is not allowed.",
            Some("Use a plain relative path inside the repository"),
            error.to_string(),
        )
    }

    pub fn translate_llm(error: &LLMError) -> UserFriendlyError {
        let raw = error.to_string();
        match error {
            LLMError::MissingApiKey(_) => UserFriendlyError::new(
                "No API key configured.",
                Some("Set the API key environment variable and restart"),
                raw,
            ),
            LLMError::RateLimitExceeded(_) => UserFriendlyError::new(
                "Too many AI requests.",
                Some("Wait a minute and retry"),
                raw,
            ),
            LLMError::Timeout => UserFriendlyError::new(
                "The AI did not answer in time.",
                Some("Retry in a moment"),
                raw,
            ),
            _ => UserFriendlyError::new(
                "Error communicating with the AI service.",
                Some("Check your API key, model name and network connection"),
                raw,
            ),
        }
    }

    pub fn translate_exec(error: &ExecError) -> UserFriendlyError {
        let raw = error.to_string();
        match error {
            ExecError::ExecutionDenied(_) => UserFriendlyError::new(
                "Command not allowed.",
                Some("Only allowlisted commands and subcommands can run"),
                raw,
            ),
            ExecError::ExecutionTimeout(_) => {
                UserFriendlyError::new("Command timed out and was killed.", None, raw)
            }
            ExecError::ExecutionFailed { stderr, .. } => {
                let (simple, suggestion) = Self::match_git_patterns(stderr);
                UserFriendlyError {
                    simple_message: simple.unwrap_or_else(|| "Command failed.".to_string()),
                    suggestion,
                    raw_error: raw,
                }
            }
        }
    }

    pub fn translate_git(error: &GitOpsError) -> UserFriendlyError {
        let raw = error.to_string();
        let (matched, suggestion) = Self::match_git_patterns(&raw);
        let fallback = match error {
            GitOpsError::StageFailed(_) => "Staging changes failed.",
            GitOpsError::CommitFailed(_) => "Commit failed.",
            GitOpsError::NotARepository(_) => "Not a git repository.",
        };

        UserFriendlyError {
            simple_message: matched.unwrap_or_else(|| fallback.to_string()),
            suggestion,
            raw_error: raw,
        }
    }

    /// Match common git error patterns and provide user-friendly messages
    fn match_git_patterns(error_text: &str) -> (Option<String>, Option<String>) {
        let lower = error_text.to_lowercase();

        let matched: Option<(&str, Option<&str>)> =
            if lower.contains("nothing to commit") || lower.contains("working tree clean") {
                Some(("No changes to commit - working directory is clean.", None))
            } else if lower.contains("not a git repository") {
                Some((
                    "The configured repository root is not a git repository.",
                    Some("Check repo.root in the config"),
                ))
            } else if lower.contains("please tell me who you are")
                || lower.contains("unable to auto-detect email")
            {
                Some((
                    "Git has no author identity configured.",
                    Some("Set user.name and user.email in the repository's git config"),
                ))
            } else if lower.contains("index.lock") {
                Some((
                    "Another git process holds the repository lock.",
                    Some("Wait for it to finish or remove .git/index.lock"),
                ))
            } else if lower.contains("merge conflict") || lower.contains("conflict") {
                Some((
                    "Merge has conflicts that need to be resolved.",
                    Some("Fix conflicts in the listed files, then commit."),
                ))
            } else if lower.contains("would be overwritten") {
                Some((
                    "Operation would overwrite uncommitted changes.",
                    Some("Commit the pending changes first"),
                ))
            } else if lower.contains("authentication failed") || lower.contains("permission denied") {
                Some((
                    "Authentication failed - check your credentials.",
                    Some("Verify your SSH keys or personal access token."),
                ))
            } else {
                None
            };

        match matched {
            Some((message, suggestion)) => {
                (Some(message.to_string()), suggestion.map(str::to_string))
            }
            None => (None, None),
        }
    }
}
