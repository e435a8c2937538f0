use std::io;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::ConfigError;
use crate::exec::ExecError;
use crate::git::GitOpsError;
use crate::llm::LLMError;
use crate::patch::{LifecycleError, PatchError};
use crate::security::PathError;

/// Top-level application error that wraps all module-specific errors
///
/// This provides a unified error type for application-level code while preserving
/// the specific error context from each module. All module errors automatically
/// convert to AppError via the `From` trait.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Git error: {0}")]
    Git(#[from] GitOpsError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    /// Flatten lifecycle wrappers so callers can match on the root cause
    pub fn into_root(self) -> Self {
        match self {
            AppError::Lifecycle(LifecycleError::Patch(PatchError::Path(e))) => AppError::Path(e),
            AppError::Lifecycle(LifecycleError::Patch(e)) => AppError::Patch(e),
            AppError::Lifecycle(LifecycleError::Llm(e)) => AppError::Llm(e),
            AppError::Lifecycle(LifecycleError::Git(e)) => AppError::Git(e),
            AppError::Lifecycle(LifecycleError::Io(e)) => AppError::Io(e),
            AppError::Patch(PatchError::Path(e)) => AppError::Path(e),
            other => other,
        }
    }
}

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_root_unwraps_lifecycle() {
        let err: AppError = LifecycleError::Patch(PatchError::Path(PathError::PathTraversal(
            "../x".to_string(),
        )))
        .into();
        assert!(matches!(err.into_root(), AppError::Path(PathError::PathTraversal(_))));

        let err: AppError = LifecycleError::Llm(LLMError::Timeout).into();
        assert!(matches!(err.into_root(), AppError::Llm(LLMError::Timeout)));
    }

    #[test]
    fn test_into_root_keeps_lifecycle_only_variants() {
        let err: AppError = LifecycleError::NoPendingPatch.into();
        assert!(matches!(
            err.into_root(),
            AppError::Lifecycle(LifecycleError::NoPendingPatch)
        ));
    }

    #[test]
    fn test_question_mark_conversion() {
        fn load() -> AppResult<()> {
            Err(ConfigError::DirectoryNotFound)?
        }
        assert!(matches!(load(), Err(AppError::Config(_))));
    }
}
