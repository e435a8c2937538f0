use crate::security::PathError;
use std::io;
use thiserror::Error;

/// Errors raised while validating, applying or previewing a patch
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("match not found for {kind} (operation {index})")]
    NoMatchFound { index: usize, kind: &'static str },

    #[error("{kind} requires match (operation {index})")]
    MissingMatch { index: usize, kind: &'static str },

    #[error("Unsupported op: {0}")]
    UnsupportedOperation(String),

    #[error("No ops provided.")]
    EmptyOperations,

    #[error("Refused: file too much smaller (orig={original}, new={candidate}).")]
    ShrinkGuardTripped { original: usize, candidate: usize },

    #[error("AI returned non-JSON. Raw: {0}")]
    NonJsonResponse(String),

    #[error("AI returned JSON that does not match the patch schema: {0}")]
    InvalidSchema(String),

    #[error("Patch must target exactly 1 file (got {0}).")]
    MultiFileRejected(usize),

    #[error("File is not on the patch allowlist: {0}")]
    FileNotAllowlisted(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File too large: {path} ({bytes} bytes)")]
    FileTooLarge { path: String, bytes: u64 },

    #[error("Diff preview failed: {0}")]
    DiffPreviewFailed(String),

    #[error("{0}")]
    Path(#[from] PathError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
