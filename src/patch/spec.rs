use crate::patch::error::PatchError;
use crate::patch::ops::PatchOperation;
use serde::Deserialize;

pub const MAX_COMMIT_MESSAGE_CHARS: usize = 80;
pub const MAX_NOTES_CHARS: usize = 220;
pub const DEFAULT_COMMIT_MESSAGE: &str = "feat: apply patch";

/// How much of an unparsable response is echoed back in errors
const RAW_PREVIEW_CHARS: usize = 250;

/// Patch proposal exactly as the generative collaborator sends it
#[derive(Debug, Deserialize)]
struct RawPatchSpec {
    #[serde(default)]
    commit_message: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    files: Vec<RawFileEdit>,
}

#[derive(Debug, Deserialize)]
struct RawFileEdit {
    #[serde(default)]
    path: String,
    #[serde(default)]
    ops: Vec<RawOperation>,
}

#[derive(Debug, Deserialize)]
struct RawOperation {
    #[serde(default)]
    op: String,
    #[serde(default, rename = "match")]
    needle: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl RawOperation {
    fn into_operation(self, index: usize) -> Result<PatchOperation, PatchError> {
        let text = self.text.unwrap_or_default();
        let kind = self.op.trim();

        let require_match = |kind: &'static str, needle: Option<String>| match needle {
            Some(n) if !n.is_empty() => Ok(n),
            _ => Err(PatchError::MissingMatch { index, kind }),
        };

        match kind {
            "insert_after" => Ok(PatchOperation::InsertAfter {
                needle: require_match("insert_after", self.needle)?,
                text,
            }),
            "insert_before" => Ok(PatchOperation::InsertBefore {
                needle: require_match("insert_before", self.needle)?,
                text,
            }),
            "replace_once" => Ok(PatchOperation::ReplaceOnce {
                needle: require_match("replace_once", self.needle)?,
                text,
            }),
            "append" => Ok(PatchOperation::Append { text }),
            other => Err(PatchError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// A validated single-file patch proposal
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSpec {
    /// Repository-relative target, not yet resolved
    pub path: String,
    pub operations: Vec<PatchOperation>,
    pub commit_message: String,
    pub notes: String,
}

impl PatchSpec {
    /// Parse and validate a proposal from raw model output
    ///
    /// Anything that is not strict JSON of the expected shape is rejected here,
    /// before it can reach the patch engine.
    pub fn parse(raw: &str) -> Result<Self, PatchError> {
        let cleaned = strip_code_fence(raw);

        let value: serde_json::Value = serde_json::from_str(cleaned)
            .map_err(|_| PatchError::NonJsonResponse(truncate_chars(cleaned, RAW_PREVIEW_CHARS)))?;

        let raw_spec: RawPatchSpec = serde_json::from_value(value)
            .map_err(|e| PatchError::InvalidSchema(e.to_string()))?;

        Self::try_from(raw_spec)
    }
}

impl TryFrom<RawPatchSpec> for PatchSpec {
    type Error = PatchError;

    fn try_from(raw: RawPatchSpec) -> Result<Self, Self::Error> {
        let commit_message = raw
            .commit_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
        let notes = raw.notes.unwrap_or_default();

        if raw.files.len() != 1 {
            return Err(PatchError::MultiFileRejected(raw.files.len()));
        }

        let Some(file) = raw.files.into_iter().next() else {
            return Err(PatchError::MultiFileRejected(0));
        };

        if file.ops.is_empty() {
            return Err(PatchError::EmptyOperations);
        }

        let operations = file
            .ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| op.into_operation(i + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: file.path.trim().to_string(),
            operations,
            commit_message: truncate_chars(&commit_message, MAX_COMMIT_MESSAGE_CHARS),
            notes: truncate_chars(notes.trim(), MAX_NOTES_CHARS),
        })
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any
fn strip_code_fence(response: &str) -> &str {
    let mut cleaned = response.trim();

    if cleaned.starts_with("```") {
        // Remove opening ```json or ```
        if let Some(first_newline) = cleaned.find('\n') {
            cleaned = &cleaned[first_newline + 1..];
        }
        // Remove closing ```
        if let Some(last_backticks) = cleaned.rfind("```") {
            cleaned = &cleaned[..last_backticks];
        }
        cleaned = cleaned.trim();
    }

    cleaned
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
