use crate::patch::error::PatchError;

/// One literal-substring edit
///
/// Matching is by exact substring and always targets the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOperation {
    InsertAfter { needle: String, text: String },
    InsertBefore { needle: String, text: String },
    ReplaceOnce { needle: String, text: String },
    Append { text: String },
}

impl PatchOperation {
    /// Wire name of the operation kind
    pub fn kind(&self) -> &'static str {
        match self {
            PatchOperation::InsertAfter { .. } => "insert_after",
            PatchOperation::InsertBefore { .. } => "insert_before",
            PatchOperation::ReplaceOnce { .. } => "replace_once",
            PatchOperation::Append { .. } => "append",
        }
    }

    /// Apply this operation to `content`, producing new content
    ///
    /// `index` is only used to label the error.
    pub fn apply(&self, content: &str, index: usize) -> Result<String, PatchError> {
        let not_found = || PatchError::NoMatchFound {
            index,
            kind: self.kind(),
        };

        match self {
            PatchOperation::InsertAfter { needle, text } => {
                let at = content.find(needle.as_str()).ok_or_else(not_found)? + needle.len();
                Ok(splice(content, at, at, text))
            }
            PatchOperation::InsertBefore { needle, text } => {
                let at = content.find(needle.as_str()).ok_or_else(not_found)?;
                Ok(splice(content, at, at, text))
            }
            PatchOperation::ReplaceOnce { needle, text } => {
                let at = content.find(needle.as_str()).ok_or_else(not_found)?;
                Ok(splice(content, at, at + needle.len(), text))
            }
            PatchOperation::Append { text } => {
                let mut out = String::with_capacity(content.len() + text.len() + 1);
                out.push_str(content);
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(text);
                Ok(out)
            }
        }
    }
}

fn splice(content: &str, start: usize, end: usize, text: &str) -> String {
    let mut out = String::with_capacity(content.len() - (end - start) + text.len());
    out.push_str(&content[..start]);
    out.push_str(text);
    out.push_str(&content[end..]);
    out
}

/// Apply operations in order, each against the output of the previous one
///
/// All-or-nothing: the first failing operation aborts the batch and the
/// caller's content is left untouched.
pub fn apply_operations(
    content: &str,
    operations: &[PatchOperation],
) -> Result<String, PatchError> {
    operations
        .iter()
        .enumerate()
        .try_fold(content.to_string(), |acc, (index, op)| op.apply(&acc, index + 1))
}

/// Line count as the shrink guard sees it (a trailing newline opens a new line)
pub fn line_count(content: &str) -> usize {
    content.split('\n').count()
}

/// Refuse candidates whose line count drops below `min_ratio` of the original
pub fn check_shrink(original: &str, candidate: &str, min_ratio: f64) -> Result<(), PatchError> {
    let original_lines = line_count(original);
    let candidate_lines = line_count(candidate);

    if (candidate_lines as f64) < (original_lines as f64) * min_ratio {
        return Err(PatchError::ShrinkGuardTripped {
            original: original_lines,
            candidate: candidate_lines,
        });
    }

    Ok(())
}
