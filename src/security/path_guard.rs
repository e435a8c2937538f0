use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::security::SECRETS_FILE;

/// Directory prefixes no patch may ever read or write
const FORBIDDEN_PREFIXES: &[&str] = &[".git/", "node_modules/", "logs/", "workspace/"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PathError {
    #[error("Empty path")]
    EmptyPath,

    #[error("Path traversal refused: {0}")]
    PathTraversal(String),

    #[error("Absolute path refused: {0}")]
    AbsolutePathRejected(String),

    #[error("Forbidden file path: {0}")]
    ForbiddenPath(String),

    #[error("Outside repo refused: {0}")]
    OutsideRepository(String),
}

/// Resolves operator or model supplied relative paths inside the repository root
///
/// Every read or write triggered by a patch goes through [`PathGuard::resolve`].
#[derive(Debug, Clone)]
pub struct PathGuard {
    repo_root: PathBuf,
    forbidden_prefixes: Vec<String>,
}

impl PathGuard {
    /// Create a guard for the given repository root
    ///
    /// The root is made absolute lexically; it does not have to exist yet.
    pub fn new<P: AsRef<Path>>(repo_root: P) -> Self {
        let root = repo_root.as_ref();
        let repo_root = if root.is_absolute() {
            normalize(root)
        } else {
            let cwd = std::env::current_dir().unwrap_or_default();
            normalize(&cwd.join(root))
        };

        Self {
            repo_root,
            forbidden_prefixes: FORBIDDEN_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Additionally forbid a directory prefix (e.g. a custom scratch dir)
    pub fn forbid_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        if !self.forbidden_prefixes.contains(&prefix) {
            self.forbidden_prefixes.push(prefix);
        }
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Resolve a relative path to an absolute path inside the repository
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        let cleaned = clean_relative(relative)?;

        if self.is_forbidden(&cleaned) {
            return Err(PathError::ForbiddenPath(cleaned));
        }

        let full = normalize(&self.repo_root.join(&cleaned));
        if full == self.repo_root || !full.starts_with(&self.repo_root) {
            return Err(PathError::OutsideRepository(relative.to_string()));
        }

        Ok(full)
    }

    /// Denylist check on an already cleaned relative path
    fn is_forbidden(&self, cleaned: &str) -> bool {
        if cleaned == SECRETS_FILE || cleaned.starts_with(&format!("{}.", SECRETS_FILE)) {
            return true;
        }

        self.forbidden_prefixes.iter().any(|prefix| {
            cleaned.starts_with(prefix.as_str()) || cleaned == prefix.trim_end_matches('/')
        })
    }
}

/// Strip leading `./`, reject empty, traversal and absolute inputs
fn clean_relative(raw: &str) -> Result<String, PathError> {
    let mut cleaned = raw.trim();
    while let Some(rest) = cleaned.strip_prefix("./") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(PathError::EmptyPath);
    }

    if cleaned.contains("..") {
        return Err(PathError::PathTraversal(raw.to_string()));
    }

    if cleaned.starts_with('/') || cleaned.starts_with('\\') || Path::new(cleaned).is_absolute() {
        return Err(PathError::AbsolutePathRejected(raw.to_string()));
    }

    Ok(cleaned.to_string())
}

/// Lexical normalization: drops `.` components and folds `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
