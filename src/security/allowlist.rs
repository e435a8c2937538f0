use std::collections::{HashMap, HashSet};

use crate::security::{BLOCKED_RUN_COMMANDS, DEFAULT_ALLOWLIST, SECRETS_FILE};

/// Decides whether a command and its argument vector may ever be spawned
///
/// A command missing from the table is always denied. A command mapped to an
/// empty set accepts any arguments; otherwise the first argument must be one of
/// the permitted subcommands.
#[derive(Debug, Clone, Default)]
pub struct CommandAllowlist {
    entries: HashMap<String, HashSet<String>>,
}

impl CommandAllowlist {
    /// Create an allowlist that denies everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the allowlist from the shared default policy
    pub fn with_defaults() -> Self {
        let mut allowlist = Self::new();
        for (command, first_args) in DEFAULT_ALLOWLIST {
            allowlist.allow(*command, first_args.iter().copied());
        }
        allowlist
    }

    /// Permit `command` with the given first arguments (none = any arguments)
    pub fn allow<I, S>(&mut self, command: impl Into<String>, first_args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            command.into(),
            first_args.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Check a command against the table
    pub fn is_allowed<S: AsRef<str>>(&self, command: &str, args: &[S]) -> bool {
        let Some(permitted) = self.entries.get(command) else {
            return false;
        };

        if permitted.is_empty() {
            return true;
        }

        match args.first() {
            Some(first) => permitted.contains(first.as_ref()),
            None => false,
        }
    }

    /// Whether the command has any entry at all
    pub fn knows(&self, command: &str) -> bool {
        self.entries.contains_key(command)
    }
}

/// Operator-facing `/run` filter applied before the allowlist
///
/// Refuses destructive or environment-dumping binaries outright, and any
/// invocation that names the secrets file anywhere in its argument vector.
pub fn is_run_blocked<S: AsRef<str>>(command: &str, args: &[S]) -> bool {
    if command.trim().is_empty() {
        return true;
    }

    if BLOCKED_RUN_COMMANDS.contains(&command) {
        return true;
    }

    command.contains(SECRETS_FILE) || args.iter().any(|a| a.as_ref().contains(SECRETS_FILE))
}
