pub mod allowlist;
pub mod path_guard;

pub use allowlist::{CommandAllowlist, is_run_blocked};
pub use path_guard::{PathError, PathGuard};

/// Binaries the executor may spawn, each with the first arguments it accepts
///
/// An empty list means any arguments are accepted. This table is shared by the
/// executor (spawn gate), the `/run` surface and the verification probes so
/// that every path into a child process agrees on the same policy.
///
/// Adding a new entry requires careful security review.
pub const DEFAULT_ALLOWLIST: &[(&str, &[&str])] = &[
    ("node", &["-v", "--version"]),
    ("npm", &["ci", "install", "test", "run", "start", "audit"]),
    (
        "git",
        &[
            // Read operations
            "status",
            "diff",
            "log",
            "show",
            "rev-parse",
            "branch",
            // Write operations
            "add",
            "commit",
            "checkout",
            "reset",
            // Remote operations
            "pull",
        ],
    ),
    (
        "pm2",
        &["status", "list", "restart", "reload", "logs", "save", "describe"],
    ),
    // Health probes only
    ("curl", &[]),
];

/// Binaries refused by `/run` before the allowlist is even consulted
pub const BLOCKED_RUN_COMMANDS: &[&str] = &[
    "rm", "shutdown", "reboot", "mkfs", "dd", "kill", "pkill", "poweroff", "chmod", "chown",
    "printenv", "env",
];

/// Name of the repository's secrets file; it and its `.env.*` variants are never readable
pub const SECRETS_FILE: &str = ".env";
