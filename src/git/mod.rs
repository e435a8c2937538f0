pub mod ops;

pub use ops::{CommitOutcome, GitOps, GitOpsError, discover_root};
