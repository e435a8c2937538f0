pub mod error;
pub mod lifecycle;
pub mod ops;
pub mod preview;
pub mod spec;

pub use error::PatchError;
pub use lifecycle::{
    ApplyReport, CancelOutcome, Clock, IdGenerator, LifecycleError, LifecycleState, PatchLifecycle,
    PatchPolicy, PatchSession, PendingPatch, RandomIds, SystemClock,
};
pub use ops::{PatchOperation, apply_operations, check_shrink, line_count};
pub use preview::{DiffPreviewer, Preview, Snapshots};
pub use spec::PatchSpec;
