pub mod runner;

pub use runner::{
    DEFAULT_ATTEMPTS, DEFAULT_SPACING, Probe, VerificationCheck, VerificationReport,
    VerificationRunner, default_probes,
};
