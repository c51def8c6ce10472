//! Failure digest & regression engine: deterministic, budget-bounded.
//!
//! Turns one test run's artifacts into compact outputs: stable failure
//! fingerprints, bounded and redacted digests of a failing case's event log,
//! diffs between two fingerprint sets or two digests, and a regression gate.
//!
//! No DB, no network; pure computation plus file reads/writes the caller asks for.

pub mod codeframe;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod fingerprint;
pub mod gate;
pub mod hint;
pub mod normalize;
pub mod rank;
pub mod records;
pub mod redact;
pub mod report;
pub mod rules;
pub mod trends;
pub mod types;

pub use config::DigestConfig;
pub use diff::{compare_digests, compare_fingerprints, DigestDiff};
pub use engine::{CaseInput, DigestEngine};
pub use error::EngineError;
pub use extract::extract_failure_info;
pub use gate::{GatePolicy, GateVerdict};
pub use normalize::{normalize_path, NormalizeOptions};
pub use types::{Digest, DiffResult, FailureInfo, Fingerprint, FingerprintRecord};
