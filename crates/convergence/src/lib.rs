//! Reconciliation core for declaratively managed machine-learning platform
//! resources.
//!
//! This crate contains the parts of convergence that do not depend on how the
//! remote API is reached: the error taxonomy every remote call is classified
//! into, the readiness poller, the association-set reconciler, and the content
//! fingerprinter used for drift detection. The `transport` crate supplies the
//! HTTP client and implements the [`Probe`] and [`MembershipOps`] ports
//! defined here.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No network I/O happens in this crate.
//! It defines *what* is needed; the transport crate defines *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`MemberId`, `EntityId`, `StatusId`) |
//! | [`types`] | Value types (`ContentFingerprint`, `Drift`, `MembershipDelta`, `ReconcileReport`) |
//! | [`errors`] | `TransportError` taxonomy and cause-chain lookup |
//! | [`poller`] | `Poller`, `Probe`, `Readiness` |
//! | [`membership`] | `reconcile`, `MembershipOps` |
//! | [`fingerprint`] | SHA-256 content fingerprints for files and directories |

pub mod errors;
pub mod fingerprint;
pub mod identifiers;
pub mod membership;
pub mod poller;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{find_transport_error, BoxError, Cancelled, TransportError};
pub use fingerprint::{
    fingerprint, fingerprint_directory, fingerprint_file, fingerprint_files, fingerprint_reader,
    FingerprintError,
};
pub use identifiers::{EmptyIdentifier, EntityId, MemberId, StatusId};
pub use membership::{reconcile, MembershipChange, MembershipOps, ReconcileError};
pub use poller::{
    PollError, Poller, PollerConfig, Probe, ProbeFailure, Readiness, DEFAULT_TIMEOUT_MINUTES,
};
pub use types::{
    ContentFingerprint, Drift, InvalidFingerprint, MembershipDelta, ReconcileReport, FINGERPRINT_LEN,
};

// Re-exported so callers do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
