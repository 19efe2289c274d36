//! Value types produced and consumed by the reconciliation components.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry
//! invariants (a fingerprint is always 64 lowercase hex characters, a delta's
//! two sets are always disjoint) and participate in reconciliation decisions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MemberId;

// ---------------------------------------------------------------------------
// Content fingerprints
// ---------------------------------------------------------------------------

/// Length of a [`ContentFingerprint`] in hex characters (SHA-256).
pub const FINGERPRINT_LEN: usize = 64;

/// Hex digest of a byte payload.
///
/// Used only as an equality key: the digest is stored in the caller's state
/// snapshot in place of the file content and compared on the next apply. It is
/// never decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// The all-zero digest stored before a fingerprint has ever been computed.
    ///
    /// It compares unequal to every real digest, so a resource carrying it is
    /// always considered drifted.
    pub fn never_computed() -> Self {
        Self("0".repeat(FINGERPRINT_LEN))
    }

    /// Parses a previously stored digest.
    ///
    /// Returns `None` unless `value` is exactly 64 hex characters. Upper-case
    /// input is normalised to lower case.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() == FINGERPRINT_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(value.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Returns the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the [`ContentFingerprint::never_computed`] sentinel.
    pub fn is_never_computed(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored digest that is not 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid content fingerprint '{0}': expected 64 hex characters")]
pub struct InvalidFingerprint(pub String);

impl TryFrom<String> for ContentFingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidFingerprint(value))
    }
}

impl From<ContentFingerprint> for String {
    fn from(fingerprint: ContentFingerprint) -> Self {
        fingerprint.0
    }
}

/// Outcome of comparing a stored fingerprint with a freshly computed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The content is byte-for-byte the same as at the last apply.
    Unchanged,
    /// The content changed (or was never fingerprinted); the resource must be
    /// recreated.
    Changed {
        /// Digest recorded at the last apply.
        previous: ContentFingerprint,
        /// Digest of the content as declared now.
        current: ContentFingerprint,
    },
}

impl Drift {
    /// Compares `previous` (from state) with `current` (from the declared files).
    pub fn detect(previous: &ContentFingerprint, current: &ContentFingerprint) -> Self {
        if previous == current {
            Self::Unchanged
        } else {
            Self::Changed {
                previous: previous.clone(),
                current: current.clone(),
            }
        }
    }

    /// Compares two ordered digest lists, one per declared file.
    ///
    /// Lists of different length always drift. The reported pair is the first
    /// position that differs, with a missing entry reported as the sentinel.
    pub fn detect_all(previous: &[ContentFingerprint], current: &[ContentFingerprint]) -> Self {
        let len = previous.len().max(current.len());
        for i in 0..len {
            let before = previous
                .get(i)
                .cloned()
                .unwrap_or_else(ContentFingerprint::never_computed);
            let after = current
                .get(i)
                .cloned()
                .unwrap_or_else(ContentFingerprint::never_computed);
            if before != after {
                return Self::Changed {
                    previous: before,
                    current: after,
                };
            }
        }
        Self::Unchanged
    }

    /// Returns `true` if the calling adapter must recreate the resource.
    pub fn requires_replacement(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Additions and removals needed to turn the observed membership into the
/// declared one.
///
/// Computed once per reconciliation and consumed immediately. The two sets are
/// disjoint and iterate in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipDelta {
    to_add: BTreeSet<MemberId>,
    to_remove: BTreeSet<MemberId>,
}

impl MembershipDelta {
    /// Computes `declared − observed` and `observed − declared`.
    ///
    /// Order and duplicates in either input are irrelevant.
    pub fn between<'a>(
        declared: impl IntoIterator<Item = &'a MemberId>,
        observed: impl IntoIterator<Item = &'a MemberId>,
    ) -> Self {
        let declared: BTreeSet<&MemberId> = declared.into_iter().collect();
        let observed: BTreeSet<&MemberId> = observed.into_iter().collect();
        Self {
            to_add: declared
                .difference(&observed)
                .map(|id| (*id).clone())
                .collect(),
            to_remove: observed
                .difference(&declared)
                .map(|id| (*id).clone())
                .collect(),
        }
    }

    /// Members that must be linked.
    pub fn to_add(&self) -> &BTreeSet<MemberId> {
        &self.to_add
    }

    /// Members that must be unlinked.
    pub fn to_remove(&self) -> &BTreeSet<MemberId> {
        &self.to_remove
    }

    /// Returns `true` when declared and observed membership already agree.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Summary of the remote calls one reconciliation made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Links created.
    pub added: usize,
    /// Links that already existed when the add was issued.
    pub already_present: usize,
    /// Links deleted.
    pub removed: usize,
    /// Links (or their targets) that were already gone when the remove was issued.
    pub already_absent: usize,
}

impl ReconcileReport {
    /// Total number of remote calls issued.
    pub fn calls(&self) -> usize {
        self.added + self.already_present + self.removed + self.already_absent
    }
}
