//! Set reconciliation for many-to-many association links.
//!
//! [`reconcile`] makes the remote membership of one entity match the declared
//! membership by issuing one add per missing member and one remove per extra
//! member. "Already a member" and "already absent" outcomes count as success,
//! which makes a reconciliation that failed halfway safe to re-run with the
//! same inputs. Nothing is rolled back.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{MemberId, MembershipDelta, ReconcileReport, TransportError};

/// Remote operations that link and unlink one entity's members.
#[async_trait]
pub trait MembershipOps: Send + Sync {
    /// Human-readable description of the association set (for errors and logs).
    fn scope(&self) -> String;

    /// Creates the link to `member`.
    async fn add(&self, member: &MemberId, cancel: &CancellationToken) -> Result<(), TransportError>;

    /// Deletes the link to `member`.
    async fn remove(&self, member: &MemberId, cancel: &CancellationToken)
        -> Result<(), TransportError>;
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Add,
    Remove,
}

impl fmt::Display for MembershipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// A reconciliation stopped at the first non-normalisable failure.
///
/// Changes applied before the failure stay applied; `applied` counts them.
#[derive(Debug, Error)]
#[error("failed to {change} {member} in {scope}: {source}")]
pub struct ReconcileError {
    /// The operation that failed.
    pub change: MembershipChange,
    /// The member it failed for.
    pub member: MemberId,
    /// The association set being reconciled.
    pub scope: String,
    /// Changes that succeeded before the failure.
    pub applied: ReconcileReport,
    #[source]
    pub source: TransportError,
}

/// Applies the delta between `declared` and `observed` membership through `ops`.
///
/// Additions run before removals, each in sorted member order. An add that
/// fails with [`TransportError::is_already_member`] and a remove that fails
/// with [`TransportError::NotFound`] are counted as no-ops. Any other failure
/// is returned immediately with the offending member.
#[instrument(skip_all, fields(scope = %ops.scope(), declared = declared.len(), observed = observed.len()))]
pub async fn reconcile<O>(
    declared: &[MemberId],
    observed: &[MemberId],
    ops: &O,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, ReconcileError>
where
    O: MembershipOps + ?Sized,
{
    let delta = MembershipDelta::between(declared, observed);
    apply(&delta, ops, cancel).await
}

/// Applies a precomputed [`MembershipDelta`] through `ops`.
pub async fn apply<O>(
    delta: &MembershipDelta,
    ops: &O,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, ReconcileError>
where
    O: MembershipOps + ?Sized,
{
    let mut report = ReconcileReport::default();
    if delta.is_empty() {
        debug!("membership already converged");
        return Ok(report);
    }

    let fail = |change, member: &MemberId, report: ReconcileReport, source| ReconcileError {
        change,
        member: member.clone(),
        scope: ops.scope(),
        applied: report,
        source,
    };

    for member in delta.to_add() {
        if cancel.is_cancelled() {
            return Err(fail(MembershipChange::Add, member, report, TransportError::cancelled("reconcile")));
        }
        match ops.add(member, cancel).await {
            Ok(()) => report.added += 1,
            Err(err) if err.is_already_member() => {
                debug!(%member, "already a member");
                report.already_present += 1;
            }
            Err(err) => {
                warn!(%member, error = %err, "failed to add member");
                return Err(fail(MembershipChange::Add, member, report, err));
            }
        }
    }

    for member in delta.to_remove() {
        if cancel.is_cancelled() {
            return Err(fail(MembershipChange::Remove, member, report, TransportError::cancelled("reconcile")));
        }
        match ops.remove(member, cancel).await {
            Ok(()) => report.removed += 1,
            Err(TransportError::NotFound { .. }) => {
                debug!(%member, "already absent");
                report.already_absent += 1;
            }
            Err(err) => {
                warn!(%member, error = %err, "failed to remove member");
                return Err(fail(MembershipChange::Remove, member, report, err));
            }
        }
    }

    info!(
        added = report.added,
        removed = report.removed,
        already_present = report.already_present,
        already_absent = report.already_absent,
        "membership reconciled"
    );
    Ok(report)
}
