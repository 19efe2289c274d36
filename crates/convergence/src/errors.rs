//! Error taxonomy shared by every reconciliation component.
//!
//! [`TransportError`] is the closed set of outcomes a remote call can fail
//! with. Component-level errors ([`crate::PollError`], [`crate::ReconcileError`],
//! [`crate::FingerprintError`]) are defined next to the component that
//! produces them and wrap a [`TransportError`] as their `source()` where one is
//! involved. [`find_transport_error`] recovers it through any depth of wrapping.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed cause carried inside a [`TransportError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Message fragments the remote API uses when a link being created already
/// exists. Consulted only when the response carries no conflict status.
const ALREADY_MEMBER_PHRASES: &[&str] = &["already linked", "already a member", "already exists"];

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Classified failure of a remote call.
///
/// Exactly one variant is active. Callers are expected to `match` on it rather
/// than inspect the message text:
///
/// - [`TransportError::NotFound`] usually means "already deleted" (idempotent
///   delete) or "drop from local state" (idempotent read).
/// - [`TransportError::Unauthorized`] is never retried.
/// - [`TransportError::Generic`] covers everything else; its message embeds the
///   method, URL, status, and a truncated response body.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote object does not exist (HTTP 404).
    #[error("{resource} not found")]
    NotFound {
        /// URL or description of the missing object.
        resource: String,
        /// Underlying failure, when this error wraps another.
        #[source]
        cause: Option<BoxError>,
    },

    /// The credential was rejected or lacks the required scope (HTTP 401).
    #[error("access denied to {resource}")]
    Unauthorized {
        /// URL or description of the object that was refused.
        resource: String,
        /// Underlying failure, when this error wraps another.
        #[source]
        cause: Option<BoxError>,
    },

    /// Malformed input, unexpected status, or connection-level failure.
    #[error("{message}")]
    Generic {
        /// Diagnostic message sufficient to reconstruct the failing call.
        message: String,
        /// HTTP status of the response, if one was received.
        status: Option<u16>,
        /// Underlying failure (serialization, I/O, cancellation, ...).
        #[source]
        cause: Option<BoxError>,
    },
}

impl TransportError {
    /// Creates a [`TransportError::NotFound`] for `resource`.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            cause: None,
        }
    }

    /// Wraps `cause` in a [`TransportError::NotFound`].
    pub fn wrap_not_found(resource: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            cause: Some(cause.into()),
        }
    }

    /// Creates a [`TransportError::Unauthorized`] for `resource`.
    pub fn unauthorized(resource: impl Into<String>) -> Self {
        Self::Unauthorized {
            resource: resource.into(),
            cause: None,
        }
    }

    /// Wraps `cause` in a [`TransportError::Unauthorized`].
    pub fn wrap_unauthorized(resource: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Unauthorized {
            resource: resource.into(),
            cause: Some(cause.into()),
        }
    }

    /// Creates a [`TransportError::Generic`] with no status and no cause.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    /// Creates a [`TransportError::Generic`] for a response with `status`.
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Generic {
            message: message.into(),
            status: Some(status),
            cause: None,
        }
    }

    /// Wraps `cause` in a [`TransportError::Generic`].
    pub fn wrap_generic(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Generic {
            message: message.into(),
            status: None,
            cause: Some(cause.into()),
        }
    }

    /// Creates the error returned when a call is abandoned through its
    /// cancellation token.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::wrap_generic(format!("{} cancelled", operation.into()), Cancelled)
    }

    /// HTTP status of the failed response, where one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Unauthorized { .. } => Some(401),
            Self::Generic { status, .. } => *status,
        }
    }

    /// Returns `true` for [`TransportError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`TransportError::Unauthorized`].
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if the call was abandoned through its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = StdError::source(self);
        while let Some(err) = current {
            if err.is::<Cancelled>() {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Returns `true` if this failure means "the link being created already
    /// exists".
    ///
    /// A 409 status decides on its own. Otherwise the remote API signals the
    /// condition only through the response text, so a fixed set of phrases is
    /// consulted.
    pub fn is_already_member(&self) -> bool {
        match self {
            Self::Generic {
                status: Some(409), ..
            } => true,
            Self::Generic { message, .. } => {
                let message = message.to_ascii_lowercase();
                ALREADY_MEMBER_PHRASES
                    .iter()
                    .any(|phrase| message.contains(phrase))
            }
            Self::NotFound { .. } | Self::Unauthorized { .. } => false,
        }
    }
}

/// Marker cause attached to errors produced by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Walks the `source()` chain of `err`, starting with `err` itself, and
/// returns the first [`TransportError`] found.
///
/// ```
/// use convergence::{find_transport_error, TransportError};
///
/// let err = TransportError::not_found("/datasets/1/");
/// assert!(find_transport_error(&err).is_some_and(TransportError::is_not_found));
/// ```
pub fn find_transport_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a TransportError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<TransportError>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}
