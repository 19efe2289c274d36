//! Newtype identifiers for remote objects.
//!
//! The remote platform identifies everything with opaque strings. Each role an
//! identifier plays is a distinct newtype so that a use-case ID can never be
//! passed where an entity ID is expected, even though both are strings on the
//! wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An identifier was empty where a value is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} must not be empty")]
pub struct EmptyIdentifier(pub &'static str);

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and
// serde conversions that go through new().
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier(stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identifies one member of a many-to-many association set.
    ///
    /// For use-case links this is the use-case ID; the entity being linked is
    /// fixed for the whole reconciliation and identified by [`EntityId`].
    MemberId
}

string_id! {
    /// Identifies the remote object whose associations are being reconciled.
    EntityId
}

string_id! {
    /// Identifies an asynchronous remote task, as returned in the `Location`
    /// header of a request that was accepted for background processing.
    StatusId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(MemberId::new("").is_none());
        assert!(StatusId::new(String::new()).is_none());
    }

    #[test]
    fn identifiers_order_lexicographically() {
        let a = MemberId::new("a").unwrap();
        let b = MemberId::new("b").unwrap();
        assert!(a < b);
        assert_eq!(a.to_string(), "a");
    }

    #[test]
    fn identifiers_serialize_as_bare_strings() {
        let id = EntityId::new("65f0c1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"65f0c1\"");
    }

    #[test]
    fn empty_identifiers_are_rejected_on_load() {
        let err = serde_json::from_str::<MemberId>("\"\"").unwrap_err();
        assert!(err.to_string().contains("MemberId must not be empty"));
        let id: StatusId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
    }
}
