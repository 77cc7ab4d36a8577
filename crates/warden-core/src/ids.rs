//! Newtype identifiers.
//!
//! `ClientIdentity` partitions rate-limit state; `ConversationId` keys the
//! conversation store. Neither is generated here: identities are derived from
//! request metadata and conversation ids are chosen by the client and checked
//! by `warden_guardrails::validate_conversation_id` before use.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string without further checks.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Key identifying a request source (usually the client IP).
    ClientIdentity
);

string_id!(
    /// Identifier of a conversation (`conv-<digits>`).
    ConversationId
);

impl ClientIdentity {
    /// Identity used when nothing about the caller is known.
    pub fn unknown() -> Self {
        Self::from_raw(crate::constants::UNKNOWN_CLIENT)
    }

    /// Whether this is the fallback identity.
    pub fn is_unknown(&self) -> bool {
        self.0 == crate::constants::UNKNOWN_CLIENT
    }
}
