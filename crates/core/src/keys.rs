//! String keys for author-chosen identifiers.
//!
//! Node ids, middleware ids, worker names and port keys are chosen by
//! workflow authors and worker operators, not by the control plane. They must
//! round-trip verbatim through snapshot JSON and control-plane frames, so
//! these are transparent string newtypes: no normalization, only a
//! non-empty/size check at construction.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted length for any string key, in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Errors produced when constructing a string key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key was empty.
    #[error("key must not be empty")]
    Empty,
    /// The key exceeded [`MAX_KEY_LEN`] bytes.
    #[error("key exceeds {MAX_KEY_LEN} bytes")]
    TooLong,
}

macro_rules! string_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Construct a key, validating it is non-empty and within bounds.
            pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err(KeyError::Empty);
                }
                if raw.len() > MAX_KEY_LEN {
                    return Err(KeyError::TooLong);
                }
                Ok(Self(raw))
            }

            /// View the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeyError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_key! {
    /// Identifier of a node (or middleware) within a workflow snapshot.
    NodeKey
}

string_key! {
    /// Unique name a worker registers under at handshake.
    WorkerName
}

string_key! {
    /// Key of an input or output port on a node.
    PortKey
}
