//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so game records and
//! wire messages stay readable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
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

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Game identifier as declared by the game definition (hex UUID or alias).
    GameId
);

string_newtype!(
    /// Name of a game profile; unique within the launcher's profile list.
    ProfileName
);

/// Suffix of the per-game profile holding module parameter overrides.
const CUSTOM_SUFFIX: &str = " (custom)";

impl ProfileName {
    /// Name of the custom profile a game's parameter overrides live in.
    pub fn custom_for(game: &GameId) -> Self {
        Self(format!("{game}{CUSTOM_SUFFIX}"))
    }

    pub fn is_custom(&self) -> bool {
        self.0.ends_with(CUSTOM_SUFFIX)
    }
}

string_newtype!(
    /// Name of an engine module, e.g. `OpenGL` or `DragonScript`.
    ModuleName
);

string_newtype!(
    /// Identifier of a game patch.
    PatchId
);
