//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Opaque identifier of the command that submitted a script (`add`/`requeue`).
/// The engine never interprets it — it is carried through to the `script`
/// event's `cmdId` field so operators can correlate a running script back to
/// the command that created it.
define_id!(CmdId, uuid);

/// A script's SAL index — unique within one engine's `[min_idx, max_idx]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptIndex(i32);

impl ScriptIndex {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i32 {
        self.0
    }

    /// The sentinel used on the wire when there is no current script.
    pub const NONE: ScriptIndex = ScriptIndex(0);
}

impl fmt::Display for ScriptIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ScriptIndex {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_id_round_trips_through_display() {
        let id = CmdId::new();
        let reparsed = CmdId::from_string(id.to_string()).unwrap();
        assert_eq!(id, reparsed);
    }

    #[test]
    fn script_index_display_matches_decimal_value() {
        let idx = ScriptIndex::new(100_042);
        assert_eq!(idx.to_string(), "100042");
        assert_eq!(idx.get(), 100_042);
    }
}
