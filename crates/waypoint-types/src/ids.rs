use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wraps an already-opaque token (e.g. one read back from the
            /// wire) without re-validating its shape.
            pub fn from_opaque(token: impl Into<String>) -> Self {
                Self(token.into())
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

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(RunId, "run_");
opaque_id!(ScenarioId, "scn_");
opaque_id!(ProjectId, "proj_");
opaque_id!(SnapshotId, "ss_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(RunId::new().as_str().starts_with("run_"));
        assert!(ScenarioId::new().as_str().starts_with("scn_"));
        assert!(ProjectId::new().as_str().starts_with("proj_"));
        assert!(SnapshotId::new().as_str().starts_with("ss_"));
    }

    #[test]
    fn ids_are_uninterpreted_strings() {
        let id = RunId::from_opaque("run_custom-token");
        assert_eq!(id.as_str(), "run_custom-token");
    }
}
