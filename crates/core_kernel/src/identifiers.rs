//! Strongly-typed identifiers for domain entities
//!
//! Newtype wrappers around UUIDs keep a guide id from ever being passed where
//! a batch id is expected. A nil UUID stands for "unset".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Tag printed in front of the UUID
            pub const PREFIX: &'static str = $prefix;

            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered id; aggregates use these so ids sort by creation
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_uuid(&self) -> &Uuid {
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
                write!(f, "{}-{}", Self::PREFIX, self.0)
            }
        }

        /// Accepts both `PREFIX-<uuid>` and a bare UUID
        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Claim billing identifiers
define_id!(ClaimLineId, "GLN");
define_id!(ClaimGuideId, "GUI");
define_id!(ClaimBatchId, "LOT");

// Foreign keys owned by other parts of the platform
define_id!(ClinicId, "CLN");
define_id!(InsuranceOperatorId, "OPR");
define_id!(AppointmentId, "APT");
define_id!(PatientInsuranceId, "PIN");
define_id!(TenantId, "TEN");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_prefix() {
        assert!(ClaimGuideId::new().to_string().starts_with("GUI-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = ClaimBatchId::new();
        let parsed: ClaimBatchId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_nil_is_unset() {
        assert!(ClaimGuideId::nil().is_nil());
        assert!(!ClaimGuideId::new_v7().is_nil());
    }
}
