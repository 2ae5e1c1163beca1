//! Typed identifiers for every entity the engine stores.
//!
//! Each id wraps a UUID so that an offering id can't be passed where a
//! network id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
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

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Id of a network offering.
    NetworkOfferingId
);
entity_id!(
    /// Id of a VPC offering.
    VpcOfferingId
);
entity_id!(ZoneId);
entity_id!(VpcId);
entity_id!(NetworkId);
entity_id!(SecurityGroupId);
entity_id!(
    /// Id of a single ingress/egress rule inside a security group.
    RuleId
);
entity_id!(VmId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_parse_back() {
        let a = NetworkId::new();
        let b = NetworkId::new();
        assert_ne!(a, b);
        let parsed: NetworkId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert!("not-a-uuid".parse::<VpcId>().is_err());
    }
}
