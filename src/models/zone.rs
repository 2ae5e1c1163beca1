//! Availability zone data model.

use super::ZoneId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Networking model of a zone.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneNetworkType {
    Basic,
    Advanced,
}

/// Parameters for registering a zone.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ZoneSpec {
    pub name: String,
    pub network_type: ZoneNetworkType,
    #[serde(default)]
    pub security_groups_enabled: bool,
}

/// A zone the engine provisions networks into.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub network_type: ZoneNetworkType,
    pub security_groups_enabled: bool,
}

impl Zone {
    pub(crate) fn from_spec(spec: ZoneSpec) -> Self {
        Zone {
            id: ZoneId::new(),
            name: spec.name,
            network_type: spec.network_type,
            security_groups_enabled: spec.security_groups_enabled,
        }
    }

    /// Basic zones always isolate guests with security groups; advanced
    /// zones only when explicitly enabled.
    pub fn is_security_group_enabled(&self) -> bool {
        match self.network_type {
            ZoneNetworkType::Basic => true,
            ZoneNetworkType::Advanced => self.security_groups_enabled,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.network_type, self.is_security_group_enabled()) {
            (ZoneNetworkType::Basic, _) => "Basic",
            (ZoneNetworkType::Advanced, true) => "AdvancedSG",
            (ZoneNetworkType::Advanced, false) => "Advanced",
        };
        write!(f, "{} ({kind})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_group_enabled() {
        let basic = Zone::from_spec(ZoneSpec {
            name: "z1".to_string(),
            network_type: ZoneNetworkType::Basic,
            security_groups_enabled: false,
        });
        let adv = Zone::from_spec(ZoneSpec {
            name: "z2".to_string(),
            network_type: ZoneNetworkType::Advanced,
            security_groups_enabled: false,
        });
        let adv_sg = Zone::from_spec(ZoneSpec {
            name: "z3".to_string(),
            network_type: ZoneNetworkType::Advanced,
            security_groups_enabled: true,
        });
        assert!(basic.is_security_group_enabled());
        assert!(!adv.is_security_group_enabled());
        assert!(adv_sg.is_security_group_enabled());
        assert_eq!(adv_sg.to_string(), "z3 (AdvancedSG)");
    }
}
