//! Network and VPC offering data model.

use super::{NetworkOfferingId, VpcOfferingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Guest IP type of a network offering.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestIpType {
    Isolated,
    Shared,
}

/// Network service that an offering may supply.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceType {
    Dhcp,
    Dns,
    SourceNat,
    PortForwarding,
    Vpn,
    Firewall,
    Lb,
    UserData,
    StaticNat,
    NetworkACL,
    Connectivity,
    SecurityGroup,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Element that implements a service for a network.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    VirtualRouter,
    VpcVirtualRouter,
    Netscaler,
    Tungsten,
    Nuage,
    InternalLbVm,
    SecurityGroupProvider,
    ConfigDrive,
}

impl Provider {
    /// Whether the provider can serve a tier inside a VPC.
    pub fn is_vpc_capable(&self) -> bool {
        !matches!(self, Provider::VirtualRouter | Provider::SecurityGroupProvider)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `SupportedLbIsolation` capability of the offering's Lb provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LbIsolation {
    #[default]
    Shared,
    Dedicated,
}

/// Offering lifecycle state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OfferingState {
    #[default]
    Disabled,
    Enabled,
}

impl fmt::Display for OfferingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Parameters for creating a network offering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkOfferingSpec {
    pub name: String,
    pub guest_ip_type: GuestIpType,
    #[serde(default)]
    pub supported_services: BTreeSet<ServiceType>,
    #[serde(default)]
    pub service_providers: BTreeMap<ServiceType, Provider>,
    #[serde(default)]
    pub for_vpc: bool,
    #[serde(default)]
    pub conserve_mode: bool,
    #[serde(default)]
    pub lb_isolation: LbIsolation,
}

/// A registered network offering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkOffering {
    pub id: NetworkOfferingId,
    pub name: String,
    pub guest_ip_type: GuestIpType,
    pub supported_services: BTreeSet<ServiceType>,
    pub service_providers: BTreeMap<ServiceType, Provider>,
    pub for_vpc: bool,
    pub conserve_mode: bool,
    pub lb_isolation: LbIsolation,
    pub state: OfferingState,
    pub created: DateTime<Utc>,
}

impl NetworkOffering {
    pub(crate) fn from_spec(spec: NetworkOfferingSpec) -> Self {
        NetworkOffering {
            id: NetworkOfferingId::new(),
            name: spec.name,
            guest_ip_type: spec.guest_ip_type,
            supported_services: spec.supported_services,
            service_providers: spec.service_providers,
            for_vpc: spec.for_vpc,
            conserve_mode: spec.conserve_mode,
            lb_isolation: spec.lb_isolation,
            state: OfferingState::Disabled,
            created: Utc::now(),
        }
    }

    pub fn supports(&self, service: ServiceType) -> bool {
        self.supported_services.contains(&service)
    }

    pub fn provider(&self, service: ServiceType) -> Option<Provider> {
        self.service_providers.get(&service).copied()
    }

    pub fn is_enabled(&self) -> bool {
        self.state == OfferingState::Enabled
    }
}

/// Parameters for creating a VPC offering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VpcOfferingSpec {
    pub name: String,
    #[serde(default)]
    pub supported_services: BTreeSet<ServiceType>,
    #[serde(default)]
    pub service_providers: BTreeMap<ServiceType, Provider>,
}

/// A registered VPC offering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VpcOffering {
    pub id: VpcOfferingId,
    pub name: String,
    pub supported_services: BTreeSet<ServiceType>,
    pub service_providers: BTreeMap<ServiceType, Provider>,
    pub state: OfferingState,
    pub created: DateTime<Utc>,
}

impl VpcOffering {
    pub(crate) fn from_spec(spec: VpcOfferingSpec) -> Self {
        VpcOffering {
            id: VpcOfferingId::new(),
            name: spec.name,
            supported_services: spec.supported_services,
            service_providers: spec.service_providers,
            state: OfferingState::Disabled,
            created: Utc::now(),
        }
    }

    pub fn supports(&self, service: ServiceType) -> bool {
        self.supported_services.contains(&service)
    }

    pub fn is_enabled(&self) -> bool {
        self.state == OfferingState::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_vpc_capability() {
        assert!(Provider::VpcVirtualRouter.is_vpc_capable());
        assert!(Provider::Netscaler.is_vpc_capable());
        assert!(!Provider::VirtualRouter.is_vpc_capable());
        assert!(!Provider::SecurityGroupProvider.is_vpc_capable());
    }

    #[test]
    fn test_spec_defaults_from_json() {
        let spec: NetworkOfferingSpec = serde_json::from_str(
            r#"{
                "name": "iso",
                "guest_ip_type": "Isolated",
                "supported_services": ["Dhcp", "SourceNat"],
                "service_providers": {"Dhcp": "VirtualRouter", "SourceNat": "VirtualRouter"}
            }"#,
        )
        .unwrap();
        assert!(!spec.for_vpc);
        assert!(!spec.conserve_mode);
        assert_eq!(spec.lb_isolation, LbIsolation::Shared);

        let offering = NetworkOffering::from_spec(spec);
        assert_eq!(offering.state, OfferingState::Disabled);
        assert!(offering.supports(ServiceType::SourceNat));
        assert_eq!(
            offering.provider(ServiceType::Dhcp),
            Some(Provider::VirtualRouter)
        );
        assert_eq!(offering.provider(ServiceType::Lb), None);
    }
}
