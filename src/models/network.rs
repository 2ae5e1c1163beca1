//! Guest network data model.

use super::{Ipv4, NetworkId, NetworkOfferingId, Owner, VmId, VpcId, ZoneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Visibility scope of a network.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AclType {
    #[default]
    Account,
    Domain,
}

/// Network lifecycle state.
///
/// `Allocated --first VM--> Implemented --idle GC--> Shutdown --idle GC--> Allocated`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkState {
    Allocated,
    Implemented,
    Shutdown,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Guest IP range handed out to VMs of a shared network.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

/// Parameters for creating a network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    pub name: String,
    pub offering_id: NetworkOfferingId,
    pub zone_id: ZoneId,
    pub owner: Owner,
    #[serde(default)]
    pub vpc_id: Option<VpcId>,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub netmask: Option<Ipv4Addr>,
    #[serde(default)]
    pub start_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub end_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub acl_type: AclType,
}

impl NetworkRequest {
    /// Minimal request; addressing fields are filled in with the builder methods.
    pub fn new(
        name: &str,
        offering_id: NetworkOfferingId,
        zone_id: ZoneId,
        owner: Owner,
    ) -> Self {
        NetworkRequest {
            name: name.to_string(),
            offering_id,
            zone_id,
            owner,
            vpc_id: None,
            gateway: None,
            netmask: None,
            start_ip: None,
            end_ip: None,
            acl_type: AclType::Account,
        }
    }

    pub fn in_vpc(mut self, vpc_id: VpcId) -> Self {
        self.vpc_id = Some(vpc_id);
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self.netmask = Some(netmask);
        self
    }

    pub fn with_ip_range(mut self, start: Ipv4Addr, end: Ipv4Addr) -> Self {
        self.start_ip = Some(start);
        self.end_ip = Some(end);
        self
    }

    pub fn with_acl_type(mut self, acl_type: AclType) -> Self {
        self.acl_type = acl_type;
        self
    }
}

/// A provisioned network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    /// Network address and prefix, host bits cleared.
    pub cidr: Ipv4,
    pub gateway: Ipv4Addr,
    pub ip_range: Option<IpRange>,
    pub offering_id: NetworkOfferingId,
    pub zone_id: ZoneId,
    pub vpc_id: Option<VpcId>,
    pub owner: Owner,
    pub acl_type: AclType,
    pub vlan: Option<u16>,
    pub state: NetworkState,
    pub attached_vms: BTreeSet<VmId>,
    pub created: DateTime<Utc>,
}

impl Network {
    pub fn is_idle(&self) -> bool {
        self.attached_vms.is_empty()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] gw={} state={} vms={}",
            self.name,
            self.cidr,
            self.gateway,
            self.state,
            self.attached_vms.len()
        )
    }
}
