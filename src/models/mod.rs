//! Domain models for the provisioning engine.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`Ipv4`] - IPv4 address with CIDR notation support
//! - [`NetworkOffering`] and [`VpcOffering`] - catalog entries
//! - [`Zone`], [`Vpc`], [`Network`] - provisioned entities
//! - [`SecurityGroup`] - per-account traffic rules

mod ids;
mod ipv4;
mod network;
mod offering;
mod owner;
mod security_group;
mod vpc;
mod zone;

// Re-export public types
pub use ids::{
    NetworkId, NetworkOfferingId, RuleId, SecurityGroupId, VmId, VpcId, VpcOfferingId, ZoneId,
};
pub use ipv4::{
    broadcast_addr, cut_addr, find_free_subnet, get_cidr_mask, ip_after_subnet, lo_mask,
    netmask_to_len, next_subnet_ipv4, num_hosts, Ipv4, MAX_LENGTH,
};
pub use network::{AclType, IpRange, Network, NetworkRequest, NetworkState};
pub use offering::{
    GuestIpType, LbIsolation, NetworkOffering, NetworkOfferingSpec, OfferingState, Provider,
    ServiceType, VpcOffering, VpcOfferingSpec,
};
pub use owner::Owner;
pub use security_group::{
    Direction, Protocol, RuleSource, SecurityGroup, SecurityRule, SecurityRuleSpec,
    DEFAULT_SECURITY_GROUP,
};
pub use vpc::{Vpc, VpcRequest, VpcState};
pub use zone::{Zone, ZoneNetworkType, ZoneSpec};
