//! Virtual Private Cloud data model.

use super::{Ipv4, NetworkId, Owner, VpcId, VpcOfferingId, ZoneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// VPC lifecycle state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VpcState {
    Enabled,
    Inactive,
}

/// Parameters for creating a VPC.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VpcRequest {
    pub name: String,
    pub offering_id: VpcOfferingId,
    pub zone_id: ZoneId,
    /// Super CIDR that every tier must nest inside, e.g. "10.1.1.1/16".
    pub cidr: String,
    pub owner: Owner,
}

/// A provisioned VPC and the tiers bound into its address space.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub id: VpcId,
    pub name: String,
    pub cidr: Ipv4,
    pub offering_id: VpcOfferingId,
    pub zone_id: ZoneId,
    pub owner: Owner,
    pub state: VpcState,
    /// Tier network ids in creation order.
    pub tiers: Vec<NetworkId>,
    pub created: DateTime<Utc>,
}

impl Vpc {
    pub fn has_tier(&self, id: &NetworkId) -> bool {
        self.tiers.contains(id)
    }
}

impl fmt::Display for Vpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({} tiers, {})",
            self.name,
            self.cidr,
            self.tiers.len(),
            self.owner
        )
    }
}
