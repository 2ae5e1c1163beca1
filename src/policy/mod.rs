//! Provisioning policy.
//!
//! Pure decision functions: given a proposed network and a read-only view of
//! the zone, offering and VPC it lands in, decide [`Decision::Accepted`] or
//! the precise rejection. Nothing in here mutates state.
//!
//! - [`network_rules`] - rules 1-8, evaluated in order, first failure wins
//! - [`deletion`] - rule 9, the in-use deletion guard

mod deletion;
mod network_rules;

use crate::error::{EngineError, EngineResult, ReasonCode};
use crate::models::{
    Ipv4, Network, NetworkId, NetworkOffering, NetworkRequest, Vpc, VpcOffering, Zone,
};

pub use deletion::{validate_network_delete, validate_security_group_delete};
pub use network_rules::{resolve_cidr, validate_network, NETWORK_RULES};

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(EngineError),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }

    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Decision::Accepted => None,
            Decision::Rejected(e) => Some(e.reason_code()),
        }
    }

    /// Operator-facing message of a rejection.
    pub fn message(&self) -> Option<String> {
        match self {
            Decision::Accepted => None,
            Decision::Rejected(e) => Some(e.to_string()),
        }
    }

    pub fn into_result(self) -> EngineResult<()> {
        match self {
            Decision::Accepted => Ok(()),
            Decision::Rejected(e) => Err(e),
        }
    }
}

impl From<EngineResult<()>> for Decision {
    fn from(result: EngineResult<()>) -> Self {
        match result {
            Ok(()) => Decision::Accepted,
            Err(e) => Decision::Rejected(e),
        }
    }
}

/// What the rules need to know about an existing tier of the same VPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingTier {
    pub id: NetworkId,
    pub name: String,
    pub cidr: Ipv4,
    pub provides_lb: bool,
}

impl SiblingTier {
    pub fn new(network: &Network, offering: &NetworkOffering) -> Self {
        SiblingTier {
            id: network.id,
            name: network.name.clone(),
            cidr: network.cidr,
            provides_lb: offering.supports(crate::models::ServiceType::Lb),
        }
    }
}

/// The VPC a proposed network would become a tier of.
#[derive(Debug, Clone, Copy)]
pub struct VpcContext<'a> {
    pub vpc: &'a Vpc,
    pub offering: &'a VpcOffering,
    pub tiers: &'a [SiblingTier],
}

/// Read-only state the network rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct NetworkContext<'a> {
    pub zone: &'a Zone,
    pub offering: &'a NetworkOffering,
    pub vpc: Option<VpcContext<'a>>,
}

/// A network request together with the CIDR it resolved to.
#[derive(Debug, Clone, Copy)]
pub struct NetworkProposal<'a> {
    pub request: &'a NetworkRequest,
    pub cidr: Option<Ipv4>,
}
