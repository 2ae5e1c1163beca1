//! Security group data model.

use super::{Ipv4, Owner, RuleId, SecurityGroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the group every account owns from creation.
pub const DEFAULT_SECURITY_GROUP: &str = "default";

/// IP protocol a rule matches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Traffic direction a rule applies to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

/// Where the matched traffic comes from (ingress) or goes to (egress).
///
/// A `Group` source is a weak reference by account and group name: it is
/// never cleaned up when the grantee goes away.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSource {
    Cidr(Ipv4),
    Group { account: String, group: String },
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Cidr(cidr) => write!(f, "{cidr}"),
            RuleSource::Group { account, group } => write!(f, "{account}:{group}"),
        }
    }
}

/// Parameters of a single rule, as submitted by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecurityRuleSpec {
    pub protocol: Protocol,
    #[serde(default)]
    pub start_port: Option<u16>,
    #[serde(default)]
    pub end_port: Option<u16>,
    #[serde(default)]
    pub icmp_type: Option<i16>,
    #[serde(default)]
    pub icmp_code: Option<i16>,
    pub source: RuleSource,
}

impl SecurityRuleSpec {
    pub fn ports(protocol: Protocol, start: u16, end: u16, source: RuleSource) -> Self {
        SecurityRuleSpec {
            protocol,
            start_port: Some(start),
            end_port: Some(end),
            icmp_type: None,
            icmp_code: None,
            source,
        }
    }

    pub fn icmp(icmp_type: i16, icmp_code: i16, source: RuleSource) -> Self {
        SecurityRuleSpec {
            protocol: Protocol::Icmp,
            start_port: None,
            end_port: None,
            icmp_type: Some(icmp_type),
            icmp_code: Some(icmp_code),
            source,
        }
    }
}

/// An authorized rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    pub id: RuleId,
    pub direction: Direction,
    pub spec: SecurityRuleSpec,
}

/// A security group and its rules.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: SecurityGroupId,
    pub name: String,
    pub owner: Owner,
    pub ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
    pub created: DateTime<Utc>,
}

impl SecurityGroup {
    pub(crate) fn new(name: &str, owner: Owner) -> Self {
        SecurityGroup {
            id: SecurityGroupId::new(),
            name: name.to_string(),
            owner,
            ingress: Vec::new(),
            egress: Vec::new(),
            created: Utc::now(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_SECURITY_GROUP
    }

    pub fn rules(&self, direction: Direction) -> &[SecurityRule] {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }

    pub(crate) fn rules_mut(&mut self, direction: Direction) -> &mut Vec<SecurityRule> {
        match direction {
            Direction::Ingress => &mut self.ingress,
            Direction::Egress => &mut self.egress,
        }
    }
}
