//! Provisioning plans.
//!
//! A plan is a JSON file with an ordered list of steps (zones, accounts,
//! offerings, VPCs, networks, security groups and VM events). Entities are
//! referenced by name; [`replay`] resolves the names against the engine and
//! applies the steps one by one.

mod replay;

pub use replay::{replay, StepOutcome};

use crate::models::{
    NetworkOfferingSpec, OfferingState, Owner, SecurityRuleSpec, VpcOfferingSpec, ZoneSpec,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

/// Errors while loading a plan file.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan file does not exist: {0}")]
    Missing(String),

    #[error("Error reading plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing plan JSON: path={path} error={message}")]
    Parse { path: String, message: String },
}

/// Which catalog an offering name refers to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferingKind {
    Network,
    Vpc,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<PlanStep>,
}

/// One operation of a plan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanStep {
    AddZone(ZoneSpec),
    CreateAccount(Owner),
    CreateNetworkOffering {
        #[serde(flatten)]
        spec: NetworkOfferingSpec,
        #[serde(default)]
        enable: bool,
    },
    CreateVpcOffering {
        #[serde(flatten)]
        spec: VpcOfferingSpec,
        #[serde(default)]
        enable: bool,
    },
    SetOfferingState {
        kind: OfferingKind,
        offering: String,
        state: OfferingState,
    },
    DeleteOffering {
        kind: OfferingKind,
        offering: String,
    },
    CreateVpc {
        name: String,
        zone: String,
        offering: String,
        cidr: String,
        owner: Owner,
    },
    DeleteVpc {
        name: String,
        owner: Owner,
    },
    CreateNetwork {
        name: String,
        zone: String,
        offering: String,
        owner: Owner,
        #[serde(default)]
        vpc: Option<String>,
        /// Account owning the VPC when it differs from `owner`.
        #[serde(default)]
        vpc_owner: Option<Owner>,
        #[serde(default)]
        gateway: Option<Ipv4Addr>,
        #[serde(default)]
        netmask: Option<Ipv4Addr>,
        #[serde(default)]
        start_ip: Option<Ipv4Addr>,
        #[serde(default)]
        end_ip: Option<Ipv4Addr>,
        #[serde(default)]
        acl_type: crate::models::AclType,
    },
    DeleteNetwork {
        name: String,
        owner: Owner,
    },
    CreateSecurityGroup {
        name: String,
        owner: Owner,
    },
    AuthorizeIngress {
        group: String,
        owner: Owner,
        rule: SecurityRuleSpec,
    },
    AuthorizeEgress {
        group: String,
        owner: Owner,
        rule: SecurityRuleSpec,
    },
    DeleteSecurityGroup {
        name: String,
        owner: Owner,
    },
    AttachVm {
        vm: String,
        network: String,
        owner: Owner,
        #[serde(default)]
        security_groups: Vec<String>,
    },
    DetachVm {
        vm: String,
        network: String,
        owner: Owner,
    },
    IdleTimeout {
        network: String,
        owner: Owner,
    },
}

impl PlanStep {
    /// Short operation name used in reports.
    pub fn op(&self) -> &'static str {
        match self {
            PlanStep::AddZone(_) => "add_zone",
            PlanStep::CreateAccount(_) => "create_account",
            PlanStep::CreateNetworkOffering { .. } => "create_network_offering",
            PlanStep::CreateVpcOffering { .. } => "create_vpc_offering",
            PlanStep::SetOfferingState { .. } => "set_offering_state",
            PlanStep::DeleteOffering { .. } => "delete_offering",
            PlanStep::CreateVpc { .. } => "create_vpc",
            PlanStep::DeleteVpc { .. } => "delete_vpc",
            PlanStep::CreateNetwork { .. } => "create_network",
            PlanStep::DeleteNetwork { .. } => "delete_network",
            PlanStep::CreateSecurityGroup { .. } => "create_security_group",
            PlanStep::AuthorizeIngress { .. } => "authorize_ingress",
            PlanStep::AuthorizeEgress { .. } => "authorize_egress",
            PlanStep::DeleteSecurityGroup { .. } => "delete_security_group",
            PlanStep::AttachVm { .. } => "attach_vm",
            PlanStep::DetachVm { .. } => "detach_vm",
            PlanStep::IdleTimeout { .. } => "idle_timeout",
        }
    }

    /// Name of the entity the step acts on.
    pub fn target(&self) -> String {
        match self {
            PlanStep::AddZone(spec) => spec.name.clone(),
            PlanStep::CreateAccount(owner) => owner.to_string(),
            PlanStep::CreateNetworkOffering { spec, .. } => spec.name.clone(),
            PlanStep::CreateVpcOffering { spec, .. } => spec.name.clone(),
            PlanStep::SetOfferingState { offering, .. }
            | PlanStep::DeleteOffering { offering, .. } => offering.clone(),
            PlanStep::CreateVpc { name, .. }
            | PlanStep::DeleteVpc { name, .. }
            | PlanStep::CreateNetwork { name, .. }
            | PlanStep::DeleteNetwork { name, .. }
            | PlanStep::CreateSecurityGroup { name, .. }
            | PlanStep::DeleteSecurityGroup { name, .. } => name.clone(),
            PlanStep::AuthorizeIngress { group, .. } | PlanStep::AuthorizeEgress { group, .. } => {
                group.clone()
            }
            PlanStep::AttachVm { vm, network, .. } | PlanStep::DetachVm { vm, network, .. } => {
                format!("{vm}@{network}")
            }
            PlanStep::IdleTimeout { network, .. } => network.clone(),
        }
    }
}

/// Read and parse a plan file.
pub fn load_plan(path: &str) -> Result<Plan, PlanError> {
    if !Path::new(path).exists() {
        return Err(PlanError::Missing(path.to_string()));
    }
    log::info!("Reading plan file: {path}");
    let json = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_string(),
        source,
    })?;
    let plan = parse_plan(&json)?;
    log::info!("Plan {path} has {} step(s)", plan.steps.len());
    Ok(plan)
}

/// Parse plan JSON, reporting the JSON path of the first bad field.
pub fn parse_plan(json: &str) -> Result<Plan, PlanError> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        log::error!("Plan JSON rejected at {}", e.path());
        PlanError::Parse {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GuestIpType, Protocol, ServiceType};

    #[test]
    fn test_load_plan_fixture() {
        let plan =
            load_plan("src/tests/test_data/plan_vpc_tiers.json").expect("Error reading plan");
        assert!(plan.description.is_some());
        assert_eq!(plan.steps[0].op(), "add_zone");
        let Some(PlanStep::CreateNetworkOffering { spec, enable }) = plan
            .steps
            .iter()
            .find(|s| matches!(s, PlanStep::CreateNetworkOffering { .. }))
        else {
            panic!("fixture has no network offering");
        };
        assert!(*enable);
        assert_eq!(spec.guest_ip_type, GuestIpType::Isolated);
        assert!(spec.supported_services.contains(&ServiceType::SourceNat));
    }

    #[test]
    fn test_parse_error_has_path() {
        let json = r#"{"steps": [{"op": "add_zone", "name": "z1", "network_type": "Basic"},
                                  {"op": "authorize_ingress", "group": "web",
                                   "owner": {"account": "a", "domain": "ROOT"},
                                   "rule": {"protocol": "Sctp", "source": {"Cidr": "0.0.0.0/0"}}}]}"#;
        match parse_plan(json) {
            Err(PlanError::Parse { path, .. }) => assert!(path.starts_with("steps[1]"), "{path}"),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rule_step() {
        let json = r#"{"steps": [{"op": "authorize_egress", "group": "web",
                                  "owner": {"account": "a", "domain": "ROOT"},
                                  "rule": {"protocol": "Tcp", "start_port": 80, "end_port": 80,
                                           "source": {"Group": {"account": "b", "group": "lb"}}}}]}"#;
        let plan = parse_plan(json).unwrap();
        match &plan.steps[0] {
            PlanStep::AuthorizeEgress { rule, .. } => assert_eq!(rule.protocol, Protocol::Tcp),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(plan.steps[0].target(), "web");
    }

    #[test]
    fn test_missing_plan_file() {
        assert!(matches!(
            load_plan("src/tests/test_data/no_such_plan.json"),
            Err(PlanError::Missing(_))
        ));
    }
}
