//! Apply a plan to an engine, one outcome per step.

use super::{OfferingKind, Plan, PlanStep};
use crate::catalog::OfferingRef;
use crate::engine::{ProvisioningEngine, VmAttachment, VmAttachmentEvents};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    NetworkId, NetworkOfferingId, NetworkRequest, OfferingState, Owner, SecurityGroupId, VmId,
    VpcId, VpcOfferingId, VpcRequest, ZoneId,
};
use crate::policy::Decision;
use std::collections::HashMap;

/// Result of one plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// 1-based position in the plan.
    pub index: usize,
    pub op: &'static str,
    pub target: String,
    pub decision: Decision,
    /// What was created or changed, empty on rejection.
    pub detail: String,
}

/// Run every step of `plan`. A rejected step doesn't stop the replay.
pub fn replay(engine: &ProvisioningEngine, plan: &Plan) -> Vec<StepOutcome> {
    if let Some(description) = &plan.description {
        log::info!("Replaying plan: {description}");
    }
    let mut vms: HashMap<String, VmId> = HashMap::new();
    plan.steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let (decision, detail) = match apply(engine, step, &mut vms) {
                Ok(detail) => (Decision::Accepted, detail),
                Err(e) => (Decision::Rejected(e), String::new()),
            };
            log::debug!("step {} {} {}: {decision:?}", i + 1, step.op(), step.target());
            StepOutcome {
                index: i + 1,
                op: step.op(),
                target: step.target(),
                decision,
                detail,
            }
        })
        .collect()
}

fn apply(
    engine: &ProvisioningEngine,
    step: &PlanStep,
    vms: &mut HashMap<String, VmId>,
) -> EngineResult<String> {
    match step {
        PlanStep::AddZone(spec) => {
            let zone = engine.add_zone(spec.clone())?;
            Ok(zone.to_string())
        }
        PlanStep::CreateAccount(owner) => {
            let group = engine.create_account(owner.clone())?;
            Ok(format!("security group '{}'", group.name))
        }
        PlanStep::CreateNetworkOffering { spec, enable } => {
            let id = engine.create_network_offering(spec.clone())?;
            if *enable {
                engine.set_offering_state(OfferingRef::Network(id), OfferingState::Enabled)?;
            }
            Ok(offering_detail(*enable))
        }
        PlanStep::CreateVpcOffering { spec, enable } => {
            let id = engine.create_vpc_offering(spec.clone())?;
            if *enable {
                engine.set_offering_state(OfferingRef::Vpc(id), OfferingState::Enabled)?;
            }
            Ok(offering_detail(*enable))
        }
        PlanStep::SetOfferingState {
            kind,
            offering,
            state,
        } => {
            engine.set_offering_state(offering_ref(engine, *kind, offering)?, *state)?;
            Ok(state.to_string())
        }
        PlanStep::DeleteOffering { kind, offering } => {
            engine.delete_offering(offering_ref(engine, *kind, offering)?)?;
            Ok("deleted".to_string())
        }
        PlanStep::CreateVpc {
            name,
            zone,
            offering,
            cidr,
            owner,
        } => {
            let vpc = engine.create_vpc(VpcRequest {
                name: name.clone(),
                offering_id: vpc_offering_id(engine, offering)?,
                zone_id: zone_id(engine, zone)?,
                cidr: cidr.clone(),
                owner: owner.clone(),
            })?;
            Ok(vpc.cidr.to_string())
        }
        PlanStep::DeleteVpc { name, owner } => {
            engine.delete_vpc(&vpc_id(engine, owner, name)?)?;
            Ok("deleted".to_string())
        }
        PlanStep::CreateNetwork {
            name,
            zone,
            offering,
            owner,
            vpc,
            vpc_owner,
            gateway,
            netmask,
            start_ip,
            end_ip,
            acl_type,
        } => {
            let mut request = NetworkRequest::new(
                name,
                network_offering_id(engine, offering)?,
                zone_id(engine, zone)?,
                owner.clone(),
            )
            .with_acl_type(*acl_type);
            if let Some(vpc) = vpc {
                let vpc_owner = vpc_owner.as_ref().unwrap_or(owner);
                request = request.in_vpc(vpc_id(engine, vpc_owner, vpc)?);
            }
            request.gateway = *gateway;
            request.netmask = *netmask;
            request.start_ip = *start_ip;
            request.end_ip = *end_ip;
            let network = engine.create_network(request)?;
            Ok(match network.vlan {
                Some(vlan) => format!("{} vlan={vlan}", network.cidr),
                None => network.cidr.to_string(),
            })
        }
        PlanStep::DeleteNetwork { name, owner } => {
            engine.delete_network(&network_id(engine, owner, name)?)?;
            Ok("deleted".to_string())
        }
        PlanStep::CreateSecurityGroup { name, owner } => {
            engine.create_security_group(owner, name)?;
            Ok(String::new())
        }
        PlanStep::AuthorizeIngress { group, owner, rule } => {
            let group = security_group_id(engine, owner, group)?;
            let rule = engine.authorize_ingress(&group, rule.clone())?;
            Ok(format!("{:?} from {}", rule.spec.protocol, rule.spec.source))
        }
        PlanStep::AuthorizeEgress { group, owner, rule } => {
            let group = security_group_id(engine, owner, group)?;
            let rule = engine.authorize_egress(&group, rule.clone())?;
            Ok(format!("{:?} to {}", rule.spec.protocol, rule.spec.source))
        }
        PlanStep::DeleteSecurityGroup { name, owner } => {
            engine.delete_security_group(&security_group_id(engine, owner, name)?)?;
            Ok("deleted".to_string())
        }
        PlanStep::AttachVm {
            vm,
            network,
            owner,
            security_groups,
        } => {
            let network_id = network_id(engine, owner, network)?;
            let security_groups = security_groups
                .iter()
                .map(|g| security_group_id(engine, owner, g))
                .collect::<EngineResult<Vec<_>>>()?;
            let vm_id = *vms.entry(vm.clone()).or_insert_with(VmId::new);
            engine.on_vm_attached(VmAttachment {
                vm_id,
                network_id,
                owner: owner.clone(),
                security_groups,
            })?;
            Ok(engine.network(&network_id)?.state.to_string())
        }
        PlanStep::DetachVm { vm, network, owner } => {
            let network_id = network_id(engine, owner, network)?;
            let vm_id = vms
                .get(vm)
                .copied()
                .ok_or_else(|| EngineError::not_found("VM", vm))?;
            engine.on_vm_detached(&vm_id, &network_id)?;
            Ok(engine.network(&network_id)?.state.to_string())
        }
        PlanStep::IdleTimeout { network, owner } => {
            let state = engine.on_idle_timeout(&network_id(engine, owner, network)?)?;
            Ok(state.to_string())
        }
    }
}

fn offering_detail(enabled: bool) -> String {
    if enabled {
        OfferingState::Enabled.to_string()
    } else {
        OfferingState::Disabled.to_string()
    }
}

fn zone_id(engine: &ProvisioningEngine, name: &str) -> EngineResult<ZoneId> {
    engine
        .find_zone(name)
        .map(|z| z.id)
        .ok_or_else(|| EngineError::not_found("Zone", name))
}

fn network_offering_id(engine: &ProvisioningEngine, name: &str) -> EngineResult<NetworkOfferingId> {
    engine
        .catalog()
        .find_network_offering(name)
        .map(|o| o.id)
        .ok_or_else(|| EngineError::not_found("Network offering", name))
}

fn vpc_offering_id(engine: &ProvisioningEngine, name: &str) -> EngineResult<VpcOfferingId> {
    engine
        .catalog()
        .find_vpc_offering(name)
        .map(|o| o.id)
        .ok_or_else(|| EngineError::not_found("VPC offering", name))
}

fn offering_ref(
    engine: &ProvisioningEngine,
    kind: OfferingKind,
    name: &str,
) -> EngineResult<OfferingRef> {
    match kind {
        OfferingKind::Network => network_offering_id(engine, name).map(OfferingRef::Network),
        OfferingKind::Vpc => vpc_offering_id(engine, name).map(OfferingRef::Vpc),
    }
}

fn vpc_id(engine: &ProvisioningEngine, owner: &Owner, name: &str) -> EngineResult<VpcId> {
    engine
        .find_vpc(owner, name)
        .map(|v| v.id)
        .ok_or_else(|| EngineError::not_found("VPC", format!("{owner}/{name}")))
}

fn network_id(engine: &ProvisioningEngine, owner: &Owner, name: &str) -> EngineResult<NetworkId> {
    engine
        .find_network(owner, name)
        .map(|n| n.id)
        .ok_or_else(|| EngineError::not_found("Network", format!("{owner}/{name}")))
}

fn security_group_id(
    engine: &ProvisioningEngine,
    owner: &Owner,
    name: &str,
) -> EngineResult<SecurityGroupId> {
    engine
        .find_security_group(owner, name)
        .map(|g| g.id)
        .ok_or_else(|| EngineError::not_found("Security group", format!("{owner}/{name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ReasonCode;
    use crate::plan::load_plan;

    #[test]
    fn test_replay_fixture() {
        let plan =
            load_plan("src/tests/test_data/plan_vpc_tiers.json").expect("Error reading plan");
        let engine = ProvisioningEngine::new(EngineConfig::default());
        let outcomes = replay(&engine, &plan);
        assert_eq!(outcomes.len(), plan.steps.len());

        let rejected: Vec<(&str, &str, ReasonCode)> = outcomes
            .iter()
            .filter_map(|o| o.decision.reason_code().map(|c| (o.op, o.target.as_str(), c)))
            .collect();
        pretty_assertions::assert_eq!(
            rejected,
            vec![
                ("create_network", "tier1-again", ReasonCode::CidrOverlap),
                ("create_network", "tier1-nested", ReasonCode::CidrOverlap),
                ("create_network", "tier-vr", ReasonCode::ProviderNotVpcCapable),
                ("create_network", "tier-lb2", ReasonCode::DuplicateLbServiceInVpc),
                ("delete_network", "tier1", ReasonCode::ResourceInUse),
            ]
        );

        let tier1 = outcomes
            .iter()
            .find(|o| o.op == "create_network" && o.target == "tier1")
            .unwrap();
        assert_eq!(tier1.detail, "10.1.1.0/24");
        let last = outcomes.last().unwrap();
        assert_eq!((last.op, last.detail.as_str()), ("delete_network", "deleted"));
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let engine = ProvisioningEngine::new(EngineConfig::default());
        let plan = crate::plan::parse_plan(
            r#"{"steps": [{"op": "delete_network", "name": "nope",
                           "owner": {"account": "a", "domain": "ROOT"}},
                          {"op": "detach_vm", "vm": "vm9", "network": "nope",
                           "owner": {"account": "a", "domain": "ROOT"}}]}"#,
        )
        .unwrap();
        let outcomes = replay(&engine, &plan);
        assert!(outcomes
            .iter()
            .all(|o| o.decision.reason_code() == Some(ReasonCode::NotFound)));
        assert_eq!(outcomes[1].target, "vm9@nope");
    }
}
