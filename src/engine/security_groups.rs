//! Security group operations.
//!
//! Grants to another group are weak references by (account, group name). A
//! grant whose grantee has been deleted stays stored but is left out of
//! [`ProvisioningEngine::effective_rules`] until it is revoked.

use super::{lock_mutex, ProvisioningEngine};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Direction, Owner, Protocol, RuleId, RuleSource, SecurityGroup, SecurityGroupId, SecurityRule,
    SecurityRuleSpec,
};
use crate::policy::validate_security_group_delete;

const SECURITY_GROUP: &str = "Security group";

impl ProvisioningEngine {
    pub fn create_security_group(&self, owner: &Owner, name: &str) -> EngineResult<SecurityGroup> {
        self.require_account(owner)?;
        if name.trim().is_empty() {
            return Err(EngineError::invalid_parameter(
                "security group name must not be empty",
            ));
        }
        let _names = lock_mutex(&self.name_lock);
        if self.find_security_group(owner, name).is_some() {
            return Err(EngineError::DuplicateName {
                resource: SECURITY_GROUP.to_string(),
                name: name.to_string(),
            });
        }
        let group = SecurityGroup::new(name, owner.clone());
        log::info!("Created security group '{name}' for {owner} id={}", group.id);
        self.security_groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn security_group(&self, id: &SecurityGroupId) -> EngineResult<SecurityGroup> {
        self.security_groups
            .get(id)
            .map(|g| g.clone())
            .ok_or_else(|| EngineError::not_found(SECURITY_GROUP, id))
    }

    pub fn find_security_group(&self, owner: &Owner, name: &str) -> Option<SecurityGroup> {
        self.security_groups
            .iter()
            .find(|g| &g.owner == owner && g.name == name)
            .map(|g| g.value().clone())
    }

    /// Security groups of an account, sorted by name.
    pub fn list_security_groups(&self, owner: &Owner) -> Vec<SecurityGroup> {
        let mut groups: Vec<SecurityGroup> = self
            .security_groups
            .iter()
            .filter(|g| &g.owner == owner)
            .map(|g| g.value().clone())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn authorize_ingress(
        &self,
        group: &SecurityGroupId,
        spec: SecurityRuleSpec,
    ) -> EngineResult<SecurityRule> {
        self.authorize(group, Direction::Ingress, spec)
    }

    pub fn authorize_egress(
        &self,
        group: &SecurityGroupId,
        spec: SecurityRuleSpec,
    ) -> EngineResult<SecurityRule> {
        self.authorize(group, Direction::Egress, spec)
    }

    fn authorize(
        &self,
        group_id: &SecurityGroupId,
        direction: Direction,
        spec: SecurityRuleSpec,
    ) -> EngineResult<SecurityRule> {
        validate_rule(&spec)?;
        if let RuleSource::Group { account, group } = &spec.source {
            if !self.grantee_exists(account, group) {
                return Err(EngineError::not_found(
                    SECURITY_GROUP,
                    format!("{account}:{group}"),
                ));
            }
        }
        let mut group = self
            .security_groups
            .get_mut(group_id)
            .ok_or_else(|| EngineError::not_found(SECURITY_GROUP, group_id))?;
        if group.rules(direction).iter().any(|r| r.spec == spec) {
            return Err(EngineError::invalid_parameter(format!(
                "{direction:?} rule already exists in security group '{}'",
                group.name
            )));
        }
        let rule = SecurityRule {
            id: RuleId::new(),
            direction,
            spec,
        };
        log::info!(
            "Authorized {direction:?} {:?} from {} in security group '{}'",
            rule.spec.protocol,
            rule.spec.source,
            group.name
        );
        group.rules_mut(direction).push(rule.clone());
        Ok(rule)
    }

    /// Remove a rule from whichever group holds it.
    pub fn revoke_rule(&self, rule_id: &RuleId) -> EngineResult<SecurityRule> {
        for mut group in self.security_groups.iter_mut() {
            for direction in [Direction::Ingress, Direction::Egress] {
                let rules = group.rules_mut(direction);
                if let Some(pos) = rules.iter().position(|r| &r.id == rule_id) {
                    let rule = rules.remove(pos);
                    log::info!("Revoked rule {rule_id} from security group '{}'", group.name);
                    return Ok(rule);
                }
            }
        }
        Err(EngineError::not_found("Security rule", rule_id))
    }

    pub fn delete_security_group(&self, id: &SecurityGroupId) -> EngineResult<()> {
        let _attach = lock_mutex(&self.attach_lock);
        let group = self.security_group(id)?;
        let vms_using = self
            .attachments
            .iter()
            .filter(|a| a.security_groups.contains(id))
            .count();
        if let Err(e) = validate_security_group_delete(&group, vms_using).into_result() {
            log::warn!("Rejected delete of security group '{}': {e}", group.name);
            return Err(e);
        }
        self.security_groups.remove(id);
        log::info!("Deleted security group '{}' of {}", group.name, group.owner);
        Ok(())
    }

    /// Rules in force for `direction`, without grants to deleted groups.
    pub fn effective_rules(
        &self,
        id: &SecurityGroupId,
        direction: Direction,
    ) -> EngineResult<Vec<SecurityRule>> {
        let group = self.security_group(id)?;
        Ok(group
            .rules(direction)
            .iter()
            .filter(|r| match &r.spec.source {
                RuleSource::Cidr(_) => true,
                RuleSource::Group { account, group } => self.grantee_exists(account, group),
            })
            .cloned()
            .collect())
    }

    fn grantee_exists(&self, account: &str, group: &str) -> bool {
        self.security_groups
            .iter()
            .any(|g| g.owner.account == account && g.name == group)
    }
}

fn validate_rule(spec: &SecurityRuleSpec) -> EngineResult<()> {
    let invalid = |msg: &str| Err(EngineError::invalid_parameter(msg));
    let has_ports = spec.start_port.is_some() || spec.end_port.is_some();
    let has_icmp = spec.icmp_type.is_some() || spec.icmp_code.is_some();
    match spec.protocol {
        Protocol::Tcp | Protocol::Udp => {
            if has_icmp {
                return invalid("icmp type/code only apply to the Icmp protocol");
            }
            match (spec.start_port, spec.end_port) {
                (Some(start), Some(end)) if start > end => {
                    invalid("start port must not be greater than end port")
                }
                (Some(_), Some(_)) => Ok(()),
                _ => invalid("Tcp and Udp rules need a start and an end port"),
            }
        }
        Protocol::Icmp => {
            if has_ports {
                return invalid("ports don't apply to the Icmp protocol");
            }
            match (spec.icmp_type, spec.icmp_code) {
                (Some(t), Some(c)) if (-1..=255).contains(&t) && (-1..=255).contains(&c) => Ok(()),
                (Some(_), Some(_)) => invalid("icmp type and code must be within -1..255"),
                _ => invalid("Icmp rules need an icmp type and code"),
            }
        }
        Protocol::All => {
            if has_ports || has_icmp {
                return invalid("protocol All takes no ports or icmp type/code");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::fixture;
    use crate::engine::{VmAttachment, VmAttachmentEvents};
    use crate::error::ReasonCode;
    use crate::models::{Ipv4, VmId, DEFAULT_SECURITY_GROUP};

    fn anywhere() -> RuleSource {
        RuleSource::Cidr(Ipv4::new("0.0.0.0/0").unwrap())
    }

    #[test]
    fn test_account_has_default_group() {
        let f = fixture();
        let groups = f.engine.list_security_groups(&f.owner);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, DEFAULT_SECURITY_GROUP);
        assert!(groups[0].ingress.is_empty() && groups[0].egress.is_empty());

        let err = f
            .engine
            .delete_security_group(&groups[0].id)
            .unwrap_err();
        assert_eq!(err.reason_code(), ReasonCode::ProtectedResource);
        assert_eq!(
            f.engine
                .create_security_group(&f.owner, DEFAULT_SECURITY_GROUP)
                .unwrap_err()
                .reason_code(),
            ReasonCode::DuplicateName
        );
    }

    #[test]
    fn test_rule_validation() {
        let f = fixture();
        let web = f.engine.create_security_group(&f.owner, "web").unwrap();
        let bad = [
            SecurityRuleSpec::ports(Protocol::Tcp, 443, 80, anywhere()),
            SecurityRuleSpec::icmp(300, 0, anywhere()),
            SecurityRuleSpec {
                protocol: Protocol::Udp,
                start_port: Some(53),
                end_port: None,
                icmp_type: None,
                icmp_code: None,
                source: anywhere(),
            },
            SecurityRuleSpec::ports(Protocol::All, 1, 2, anywhere()),
        ];
        for spec in bad {
            assert_eq!(
                f.engine
                    .authorize_ingress(&web.id, spec)
                    .unwrap_err()
                    .reason_code(),
                ReasonCode::InvalidParameter
            );
        }
        let ok = SecurityRuleSpec::ports(Protocol::Tcp, 80, 443, anywhere());
        f.engine.authorize_ingress(&web.id, ok.clone()).unwrap();
        assert_eq!(
            f.engine
                .authorize_ingress(&web.id, ok.clone())
                .unwrap_err()
                .reason_code(),
            ReasonCode::InvalidParameter
        );
        // same rule in the other direction is a different rule
        f.engine.authorize_egress(&web.id, ok).unwrap();
    }

    #[test]
    fn test_grant_to_deleted_group_becomes_inert() {
        let f = fixture();
        let web = f.engine.create_security_group(&f.owner, "web").unwrap();
        let db = f.engine.create_security_group(&f.owner, "db").unwrap();
        let from_web = RuleSource::Group {
            account: f.owner.account.clone(),
            group: "web".to_string(),
        };
        let grant = f
            .engine
            .authorize_ingress(
                &db.id,
                SecurityRuleSpec::ports(Protocol::Tcp, 5432, 5432, from_web.clone()),
            )
            .unwrap();
        f.engine
            .authorize_ingress(&db.id, SecurityRuleSpec::icmp(-1, -1, anywhere()))
            .unwrap();
        assert_eq!(f.engine.effective_rules(&db.id, Direction::Ingress).unwrap().len(), 2);

        f.engine.delete_security_group(&web.id).unwrap();
        let stored = f.engine.security_group(&db.id).unwrap();
        assert_eq!(stored.ingress.len(), 2);
        let effective = f.engine.effective_rules(&db.id, Direction::Ingress).unwrap();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].spec.protocol, Protocol::Icmp);

        // can't grant to a group that doesn't exist
        assert_eq!(
            f.engine
                .authorize_ingress(
                    &db.id,
                    SecurityRuleSpec::ports(Protocol::Tcp, 22, 22, from_web),
                )
                .unwrap_err()
                .reason_code(),
            ReasonCode::NotFound
        );

        f.engine.revoke_rule(&grant.id).unwrap();
        assert_eq!(f.engine.security_group(&db.id).unwrap().ingress.len(), 1);
        assert_eq!(
            f.engine.revoke_rule(&grant.id).unwrap_err().reason_code(),
            ReasonCode::NotFound
        );
    }

    #[test]
    fn test_group_in_use_by_vm() {
        let f = fixture();
        let web = f.engine.create_security_group(&f.owner, "web").unwrap();
        let net = f.engine.create_network(f.isolated("guest1")).unwrap();
        let vm = VmId::new();
        f.engine
            .on_vm_attached(VmAttachment {
                vm_id: vm,
                network_id: net.id,
                owner: f.owner.clone(),
                security_groups: vec![web.id],
            })
            .unwrap();
        let err = f.engine.delete_security_group(&web.id).unwrap_err();
        assert_eq!(err.reason_code(), ReasonCode::ResourceInUse);
        assert_eq!(err.to_string(), "Security group 'web' is in use by 1 VM(s)");

        f.engine.on_vm_detached(&vm, &net.id).unwrap();
        f.engine.delete_security_group(&web.id).unwrap();
    }
}
