//! In-use deletion guard.
//!
//! A network or security group can't go away while a VM that hasn't been
//! expunged still references it. Callers poll and retry; nothing is queued.

use super::Decision;
use crate::error::EngineError;
use crate::models::{Network, SecurityGroup};

pub fn validate_network_delete(network: &Network) -> Decision {
    if network.is_idle() {
        return Decision::Accepted;
    }
    Decision::Rejected(EngineError::ResourceInUse {
        resource: "Network".to_string(),
        identifier: network.name.clone(),
        count: network.attached_vms.len(),
        dependents: "VM(s)".to_string(),
    })
}

/// `vms_using` is the number of attached VMs that list the group.
pub fn validate_security_group_delete(group: &SecurityGroup, vms_using: usize) -> Decision {
    if group.is_default() {
        return Decision::Rejected(EngineError::ProtectedResource {
            resource: "Security group".to_string(),
            identifier: format!("{}:{}", group.owner.account, group.name),
            reason: "the default group of an account is never deletable".to_string(),
        });
    }
    if vms_using > 0 {
        return Decision::Rejected(EngineError::ResourceInUse {
            resource: "Security group".to_string(),
            identifier: group.name.clone(),
            count: vms_using,
            dependents: "VM(s)".to_string(),
        });
    }
    Decision::Accepted
}
