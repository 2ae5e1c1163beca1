//! VM attachment events and the idle network GC.
//!
//! The engine never sleeps or polls. The VM manager reports attachments
//! through [`VmAttachmentEvents`], and the engine asks an [`IdleGcScheduler`]
//! to call [`ProvisioningEngine::on_idle_timeout`] once a network has been
//! idle for the configured wait.

use super::{lock_mutex, ProvisioningEngine, NETWORK};
use crate::error::{EngineError, EngineResult};
use crate::models::{NetworkId, NetworkState, Owner, SecurityGroupId, VmId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// A VM NIC plugged into a network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VmAttachment {
    pub vm_id: VmId,
    pub network_id: NetworkId,
    /// Account the VM belongs to.
    pub owner: Owner,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupId>,
}

/// Inbound feed from the VM manager.
pub trait VmAttachmentEvents {
    fn on_vm_attached(&self, attachment: VmAttachment) -> EngineResult<()>;
    fn on_vm_detached(&self, vm_id: &VmId, network_id: &NetworkId) -> EngineResult<()>;
}

/// Timer service that fires idle timeouts back into the engine.
pub trait IdleGcScheduler: Send + Sync {
    /// Arrange for `on_idle_timeout(network)` to run after `after`.
    /// Scheduling an already pending network replaces its timer.
    fn schedule(&self, network: NetworkId, after: Duration);
    fn cancel(&self, network: &NetworkId);
}

/// Scheduler that only records pending timeouts; the owner fires them.
#[derive(Debug, Default)]
pub struct ManualGcScheduler {
    pending: Mutex<BTreeMap<NetworkId, Duration>>,
}

impl ManualGcScheduler {
    pub fn pending(&self) -> Vec<(NetworkId, Duration)> {
        lock_mutex(&self.pending)
            .iter()
            .map(|(id, after)| (*id, *after))
            .collect()
    }

    pub fn is_scheduled(&self, network: &NetworkId) -> bool {
        lock_mutex(&self.pending).contains_key(network)
    }

    /// Take every pending timeout, leaving none scheduled.
    pub fn drain(&self) -> Vec<NetworkId> {
        std::mem::take(&mut *lock_mutex(&self.pending))
            .into_keys()
            .collect()
    }
}

impl IdleGcScheduler for ManualGcScheduler {
    fn schedule(&self, network: NetworkId, after: Duration) {
        lock_mutex(&self.pending).insert(network, after);
    }

    fn cancel(&self, network: &NetworkId) {
        lock_mutex(&self.pending).remove(network);
    }
}

impl VmAttachmentEvents for ProvisioningEngine {
    /// Plug a VM in. The first VM implements the network.
    fn on_vm_attached(&self, mut attachment: VmAttachment) -> EngineResult<()> {
        let _attach = lock_mutex(&self.attach_lock);
        let key = (attachment.vm_id, attachment.network_id);
        if self.attachments.contains_key(&key) {
            return Err(EngineError::invalid_parameter(format!(
                "VM {} is already attached to network {}",
                attachment.vm_id, attachment.network_id
            )));
        }
        let zone_id = self.network(&attachment.network_id)?.zone_id;
        if attachment.security_groups.is_empty()
            && self.zone(&zone_id)?.is_security_group_enabled()
        {
            let default = self
                .find_security_group(&attachment.owner, crate::models::DEFAULT_SECURITY_GROUP)
                .ok_or_else(|| EngineError::not_found("Account", &attachment.owner))?;
            attachment.security_groups.push(default.id);
        }
        if let Some(missing) = attachment
            .security_groups
            .iter()
            .find(|g| !self.security_groups.contains_key(*g))
        {
            return Err(EngineError::not_found("Security group", missing));
        }

        let mut network = self
            .networks
            .get_mut(&attachment.network_id)
            .ok_or_else(|| EngineError::not_found(NETWORK, attachment.network_id))?;
        network.attached_vms.insert(attachment.vm_id);
        if network.state != NetworkState::Implemented {
            log::info!(
                "Network '{}': {} -> Implemented (VM {} attached)",
                network.name,
                network.state,
                attachment.vm_id
            );
            network.state = NetworkState::Implemented;
        }
        self.scheduler.cancel(&network.id);
        drop(network);

        self.attachments.insert(key, attachment);
        Ok(())
    }

    /// Unplug a VM. The last VM out starts the idle timer.
    fn on_vm_detached(&self, vm_id: &VmId, network_id: &NetworkId) -> EngineResult<()> {
        self.attachments
            .remove(&(*vm_id, *network_id))
            .ok_or_else(|| {
                EngineError::invalid_parameter(format!(
                    "VM {vm_id} is not attached to network {network_id}"
                ))
            })?;
        let mut network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| EngineError::not_found(NETWORK, network_id))?;
        network.attached_vms.remove(vm_id);
        log::debug!("VM {vm_id} detached from network '{}'", network.name);
        if network.is_idle() && network.state == NetworkState::Implemented {
            log::info!(
                "Network '{}' is idle, GC in {}s",
                network.name,
                self.config.gc_wait.as_secs()
            );
            self.scheduler.schedule(*network_id, self.config.gc_wait);
        }
        Ok(())
    }
}

impl ProvisioningEngine {
    /// Idle timer callback.
    ///
    /// `Implemented -> Shutdown` and `Shutdown -> Allocated` while no VM is
    /// attached; anything else is a no-op. Returns the resulting state.
    pub fn on_idle_timeout(&self, network_id: &NetworkId) -> EngineResult<NetworkState> {
        let mut network = self
            .networks
            .get_mut(network_id)
            .ok_or_else(|| EngineError::not_found(NETWORK, network_id))?;
        if !network.is_idle() {
            log::debug!(
                "Idle timeout for network '{}' ignored, {} VM(s) attached",
                network.name,
                network.attached_vms.len()
            );
            return Ok(network.state);
        }
        let next = match network.state {
            NetworkState::Implemented => NetworkState::Shutdown,
            NetworkState::Shutdown => NetworkState::Allocated,
            NetworkState::Allocated => return Ok(NetworkState::Allocated),
        };
        log::info!("Network '{}': {} -> {next} (idle GC)", network.name, network.state);
        network.state = next;
        if next == NetworkState::Shutdown {
            self.scheduler.schedule(*network_id, self.config.gc_wait);
        }
        Ok(next)
    }
}
