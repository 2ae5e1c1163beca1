//! Provisioning engine.
//!
//! Owns the entity stores and applies accepted requests atomically. Every
//! create/delete either commits fully or returns the rejection with nothing
//! changed.
//!
//! Locking: a mutation touching a VPC's tier set holds that VPC's mutex for
//! its whole duration; the offering catalog sits behind an `RwLock` that is
//! always taken after the VPC mutex. Name uniqueness checks hold
//! `name_lock` until the insert; it is taken last.

mod events;
mod security_groups;
mod vlan;

pub use events::{IdleGcScheduler, ManualGcScheduler, VmAttachment, VmAttachmentEvents};
pub use vlan::VlanAllocator;

use crate::catalog::{OfferingCatalog, OfferingRef};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    find_free_subnet, GuestIpType, IpRange, Ipv4, Network, NetworkId, NetworkOfferingId,
    NetworkOfferingSpec, NetworkRequest, NetworkState, OfferingState, Owner, SecurityGroup,
    SecurityGroupId, VmId, Vpc, VpcId, VpcOfferingId, VpcOfferingSpec, VpcRequest, VpcState, Zone,
    ZoneId, ZoneSpec,
};
use crate::policy::{
    resolve_cidr, validate_network, validate_network_delete, NetworkContext, NetworkProposal,
    SiblingTier, VpcContext,
};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

const ACCOUNT: &str = "Account";
const ZONE: &str = "Zone";
const VPC: &str = "VPC";
const NETWORK: &str = "Network";

/// In-memory provisioning engine.
pub struct ProvisioningEngine {
    config: EngineConfig,
    catalog: RwLock<OfferingCatalog>,
    zones: DashMap<ZoneId, Zone>,
    accounts: DashSet<Owner>,
    vpcs: DashMap<VpcId, Vpc>,
    vpc_locks: DashMap<VpcId, Arc<Mutex<()>>>,
    networks: DashMap<NetworkId, Network>,
    security_groups: DashMap<SecurityGroupId, SecurityGroup>,
    /// Live VM attachments keyed by (vm, network).
    attachments: DashMap<(VmId, NetworkId), VmAttachment>,
    /// Serializes network and security group deletion against VM attachment.
    attach_lock: Mutex<()>,
    /// Held from the duplicate-name check to the insert of zones, VPCs and
    /// security groups.
    name_lock: Mutex<()>,
    vlans: Mutex<VlanAllocator>,
    scheduler: Arc<dyn IdleGcScheduler>,
}

impl ProvisioningEngine {
    /// Engine with a [`ManualGcScheduler`]; idle timeouts are fired by the caller.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_scheduler(config, Arc::new(ManualGcScheduler::default()))
    }

    pub fn with_scheduler(config: EngineConfig, scheduler: Arc<dyn IdleGcScheduler>) -> Self {
        let vlans = VlanAllocator::new(config.vlan_range.clone());
        ProvisioningEngine {
            config,
            catalog: RwLock::new(OfferingCatalog::new()),
            zones: DashMap::new(),
            accounts: DashSet::new(),
            vpcs: DashMap::new(),
            vpc_locks: DashMap::new(),
            networks: DashMap::new(),
            security_groups: DashMap::new(),
            attachments: DashMap::new(),
            attach_lock: Mutex::new(()),
            name_lock: Mutex::new(()),
            vlans: Mutex::new(vlans),
            scheduler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Offerings ──

    /// Shared read access to the offering catalog.
    pub fn catalog(&self) -> RwLockReadGuard<'_, OfferingCatalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalog_mut(&self) -> RwLockWriteGuard<'_, OfferingCatalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_network_offering(
        &self,
        spec: NetworkOfferingSpec,
    ) -> EngineResult<NetworkOfferingId> {
        self.catalog_mut().create_network_offering(spec)
    }

    pub fn create_vpc_offering(&self, spec: VpcOfferingSpec) -> EngineResult<VpcOfferingId> {
        self.catalog_mut().create_vpc_offering(spec)
    }

    pub fn set_offering_state(
        &self,
        offering: OfferingRef,
        state: OfferingState,
    ) -> EngineResult<()> {
        self.catalog_mut().set_state(offering, state)
    }

    /// Remove a Disabled offering nothing is provisioned from.
    pub fn delete_offering(&self, offering: OfferingRef) -> EngineResult<()> {
        let mut catalog = self.catalog_mut();
        let (resource, name, users, dependents) = match offering {
            OfferingRef::Network(id) => (
                "Network offering",
                catalog.network_offering(&id)?.name.clone(),
                self.networks.iter().filter(|n| n.offering_id == id).count(),
                "network(s)",
            ),
            OfferingRef::Vpc(id) => (
                "VPC offering",
                catalog.vpc_offering(&id)?.name.clone(),
                self.vpcs.iter().filter(|v| v.offering_id == id).count(),
                "VPC(s)",
            ),
        };
        if users > 0 {
            return Err(EngineError::ResourceInUse {
                resource: resource.to_string(),
                identifier: name,
                count: users,
                dependents: dependents.to_string(),
            });
        }
        catalog.delete(offering)
    }

    // ── Zones and accounts ──

    pub fn add_zone(&self, spec: ZoneSpec) -> EngineResult<Zone> {
        if spec.name.trim().is_empty() {
            return Err(EngineError::invalid_parameter("zone name must not be empty"));
        }
        let _names = lock_mutex(&self.name_lock);
        if self.zones.iter().any(|z| z.name == spec.name) {
            return Err(EngineError::DuplicateName {
                resource: ZONE.to_string(),
                name: spec.name,
            });
        }
        let zone = Zone::from_spec(spec);
        log::info!("Added zone {} id={}", zone, zone.id);
        self.zones.insert(zone.id, zone.clone());
        Ok(zone)
    }

    pub fn zone(&self, id: &ZoneId) -> EngineResult<Zone> {
        self.zones
            .get(id)
            .map(|z| z.clone())
            .ok_or_else(|| EngineError::not_found(ZONE, id))
    }

    pub fn find_zone(&self, name: &str) -> Option<Zone> {
        self.zones
            .iter()
            .find(|z| z.name == name)
            .map(|z| z.value().clone())
    }

    /// Register an account. Its `default` security group is created with it.
    pub fn create_account(&self, owner: Owner) -> EngineResult<SecurityGroup> {
        if owner.account.trim().is_empty() || owner.domain.trim().is_empty() {
            return Err(EngineError::invalid_parameter(
                "account and domain must not be empty",
            ));
        }
        let _names = lock_mutex(&self.name_lock);
        if !self.accounts.insert(owner.clone()) {
            return Err(EngineError::DuplicateName {
                resource: ACCOUNT.to_string(),
                name: owner.to_string(),
            });
        }
        let group = SecurityGroup::new(crate::models::DEFAULT_SECURITY_GROUP, owner);
        log::info!("Created account {} with default security group id={}", group.owner, group.id);
        self.security_groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn has_account(&self, owner: &Owner) -> bool {
        self.accounts.contains(owner)
    }

    fn require_account(&self, owner: &Owner) -> EngineResult<()> {
        if self.has_account(owner) {
            Ok(())
        } else {
            Err(EngineError::not_found(ACCOUNT, owner))
        }
    }

    // ── VPCs ──

    pub fn create_vpc(&self, request: VpcRequest) -> EngineResult<Vpc> {
        let result = self.try_create_vpc(&request);
        if let Err(e) = &result {
            log::warn!("Rejected VPC '{}': [{}] {e}", request.name, e.reason_code());
        }
        result
    }

    fn try_create_vpc(&self, request: &VpcRequest) -> EngineResult<Vpc> {
        if request.name.trim().is_empty() {
            return Err(EngineError::invalid_parameter("VPC name must not be empty"));
        }
        self.zone(&request.zone_id)?;
        self.require_account(&request.owner)?;
        // held until the insert so delete_offering can't drop the offering
        let catalog = self.catalog();
        let offering = catalog.vpc_offering(&request.offering_id)?;
        if !offering.is_enabled() {
            return Err(EngineError::OfferingNotEnabled {
                offering: offering.name.clone(),
            });
        }
        let cidr = Ipv4::new(&request.cidr)?;
        let _names = lock_mutex(&self.name_lock);
        if self
            .vpcs
            .iter()
            .any(|v| v.owner == request.owner && v.name == request.name)
        {
            return Err(EngineError::DuplicateName {
                resource: VPC.to_string(),
                name: request.name.clone(),
            });
        }

        let vpc = Vpc {
            id: VpcId::new(),
            name: request.name.clone(),
            cidr,
            offering_id: request.offering_id,
            zone_id: request.zone_id,
            owner: request.owner.clone(),
            state: VpcState::Enabled,
            tiers: Vec::new(),
            created: Utc::now(),
        };
        self.vpc_locks.insert(vpc.id, Arc::new(Mutex::new(())));
        self.vpcs.insert(vpc.id, vpc.clone());
        log::info!("Created VPC {vpc} id={}", vpc.id);
        Ok(vpc)
    }

    /// Remove a VPC that has no tiers left.
    pub fn delete_vpc(&self, id: &VpcId) -> EngineResult<()> {
        let lock = self.vpc_lock(id)?;
        let _guard = lock_mutex(&lock);
        {
            let mut vpc = self
                .vpcs
                .get_mut(id)
                .ok_or_else(|| EngineError::not_found(VPC, id))?;
            if !vpc.tiers.is_empty() {
                let e = EngineError::ResourceInUse {
                    resource: VPC.to_string(),
                    identifier: vpc.name.clone(),
                    count: vpc.tiers.len(),
                    dependents: "network(s)".to_string(),
                };
                log::warn!("Rejected delete of VPC '{}': {e}", vpc.name);
                return Err(e);
            }
            vpc.state = VpcState::Inactive;
            log::debug!("VPC '{}' marked Inactive", vpc.name);
        }
        if let Some((_, vpc)) = self.vpcs.remove(id) {
            log::info!("Deleted VPC '{}' id={id}", vpc.name);
        }
        self.vpc_locks.remove(id);
        Ok(())
    }

    fn vpc_lock(&self, id: &VpcId) -> EngineResult<Arc<Mutex<()>>> {
        self.vpc_locks
            .get(id)
            .map(|l| Arc::clone(l.value()))
            .ok_or_else(|| EngineError::not_found(VPC, id))
    }

    pub fn vpc(&self, id: &VpcId) -> EngineResult<Vpc> {
        self.vpcs
            .get(id)
            .map(|v| v.clone())
            .ok_or_else(|| EngineError::not_found(VPC, id))
    }

    pub fn find_vpc(&self, owner: &Owner, name: &str) -> Option<Vpc> {
        self.vpcs
            .iter()
            .find(|v| &v.owner == owner && v.name == name)
            .map(|v| v.value().clone())
    }

    pub fn list_vpcs(&self) -> Vec<Vpc> {
        let mut vpcs: Vec<Vpc> = self.vpcs.iter().map(|v| v.value().clone()).collect();
        vpcs.sort_by(|a, b| a.name.cmp(&b.name));
        vpcs
    }

    /// Tier networks of a VPC in creation order.
    pub fn list_tiers(&self, vpc_id: &VpcId) -> EngineResult<Vec<Network>> {
        let vpc = self.vpc(vpc_id)?;
        Ok(vpc
            .tiers
            .iter()
            .filter_map(|id| self.networks.get(id).map(|n| n.clone()))
            .collect())
    }

    // ── Networks ──

    /// Validate and create a network.
    ///
    /// Tiers are validated and committed under the VPC mutex so concurrent
    /// requests can't both pass the overlap and Lb checks.
    pub fn create_network(&self, request: NetworkRequest) -> EngineResult<Network> {
        let result = match request.vpc_id {
            Some(vpc_id) => self.vpc_lock(&vpc_id).and_then(|lock| {
                let _guard = lock_mutex(&lock);
                self.try_create_network(&request)
            }),
            None => self.try_create_network(&request),
        };
        if let Err(e) = &result {
            log::warn!("Rejected network '{}': [{}] {e}", request.name, e.reason_code());
        }
        result
    }

    fn try_create_network(&self, request: &NetworkRequest) -> EngineResult<Network> {
        if request.name.trim().is_empty() {
            return Err(EngineError::invalid_parameter("network name must not be empty"));
        }
        let zone = self.zone(&request.zone_id)?;
        self.require_account(&request.owner)?;

        let catalog = self.catalog();
        let offering = catalog.network_offering(&request.offering_id)?;
        if !offering.is_enabled() {
            return Err(EngineError::OfferingNotEnabled {
                offering: offering.name.clone(),
            });
        }
        let mut cidr = resolve_cidr(request)?;
        let no_addressing = request.gateway.is_none() && request.netmask.is_none();

        let vpc = match request.vpc_id {
            Some(id) => Some(self.vpc(&id)?),
            None => None,
        };
        let mut tiers = Vec::new();
        let vpc_ctx = match &vpc {
            Some(vpc) => {
                if vpc.zone_id != request.zone_id {
                    return Err(EngineError::invalid_parameter(format!(
                        "network '{}' must be in zone {} of VPC '{}'",
                        request.name, vpc.zone_id, vpc.name
                    )));
                }
                if vpc.state != VpcState::Enabled {
                    return Err(EngineError::InvalidStateTransition {
                        resource: VPC.to_string(),
                        identifier: vpc.name.clone(),
                        from: format!("{:?}", vpc.state),
                        to: "new tier".to_string(),
                    });
                }
                for tier_id in &vpc.tiers {
                    if let Some(tier) = self.networks.get(tier_id) {
                        let tier_offering = catalog.network_offering(&tier.offering_id)?;
                        tiers.push(SiblingTier::new(&tier, tier_offering));
                    }
                }
                if cidr.is_none() && no_addressing {
                    cidr = Some(self.allocate_tier_cidr(vpc, &tiers)?);
                }
                Some(VpcContext {
                    vpc,
                    offering: catalog.vpc_offering(&vpc.offering_id)?,
                    tiers: &tiers,
                })
            }
            None => {
                if cidr.is_none()
                    && no_addressing
                    && offering.guest_ip_type == GuestIpType::Isolated
                {
                    cidr = Some(self.config.default_guest_cidr);
                }
                None
            }
        };

        let proposal = NetworkProposal { request, cidr };
        let ctx = NetworkContext {
            zone: &zone,
            offering,
            vpc: vpc_ctx,
        };
        validate_network(&proposal, &ctx).into_result()?;

        let cidr = cidr.ok_or_else(|| {
            EngineError::invalid_parameter("gateway and netmask must be given together")
        })?;
        let gateway = request.gateway.unwrap_or_else(|| cidr.first_host());
        let ip_range = match (request.start_ip, request.end_ip) {
            (Some(start), Some(end)) => Some(IpRange { start, end }),
            (None, None) => None,
            _ => {
                return Err(EngineError::invalid_parameter(
                    "startip and endip must be given together",
                ))
            }
        };
        if let Some(range) = &ip_range {
            if range.end < range.start
                || !cidr.contains_addr(range.start)
                || !cidr.contains_addr(range.end)
            {
                return Err(EngineError::invalid_parameter(format!(
                    "ip range {}-{} is not a range inside {}",
                    range.start,
                    range.end,
                    cidr.network()
                )));
            }
        }
        let vlan = if vpc.is_none() && offering.guest_ip_type == GuestIpType::Isolated {
            Some(lock_mutex(&self.vlans).allocate()?)
        } else {
            None
        };

        let network = Network {
            id: NetworkId::new(),
            name: request.name.clone(),
            cidr: cidr.network(),
            gateway,
            ip_range,
            offering_id: request.offering_id,
            zone_id: request.zone_id,
            vpc_id: request.vpc_id,
            owner: request.owner.clone(),
            acl_type: request.acl_type,
            vlan,
            state: NetworkState::Allocated,
            attached_vms: BTreeSet::new(),
            created: Utc::now(),
        };
        self.networks.insert(network.id, network.clone());
        if let Some(vpc_id) = network.vpc_id {
            if let Some(mut vpc) = self.vpcs.get_mut(&vpc_id) {
                vpc.tiers.push(network.id);
            }
        }
        log::info!("Created network {network} id={}", network.id);
        Ok(network)
    }

    fn allocate_tier_cidr(&self, vpc: &Vpc, tiers: &[SiblingTier]) -> EngineResult<Ipv4> {
        let taken: Vec<Ipv4> = tiers.iter().map(|t| t.cidr).collect();
        let cidr = find_free_subnet(vpc.cidr.network(), self.config.default_tier_prefix, &taken)
            .ok_or_else(|| EngineError::InsufficientCapacity {
                reason: format!(
                    "no free /{} left in VPC '{}' ({})",
                    self.config.default_tier_prefix, vpc.name, vpc.cidr
                ),
            })?;
        log::debug!("Picked {cidr} for a new tier of VPC '{}'", vpc.name);
        Ok(cidr)
    }

    /// Delete a network no VM is attached to.
    pub fn delete_network(&self, id: &NetworkId) -> EngineResult<()> {
        let vpc_id = self
            .networks
            .get(id)
            .ok_or_else(|| EngineError::not_found(NETWORK, id))?
            .vpc_id;
        let result = match vpc_id {
            Some(vpc_id) => self.vpc_lock(&vpc_id).and_then(|lock| {
                let _guard = lock_mutex(&lock);
                self.try_delete_network(id)
            }),
            None => self.try_delete_network(id),
        };
        if let Err(e) = &result {
            log::warn!("Rejected delete of network {id}: [{}] {e}", e.reason_code());
        }
        result
    }

    fn try_delete_network(&self, id: &NetworkId) -> EngineResult<()> {
        let _attach = lock_mutex(&self.attach_lock);
        validate_network_delete(&self.network(id)?).into_result()?;
        let Some((_, network)) = self.networks.remove(id) else {
            return Err(EngineError::not_found(NETWORK, id));
        };

        if network.state != NetworkState::Allocated {
            log::info!(
                "Network '{}' is {}, shutting it down before delete",
                network.name,
                network.state
            );
        }
        self.scheduler.cancel(&network.id);
        if let Some(vlan) = network.vlan {
            lock_mutex(&self.vlans).release(vlan);
        }
        if let Some(vpc_id) = network.vpc_id {
            if let Some(mut vpc) = self.vpcs.get_mut(&vpc_id) {
                vpc.tiers.retain(|t| t != id);
            }
        }
        log::info!("Deleted network '{}' id={id}", network.name);
        Ok(())
    }

    pub fn network(&self, id: &NetworkId) -> EngineResult<Network> {
        self.networks
            .get(id)
            .map(|n| n.clone())
            .ok_or_else(|| EngineError::not_found(NETWORK, id))
    }

    pub fn find_network(&self, owner: &Owner, name: &str) -> Option<Network> {
        self.networks
            .iter()
            .find(|n| &n.owner == owner && n.name == name)
            .map(|n| n.value().clone())
    }

    pub fn list_networks(&self) -> Vec<Network> {
        let mut networks: Vec<Network> = self.networks.iter().map(|n| n.value().clone()).collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name).then(a.cidr.cmp(&b.cidr)));
        networks
    }

    pub fn vlans_in_use(&self) -> usize {
        lock_mutex(&self.vlans).in_use()
    }
}

/// Lock a mutex, carrying on with the data if a holder panicked.
fn lock_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
