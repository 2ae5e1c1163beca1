//! Offering catalog.
//!
//! System of record for network and VPC offerings. Enforces unique names per
//! offering kind and the `Disabled <-> Enabled` lifecycle:
//! offerings are created Disabled, must be Enabled before use and Disabled
//! again before they can be deleted.

use crate::error::{EngineError, EngineResult};
use crate::models::{
    NetworkOffering, NetworkOfferingId, NetworkOfferingSpec, OfferingState, Provider, ServiceType,
    VpcOffering, VpcOfferingId, VpcOfferingSpec,
};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const NETWORK_OFFERING: &str = "Network offering";
const VPC_OFFERING: &str = "VPC offering";

/// Reference to either kind of offering, for lifecycle calls that accept both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferingRef {
    Network(NetworkOfferingId),
    Vpc(VpcOfferingId),
}

/// In-memory registry of offerings.
#[derive(Debug, Default)]
pub struct OfferingCatalog {
    network_offerings: HashMap<NetworkOfferingId, NetworkOffering>,
    vpc_offerings: HashMap<VpcOfferingId, VpcOffering>,
}

impl OfferingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network offering. It starts out Disabled.
    pub fn create_network_offering(
        &mut self,
        spec: NetworkOfferingSpec,
    ) -> EngineResult<NetworkOfferingId> {
        validate_name(NETWORK_OFFERING, &spec.name)?;
        validate_providers(&spec.name, &spec.supported_services, &spec.service_providers)?;
        if self.find_network_offering(&spec.name).is_some() {
            return Err(EngineError::DuplicateName {
                resource: NETWORK_OFFERING.to_string(),
                name: spec.name,
            });
        }

        let offering = NetworkOffering::from_spec(spec);
        let id = offering.id;
        log::info!(
            "Created network offering '{}' id={id} services=[{}]",
            offering.name,
            offering.supported_services.iter().join(",")
        );
        self.network_offerings.insert(id, offering);
        Ok(id)
    }

    /// Register a VPC offering. It starts out Disabled.
    pub fn create_vpc_offering(&mut self, spec: VpcOfferingSpec) -> EngineResult<VpcOfferingId> {
        validate_name(VPC_OFFERING, &spec.name)?;
        validate_providers(&spec.name, &spec.supported_services, &spec.service_providers)?;
        if self.find_vpc_offering(&spec.name).is_some() {
            return Err(EngineError::DuplicateName {
                resource: VPC_OFFERING.to_string(),
                name: spec.name,
            });
        }

        let offering = VpcOffering::from_spec(spec);
        let id = offering.id;
        log::info!("Created VPC offering '{}' id={id}", offering.name);
        self.vpc_offerings.insert(id, offering);
        Ok(id)
    }

    pub fn network_offering(&self, id: &NetworkOfferingId) -> EngineResult<&NetworkOffering> {
        self.network_offerings
            .get(id)
            .ok_or_else(|| EngineError::not_found(NETWORK_OFFERING, id))
    }

    pub fn vpc_offering(&self, id: &VpcOfferingId) -> EngineResult<&VpcOffering> {
        self.vpc_offerings
            .get(id)
            .ok_or_else(|| EngineError::not_found(VPC_OFFERING, id))
    }

    pub fn find_network_offering(&self, name: &str) -> Option<&NetworkOffering> {
        self.network_offerings.values().find(|o| o.name == name)
    }

    pub fn find_vpc_offering(&self, name: &str) -> Option<&VpcOffering> {
        self.vpc_offerings.values().find(|o| o.name == name)
    }

    /// Network offerings sorted by name.
    pub fn list_network_offerings(&self) -> Vec<&NetworkOffering> {
        self.network_offerings
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    /// VPC offerings sorted by name.
    pub fn list_vpc_offerings(&self) -> Vec<&VpcOffering> {
        self.vpc_offerings
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    /// Move an offering to `new_state`.
    ///
    /// Only `Disabled -> Enabled` and `Enabled -> Disabled` are legal.
    pub fn set_state(
        &mut self,
        offering: OfferingRef,
        new_state: OfferingState,
    ) -> EngineResult<()> {
        let (resource, name, state) = match offering {
            OfferingRef::Network(id) => {
                let o = self
                    .network_offerings
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::not_found(NETWORK_OFFERING, id))?;
                (NETWORK_OFFERING, o.name.as_str(), &mut o.state)
            }
            OfferingRef::Vpc(id) => {
                let o = self
                    .vpc_offerings
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::not_found(VPC_OFFERING, id))?;
                (VPC_OFFERING, o.name.as_str(), &mut o.state)
            }
        };
        if *state == new_state {
            return Err(EngineError::InvalidStateTransition {
                resource: resource.to_string(),
                identifier: name.to_string(),
                from: state.to_string(),
                to: new_state.to_string(),
            });
        }
        log::info!("{resource} '{name}': {state} -> {new_state}");
        *state = new_state;
        Ok(())
    }

    /// Remove a Disabled offering. In-use checks are the caller's job.
    pub fn delete(&mut self, offering: OfferingRef) -> EngineResult<()> {
        let (resource, name, state) = match offering {
            OfferingRef::Network(id) => {
                let o = self.network_offering(&id)?;
                (NETWORK_OFFERING, o.name.clone(), o.state)
            }
            OfferingRef::Vpc(id) => {
                let o = self.vpc_offering(&id)?;
                (VPC_OFFERING, o.name.clone(), o.state)
            }
        };
        if state != OfferingState::Disabled {
            return Err(EngineError::InvalidStateTransition {
                resource: resource.to_string(),
                identifier: name,
                from: state.to_string(),
                to: "Deleted".to_string(),
            });
        }
        match offering {
            OfferingRef::Network(id) => {
                self.network_offerings.remove(&id);
            }
            OfferingRef::Vpc(id) => {
                self.vpc_offerings.remove(&id);
            }
        }
        log::info!("Deleted {resource} '{name}'");
        Ok(())
    }
}

fn validate_name(resource: &str, name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::invalid_parameter(format!(
            "{resource} name must not be empty"
        )));
    }
    Ok(())
}

/// Every supported service needs exactly one provider and every provider
/// entry must belong to a supported service.
fn validate_providers(
    name: &str,
    services: &BTreeSet<ServiceType>,
    providers: &BTreeMap<ServiceType, Provider>,
) -> EngineResult<()> {
    if let Some(missing) = services.iter().find(|s| !providers.contains_key(*s)) {
        return Err(EngineError::invalid_parameter(format!(
            "offering '{name}': service {missing} has no provider"
        )));
    }
    if let Some(extra) = providers.keys().find(|s| !services.contains(*s)) {
        return Err(EngineError::invalid_parameter(format!(
            "offering '{name}': provider given for unsupported service {extra}"
        )));
    }
    match providers.get(&ServiceType::SecurityGroup) {
        Some(p) if *p != Provider::SecurityGroupProvider => {
            Err(EngineError::invalid_parameter(format!(
                "offering '{name}': SecurityGroup service must use SecurityGroupProvider, not {p}"
            )))
        }
        _ => Ok(()),
    }
}
