//! Error taxonomy for the provisioning engine.
//!
//! Every rejection carries a [`ReasonCode`] and an operator-facing message.
//! Rejections are deterministic functions of the input and current state and
//! never leave partial commits behind.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable reason attached to every [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    // ── Address ranges ──
    InvalidCidr,
    CidrOutsideVpcRange,
    CidrOverlap,
    // ── Offering / zone mismatch ──
    IncompatibleZoneType,
    NotAVpcOffering,
    SharedNotAllowedInVpc,
    ConserveModeNotAllowedInVpc,
    // ── Service / provider policy ──
    ServiceNotSupportedByVpcOffering,
    ProviderNotVpcCapable,
    DuplicateLbServiceInVpc,
    // ── Tenancy ──
    OwnershipMismatch,
    // ── Shared networks ──
    IncompleteIpRange,
    // ── Lifecycle ──
    ResourceInUse,
    ProtectedResource,
    OfferingNotEnabled,
    InsufficientCapacity,
    // ── Catalog integrity ──
    DuplicateName,
    InvalidStateTransition,
    NotFound,
    InvalidParameter,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Unified error type returned by the catalog, validator and engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid CIDR '{input}': {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("CIDR {cidr} is outside of the VPC super CIDR {vpc_cidr}")]
    CidrOutsideVpcRange { cidr: String, vpc_cidr: String },

    #[error("CIDR {cidr} overlaps with CIDR {existing} of network '{network}'")]
    CidrOverlap {
        cidr: String,
        existing: String,
        network: String,
    },

    #[error("Offering '{offering}' can't be used in zone '{zone}': {reason}")]
    IncompatibleZoneType {
        offering: String,
        zone: String,
        reason: String,
    },

    #[error("Network offering '{offering}' {reason}")]
    NotAVpcOffering { offering: String, reason: String },

    #[error("Network offering '{offering}' has guest type Shared; only Isolated networks can be created inside a VPC")]
    SharedNotAllowedInVpc { offering: String },

    #[error("Network offering '{offering}' has conserve mode enabled; it can't be used inside a VPC")]
    ConserveModeNotAllowedInVpc { offering: String },

    #[error("Service {service} of network offering '{offering}' is not supported by VPC offering '{vpc_offering}'")]
    ServiceNotSupportedByVpcOffering {
        service: String,
        offering: String,
        vpc_offering: String,
    },

    #[error("Provider {provider} of service {service} can't be used inside a VPC")]
    ProviderNotVpcCapable { provider: String, service: String },

    #[error("VPC '{vpc}' already has network '{network}' providing the Lb service")]
    DuplicateLbServiceInVpc { vpc: String, network: String },

    #[error("Owner {requester} doesn't match owner {owner} of VPC '{vpc}'")]
    OwnershipMismatch {
        requester: String,
        owner: String,
        vpc: String,
    },

    #[error("Incomplete IP range for shared network: {reason}")]
    IncompleteIpRange { reason: String },

    #[error("{resource} '{identifier}' is in use by {count} {dependents}")]
    ResourceInUse {
        resource: String,
        identifier: String,
        count: usize,
        dependents: String,
    },

    #[error("{resource} '{identifier}' can't be removed: {reason}")]
    ProtectedResource {
        resource: String,
        identifier: String,
        reason: String,
    },

    #[error("Not enough capacity: {reason}")]
    InsufficientCapacity { reason: String },

    #[error("Offering '{offering}' is not enabled")]
    OfferingNotEnabled { offering: String },

    #[error("{resource} with name '{name}' already exists")]
    DuplicateName { resource: String, name: String },

    #[error("Invalid state transition for {resource} '{identifier}': {from} -> {to}")]
    InvalidStateTransition {
        resource: String,
        identifier: String,
        from: String,
        to: String,
    },

    #[error("{resource} not found: {identifier}")]
    NotFound {
        resource: String,
        identifier: String,
    },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl EngineError {
    /// Reason code for the rejection.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::InvalidCidr { .. } => ReasonCode::InvalidCidr,
            Self::CidrOutsideVpcRange { .. } => ReasonCode::CidrOutsideVpcRange,
            Self::CidrOverlap { .. } => ReasonCode::CidrOverlap,
            Self::IncompatibleZoneType { .. } => ReasonCode::IncompatibleZoneType,
            Self::NotAVpcOffering { .. } => ReasonCode::NotAVpcOffering,
            Self::SharedNotAllowedInVpc { .. } => ReasonCode::SharedNotAllowedInVpc,
            Self::ConserveModeNotAllowedInVpc { .. } => ReasonCode::ConserveModeNotAllowedInVpc,
            Self::ServiceNotSupportedByVpcOffering { .. } => {
                ReasonCode::ServiceNotSupportedByVpcOffering
            }
            Self::ProviderNotVpcCapable { .. } => ReasonCode::ProviderNotVpcCapable,
            Self::DuplicateLbServiceInVpc { .. } => ReasonCode::DuplicateLbServiceInVpc,
            Self::OwnershipMismatch { .. } => ReasonCode::OwnershipMismatch,
            Self::IncompleteIpRange { .. } => ReasonCode::IncompleteIpRange,
            Self::ResourceInUse { .. } => ReasonCode::ResourceInUse,
            Self::ProtectedResource { .. } => ReasonCode::ProtectedResource,
            Self::OfferingNotEnabled { .. } => ReasonCode::OfferingNotEnabled,
            Self::InsufficientCapacity { .. } => ReasonCode::InsufficientCapacity,
            Self::DuplicateName { .. } => ReasonCode::DuplicateName,
            Self::InvalidStateTransition { .. } => ReasonCode::InvalidStateTransition,
            Self::NotFound { .. } => ReasonCode::NotFound,
            Self::InvalidParameter { .. } => ReasonCode::InvalidParameter,
        }
    }

    pub(crate) fn not_found(resource: &str, identifier: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            identifier: identifier.to_string(),
        }
    }

    pub(crate) fn invalid_cidr(input: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type EngineResult<T> = Result<T, EngineError>;
