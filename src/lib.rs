//! Network provisioning policy engine.
//!
//! Validates network, VPC and security group requests against zone and VPC
//! constraints and applies the accepted ones to an in-memory store.
//!
//! - [`models`] - offerings, zones, VPCs, networks, security groups, CIDR math
//! - [`catalog`] - network and VPC offering registry
//! - [`policy`] - pure provisioning rules
//! - [`engine`] - transactional provisioning and the network state machine
//! - [`plan`] - JSON provisioning plans and their replay
//! - [`output`] - CSV reports

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod output;
pub mod plan;
pub mod policy;

pub use catalog::{OfferingCatalog, OfferingRef};
pub use config::EngineConfig;
pub use engine::{
    IdleGcScheduler, ManualGcScheduler, ProvisioningEngine, VmAttachment, VmAttachmentEvents,
};
pub use error::{EngineError, EngineResult, ReasonCode};
pub use policy::Decision;
