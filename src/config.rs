//! Engine configuration.
//!
//! Compile-time defaults, overridable through environment variables (the
//! binary loads a `.env` file first via `dotenv`).

use crate::error::{EngineError, EngineResult};
use crate::models::Ipv4;
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_VLAN_RANGE: RangeInclusive<u16> = 100..=4094;
/// How long an idle network waits before the GC shuts it down (`network.gc.wait`).
pub const DEFAULT_GC_WAIT_SECS: u64 = 600;
/// CIDR of an isolated network created without gateway/netmask.
pub const DEFAULT_GUEST_CIDR: &str = "10.1.1.0/24";
/// Prefix length of VPC tiers created without gateway/netmask.
pub const DEFAULT_TIER_PREFIX: u8 = 24;
pub const DEFAULT_PLAN_FILE: &str = "plan.json";
pub const DEFAULT_LOG_CONFIG: &str = "log4rs.yml";

pub const ENV_VLAN_RANGE: &str = "NETPOLICY_VLAN_RANGE";
pub const ENV_GC_WAIT_SECS: &str = "NETPOLICY_GC_WAIT_SECS";
pub const ENV_GUEST_CIDR: &str = "NETPOLICY_GUEST_CIDR";
pub const ENV_TIER_PREFIX: &str = "NETPOLICY_TIER_PREFIX";
pub const ENV_PLAN: &str = "NETPOLICY_PLAN";
pub const ENV_LOG_CONFIG: &str = "NETPOLICY_LOG_CONFIG";

/// Runtime settings of the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// VLAN ids handed to isolated networks outside of VPCs.
    pub vlan_range: RangeInclusive<u16>,
    pub gc_wait: Duration,
    pub default_guest_cidr: Ipv4,
    pub default_tier_prefix: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            vlan_range: DEFAULT_VLAN_RANGE,
            gc_wait: Duration::from_secs(DEFAULT_GC_WAIT_SECS),
            default_guest_cidr: Ipv4 {
                addr: std::net::Ipv4Addr::new(10, 1, 1, 0),
                mask: 24,
            },
            default_tier_prefix: DEFAULT_TIER_PREFIX,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns per variable name.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        if let Some(v) = lookup(ENV_VLAN_RANGE) {
            config.vlan_range = parse_vlan_range(&v)?;
        }
        if let Some(v) = lookup(ENV_GC_WAIT_SECS) {
            let secs: u64 = v.trim().parse().map_err(|_| {
                EngineError::invalid_parameter(format!("{ENV_GC_WAIT_SECS}={v} is not a number"))
            })?;
            config.gc_wait = Duration::from_secs(secs);
        }
        if let Some(v) = lookup(ENV_GUEST_CIDR) {
            config.default_guest_cidr = Ipv4::new(&v)?.network();
        }
        if let Some(v) = lookup(ENV_TIER_PREFIX) {
            config.default_tier_prefix = v
                .trim()
                .parse()
                .ok()
                .filter(|p| *p <= crate::models::MAX_LENGTH)
                .ok_or_else(|| {
                    EngineError::invalid_parameter(format!(
                        "{ENV_TIER_PREFIX}={v} is not a prefix length"
                    ))
                })?;
        }
        log::debug!("Engine config: {config:?}");
        Ok(config)
    }
}

/// Parse a VLAN range such as "100-4094".
pub fn parse_vlan_range(input: &str) -> EngineResult<RangeInclusive<u16>> {
    let invalid = || EngineError::invalid_parameter(format!("invalid VLAN range '{input}'"));
    let (lo, hi) = input.trim().split_once('-').ok_or_else(invalid)?;
    let lo: u16 = lo.trim().parse().map_err(|_| invalid())?;
    let hi: u16 = hi.trim().parse().map_err(|_| invalid())?;
    if lo == 0 || hi > 4094 || lo > hi {
        return Err(invalid());
    }
    Ok(lo..=hi)
}
