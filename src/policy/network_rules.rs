//! Network creation rules.
//!
//! The order of [`NETWORK_RULES`] is the precedence when a request violates
//! several rules at once.

use super::{Decision, NetworkContext, NetworkProposal, VpcContext};
use crate::error::{EngineError, EngineResult};
use crate::models::{GuestIpType, Ipv4, LbIsolation, NetworkRequest, ServiceType};

type RuleFn = fn(&NetworkProposal<'_>, &NetworkContext<'_>) -> EngineResult<()>;

/// Named network rules in evaluation order.
pub const NETWORK_RULES: [(&str, RuleFn); 8] = [
    ("zone_compatibility", zone_compatibility),
    ("vpc_membership", vpc_membership),
    ("vpc_service_coverage", vpc_service_coverage),
    ("provider_vpc_capability", provider_vpc_capability),
    ("lb_exclusivity", lb_exclusivity),
    ("cidr_nesting", cidr_nesting),
    ("ownership", ownership),
    ("shared_ip_range", shared_ip_range),
];

/// Run every network rule in order; the first rejection wins.
pub fn validate_network(proposal: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> Decision {
    for (name, rule) in NETWORK_RULES {
        if let Err(e) = rule(proposal, ctx) {
            log::debug!(
                "rule {name} rejected network '{}': {e}",
                proposal.request.name
            );
            return Decision::Rejected(e);
        }
        log::trace!("rule {name} passed for network '{}'", proposal.request.name);
    }
    Decision::Accepted
}

/// CIDR described by the request's gateway and netmask.
///
/// `Ok(None)` when either is missing; whether that is acceptable depends on
/// the offering and is decided later.
pub fn resolve_cidr(request: &NetworkRequest) -> EngineResult<Option<Ipv4>> {
    match (request.gateway, request.netmask) {
        (Some(gateway), Some(netmask)) => Ok(Some(Ipv4::from_gateway_netmask(gateway, netmask)?)),
        _ => Ok(None),
    }
}

fn zone_compatibility(_: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let offering = ctx.offering;
    let reject = |reason: &str| {
        Err(EngineError::IncompatibleZoneType {
            offering: offering.name.clone(),
            zone: ctx.zone.to_string(),
            reason: reason.to_string(),
        })
    };
    if ctx.zone.is_security_group_enabled() {
        if offering.guest_ip_type == GuestIpType::Isolated {
            return reject("isolated networks are not supported in a security group enabled zone");
        }
        if !offering.supports(ServiceType::SecurityGroup) {
            return reject("shared networks in a security group enabled zone need the SecurityGroup service");
        }
    } else if offering.supports(ServiceType::SecurityGroup) {
        return reject("the SecurityGroup service needs a security group enabled zone");
    }
    Ok(())
}

fn vpc_membership(proposal: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let offering = ctx.offering;
    if proposal.request.vpc_id.is_none() {
        if offering.for_vpc {
            return Err(EngineError::NotAVpcOffering {
                offering: offering.name.clone(),
                reason: "is meant for VPC tiers and needs a VPC".to_string(),
            });
        }
        return Ok(());
    }
    if !offering.for_vpc {
        return Err(EngineError::NotAVpcOffering {
            offering: offering.name.clone(),
            reason: "is not usable for VPC tiers".to_string(),
        });
    }
    if offering.conserve_mode {
        return Err(EngineError::ConserveModeNotAllowedInVpc {
            offering: offering.name.clone(),
        });
    }
    if offering.guest_ip_type == GuestIpType::Shared {
        return Err(EngineError::SharedNotAllowedInVpc {
            offering: offering.name.clone(),
        });
    }
    Ok(())
}

fn vpc_service_coverage(_: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let Some(VpcContext { offering: vpc_offering, .. }) = ctx.vpc else {
        return Ok(());
    };
    match ctx
        .offering
        .supported_services
        .iter()
        .find(|s| !vpc_offering.supports(**s))
    {
        Some(service) => Err(EngineError::ServiceNotSupportedByVpcOffering {
            service: service.to_string(),
            offering: ctx.offering.name.clone(),
            vpc_offering: vpc_offering.name.clone(),
        }),
        None => Ok(()),
    }
}

fn provider_vpc_capability(_: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    if ctx.vpc.is_none() {
        return Ok(());
    }
    // SourceNat first, it is the service every VPC tier depends on
    let source_nat = ctx
        .offering
        .provider(ServiceType::SourceNat)
        .map(|p| (ServiceType::SourceNat, p));
    let others = ctx
        .offering
        .service_providers
        .iter()
        .filter(|(s, _)| **s != ServiceType::SourceNat)
        .map(|(s, p)| (*s, *p));

    match source_nat
        .into_iter()
        .chain(others)
        .find(|(_, p)| !p.is_vpc_capable())
    {
        Some((service, provider)) => Err(EngineError::ProviderNotVpcCapable {
            provider: provider.to_string(),
            service: service.to_string(),
        }),
        None => Ok(()),
    }
}

fn lb_exclusivity(_: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let Some(vpc) = ctx.vpc else {
        return Ok(());
    };
    if !ctx.offering.supports(ServiceType::Lb)
        || ctx.offering.lb_isolation == LbIsolation::Dedicated
    {
        return Ok(());
    }
    match vpc.tiers.iter().find(|t| t.provides_lb) {
        Some(tier) => Err(EngineError::DuplicateLbServiceInVpc {
            vpc: vpc.vpc.name.clone(),
            network: tier.name.clone(),
        }),
        None => Ok(()),
    }
}

fn cidr_nesting(proposal: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let Some(vpc) = ctx.vpc else {
        return Ok(());
    };
    let Some(cidr) = proposal.cidr else {
        return Err(EngineError::invalid_parameter(format!(
            "tier '{}' has no gateway/netmask",
            proposal.request.name
        )));
    };
    if !vpc.vpc.cidr.contains(&cidr) {
        return Err(EngineError::CidrOutsideVpcRange {
            cidr: cidr.to_string(),
            vpc_cidr: vpc.vpc.cidr.to_string(),
        });
    }
    match vpc.tiers.iter().find(|t| t.cidr.overlaps(&cidr)) {
        Some(tier) => Err(EngineError::CidrOverlap {
            cidr: cidr.network().to_string(),
            existing: tier.cidr.to_string(),
            network: tier.name.clone(),
        }),
        None => Ok(()),
    }
}

fn ownership(proposal: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    let Some(vpc) = ctx.vpc else {
        return Ok(());
    };
    if proposal.request.owner != vpc.vpc.owner {
        return Err(EngineError::OwnershipMismatch {
            requester: proposal.request.owner.to_string(),
            owner: vpc.vpc.owner.to_string(),
            vpc: vpc.vpc.name.clone(),
        });
    }
    Ok(())
}

fn shared_ip_range(proposal: &NetworkProposal<'_>, ctx: &NetworkContext<'_>) -> EngineResult<()> {
    if ctx.offering.guest_ip_type != GuestIpType::Shared {
        return Ok(());
    }
    let request = proposal.request;
    let missing: Vec<&str> = [
        ("gateway", request.gateway.is_none()),
        ("netmask", request.netmask.is_none()),
        ("startip", request.start_ip.is_none()),
        ("endip", request.end_ip.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    let incomplete = |reason: String| Err(EngineError::IncompleteIpRange { reason });

    if !missing.is_empty() {
        return incomplete(format!("missing {}", missing.join(", ")));
    }
    let (Some(cidr), Some(start), Some(end)) = (proposal.cidr, request.start_ip, request.end_ip)
    else {
        return incomplete("gateway/netmask don't describe a subnet".to_string());
    };
    if end < start {
        return incomplete(format!("endip {end} is lower than startip {start}"));
    }
    if let Some(outside) = [start, end].into_iter().find(|ip| !cidr.contains_addr(*ip)) {
        return incomplete(format!("{outside} is outside of {}", cidr.network()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonCode;
    use crate::models::*;
    use crate::policy::SiblingTier;
    use std::collections::{BTreeMap, BTreeSet};
    use std::net::Ipv4Addr;

    fn zone(network_type: ZoneNetworkType, sg: bool) -> Zone {
        Zone {
            id: ZoneId::new(),
            name: "zone1".to_string(),
            network_type,
            security_groups_enabled: sg,
        }
    }

    fn offering(
        guest_ip_type: GuestIpType,
        services: &[(ServiceType, Provider)],
        for_vpc: bool,
    ) -> NetworkOffering {
        NetworkOffering {
            id: NetworkOfferingId::new(),
            name: "offering".to_string(),
            guest_ip_type,
            supported_services: services.iter().map(|(s, _)| *s).collect(),
            service_providers: services.iter().copied().collect(),
            for_vpc,
            conserve_mode: false,
            lb_isolation: LbIsolation::Shared,
            state: OfferingState::Enabled,
            created: chrono::Utc::now(),
        }
    }

    fn vpc_tier_offering() -> NetworkOffering {
        offering(
            GuestIpType::Isolated,
            &[
                (ServiceType::Dhcp, Provider::VpcVirtualRouter),
                (ServiceType::SourceNat, Provider::VpcVirtualRouter),
                (ServiceType::Lb, Provider::VpcVirtualRouter),
            ],
            true,
        )
    }

    fn vpc_offering() -> VpcOffering {
        let services: BTreeSet<ServiceType> = [
            ServiceType::Dhcp,
            ServiceType::Dns,
            ServiceType::SourceNat,
            ServiceType::Lb,
            ServiceType::StaticNat,
            ServiceType::NetworkACL,
        ]
        .into_iter()
        .collect();
        let service_providers: BTreeMap<ServiceType, Provider> = services
            .iter()
            .map(|s| (*s, Provider::VpcVirtualRouter))
            .collect();
        VpcOffering {
            id: VpcOfferingId::new(),
            name: "default-vpc".to_string(),
            supported_services: services,
            service_providers,
            state: OfferingState::Enabled,
            created: chrono::Utc::now(),
        }
    }

    fn vpc(owner: Owner) -> Vpc {
        Vpc {
            id: VpcId::new(),
            name: "vpc1".to_string(),
            cidr: Ipv4::new("10.1.1.1/16").unwrap(),
            offering_id: VpcOfferingId::new(),
            zone_id: ZoneId::new(),
            owner,
            state: VpcState::Enabled,
            tiers: Vec::new(),
            created: chrono::Utc::now(),
        }
    }

    fn owner() -> Owner {
        Owner::new("admin", "ROOT")
    }

    fn tier_request(gateway: [u8; 4], netmask: [u8; 4]) -> NetworkRequest {
        NetworkRequest::new("tier", NetworkOfferingId::new(), ZoneId::new(), owner())
            .in_vpc(VpcId::new())
            .with_gateway(Ipv4Addr::from(gateway), Ipv4Addr::from(netmask))
    }

    fn check(
        request: &NetworkRequest,
        zone: &Zone,
        offering: &NetworkOffering,
        vpc: Option<VpcContext<'_>>,
    ) -> Decision {
        let proposal = NetworkProposal {
            request,
            cidr: resolve_cidr(request).unwrap(),
        };
        validate_network(
            &proposal,
            &NetworkContext {
                zone,
                offering,
                vpc,
            },
        )
    }

    #[test]
    fn test_isolated_rejected_in_sg_zone() {
        let request = NetworkRequest::new("n", NetworkOfferingId::new(), ZoneId::new(), owner());
        let iso = offering(
            GuestIpType::Isolated,
            &[(ServiceType::SourceNat, Provider::VirtualRouter)],
            false,
        );
        for z in [
            zone(ZoneNetworkType::Basic, false),
            zone(ZoneNetworkType::Advanced, true),
        ] {
            let decision = check(&request, &z, &iso, None);
            assert_eq!(
                decision.reason_code(),
                Some(ReasonCode::IncompatibleZoneType)
            );
        }
        let advanced = zone(ZoneNetworkType::Advanced, false);
        assert!(check(&request, &advanced, &iso, None).is_accepted());
    }

    #[test]
    fn test_shared_in_sg_zone_needs_security_group_service() {
        let request = NetworkRequest::new("n", NetworkOfferingId::new(), ZoneId::new(), owner())
            .with_gateway(Ipv4Addr::new(10, 2, 0, 1), Ipv4Addr::new(255, 255, 255, 0))
            .with_ip_range(Ipv4Addr::new(10, 2, 0, 10), Ipv4Addr::new(10, 2, 0, 20));
        let z = zone(ZoneNetworkType::Advanced, true);

        let plain = offering(
            GuestIpType::Shared,
            &[(ServiceType::Dhcp, Provider::VirtualRouter)],
            false,
        );
        let decision = check(&request, &z, &plain, None);
        assert_eq!(
            decision.reason_code(),
            Some(ReasonCode::IncompatibleZoneType)
        );

        let sg = offering(
            GuestIpType::Shared,
            &[
                (ServiceType::Dhcp, Provider::VirtualRouter),
                (ServiceType::SecurityGroup, Provider::SecurityGroupProvider),
            ],
            false,
        );
        assert!(check(&request, &z, &sg, None).is_accepted());

        // and the same offering is refused where security groups are off
        let plain_zone = zone(ZoneNetworkType::Advanced, false);
        assert_eq!(
            check(&request, &plain_zone, &sg, None).reason_code(),
            Some(ReasonCode::IncompatibleZoneType)
        );
    }

    #[test]
    fn test_vpc_membership_rules() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let o = owner();
        let v = vpc(o.clone());
        let vo = vpc_offering();
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &[],
        };
        let request = tier_request([10, 1, 1, 1], [255, 255, 255, 0]);

        let mut non_vpc = vpc_tier_offering();
        non_vpc.for_vpc = false;
        assert_eq!(
            check(&request, &z, &non_vpc, Some(ctx)).reason_code(),
            Some(ReasonCode::NotAVpcOffering)
        );

        let mut conserve = vpc_tier_offering();
        conserve.conserve_mode = true;
        assert_eq!(
            check(&request, &z, &conserve, Some(ctx)).reason_code(),
            Some(ReasonCode::ConserveModeNotAllowedInVpc)
        );

        let mut shared = vpc_tier_offering();
        shared.guest_ip_type = GuestIpType::Shared;
        assert_eq!(
            check(&request, &z, &shared, Some(ctx)).reason_code(),
            Some(ReasonCode::SharedNotAllowedInVpc)
        );

        assert!(check(&request, &z, &vpc_tier_offering(), Some(ctx)).is_accepted());

        // a VPC offering outside of a VPC
        let standalone = NetworkRequest::new("n", NetworkOfferingId::new(), ZoneId::new(), o);
        assert_eq!(
            check(&standalone, &z, &vpc_tier_offering(), None).reason_code(),
            Some(ReasonCode::NotAVpcOffering)
        );
    }

    #[test]
    fn test_service_not_in_vpc_offering() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(owner());
        let vo = vpc_offering();
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &[],
        };
        let mut o = vpc_tier_offering();
        o.supported_services.insert(ServiceType::Vpn);
        o.service_providers
            .insert(ServiceType::Vpn, Provider::VpcVirtualRouter);
        let decision = check(&tier_request([10, 1, 1, 1], [255, 255, 255, 0]), &z, &o, Some(ctx));
        assert_eq!(
            decision.reason_code(),
            Some(ReasonCode::ServiceNotSupportedByVpcOffering)
        );
        assert!(decision.message().unwrap().contains("Vpn"));
    }

    #[test]
    fn test_source_nat_provider_must_be_vpc_capable() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(owner());
        let vo = vpc_offering();
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &[],
        };
        let mut o = vpc_tier_offering();
        // Dhcp is checked after SourceNat even though it sorts first
        o.service_providers
            .insert(ServiceType::Dhcp, Provider::VirtualRouter);
        o.service_providers
            .insert(ServiceType::SourceNat, Provider::VirtualRouter);
        let decision = check(&tier_request([10, 1, 1, 1], [255, 255, 255, 0]), &z, &o, Some(ctx));
        assert_eq!(
            decision.reason_code(),
            Some(ReasonCode::ProviderNotVpcCapable)
        );
        assert!(decision.message().unwrap().contains("SourceNat"));
    }

    #[test]
    fn test_lb_exclusivity() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(owner());
        let vo = vpc_offering();
        let tiers = vec![SiblingTier {
            id: NetworkId::new(),
            name: "web".to_string(),
            cidr: Ipv4::new("10.1.1.0/24").unwrap(),
            provides_lb: true,
        }];
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &tiers,
        };
        let request = tier_request([10, 1, 2, 1], [255, 255, 255, 0]);

        let decision = check(&request, &z, &vpc_tier_offering(), Some(ctx));
        assert_eq!(
            decision.reason_code(),
            Some(ReasonCode::DuplicateLbServiceInVpc)
        );

        let mut dedicated = vpc_tier_offering();
        dedicated.lb_isolation = LbIsolation::Dedicated;
        dedicated
            .service_providers
            .insert(ServiceType::Lb, Provider::Netscaler);
        assert!(check(&request, &z, &dedicated, Some(ctx)).is_accepted());
    }

    #[test]
    fn test_cidr_nesting_and_overlap() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(owner());
        let vo = vpc_offering();
        let tiers = vec![SiblingTier {
            id: NetworkId::new(),
            name: "tier1".to_string(),
            cidr: Ipv4::new("10.1.1.0/24").unwrap(),
            provides_lb: false,
        }];
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &tiers,
        };
        let mut o = vpc_tier_offering();
        o.supported_services.remove(&ServiceType::Lb);
        o.service_providers.remove(&ServiceType::Lb);

        let outside = tier_request([10, 2, 1, 1], [255, 255, 255, 0]);
        assert_eq!(
            check(&outside, &z, &o, Some(ctx)).reason_code(),
            Some(ReasonCode::CidrOutsideVpcRange)
        );

        let same = tier_request([10, 1, 1, 1], [255, 255, 255, 0]);
        assert_eq!(
            check(&same, &z, &o, Some(ctx)).reason_code(),
            Some(ReasonCode::CidrOverlap)
        );

        let nested = tier_request([10, 1, 1, 1], [255, 255, 255, 192]);
        assert_eq!(
            check(&nested, &z, &o, Some(ctx)).reason_code(),
            Some(ReasonCode::CidrOverlap)
        );

        let next = tier_request([10, 1, 2, 1], [255, 255, 255, 0]);
        assert!(check(&next, &z, &o, Some(ctx)).is_accepted());
    }

    #[test]
    fn test_ownership_mismatch() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(Owner::new("other", "ROOT"));
        let vo = vpc_offering();
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &[],
        };
        let decision = check(
            &tier_request([10, 1, 1, 1], [255, 255, 255, 0]),
            &z,
            &vpc_tier_offering(),
            Some(ctx),
        );
        assert_eq!(decision.reason_code(), Some(ReasonCode::OwnershipMismatch));
    }

    #[test]
    fn test_shared_ip_range_completeness() {
        let z = zone(ZoneNetworkType::Advanced, false);
        let shared = offering(
            GuestIpType::Shared,
            &[(ServiceType::Dhcp, Provider::VirtualRouter)],
            false,
        );
        let base = NetworkRequest::new("shared", NetworkOfferingId::new(), ZoneId::new(), owner())
            .with_acl_type(AclType::Domain);

        let decision = check(&base, &z, &shared, None);
        assert_eq!(decision.reason_code(), Some(ReasonCode::IncompleteIpRange));
        assert!(decision
            .message()
            .unwrap()
            .contains("gateway, netmask, startip, endip"));

        let with_gw = base
            .clone()
            .with_gateway(Ipv4Addr::new(10, 3, 0, 1), Ipv4Addr::new(255, 255, 255, 0));
        let reversed = with_gw
            .clone()
            .with_ip_range(Ipv4Addr::new(10, 3, 0, 50), Ipv4Addr::new(10, 3, 0, 10));
        assert_eq!(
            check(&reversed, &z, &shared, None).reason_code(),
            Some(ReasonCode::IncompleteIpRange)
        );

        let outside = with_gw
            .clone()
            .with_ip_range(Ipv4Addr::new(10, 3, 0, 10), Ipv4Addr::new(10, 3, 1, 10));
        assert_eq!(
            check(&outside, &z, &shared, None).reason_code(),
            Some(ReasonCode::IncompleteIpRange)
        );

        let good = with_gw.with_ip_range(Ipv4Addr::new(10, 3, 0, 10), Ipv4Addr::new(10, 3, 0, 50));
        assert!(check(&good, &z, &shared, None).is_accepted());
    }

    #[test]
    fn test_first_failing_rule_wins() {
        // conserve mode and an out-of-range CIDR: rule 2 is reported
        let z = zone(ZoneNetworkType::Advanced, false);
        let v = vpc(Owner::new("other", "ROOT"));
        let vo = vpc_offering();
        let ctx = VpcContext {
            vpc: &v,
            offering: &vo,
            tiers: &[],
        };
        let mut conserve = vpc_tier_offering();
        conserve.conserve_mode = true;
        let decision = check(
            &tier_request([192, 168, 0, 1], [255, 255, 255, 0]),
            &z,
            &conserve,
            Some(ctx),
        );
        assert_eq!(
            decision.reason_code(),
            Some(ReasonCode::ConserveModeNotAllowedInVpc)
        );
    }

    #[test]
    fn test_resolve_cidr() {
        let request = tier_request([10, 1, 1, 1], [255, 0, 255, 0]);
        assert_eq!(
            resolve_cidr(&request).unwrap_err().reason_code(),
            ReasonCode::InvalidCidr
        );
        let request = NetworkRequest::new("n", NetworkOfferingId::new(), ZoneId::new(), owner());
        assert_eq!(resolve_cidr(&request).unwrap(), None);
    }
}
