//! IPv4 address and CIDR notation utilities.
//!
//! Provides [`Ipv4`] struct for representing IPv4 addresses with a prefix
//! length, along with the containment and overlap checks the policy rules
//! are built on.

use crate::error::{EngineError, EngineResult};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length for an IPv4 prefix (32 bits).
pub const MAX_LENGTH: u8 = 32;

fn prefix_bits(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (MAX_LENGTH - len.min(MAX_LENGTH))
    }
}

/// Convert a CIDR prefix length to a subnet mask as u32.
///
/// # Examples
/// ```
/// use network_policy_engine::models::get_cidr_mask;
/// assert_eq!(get_cidr_mask(24).unwrap(), 0xFFFFFF00);
/// ```
pub fn get_cidr_mask(len: u8) -> EngineResult<u32> {
    if len > MAX_LENGTH {
        Err(EngineError::invalid_cidr(
            format!("/{len}"),
            "Network length is too long",
        ))
    } else {
        Ok(prefix_bits(len))
    }
}

/// Convert a dotted netmask (e.g. 255.255.255.192) to a prefix length.
///
/// Fails on non-contiguous masks such as 255.0.255.0.
pub fn netmask_to_len(netmask: Ipv4Addr) -> EngineResult<u8> {
    let bits = u32::from(netmask);
    let len = bits.leading_ones();
    if bits.checked_shl(len).unwrap_or(0) != 0 {
        return Err(EngineError::invalid_cidr(
            netmask,
            "Netmask bits are not contiguous",
        ));
    }
    // leading_ones() of a u32 is at most 32
    Ok(u8::try_from(len).unwrap_or(MAX_LENGTH))
}

/// Get the network address for a given IP and prefix length.
pub fn cut_addr(addr: Ipv4Addr, len: u8) -> EngineResult<Ipv4Addr> {
    let mask = get_cidr_mask(len)?;
    Ok(Ipv4Addr::from(u32::from(addr) & mask))
}

/// Calculate the broadcast address for a given IP and prefix length.
pub fn broadcast_addr(addr: Ipv4Addr, len: u8) -> EngineResult<Ipv4Addr> {
    let mask = get_cidr_mask(len)?;
    let network_bits = u32::from(addr) & mask;
    Ok(Ipv4Addr::from(network_bits | !mask))
}

/// Returns the IP address following the given subnet.
pub fn ip_after_subnet(addr: Ipv4Addr, len: u8) -> EngineResult<Ipv4Addr> {
    let mask = get_cidr_mask(len)?;
    let subnet_size = 1u64 << (MAX_LENGTH - len);
    let network_bits = u64::from(u32::from(addr) & mask);
    let next_subnet_bits = u32::try_from(network_bits + subnet_size).map_err(|_| {
        EngineError::invalid_cidr(format!("{addr}/{len}"), "Next subnet calculation overflowed")
    })?;
    Ok(Ipv4Addr::from(next_subnet_bits))
}

/// Calculate the next subnet after the given [`Ipv4`] subnet.
///
/// If `mask` is provided, the next subnet will use that mask size.
pub fn next_subnet_ipv4(ipv4: Ipv4, mask: Option<u8>) -> EngineResult<Ipv4> {
    let current_mask = ipv4.mask;
    let new_mask = mask.unwrap_or(current_mask);
    let start = if new_mask <= current_mask {
        // eq or larger subnet (smaller mask)
        ipv4.addr
    } else {
        broadcast_addr(ipv4.addr, current_mask)?
    };
    Ok(Ipv4 {
        addr: ip_after_subnet(start, new_mask)?,
        mask: new_mask,
    })
}

/// Calculate the minimum mask for an IP address based on trailing zeros.
pub fn lo_mask(ip: Ipv4Addr) -> u8 {
    let trailing_zeros = u32::from(ip).trailing_zeros().min(32);
    MAX_LENGTH - u8::try_from(trailing_zeros).unwrap_or(MAX_LENGTH)
}

/// Number of usable host addresses in a subnet of the given length.
///
/// Network and broadcast addresses are reserved, except for /31
/// point-to-point links and /32 host routes.
pub fn num_hosts(len: u8) -> EngineResult<u64> {
    match len {
        l if l > MAX_LENGTH => Err(EngineError::invalid_cidr(
            format!("/{len}"),
            "Network length is too long",
        )),
        32 => Ok(1),
        31 => Ok(2),
        l => Ok((1u64 << (MAX_LENGTH - l)) - 2),
    }
}

/// Find the first subnet of `len` inside `outer` that overlaps none of `taken`.
pub fn find_free_subnet(outer: Ipv4, len: u8, taken: &[Ipv4]) -> Option<Ipv4> {
    if len < outer.mask || len > MAX_LENGTH {
        return None;
    }
    let mut candidate = Ipv4 {
        addr: outer.lo(),
        mask: len,
    };
    while outer.contains(&candidate) {
        match taken.iter().find(|t| t.overlaps(&candidate)) {
            None => return Some(candidate),
            Some(blocker) => {
                // skip past whichever of the two ends later
                let skip_from = if blocker.hi() > candidate.hi() {
                    *blocker
                } else {
                    candidate
                };
                let next = next_subnet_ipv4(skip_from, Some(len)).ok()?;
                candidate = Ipv4 {
                    addr: cut_addr(next.addr, len).ok()?,
                    mask: len,
                };
            }
        }
    }
    None
}

/// IPv4 address with CIDR notation support.
///
/// The address keeps any host bits it was parsed with (a gateway such as
/// `10.1.1.1/24` stays printable as given); every range computation works on
/// the masked network address.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
pub struct Ipv4 {
    /// The IPv4 address.
    pub addr: Ipv4Addr,
    /// The prefix length (0-32).
    pub mask: u8,
}

impl Serialize for Ipv4 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ipv4 {
    fn deserialize<D>(deserializer: D) -> Result<Ipv4, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ipv4::new(&s).map_err(de::Error::custom)
    }
}

impl FromStr for Ipv4 {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4::new(s)
    }
}

impl Ipv4 {
    /// Create a new [`Ipv4`] from a CIDR string (e.g., "10.0.0.0/24").
    pub fn new(addr_cidr: &str) -> EngineResult<Ipv4> {
        let addr_cidr = addr_cidr.trim();
        let Some((addr, mask)) = addr_cidr.split_once('/') else {
            return Err(EngineError::invalid_cidr(addr_cidr, "Invalid address/mask"));
        };
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| EngineError::invalid_cidr(addr_cidr, format!("Invalid address {addr}")))?;
        let mask: u8 = mask
            .parse()
            .map_err(|_| EngineError::invalid_cidr(addr_cidr, format!("Invalid prefix {mask}")))?;
        if mask > MAX_LENGTH {
            return Err(EngineError::invalid_cidr(
                addr_cidr,
                "Network length is too long",
            ));
        }
        Ok(Ipv4 { addr, mask })
    }

    /// Build a CIDR from a gateway address and a dotted netmask.
    pub fn from_gateway_netmask(gateway: Ipv4Addr, netmask: Ipv4Addr) -> EngineResult<Ipv4> {
        Ok(Ipv4 {
            addr: gateway,
            mask: netmask_to_len(netmask)?,
        })
    }

    /// The same range with host bits cleared (e.g. 10.1.1.1/24 -> 10.1.1.0/24).
    pub fn network(&self) -> Ipv4 {
        Ipv4 {
            addr: self.lo(),
            mask: self.mask,
        }
    }

    /// Dotted netmask for this prefix length.
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(prefix_bits(self.mask))
    }

    /// Get the highest (broadcast) address in the subnet.
    pub fn hi(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !prefix_bits(self.mask))
    }

    /// Get the lowest (network) address in the subnet.
    pub fn lo(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & prefix_bits(self.mask))
    }

    /// First usable host address, conventionally the gateway.
    pub fn first_host(&self) -> Ipv4Addr {
        if self.mask >= 31 {
            self.lo()
        } else {
            Ipv4Addr::from(u32::from(self.lo()) + 1)
        }
    }

    /// True iff every address of `inner` lies within `self`.
    pub fn contains(&self, inner: &Ipv4) -> bool {
        let mask = prefix_bits(self.mask);
        self.mask <= inner.mask && (u32::from(self.addr) & mask) == (u32::from(inner.addr) & mask)
    }

    /// True iff `addr` lies within this range.
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        let mask = prefix_bits(self.mask);
        (u32::from(self.addr) & mask) == (u32::from(addr) & mask)
    }

    /// True iff the two ranges share any address, including equality.
    pub fn overlaps(&self, other: &Ipv4) -> bool {
        self.lo() <= other.hi() && other.lo() <= self.hi()
    }
}

impl std::fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.mask)
    }
}
