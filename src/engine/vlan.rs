//! VLAN id pool for isolated guest networks.

use crate::error::{EngineError, EngineResult};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

#[derive(Debug, Clone)]
pub struct VlanAllocator {
    range: RangeInclusive<u16>,
    in_use: BTreeSet<u16>,
}

impl VlanAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        VlanAllocator {
            range,
            in_use: BTreeSet::new(),
        }
    }

    /// Hand out the lowest free VLAN id.
    pub fn allocate(&mut self) -> EngineResult<u16> {
        let vlan = self
            .range
            .clone()
            .find(|v| !self.in_use.contains(v))
            .ok_or_else(|| EngineError::InsufficientCapacity {
                reason: format!(
                    "VLAN range {}-{} is exhausted",
                    self.range.start(),
                    self.range.end()
                ),
            })?;
        self.in_use.insert(vlan);
        log::debug!("Allocated VLAN {vlan}");
        Ok(vlan)
    }

    pub fn release(&mut self, vlan: u16) {
        if self.in_use.remove(&vlan) {
            log::debug!("Released VLAN {vlan}");
        } else {
            log::warn!("VLAN {vlan} released but was not allocated");
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonCode;

    #[test]
    fn test_allocate_lowest_free() {
        let mut pool = VlanAllocator::new(100..=102);
        assert_eq!(pool.allocate().unwrap(), 100);
        assert_eq!(pool.allocate().unwrap(), 101);
        pool.release(100);
        assert_eq!(pool.allocate().unwrap(), 100);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_exhausted_pool() {
        let mut pool = VlanAllocator::new(5..=5);
        pool.allocate().unwrap();
        assert_eq!(
            pool.allocate().unwrap_err().reason_code(),
            ReasonCode::InsufficientCapacity
        );
    }
}
