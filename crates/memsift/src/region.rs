//! Memory region snapshots and the filtered iteration domain of a scan.

use crate::{Address, AddressRange, Size};
use std::fmt;

/// Protection flags of a single mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    pub const fn new(read: bool, write: bool, execute: bool) -> Protection {
        Protection {
            read,
            write,
            execute,
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' },
        )
    }
}

/// An immutable snapshot of one mapping, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub range: AddressRange,
    pub protection: Protection,
    pub module_name: Option<String>,
}

impl MemoryRegion {
    pub fn new(range: AddressRange, protection: Protection) -> MemoryRegion {
        MemoryRegion {
            range,
            protection,
            module_name: None,
        }
    }
}

/// Filter over the region list.
///
/// Protection flags are tri-state: `Some(true)` requires the flag set,
/// `Some(false)` requires it clear, `None` ignores it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionFilter {
    pub addr_min: Option<Address>,
    pub addr_max: Option<Address>,
    pub readable: Option<bool>,
    pub writable: Option<bool>,
    pub executable: Option<bool>,
}

impl RegionFilter {
    /// A filter which only keeps readable regions.
    pub fn readable() -> RegionFilter {
        RegionFilter {
            readable: Some(true),
            ..Default::default()
        }
    }

    fn matches(&self, region: &MemoryRegion) -> bool {
        if let Some(min) = self.addr_min {
            if region.range.end() <= min {
                return false;
            }
        }

        if let Some(max) = self.addr_max {
            if region.range.base >= max {
                return false;
            }
        }

        tri(self.readable, region.protection.read)
            && tri(self.writable, region.protection.write)
            && tri(self.executable, region.protection.execute)
    }

    /// Clip a range to the filter's address bounds.
    fn clip(&self, range: AddressRange) -> AddressRange {
        let base = match self.addr_min {
            Some(min) if min > range.base => min,
            _ => range.base,
        };

        let end = match self.addr_max {
            Some(max) if max < range.end() => max,
            _ => range.end(),
        };

        AddressRange::new(base, end.size_from(base).unwrap_or_else(|_| Size::zero()))
    }
}

fn tri(want: Option<bool>, have: bool) -> bool {
    match want {
        Some(want) => want == have,
        None => true,
    }
}

/// The region list of a process snapshot, sorted by base address.
///
/// Overlapping regions are passed through exactly as the remote service
/// reported them, never merged.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    regions: Vec<MemoryRegion>,
}

impl RegionCatalog {
    pub fn new(mut regions: Vec<MemoryRegion>) -> RegionCatalog {
        regions.sort_by_key(|r| r.range.base);
        RegionCatalog { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    /// Produce the iteration domain for a scan, in ascending address order.
    ///
    /// Region ranges are clipped to the filter's address bounds.
    pub fn enumerate(&self, filter: &RegionFilter) -> Vec<MemoryRegion> {
        self.regions
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| {
                let mut region = r.clone();
                region.range = filter.clip(region.range);
                region
            })
            .filter(|r| r.range.size != Size::zero())
            .collect()
    }

    /// Find a region containing the given address.
    pub fn find(&self, address: Address) -> Option<&MemoryRegion> {
        AddressRange::find_in_range(&self.regions, |r| r.range, address)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryRegion, Protection, RegionCatalog, RegionFilter};
    use crate::{Address, AddressRange, Size};

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(vec![
            MemoryRegion::new(
                AddressRange::new(Address::new(0x2000), Size::new(0x1000)),
                Protection::new(true, true, false),
            ),
            MemoryRegion::new(
                AddressRange::new(Address::new(0x1000), Size::new(0x1000)),
                Protection::new(true, false, true),
            ),
            MemoryRegion::new(
                AddressRange::new(Address::new(0x4000), Size::new(0x1000)),
                Protection::new(false, false, false),
            ),
        ])
    }

    #[test]
    fn test_ascending_order() {
        let catalog = catalog();
        let all = catalog.enumerate(&RegionFilter::default());

        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].range.base < w[1].range.base));
    }

    #[test]
    fn test_tri_state_protection() {
        let catalog = catalog();

        let readable = catalog.enumerate(&RegionFilter::readable());
        assert_eq!(readable.len(), 2);

        let filter = RegionFilter {
            writable: Some(false),
            readable: Some(true),
            ..Default::default()
        };
        let read_only = catalog.enumerate(&filter);
        assert_eq!(read_only.len(), 1);
        assert_eq!(read_only[0].range.base, Address::new(0x1000));
    }

    #[test]
    fn test_address_bounds_clip() {
        let catalog = catalog();

        let filter = RegionFilter {
            addr_min: Some(Address::new(0x1800)),
            addr_max: Some(Address::new(0x2800)),
            ..Default::default()
        };

        let clipped = catalog.enumerate(&filter);
        assert_eq!(clipped.len(), 2);
        assert_eq!(
            clipped[0].range,
            AddressRange::new(Address::new(0x1800), Size::new(0x800))
        );
        assert_eq!(
            clipped[1].range,
            AddressRange::new(Address::new(0x2000), Size::new(0x800))
        );
    }

    #[test]
    fn test_find() {
        let catalog = catalog();

        assert!(catalog.find(Address::new(0x2800)).is_some());
        assert!(catalog.find(Address::new(0x3800)).is_none());
    }
}
