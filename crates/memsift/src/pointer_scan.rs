//! Offset-chain discovery across independently captured pointer maps.
//!
//! Candidate chains are enumerated against the first map only; a candidate
//! survives when replaying its offsets from every map's own base lands
//! exactly on that map's own target. Chains surviving every replay do not
//! depend on a single snapshot's absolute layout.

use crate::{
    error::Error, Address, Offset, PointerBase, PointerMap, Size, Token,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{btree_map, BTreeMap};
use std::fmt;

type OffsetVec = SmallVec<[Offset; 8]>;

/// A chain of field offsets applied iteratively from a static base.
///
/// Only valid relative to the map set it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerChain {
    pub base: PointerBase,
    pub offsets: Vec<Offset>,
}

impl PointerChain {
    /// The number of dereferencing hops in the chain.
    pub fn depth(&self) -> usize {
        self.offsets.len()
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base, fmt)?;

        for o in &self.offsets {
            write!(fmt, " -> {}", o)?;
        }

        Ok(())
    }
}

/// Outcome of a resolve pass.
#[derive(Debug, Clone)]
pub struct ChainScan {
    /// Valid chains, shortest first, ties broken by signed offset order.
    pub chains: Vec<PointerChain>,
    /// Set when exactly two maps were supplied; false positives are more
    /// likely with so few snapshots.
    pub low_confidence: bool,
}

/// Searches a set of pointer maps for offset chains valid in every map.
///
/// Defaults are
///
/// max_offset: 0x1000
/// max_depth: 7
pub struct ChainResolver<'a> {
    cancel: &'a Token,
    pub max_offset: Size,
    pub max_depth: usize,
}

impl<'a> ChainResolver<'a> {
    pub fn new(cancel: &'a Token) -> ChainResolver<'a> {
        ChainResolver {
            cancel,
            max_offset: 0x1000u32.into(),
            max_depth: 7,
        }
    }

    /// Find every chain valid across all supplied maps.
    ///
    /// Requires at least two maps. A map with no entry, or with conflicting
    /// entries, for an address a candidate needs simply fails that
    /// candidate's replay.
    pub fn resolve(&self, maps: &[PointerMap]) -> Result<ChainScan, Error> {
        if maps.len() < 2 {
            return Err(Error::InsufficientPointerMaps(maps.len()));
        }

        let indexes: Vec<FieldIndex> = maps.iter().map(FieldIndex::build).collect();

        let mut found = Vec::new();
        let mut path = OffsetVec::new();

        self.search(
            &indexes[0],
            maps[0].base_address,
            maps[0].target,
            &mut path,
            &mut found,
        );

        let mut chains: Vec<OffsetVec> = Vec::new();

        'candidate: for candidate in found {
            for (map, index) in maps.iter().zip(&indexes) {
                if !replay(index, map.base_address, map.target, &candidate) {
                    continue 'candidate;
                }
            }

            chains.push(candidate);
        }

        chains.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let low_confidence = maps.len() == 2;

        log::debug!(
            "pointer resolve: {} valid chain(s) across {} map(s)",
            chains.len(),
            maps.len()
        );

        Ok(ChainScan {
            chains: chains
                .into_iter()
                .map(|offsets| PointerChain {
                    base: maps[0].base.clone(),
                    offsets: offsets.into_vec(),
                })
                .collect(),
            low_confidence,
        })
    }

    /// Bounded depth-first search over the first map's field index.
    fn search(
        &self,
        index: &FieldIndex,
        node: Address,
        target: Address,
        path: &mut OffsetVec,
        out: &mut Vec<OffsetVec>,
    ) {
        if self.cancel.is_set() {
            return;
        }

        let lo = node.saturating_sub(self.max_offset);
        let hi = node.saturating_add(self.max_offset);

        for (field, value) in index.fields.range(lo..=hi) {
            let value = match value {
                Some(value) => *value,
                // conflicting capture; nothing reachable through it.
                None => continue,
            };

            path.push(field.offset_of(node));

            if value == target {
                out.push(path.clone());
            } else if path.len() < self.max_depth {
                self.search(index, value, target, path, out);
            }

            path.pop();
        }
    }
}

/// Replay a candidate from a map's own base; valid only when it terminates
/// exactly at that map's own target.
fn replay(index: &FieldIndex, base: Address, target: Address, path: &[Offset]) -> bool {
    let mut node = base;

    for offset in path {
        let field = match offset.checked_apply(node) {
            Some(field) => field,
            None => return false,
        };

        node = match index.fields.get(&field) {
            Some(Some(value)) => *value,
            _ => return false,
        };
    }

    node == target
}

/// Field addresses mapped to the pointer observed there. A `None` value
/// records conflicting observations for the same field.
struct FieldIndex {
    fields: BTreeMap<Address, Option<Address>>,
}

impl FieldIndex {
    fn build(map: &PointerMap) -> FieldIndex {
        let mut fields = BTreeMap::new();

        for entry in &map.entries {
            let field = match entry.field_address() {
                Some(field) => field,
                None => continue,
            };

            match fields.entry(field) {
                btree_map::Entry::Vacant(e) => {
                    e.insert(Some(entry.value));
                }
                btree_map::Entry::Occupied(mut e) => {
                    if *e.get() != Some(entry.value) {
                        e.insert(None);
                    }
                }
            }
        }

        FieldIndex { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::ChainResolver;
    use crate::{Address, Error, Offset, PointerBase, PointerMap, PointerMapEntry, Sign, Size, Token};

    fn entry(object: u64, offset: i64, value: u64) -> PointerMapEntry {
        let field_offset = if offset == 0 {
            Offset::zero()
        } else if offset < 0 {
            Offset::new(Sign::Minus, Size::new(-offset as u64))
        } else {
            Offset::new(Sign::Plus, Size::new(offset as u64))
        };

        PointerMapEntry {
            object: Address::new(object),
            field_offset,
            value: Address::new(value),
        }
    }

    fn map(base: u64, target: u64, entries: Vec<PointerMapEntry>) -> PointerMap {
        PointerMap {
            base: PointerBase::Address(Address::new(base)),
            base_address: Address::new(base),
            target: Address::new(target),
            entries,
        }
    }

    fn offsets(chain: &crate::PointerChain) -> Vec<i64> {
        chain
            .offsets
            .iter()
            .map(|o| match o.sign() {
                Sign::Minus => -(o.abs().into_inner() as i64),
                _ => o.abs().into_inner() as i64,
            })
            .collect()
    }

    #[test]
    fn test_requires_two_maps() {
        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);

        let one = map(0x1000, 0x2000, vec![]);

        assert!(matches!(
            resolver.resolve(&[one]),
            Err(Error::InsufficientPointerMaps(1))
        ));
    }

    #[test]
    fn test_same_offsets_across_two_maps() {
        // map1: base 0x1000 reaches 0x2000 through [0x8, 0x10].
        let map1 = map(
            0x1000,
            0x2000,
            vec![entry(0x1000, 0x8, 0x1800), entry(0x1800, 0x10, 0x2000)],
        );

        // map2: base 0x3000 reaches 0x5000 through the same offsets.
        let map2 = map(
            0x3000,
            0x5000,
            vec![entry(0x3000, 0x8, 0x4800), entry(0x4800, 0x10, 0x5000)],
        );

        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);

        let scan = resolver.resolve(&[map1, map2]).unwrap();

        assert!(scan.low_confidence);
        assert_eq!(scan.chains.len(), 1);
        assert_eq!(offsets(&scan.chains[0]), vec![0x8, 0x10]);
    }

    #[test]
    fn test_layout_dependent_chain_is_rejected() {
        // map1 offers two routes to the target; only [0x8, 0x10] survives in
        // map2.
        let map1 = map(
            0x1000,
            0x2000,
            vec![
                entry(0x1000, 0x8, 0x1800),
                entry(0x1800, 0x10, 0x2000),
                entry(0x1000, 0x20, 0x2000),
            ],
        );

        let map2 = map(
            0x3000,
            0x5000,
            vec![entry(0x3000, 0x8, 0x4800), entry(0x4800, 0x10, 0x5000)],
        );

        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);

        let scan = resolver.resolve(&[map1, map2]).unwrap();

        assert_eq!(scan.chains.len(), 1);
        assert_eq!(offsets(&scan.chains[0]), vec![0x8, 0x10]);
    }

    #[test]
    fn test_shortest_then_lexicographic_order() {
        // two direct routes and one longer route, valid in both maps.
        let map1 = map(
            0x1000,
            0x2000,
            vec![
                entry(0x1000, 0x18, 0x2000),
                entry(0x1000, 0x8, 0x2000),
                entry(0x1000, 0x30, 0x1800),
                entry(0x1800, 0x10, 0x2000),
            ],
        );

        let map2 = map(
            0x3000,
            0x5000,
            vec![
                entry(0x3000, 0x18, 0x5000),
                entry(0x3000, 0x8, 0x5000),
                entry(0x3000, 0x30, 0x4800),
                entry(0x4800, 0x10, 0x5000),
            ],
        );

        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);

        let scan = resolver.resolve(&[map1, map2]).unwrap();

        let got: Vec<Vec<i64>> = scan.chains.iter().map(offsets).collect();
        assert_eq!(got, vec![vec![0x8], vec![0x18], vec![0x30, 0x10]]);
    }

    #[test]
    fn test_conflicting_entries_invalidate_dependents() {
        let map1 = map(
            0x1000,
            0x2000,
            vec![entry(0x1000, 0x8, 0x1800), entry(0x1800, 0x10, 0x2000)],
        );

        // map2 reports two different pointers for the same field needed by
        // the replay.
        let map2 = map(
            0x3000,
            0x5000,
            vec![
                entry(0x3000, 0x8, 0x4800),
                entry(0x3000, 0x8, 0x4900),
                entry(0x4800, 0x10, 0x5000),
            ],
        );

        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);

        let scan = resolver.resolve(&[map1, map2]).unwrap();
        assert!(scan.chains.is_empty());
    }

    #[test]
    fn test_depth_bound() {
        // a chain of three hops is invisible to a resolver bounded at two.
        let map1 = map(
            0x1000,
            0x2000,
            vec![
                entry(0x1000, 0x8, 0x1100),
                entry(0x1100, 0x8, 0x1200),
                entry(0x1200, 0x8, 0x2000),
            ],
        );

        let map2 = map(
            0x3000,
            0x5000,
            vec![
                entry(0x3000, 0x8, 0x3100),
                entry(0x3100, 0x8, 0x3200),
                entry(0x3200, 0x8, 0x5000),
            ],
        );

        let cancel = Token::new();
        let mut resolver = ChainResolver::new(&cancel);
        // keep each hop local so the only route is the three-field chain.
        resolver.max_offset = Size::new(0x10);
        resolver.max_depth = 2;

        let scan = resolver.resolve(&[map1.clone(), map2.clone()]).unwrap();
        assert!(scan.chains.is_empty());

        resolver.max_depth = 3;
        let scan = resolver.resolve(&[map1, map2]).unwrap();
        assert_eq!(scan.chains.len(), 1);
        assert_eq!(offsets(&scan.chains[0]), vec![0x8, 0x8, 0x8]);
    }

    #[test]
    fn test_replay_validity_property() {
        let map1 = map(
            0x1000,
            0x2000,
            vec![
                entry(0x1000, 0x8, 0x1800),
                entry(0x1800, 0x10, 0x2000),
                entry(0x1000, 0x40, 0x1900),
                entry(0x1900, -0x8, 0x2000),
            ],
        );

        let map2 = map(
            0x3000,
            0x5000,
            vec![
                entry(0x3000, 0x8, 0x4800),
                entry(0x4800, 0x10, 0x5000),
                entry(0x3000, 0x40, 0x4900),
                entry(0x4900, -0x8, 0x5000),
            ],
        );

        let cancel = Token::new();
        let resolver = ChainResolver::new(&cancel);
        let maps = vec![map1, map2];

        let scan = resolver.resolve(&maps).unwrap();

        // both direct routes, and because the two snapshots share their
        // relative layout, the two crossing routes as well.
        assert_eq!(scan.chains.len(), 4);

        // every returned chain replays to each map's own target.
        for chain in &scan.chains {
            for map in &maps {
                let index = super::FieldIndex::build(map);
                assert!(super::replay(
                    &index,
                    map.base_address,
                    map.target,
                    &chain.offsets
                ));
            }
        }
    }
}
