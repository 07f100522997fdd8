// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ghost identifier allocation.
//!
//! Every participant of a replayed match is given a substitute identifier
//! that:
//! - collides with nothing already referenced by the log or the viewer,
//! - differs from every original,
//! - keeps the original's presence mask, so packed occurrences can be
//!   swapped in place without disturbing surrounding bytes.
//!
//! Candidates are generated by rotating each non-zero byte through
//! `1..=255` (never landing on zero), smallest total rotation first. Only
//! if that space is exhausted does allocation fall back to probing
//! `id + 1, id + 2, ...`.

use crate::guid::presence_mask;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Largest per-byte rotation; 255 would map a byte onto itself.
const MAX_OFFSET: u32 = 254;

/// Default number of linear probes before giving up.
pub const DEFAULT_PROBE_LIMIT: u64 = 1 << 20;

/// Allocation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GhostError {
    #[error("no collision-free ghost identifier for {id:#x} after {probes} probes")]
    Exhausted { id: u64, probes: u64 },
}

/// Hands out shape-preserving, collision-free identifiers.
#[derive(Debug, Clone)]
pub struct GhostAllocator {
    used: HashSet<u64>,
    probe_limit: u64,
}

impl GhostAllocator {
    /// Create an allocator; `reserved` identifiers are never handed out.
    pub fn new(reserved: impl IntoIterator<Item = u64>) -> Self {
        let mut used: HashSet<u64> = reserved.into_iter().collect();
        used.insert(0);
        Self {
            used,
            probe_limit: DEFAULT_PROBE_LIMIT,
        }
    }

    /// Set the linear probe budget.
    pub fn with_probe_limit(mut self, limit: u64) -> Self {
        self.probe_limit = limit;
        self
    }

    /// Mark `id` as taken.
    pub fn reserve(&mut self, id: u64) {
        self.used.insert(id);
    }

    /// Allocate a ghost for `id`.
    ///
    /// Returns `Ok(None)` for the all-zero identifier, which has no packed
    /// shape to preserve and is left as is.
    pub fn allocate(&mut self, id: u64) -> Result<Option<u64>, GhostError> {
        if id == 0 {
            return Ok(None);
        }

        let mask = presence_mask(id);
        let raw = id.to_le_bytes();
        let positions: Vec<usize> = (0..8).filter(|&i| raw[i] != 0).collect();

        let used = &self.used;
        let accept = |candidate: u64| {
            candidate != 0
                && candidate != id
                && presence_mask(candidate) == mask
                && !used.contains(&candidate)
        };

        let found = rotated_candidates(&raw, &positions, accept)
            .or_else(|| probe_candidates(id, self.probe_limit, accept));

        match found {
            Some(ghost) => {
                self.used.insert(ghost);
                Ok(Some(ghost))
            }
            None => Err(GhostError::Exhausted {
                id,
                probes: self.probe_limit,
            }),
        }
    }
}

/// Walk rotation vectors by increasing total offset, returning the first
/// accepted candidate.
fn rotated_candidates(
    raw: &[u8; 8],
    positions: &[usize],
    mut accept: impl FnMut(u64) -> bool,
) -> Option<u64> {
    let k = positions.len();
    let mut offsets = vec![0u32; k];
    let mut found = None;

    for total in 1..=MAX_OFFSET * k as u32 {
        let mut visit = |offsets: &[u32]| {
            let mut bytes = *raw;
            for (&pos, &offset) in positions.iter().zip(offsets) {
                bytes[pos] = rotate(bytes[pos], offset);
            }
            let candidate = u64::from_le_bytes(bytes);
            if accept(candidate) {
                found = Some(candidate);
                true
            } else {
                false
            }
        };
        if compositions(&mut offsets, 0, total, &mut visit) {
            return found;
        }
    }

    None
}

/// Enumerate splits of `remaining` over `offsets[idx..]`, each part capped
/// at `MAX_OFFSET`. Stops as soon as `visit` returns `true`.
fn compositions(
    offsets: &mut [u32],
    idx: usize,
    remaining: u32,
    visit: &mut impl FnMut(&[u32]) -> bool,
) -> bool {
    let last = offsets.len() - 1;
    if idx == last {
        if remaining > MAX_OFFSET {
            return false;
        }
        offsets[idx] = remaining;
        return visit(offsets);
    }

    let tail_cap = MAX_OFFSET * (last - idx) as u32;
    let lo = remaining.saturating_sub(tail_cap);
    let hi = remaining.min(MAX_OFFSET);
    // Lowest byte rotates first.
    for offset in (lo..=hi).rev() {
        offsets[idx] = offset;
        if compositions(offsets, idx + 1, remaining - offset, visit) {
            return true;
        }
    }
    false
}

fn probe_candidates(id: u64, limit: u64, mut accept: impl FnMut(u64) -> bool) -> Option<u64> {
    (1..=limit)
        .map(|step| id.wrapping_add(step))
        .find(|&candidate| accept(candidate))
}

/// Cyclic rotation over `1..=255`.
fn rotate(byte: u8, offset: u32) -> u8 {
    debug_assert!(byte != 0);
    (((byte as u32 - 1 + offset) % 255) + 1) as u8
}

/// Original -> ghost identifier table for one loaded replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierRemap {
    map: BTreeMap<u64, u64>,
}

impl IdentifierRemap {
    /// Build a table for `originals`.
    ///
    /// `reserved` lists every other identifier that must stay unique: source
    /// identifiers seen in the log and the viewer's own identifier. Originals
    /// are processed in ascending order so the result is deterministic.
    pub fn build(
        originals: impl IntoIterator<Item = u64>,
        reserved: impl IntoIterator<Item = u64>,
        probe_limit: u64,
    ) -> Result<Self, GhostError> {
        let originals: BTreeSet<u64> = originals.into_iter().collect();
        let mut allocator = GhostAllocator::new(reserved).with_probe_limit(probe_limit);
        for &id in &originals {
            allocator.reserve(id);
        }

        let mut map = BTreeMap::new();
        for &id in &originals {
            match allocator.allocate(id)? {
                Some(ghost) => {
                    map.insert(id, ghost);
                }
                None => tracing::debug!("Identifier {:#x} has no packed shape; left as is", id),
            }
        }

        Ok(Self { map })
    }

    /// Ghost assigned to `id`, if any.
    pub fn ghost_of(&self, id: u64) -> Option<u64> {
        self.map.get(&id).copied()
    }

    /// Ghost for `id`, or `id` itself when unmapped.
    pub fn resolve(&self, id: u64) -> u64 {
        self.ghost_of(id).unwrap_or(id)
    }

    /// Iterate `(original, ghost)` pairs in ascending original order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.map.iter().map(|(&from, &to)| (from, to))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rotate_skips_zero() {
        assert_eq!(rotate(1, 1), 2);
        assert_eq!(rotate(255, 1), 1);
        assert_eq!(rotate(200, 254), 199);
    }

    #[test]
    fn test_smallest_perturbation_first() {
        let mut allocator = GhostAllocator::new([]);
        assert_eq!(allocator.allocate(0x2A).expect("alloc"), Some(0x2B));
        // 0x2B is now used, next is 0x2C.
        assert_eq!(allocator.allocate(0x2A).expect("alloc"), Some(0x2C));
    }

    #[test]
    fn test_lowest_byte_rotates_first() {
        let mut allocator = GhostAllocator::new([]);
        assert_eq!(allocator.allocate(0x0500_0010).expect("alloc"), Some(0x0500_0011));
    }

    #[test]
    fn test_zero_is_unmappable() {
        let mut allocator = GhostAllocator::new([]);
        assert_eq!(allocator.allocate(0).expect("alloc"), None);
    }

    #[test]
    fn test_reserved_are_skipped() {
        let mut allocator = GhostAllocator::new([0x2B, 0x2C]);
        assert_eq!(allocator.allocate(0x2A).expect("alloc"), Some(0x2D));
    }

    #[test]
    fn test_single_byte_exhaustion_falls_back_then_fails() {
        // Every other one-byte identifier is taken: no rotation works and
        // probing past 0xFF only yields wider masks.
        let reserved: Vec<u64> = (1..=255u64).filter(|&b| b != 0x2A).collect();
        let mut allocator = GhostAllocator::new(reserved).with_probe_limit(4096);

        assert_eq!(
            allocator.allocate(0x2A),
            Err(GhostError::Exhausted {
                id: 0x2A,
                probes: 4096
            })
        );
    }

    #[test]
    fn test_probe_candidates_wrap() {
        assert_eq!(probe_candidates(0x10, 10, |c| c == 0x15), Some(0x15));
        assert_eq!(probe_candidates(u64::MAX, 3, |c| c == 1), Some(1));
        assert_eq!(probe_candidates(0x10, 3, |c| c == 0x15), None);
    }

    #[test]
    fn test_remap_avoids_originals_and_reserved() {
        let remap = IdentifierRemap::build([0x2A, 0x2B], [0x2C], DEFAULT_PROBE_LIMIT)
            .expect("build");

        assert_eq!(remap.ghost_of(0x2A), Some(0x2D));
        assert_eq!(remap.ghost_of(0x2B), Some(0x2E));
        assert_eq!(remap.resolve(0x99), 0x99);
        assert_eq!(remap.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_shape_preserved(id in 1u64..) {
            let mut allocator = GhostAllocator::new([]);
            let ghost = allocator.allocate(id).expect("alloc").expect("non-zero");
            prop_assert_eq!(presence_mask(ghost), presence_mask(id));
            prop_assert_ne!(ghost, id);
        }

        #[test]
        fn prop_injective(ids in prop::collection::btree_set(1u64..=0xFFFF, 1..32)) {
            let remap = IdentifierRemap::build(ids.iter().copied(), [], DEFAULT_PROBE_LIMIT)
                .expect("build");
            let ghosts: BTreeSet<u64> = remap.iter().map(|(_, g)| g).collect();

            prop_assert_eq!(ghosts.len(), ids.len());
            for ghost in &ghosts {
                prop_assert!(!ids.contains(ghost));
                prop_assert_ne!(*ghost, 0);
            }
        }
    }
}
