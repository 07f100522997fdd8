// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity identifier matching inside opaque payloads.
//!
//! An identifier is 8 bytes and shows up in two encodings:
//!
//! ```text
//! raw:    b0 b1 b2 b3 b4 b5 b6 b7          (u64 little-endian)
//! packed: mask | b_i for each set bit i    (mask bit i <=> b_i != 0)
//! ```
//!
//! Payload framing is never interpreted; matching is a plain sub-sequence
//! search with no alignment assumption.

/// Raw identifier width.
pub const RAW_LEN: usize = 8;

/// Packed form of an identifier: presence mask followed by non-zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedGuid {
    bytes: [u8; RAW_LEN + 1],
    len: usize,
}

impl PackedGuid {
    /// Encode `id` in packed form.
    pub fn new(id: u64) -> Self {
        let raw = id.to_le_bytes();
        let mut bytes = [0u8; RAW_LEN + 1];
        let mut len = 1;
        for (i, &b) in raw.iter().enumerate() {
            if b != 0 {
                bytes[0] |= 1 << i;
                bytes[len] = b;
                len += 1;
            }
        }
        Self { bytes, len }
    }

    /// Presence mask.
    pub fn mask(&self) -> u8 {
        self.bytes[0]
    }

    /// Full packed encoding (mask included).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// An identifier without non-zero bytes cannot be located in packed form.
    pub fn is_matchable(&self) -> bool {
        self.mask() != 0
    }
}

/// Presence mask of `id`.
pub fn presence_mask(id: u64) -> u8 {
    PackedGuid::new(id).mask()
}

/// Whether `a` and `b` pack to sequences of the same shape.
pub fn same_shape(a: u64, b: u64) -> bool {
    presence_mask(a) == presence_mask(b)
}

/// Does `payload` mention `id`?
pub fn contains(payload: &[u8], id: u64, allow_raw: bool) -> bool {
    let packed = PackedGuid::new(id);
    if packed.is_matchable() && occurs(payload, packed.as_bytes()) {
        return true;
    }
    allow_raw && occurs(payload, &id.to_le_bytes())
}

/// Replace occurrences of `from` with `to` in place.
///
/// Raw occurrences are replaced when `allow_raw` is set. Packed occurrences
/// are replaced only when both identifiers share a presence mask, since a
/// packed sequence of another length would shift unknown framing.
///
/// Returns `true` if any byte changed.
pub fn replace(payload: &mut [u8], from: u64, to: u64, allow_raw: bool) -> bool {
    replace_many(payload, [(from, to)], allow_raw)
}

/// Replace every `(from, to)` pair in a single pass.
///
/// Occurrences are located in the original bytes, scanning left to right
/// without overlap, so bytes written for one pair are never matched again
/// by another. At a given offset a raw match is preferred over a packed one.
///
/// Returns `true` if any byte changed.
pub fn replace_many(
    payload: &mut [u8],
    pairs: impl IntoIterator<Item = (u64, u64)>,
    allow_raw: bool,
) -> bool {
    let mut raw: Vec<([u8; RAW_LEN], [u8; RAW_LEN])> = Vec::new();
    let mut packed: Vec<(PackedGuid, PackedGuid)> = Vec::new();

    for (from, to) in pairs {
        if from == to {
            continue;
        }
        if allow_raw {
            raw.push((from.to_le_bytes(), to.to_le_bytes()));
        }

        let packed_from = PackedGuid::new(from);
        if !packed_from.is_matchable() {
            continue;
        }
        if same_shape(from, to) {
            packed.push((packed_from, PackedGuid::new(to)));
        } else if occurs(payload, packed_from.as_bytes()) {
            tracing::warn!(
                "Packed shape mismatch {:#04x} -> {:#04x}; skipping packed rewrite of {:#x}",
                packed_from.mask(),
                presence_mask(to),
                from
            );
        }
    }

    let mut changed = false;
    let mut pos = 0;
    while pos < payload.len() {
        let rest = &payload[pos..];
        let hit = raw
            .iter()
            .find(|(from, _)| rest.starts_with(from))
            .map(|(_, to)| &to[..])
            .or_else(|| {
                packed
                    .iter()
                    .find(|(from, _)| rest.starts_with(from.as_bytes()))
                    .map(|(_, to)| to.as_bytes())
            });

        match hit {
            Some(replacement) => {
                let end = pos + replacement.len();
                payload[pos..end].copy_from_slice(replacement);
                pos = end;
                changed = true;
            }
            None => pos += 1,
        }
    }
    changed
}

fn occurs(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_encoding() {
        let packed = PackedGuid::new(0x0000_0000_0000_002A);
        assert_eq!(packed.as_bytes(), &[0x01, 0x2A]);

        let packed = PackedGuid::new(0x1F00_0000_0000_0A00);
        assert_eq!(packed.mask(), 0b1000_0010);
        assert_eq!(packed.as_bytes(), &[0x82, 0x0A, 0x1F]);

        let full = PackedGuid::new(u64::MAX);
        assert_eq!(full.as_bytes().len(), 9);
        assert_eq!(full.mask(), 0xFF);
    }

    #[test]
    fn test_zero_is_not_matchable() {
        let packed = PackedGuid::new(0);
        assert!(!packed.is_matchable());
        assert!(!contains(&[0x00, 0x00], 0, false));
        assert!(contains(&[0u8; 8], 0, true));
    }

    #[test]
    fn test_contains_packed_unaligned() {
        let payload = [0xEE, 0x03, 0x11, 0x22, 0x99];
        assert!(contains(&payload, 0x2211, false));
        assert!(!contains(&payload, 0x2212, false));
    }

    #[test]
    fn test_contains_raw_requires_flag() {
        let id: u64 = 0x0102_0304_0506_0708;
        let mut payload = vec![0xAA];
        payload.extend_from_slice(&id.to_le_bytes());

        assert!(contains(&payload, id, true));
        assert!(!contains(&payload, id, false));
    }

    #[test]
    fn test_replace_packed_same_shape() {
        let mut payload = vec![0x00, 0x01, 0x2A, 0x7F, 0x01, 0x2A];
        assert!(replace(&mut payload, 0x2A, 0x2B, false));
        assert_eq!(payload, vec![0x00, 0x01, 0x2B, 0x7F, 0x01, 0x2B]);
    }

    #[test]
    fn test_replace_skips_shape_mismatch() {
        let mut payload = vec![0x01, 0x2A];
        assert!(!replace(&mut payload, 0x2A, 0x012A, false));
        assert_eq!(payload, vec![0x01, 0x2A]);
    }

    #[test]
    fn test_replace_raw_ignores_shape() {
        let from: u64 = 0x2A;
        let to: u64 = 0x0100_0000_0000_0000;
        let mut payload = from.to_le_bytes().to_vec();

        assert!(replace(&mut payload, from, to, true));
        assert_eq!(payload, to.to_le_bytes().to_vec());
    }

    #[test]
    fn test_replace_non_overlapping() {
        // 0x0101 packs to [0x03, 0x01, 0x01]; the run below holds one
        // complete occurrence followed by a partial one.
        let mut payload = vec![0x03, 0x01, 0x01, 0x01, 0x01];
        assert!(replace(&mut payload, 0x0101, 0x0202, false));
        assert_eq!(payload, vec![0x03, 0x02, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn test_replace_unchanged_when_absent() {
        let mut payload = vec![0x10, 0x20, 0x30];
        assert!(!replace(&mut payload, 0x55, 0x56, true));
    }

    #[test]
    fn test_replace_many_does_not_chain() {
        // Rewriting the raw 0x01 at offset 1 yields 05 02 00.., which is a
        // raw 0x0205. Byte 0 belongs to no identifier and must survive.
        let mut payload = vec![0x05, 0x01, 0, 0, 0, 0, 0, 0, 0];
        assert!(replace_many(&mut payload, [(0x01, 0x02), (0x0205, 0x0206)], true));
        assert_eq!(payload, vec![0x05, 0x02, 0, 0, 0, 0, 0, 0, 0]);

        let mut payload = vec![0x01, 0x01, 0, 0, 0, 0, 0, 0, 0];
        assert!(replace_many(&mut payload, [(0x01, 0x02), (0x0201, 0x0202)], true));
        assert_eq!(payload[0], 0x01);
        assert_ne!(payload, vec![0x02, 0x02, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_replace_many_swapped_pair() {
        // Two participants trading places: each occurrence moves once.
        let mut payload = vec![0x01, 0x2A, 0x01, 0x2B];
        assert!(replace_many(&mut payload, [(0x2A, 0x2B), (0x2B, 0x2A)], false));
        assert_eq!(payload, vec![0x01, 0x2B, 0x01, 0x2A]);
    }

    #[test]
    fn test_same_shape() {
        assert!(same_shape(0x0000_00FF_0000_0001, 0x0000_0012_0000_0034));
        assert!(!same_shape(0x01, 0x0100));
    }
}
