// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identifier rewriting across a loaded match log.
//!
//! Each message is handled according to its type tag:
//! 1. container tags: split into embedded messages, rewrite each one, rebuild
//!    in the same framing
//! 2. compressed tags: inflate, rewrite packed identifiers only, deflate
//! 3. anything else: rewrite in place, raw form included unless the tag is
//!    declared packed-only
//!
//! A message that cannot be decoded or whose identifiers do not fit is left
//! untouched.

use crate::codec;
use crate::container::{self, Entry};
use crate::format::{MatchLog, MAX_PAYLOAD_LEN};
use crate::ghost::IdentifierRemap;
use crate::guid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Containers nested deeper than this are left untouched.
pub const MAX_CONTAINER_DEPTH: usize = 4;

/// Per-tag rewrite strategy table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewriteProfile {
    /// Tags whose payload is a sequence of embedded messages.
    #[serde(default)]
    pub container_tags: BTreeSet<u16>,

    /// Tags whose payload is a length-prefixed zlib block.
    #[serde(default)]
    pub compressed_tags: BTreeSet<u16>,

    /// Tags whose framing only ever carries packed identifiers.
    #[serde(default)]
    pub packed_only_tags: BTreeSet<u16>,
}

impl RewriteProfile {
    /// Declare `tag` as a container.
    pub fn container(mut self, tag: u16) -> Self {
        self.container_tags.insert(tag);
        self
    }

    /// Declare `tag` as compressed.
    pub fn compressed(mut self, tag: u16) -> Self {
        self.compressed_tags.insert(tag);
        self
    }

    /// Declare `tag` as packed-only.
    pub fn packed_only(mut self, tag: u16) -> Self {
        self.packed_only_tags.insert(tag);
        self
    }
}

/// Rewrite counters for one log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Payloads that changed.
    pub rewritten: usize,
    /// Payloads left as they were.
    pub unchanged: usize,
    /// Source identifiers replaced by their ghost.
    pub sources_remapped: usize,
}

/// Applies an [`IdentifierRemap`] to message payloads.
#[derive(Debug, Clone, Copy)]
pub struct PayloadRewriter<'a> {
    profile: &'a RewriteProfile,
    remap: &'a IdentifierRemap,
}

impl<'a> PayloadRewriter<'a> {
    pub fn new(profile: &'a RewriteProfile, remap: &'a IdentifierRemap) -> Self {
        Self { profile, remap }
    }

    /// Rewrite one payload. Returns `Some` only if it changed.
    pub fn rewrite(&self, tag: u16, payload: &[u8]) -> Option<Vec<u8>> {
        if self.remap.is_empty() {
            return None;
        }

        let rewritten = self.rewrite_at(tag, payload, 0)?;
        if rewritten.len() > MAX_PAYLOAD_LEN {
            tracing::warn!(
                "Rewritten payload for tag {:#06x} too large ({} bytes); keeping original",
                tag,
                rewritten.len()
            );
            return None;
        }
        Some(rewritten)
    }

    fn rewrite_at(&self, tag: u16, payload: &[u8], depth: usize) -> Option<Vec<u8>> {
        if self.profile.container_tags.contains(&tag) {
            self.rewrite_container(tag, payload, depth)
        } else if self.profile.compressed_tags.contains(&tag) {
            self.rewrite_compressed(tag, payload)
        } else {
            let allow_raw = !self.profile.packed_only_tags.contains(&tag);
            self.rewrite_plain(payload, allow_raw)
        }
    }

    fn rewrite_container(&self, tag: u16, payload: &[u8], depth: usize) -> Option<Vec<u8>> {
        if depth >= MAX_CONTAINER_DEPTH {
            tracing::debug!("Container {:#06x} nested too deep; left untouched", tag);
            return None;
        }

        let Some((layout, entries)) = container::resolve(payload) else {
            tracing::debug!(
                "Container {:#06x} ({} bytes) matches no known layout",
                tag,
                payload.len()
            );
            return None;
        };

        let mut changed = false;
        let rebuilt: Vec<Entry> = entries
            .into_iter()
            .map(|entry| match self.rewrite_at(entry.tag, &entry.payload, depth + 1) {
                Some(payload) => {
                    changed = true;
                    Entry::new(entry.tag, payload)
                }
                None => entry,
            })
            .collect();

        if !changed {
            return None;
        }

        match layout.rebuild(&rebuilt) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Cannot rebuild container {:#06x}: {}", tag, e);
                None
            }
        }
    }

    fn rewrite_compressed(&self, tag: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let mut inflated = match codec::decompress(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Compressed message {:#06x} not decodable: {}", tag, e);
                return None;
            }
        };

        // Offsets inside the inflated block are opaque: packed form only.
        if !self.replace_all(&mut inflated, false) {
            return None;
        }

        match codec::compress(&inflated) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::warn!("Cannot recompress message {:#06x}: {}", tag, e);
                None
            }
        }
    }

    fn rewrite_plain(&self, payload: &[u8], allow_raw: bool) -> Option<Vec<u8>> {
        let mut bytes = payload.to_vec();
        self.replace_all(&mut bytes, allow_raw).then_some(bytes)
    }

    fn replace_all(&self, bytes: &mut [u8], allow_raw: bool) -> bool {
        guid::replace_many(bytes, self.remap.iter(), allow_raw)
    }
}

/// Rewrite every message of `log` in place.
pub fn rewrite_log(
    log: &mut MatchLog,
    profile: &RewriteProfile,
    remap: &IdentifierRemap,
) -> RewriteStats {
    let rewriter = PayloadRewriter::new(profile, remap);
    let mut stats = RewriteStats::default();

    for msg in log.messages_mut() {
        match rewriter.rewrite(msg.type_tag, &msg.payload) {
            Some(payload) => {
                msg.payload = payload;
                stats.rewritten += 1;
            }
            None => stats.unchanged += 1,
        }

        if let Some(ghost) = remap.ghost_of(msg.source_id) {
            msg.source_id = ghost;
            stats.sources_remapped += 1;
        }
    }

    stats
}
