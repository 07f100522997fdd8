// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Match log data model and its persisted form.
//!
//! - [`record`]: flat binary record framing of a message sequence
//! - hex text encoding used for the database `contents` column

pub mod record;

pub use record::{deserialize, serialize, RECORD_HEADER_SIZE, SOURCE_FLAG, SOURCE_ID_SIZE};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Largest payload the record length field can describe (bit 31 is the
/// source-identifier flag).
pub const MAX_PAYLOAD_LEN: usize = 0x7FFF_FFFF;

/// A captured binary message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedMessage {
    /// Match clock (milliseconds since match start).
    pub timestamp: u32,

    /// Message type tag.
    pub type_tag: u16,

    /// Identifier of the entity the message is about (0 = unknown).
    pub source_id: u64,

    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl CapturedMessage {
    pub fn new(timestamp: u32, type_tag: u16, source_id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            type_tag,
            source_id,
            payload: payload.into(),
        }
    }

    /// Whether the record carries a source identifier.
    pub fn has_source(&self) -> bool {
        self.source_id != 0
    }
}

/// Match classification stored alongside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchCategory {
    /// Bracket size (2 for 2v2, 3 for 3v3, ...).
    pub bracket: u8,

    /// Host match sub-type.
    pub type_id: u32,

    /// Map / location id.
    pub map_id: u32,
}

impl MatchCategory {
    pub fn new(bracket: u8, type_id: u32, map_id: u32) -> Self {
        Self {
            bracket,
            type_id,
            map_id,
        }
    }
}

/// Team name and rating for the descriptive columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamSummary {
    pub name: String,
    pub rating: u32,
}

/// Ordered, timestamped message sequence for one match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchLog {
    category: MatchCategory,
    messages: Vec<CapturedMessage>,
    participants: BTreeSet<u64>,
}

impl MatchLog {
    /// Empty log for a new match.
    pub fn new(category: MatchCategory) -> Self {
        Self {
            category,
            messages: Vec::new(),
            participants: BTreeSet::new(),
        }
    }

    /// Rebuild a log from persisted parts.
    pub fn from_parts(
        category: MatchCategory,
        messages: Vec<CapturedMessage>,
        participants: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            category,
            messages,
            participants: participants.into_iter().collect(),
        }
    }

    /// Append a message, clamping its timestamp so the sequence never goes
    /// backwards.
    pub fn push(&mut self, mut message: CapturedMessage) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                tracing::debug!(
                    "Clock went backwards ({} < {}); clamping",
                    message.timestamp,
                    last.timestamp
                );
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message);
    }

    pub fn add_participant(&mut self, id: u64) {
        if id != 0 {
            self.participants.insert(id);
        }
    }

    pub fn category(&self) -> MatchCategory {
        self.category
    }

    pub fn messages(&self) -> &[CapturedMessage] {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut [CapturedMessage] {
        &mut self.messages
    }

    pub fn participants(&self) -> &BTreeSet<u64> {
        &self.participants
    }

    /// Every non-zero source identifier referenced by a message.
    pub fn source_ids(&self) -> BTreeSet<u64> {
        self.messages
            .iter()
            .filter(|m| m.has_source())
            .map(|m| m.source_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Timestamp of the last message (match duration as recorded).
    pub fn duration(&self) -> u32 {
        self.messages.last().map(|m| m.timestamp).unwrap_or(0)
    }

    /// Split into `(category, messages, participants)`.
    pub fn into_parts(self) -> (MatchCategory, Vec<CapturedMessage>, BTreeSet<u64>) {
        (self.category, self.messages, self.participants)
    }
}

/// Persisted-format errors.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {len} bytes at record {index} exceeds the record length field")]
    PayloadTooLarge { index: usize, len: usize },

    #[error("serialized log of {0} bytes exceeds the content size column")]
    ContentTooLarge(usize),
}

/// Encode a serialized log for the text `contents` column.
pub fn encode_contents(buffer: &[u8]) -> String {
    hex::encode_upper(buffer)
}

/// Decode the `contents` column, keeping at most `content_size` bytes.
///
/// Malformed text yields an empty buffer; the caller then sees an empty log.
pub fn decode_contents(text: &str, content_size: u32) -> Vec<u8> {
    match hex::decode(text) {
        Ok(mut bytes) => {
            bytes.truncate(content_size as usize);
            bytes
        }
        Err(e) => {
            tracing::warn!("Discarding undecodable replay contents: {}", e);
            Vec::new()
        }
    }
}
