// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Match message recorder.
//!
//! Every participant of a match sees roughly the same message stream. Only
//! one observer per side is designated to feed the log, so each message is
//! captured once per side.

use crate::filter::TagFilter;
use crate::format::{CapturedMessage, MatchCategory, MatchLog, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side of a two-team match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    First,
    Second,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

/// Recorder errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("payload of {len} bytes for tag {tag:#06x} exceeds the record length field")]
    PayloadTooLarge { tag: u16, len: usize },
}

/// Capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Messages appended to the log.
    pub message_count: u64,

    /// Payload bytes appended.
    pub bytes_captured: u64,

    /// Messages rejected by the tag filter.
    pub filtered: u64,

    /// Messages seen by an observer that is not designated for its side.
    pub duplicates: u64,
}

/// Capture state for one match.
#[derive(Debug, Clone)]
pub struct MatchRecorder {
    filter: TagFilter,
    log: MatchLog,
    observers: [Option<u64>; 2],
    stats: RecordingStats,
}

impl MatchRecorder {
    /// Start an empty log for a match.
    pub fn new(category: MatchCategory, filter: TagFilter) -> Self {
        Self {
            filter,
            log: MatchLog::new(category),
            observers: [None; 2],
            stats: RecordingStats::default(),
        }
    }

    /// Add a participant. The first one registered on a side observes for
    /// that side.
    pub fn register_participant(&mut self, id: u64, side: Side) {
        self.log.add_participant(id);

        let slot = &mut self.observers[side.index()];
        if slot.is_none() && id != 0 {
            tracing::debug!("Participant {:#x} observes for {:?}", id, side);
            *slot = Some(id);
        }
    }

    /// Designated observer for `side`, if any.
    pub fn observer(&self, side: Side) -> Option<u64> {
        self.observers[side.index()]
    }

    /// Offer one message seen by `observer`.
    ///
    /// Returns `Ok(true)` if the message was appended, `Ok(false)` if the tag
    /// is filtered out or `observer` is not the designated observer.
    pub fn capture(
        &mut self,
        observer: u64,
        side: Side,
        tag: u16,
        source_id: u64,
        payload: &[u8],
        clock: u32,
    ) -> Result<bool, RecorderError> {
        if !self.filter.matches(tag) {
            self.stats.filtered += 1;
            return Ok(false);
        }

        match self.observers[side.index()] {
            Some(designated) if designated != observer => {
                self.stats.duplicates += 1;
                return Ok(false);
            }
            Some(_) => {}
            None => self.register_participant(observer, side),
        }

        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RecorderError::PayloadTooLarge {
                tag,
                len: payload.len(),
            });
        }

        self.log.push(CapturedMessage::new(clock, tag, source_id, payload));
        self.stats.message_count += 1;
        self.stats.bytes_captured += payload.len() as u64;

        Ok(true)
    }

    /// Current statistics.
    pub fn stats(&self) -> RecordingStats {
        self.stats
    }

    /// Log captured so far.
    pub fn log(&self) -> &MatchLog {
        &self.log
    }

    /// Seal the recording.
    pub fn finish(self) -> (MatchLog, RecordingStats) {
        (self.log, self.stats)
    }
}
