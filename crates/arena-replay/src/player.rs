// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Match replay scheduling.
//!
//! A [`ReplaySession`] holds a rewritten log and is driven once per host
//! update with the current match clock. Every message due at that clock is
//! handed to the viewer, except messages about the viewer's own ghost: the
//! viewer already sees itself through its real identity.

use crate::format::{CapturedMessage, MatchLog};
use std::collections::VecDeque;

/// Spectator receiving a replay.
pub trait ReplayViewer {
    /// Deliver one replayed message.
    fn deliver(&mut self, message: &CapturedMessage);

    /// Send the viewer back where it was before the replay started.
    fn return_to_origin(&mut self);
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session to drive.
    Idle,

    /// Session still has messages queued.
    Pending {
        delivered: usize,
        suppressed: usize,
    },

    /// Session ended during this tick.
    Finished {
        delivered: usize,
        suppressed: usize,
    },
}

impl TickOutcome {
    /// Messages delivered during the tick.
    pub fn delivered(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Pending { delivered, .. } | Self::Finished { delivered, .. } => *delivered,
        }
    }

    /// Whether the session is gone after this tick.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Playback statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Messages delivered to the viewer.
    pub messages_played: u64,

    /// Messages dropped because they concern the viewer's ghost.
    pub messages_suppressed: u64,

    /// Last clock value seen.
    pub last_clock: u32,
}

/// One active replay.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    queue: VecDeque<CapturedMessage>,
    viewer_real_id: u64,
    viewer_ghost_id: u64,
    max_per_tick: usize,
    stats: PlaybackStats,
}

impl ReplaySession {
    /// Session over an already rewritten log.
    ///
    /// `viewer_ghost_id` is the viewer's ghost when the viewer took part in
    /// the match, otherwise its real identifier.
    pub fn new(log: MatchLog, viewer_real_id: u64, viewer_ghost_id: u64) -> Self {
        let (_, messages, _) = log.into_parts();
        Self {
            queue: messages.into(),
            viewer_real_id,
            viewer_ghost_id,
            max_per_tick: 0,
            stats: PlaybackStats::default(),
        }
    }

    /// Cap messages handled per tick (0 = unlimited).
    pub fn with_max_per_tick(mut self, max: usize) -> Self {
        self.max_per_tick = max;
        self
    }

    pub fn viewer_real_id(&self) -> u64 {
        self.viewer_real_id
    }

    pub fn viewer_ghost_id(&self) -> u64 {
        self.viewer_ghost_id
    }

    /// Messages left to replay.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// Advance to `clock`.
    ///
    /// With no viewer, or once the queue drains, the session reports
    /// [`TickOutcome::Finished`] and the viewer (if any) is returned to its
    /// origin. The caller drops the session on `Finished`.
    pub fn tick(&mut self, clock: u32, viewer: Option<&mut dyn ReplayViewer>) -> TickOutcome {
        self.stats.last_clock = clock;

        let Some(viewer) = viewer else {
            tracing::debug!("Viewer {:#x} gone; ending replay", self.viewer_real_id);
            self.queue.clear();
            return TickOutcome::Finished {
                delivered: 0,
                suppressed: 0,
            };
        };

        let mut delivered = 0;
        let mut suppressed = 0;

        while let Some(front) = self.queue.front() {
            if front.timestamp > clock {
                break;
            }
            if self.max_per_tick != 0 && delivered + suppressed >= self.max_per_tick {
                break;
            }

            if let Some(msg) = self.queue.pop_front() {
                if msg.source_id == self.viewer_ghost_id {
                    suppressed += 1;
                } else {
                    viewer.deliver(&msg);
                    delivered += 1;
                }
            }
        }

        self.stats.messages_played += delivered as u64;
        self.stats.messages_suppressed += suppressed as u64;

        if self.queue.is_empty() {
            tracing::info!(
                "Replay for {:#x} complete: {} played, {} suppressed",
                self.viewer_real_id,
                self.stats.messages_played,
                self.stats.messages_suppressed
            );
            viewer.return_to_origin();
            return TickOutcome::Finished {
                delivered,
                suppressed,
            };
        }

        if delivered + suppressed > 0 {
            tracing::debug!(
                "Tick {}: {} delivered, {} suppressed, {} queued",
                clock,
                delivered,
                suppressed,
                self.queue.len()
            );
        }

        TickOutcome::Pending {
            delivered,
            suppressed,
        }
    }
}
