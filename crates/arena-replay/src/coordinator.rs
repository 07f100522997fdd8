// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recording and replay lifecycle per session.
//!
//! The coordinator owns no global state: recordings in progress and active
//! replays live in injected [`StateStore`]s, persisted replays in a
//! [`ReplayRepository`]. Host code drives it with capture events while a
//! match runs and with one [`ReplayCoordinator::tick`] per update while a
//! replay plays.

use crate::config::ReplayConfig;
use crate::format::{self, MatchCategory, MatchLog, TeamSummary};
use crate::ghost::{GhostError, IdentifierRemap};
use crate::player::{ReplaySession, ReplayViewer, TickOutcome};
use crate::recorder::{MatchRecorder, Side};
use crate::rewrite::rewrite_log;
use crate::store::{
    MemoryStateStore, NewReplay, ReplayRepository, SessionKey, StateStore, StoreError,
};
use std::collections::BTreeSet;
use thiserror::Error;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Format error: {0}")]
    Format(#[from] format::FormatError),

    #[error("Ghost allocation failed: {0}")]
    Ghost(#[from] GhostError),

    #[error("Replay {0} not found")]
    NotFound(u32),
}

/// What a started replay looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayInfo {
    pub replay_id: u32,
    pub category: MatchCategory,
    pub message_count: usize,
    pub remapped: usize,
    pub viewer_ghost_id: u64,
}

/// Drives recordings and replays for every session key.
pub struct ReplayCoordinator<
    R,
    C = MemoryStateStore<MatchRecorder>,
    P = MemoryStateStore<ReplaySession>,
> where
    R: ReplayRepository,
    C: StateStore<MatchRecorder>,
    P: StateStore<ReplaySession>,
{
    config: ReplayConfig,
    repository: R,
    recordings: C,
    replays: P,
}

impl<R: ReplayRepository> ReplayCoordinator<R> {
    /// Coordinator with in-memory session state.
    pub fn new(config: ReplayConfig, repository: R) -> Self {
        Self::with_stores(
            config,
            repository,
            MemoryStateStore::new(),
            MemoryStateStore::new(),
        )
    }
}

impl<R, C, P> ReplayCoordinator<R, C, P>
where
    R: ReplayRepository,
    C: StateStore<MatchRecorder>,
    P: StateStore<ReplaySession>,
{
    /// Coordinator over caller-provided session stores.
    pub fn with_stores(config: ReplayConfig, repository: R, recordings: C, replays: P) -> Self {
        Self {
            config,
            repository,
            recordings,
            replays,
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Whether a replay is playing on `key`.
    pub fn is_replaying(&mut self, key: &SessionKey) -> bool {
        self.replays.contains(key)
    }

    /// Whether a recording is in progress on `key`.
    pub fn is_recording(&mut self, key: &SessionKey) -> bool {
        self.recordings.contains(key)
    }

    /// Start capturing a match. Returns `false` if `key` hosts a replay.
    pub fn begin_recording(&mut self, key: SessionKey, category: MatchCategory) -> bool {
        if self.replays.contains(&key) {
            tracing::debug!("Session {:?} is a replay; not recording", key);
            return false;
        }

        let recorder = MatchRecorder::new(category, self.config.tag_filter());
        if self.recordings.put(key, recorder).is_some() {
            tracing::warn!("Session {:?} was already recording; restarted", key);
        }
        tracing::info!(
            "Recording session {:?} (bracket {}, map {})",
            key,
            category.bracket,
            category.map_id
        );
        true
    }

    /// Add a participant to the recording on `key`.
    pub fn register_participant(&mut self, key: &SessionKey, id: u64, side: Side) {
        if let Some(recorder) = self.recordings.get_mut(key) {
            recorder.register_participant(id, side);
        }
    }

    /// Offer a message seen by `observer`. Returns `true` if it was captured.
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        &mut self,
        key: &SessionKey,
        observer: u64,
        side: Side,
        tag: u16,
        source_id: u64,
        payload: &[u8],
        clock: u32,
    ) -> bool {
        let Some(recorder) = self.recordings.get_mut(key) else {
            return false;
        };

        match recorder.capture(observer, side, tag, source_id, payload, clock) {
            Ok(captured) => captured,
            Err(e) => {
                tracing::warn!("Dropping message on {:?}: {}", key, e);
                false
            }
        }
    }

    /// Seal the recording on `key` and persist it.
    ///
    /// Returns the new replay id, or `None` if nothing was recorded. Any
    /// replay still attached to `key` is dropped as well.
    pub fn finish_recording(
        &mut self,
        key: &SessionKey,
        teams: [TeamSummary; 2],
    ) -> Result<Option<u32>, ReplayError> {
        self.replays.remove(key);

        let Some(recorder) = self.recordings.remove(key) else {
            return Ok(None);
        };

        let (log, stats) = recorder.finish();
        if log.is_empty() {
            tracing::debug!("Session {:?} recorded nothing", key);
            return Ok(None);
        }

        let (category, messages, participants) = log.into_parts();
        let buffer = format::serialize(&messages)?;
        let content_size = u32::try_from(buffer.len())
            .map_err(|_| format::FormatError::ContentTooLarge(buffer.len()))?;

        let id = self.repository.insert(NewReplay {
            category,
            content_size,
            contents: format::encode_contents(&buffer),
            participants: participants.into_iter().collect(),
            teams,
        })?;

        tracing::info!(
            "Saved replay {} ({} messages, {} bytes, {} duplicates skipped)",
            id,
            stats.message_count,
            content_size,
            stats.duplicates
        );
        Ok(Some(id))
    }

    /// Load replay `replay_id` for `viewer_real_id` onto `key`.
    pub fn start_replay(
        &mut self,
        key: SessionKey,
        replay_id: u32,
        viewer_real_id: u64,
    ) -> Result<ReplayInfo, ReplayError> {
        let stored = self
            .repository
            .fetch(replay_id)?
            .ok_or(ReplayError::NotFound(replay_id))?;

        let buffer = format::decode_contents(&stored.contents, stored.content_size);
        let messages = format::deserialize(&buffer);
        let mut log = MatchLog::from_parts(stored.category, messages, stored.participants);

        let originals: BTreeSet<u64> = log.participants().iter().copied().collect();
        let mut reserved = log.source_ids();
        reserved.insert(viewer_real_id);
        let remap = IdentifierRemap::build(originals, reserved, self.config.ghost_probe_limit)?;

        let stats = rewrite_log(&mut log, &self.config.rewrite, &remap);
        let viewer_ghost_id = remap.resolve(viewer_real_id);

        let info = ReplayInfo {
            replay_id,
            category: log.category(),
            message_count: log.len(),
            remapped: remap.len(),
            viewer_ghost_id,
        };

        if self.recordings.remove(&key).is_some() {
            tracing::debug!("Discarding recording on {:?}; it now hosts a replay", key);
        }

        let session = ReplaySession::new(log, viewer_real_id, viewer_ghost_id)
            .with_max_per_tick(self.config.max_messages_per_tick);
        self.replays.put(key, session);

        tracing::info!(
            "Replay {} started for {:#x}: {} messages, {} ghosts, {} payloads rewritten",
            replay_id,
            viewer_real_id,
            info.message_count,
            info.remapped,
            stats.rewritten
        );
        Ok(info)
    }

    /// Advance the replay on `key` to `clock`.
    pub fn tick(
        &mut self,
        key: &SessionKey,
        clock: u32,
        viewer: Option<&mut dyn ReplayViewer>,
    ) -> TickOutcome {
        let Some(session) = self.replays.get_mut(key) else {
            return TickOutcome::Idle;
        };

        let outcome = session.tick(clock, viewer);
        if outcome.is_finished() {
            self.replays.remove(key);
        }
        outcome
    }

    /// Latest replay ids of a bracket.
    pub fn recent_replays(&self, bracket: u8) -> Result<Vec<u32>, ReplayError> {
        Ok(self.repository.recent(bracket, self.config.recent_limit)?)
    }

    /// Bookmark a replay for `owner`.
    pub fn bookmark(&self, owner: u64, replay_id: u32) -> Result<(), ReplayError> {
        if self.repository.fetch(replay_id)?.is_none() {
            return Err(ReplayError::NotFound(replay_id));
        }
        self.repository.bookmark(owner, replay_id)?;
        Ok(())
    }

    /// One page of `owner`'s bookmarks: oldest first on the first page,
    /// newest first otherwise.
    pub fn bookmarks(&self, owner: u64, first_page: bool) -> Result<Vec<u32>, ReplayError> {
        Ok(self
            .repository
            .bookmarks(owner, self.config.bookmark_page, first_page)?)
    }
}
