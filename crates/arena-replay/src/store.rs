// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage abstractions.
//!
//! Two kinds of state live outside the engine:
//! - per-session state (a recording in progress, an active replay), keyed by
//!   [`SessionKey`] and held in a [`StateStore`]
//! - persisted replays and bookmarks, held in a [`ReplayRepository`]
//!
//! The in-memory implementations here back the tests; `SqliteRepository`
//! is the durable one.

use crate::format::{MatchCategory, TeamSummary};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Identifies one running match instance on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub map_id: u32,
    pub instance_id: u32,
}

impl SessionKey {
    pub fn new(map_id: u32, instance_id: u32) -> Self {
        Self {
            map_id,
            instance_id,
        }
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored value out of range: {0}")]
    OutOfRange(String),
}

/// Keyed per-session state.
pub trait StateStore<V> {
    /// Mutable access to the state for `key`.
    fn get_mut(&mut self, key: &SessionKey) -> Option<&mut V>;

    /// Insert or replace the state for `key`, returning the previous value.
    fn put(&mut self, key: SessionKey, value: V) -> Option<V>;

    /// Remove and return the state for `key`.
    fn remove(&mut self, key: &SessionKey) -> Option<V>;

    fn contains(&mut self, key: &SessionKey) -> bool {
        self.get_mut(key).is_some()
    }
}

/// `HashMap`-backed [`StateStore`].
#[derive(Debug, Clone)]
pub struct MemoryStateStore<V> {
    slots: HashMap<SessionKey, V>,
}

impl<V> MemoryStateStore<V> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<V> Default for MemoryStateStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StateStore<V> for MemoryStateStore<V> {
    fn get_mut(&mut self, key: &SessionKey) -> Option<&mut V> {
        self.slots.get_mut(key)
    }

    fn put(&mut self, key: SessionKey, value: V) -> Option<V> {
        self.slots.insert(key, value)
    }

    fn remove(&mut self, key: &SessionKey) -> Option<V> {
        self.slots.remove(key)
    }
}

/// A replay about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReplay {
    pub category: MatchCategory,

    /// Length of the serialized log in bytes.
    pub content_size: u32,

    /// Uppercase hex of the serialized log.
    pub contents: String,

    pub participants: Vec<u64>,

    pub teams: [TeamSummary; 2],
}

/// A persisted replay row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReplay {
    pub id: u32,
    pub category: MatchCategory,
    pub content_size: u32,
    pub contents: String,
    pub participants: Vec<u64>,
    pub teams: [TeamSummary; 2],

    /// RFC 3339 recording time.
    pub recorded_at: String,
}

impl StoredReplay {
    fn from_new(id: u32, replay: NewReplay, recorded_at: String) -> Self {
        Self {
            id,
            category: replay.category,
            content_size: replay.content_size,
            contents: replay.contents,
            participants: replay.participants,
            teams: replay.teams,
            recorded_at,
        }
    }
}

/// Persisted replays and per-owner bookmarks.
///
/// # Implementations
///
/// - `MemoryRepository`: process-local, for tests and tooling
/// - `SqliteRepository`: durable
pub trait ReplayRepository {
    /// Store a replay and return its id.
    fn insert(&self, replay: NewReplay) -> Result<u32, StoreError>;

    /// Load one replay.
    fn fetch(&self, id: u32) -> Result<Option<StoredReplay>, StoreError>;

    /// Most recent replay ids of a bracket, newest first.
    fn recent(&self, bracket: u8, limit: usize) -> Result<Vec<u32>, StoreError>;

    /// Bookmark a replay for `owner`. Bookmarking twice is a no-op.
    fn bookmark(&self, owner: u64, replay_id: u32) -> Result<(), StoreError>;

    /// Replay ids bookmarked by `owner` in bookmark order (`ascending`) or
    /// newest first.
    fn bookmarks(&self, owner: u64, limit: usize, ascending: bool) -> Result<Vec<u32>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    replays: BTreeMap<u32, StoredReplay>,
    bookmarks: Vec<(u64, u32)>,
    next_id: u32,
}

/// In-memory [`ReplayRepository`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryInner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored replays.
    pub fn count(&self) -> usize {
        self.inner.lock().replays.len()
    }
}

impl ReplayRepository for MemoryRepository {
    fn insert(&self, replay: NewReplay) -> Result<u32, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_id = inner
            .next_id
            .checked_add(1)
            .ok_or_else(|| StoreError::OutOfRange("replay id".into()))?;
        let id = inner.next_id;

        let recorded_at = chrono::Utc::now().to_rfc3339();
        inner
            .replays
            .insert(id, StoredReplay::from_new(id, replay, recorded_at));
        Ok(id)
    }

    fn fetch(&self, id: u32) -> Result<Option<StoredReplay>, StoreError> {
        Ok(self.inner.lock().replays.get(&id).cloned())
    }

    fn recent(&self, bracket: u8, limit: usize) -> Result<Vec<u32>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .replays
            .values()
            .rev()
            .filter(|r| r.category.bracket == bracket)
            .take(limit)
            .map(|r| r.id)
            .collect())
    }

    fn bookmark(&self, owner: u64, replay_id: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.bookmarks.contains(&(owner, replay_id)) {
            inner.bookmarks.push((owner, replay_id));
        }
        Ok(())
    }

    fn bookmarks(&self, owner: u64, limit: usize, ascending: bool) -> Result<Vec<u32>, StoreError> {
        let inner = self.inner.lock();
        let owned = inner.bookmarks.iter().filter(|(o, _)| *o == owner).map(|(_, id)| *id);

        Ok(if ascending {
            owned.take(limit).collect()
        } else {
            owned.rev().take(limit).collect()
        })
    }
}
