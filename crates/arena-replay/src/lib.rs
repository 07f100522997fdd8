// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Arena Replay
//!
//! Capture the binary message stream of a live match and replay it later to
//! a spectator, with every participant identifier swapped for a ghost so the
//! spectator never meets its own identity in the replayed stream.
//!
//! # Quick Start
//!
//! ```bash
//! # Latest 3v3 replays in a database
//! arena-replay --db replays.db list --bracket 3
//!
//! # Inspect one replay and dump its messages
//! arena-replay --db replays.db info 42
//! arena-replay --db replays.db dump 42 --limit 20
//!
//! # Bookmark a replay for a player
//! arena-replay --db replays.db bookmark 7 42
//! ```
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Capture | [`recorder`], [`filter`] |
//! | Persist | [`format`], [`store`], [`sqlite`] |
//! | Anonymize | [`ghost`], [`rewrite`] ([`guid`], [`container`], [`codec`]) |
//! | Replay | [`player`] |
//! | Glue | [`coordinator`], [`config`] |

pub mod codec;
pub mod config;
pub mod container;
pub mod coordinator;
pub mod filter;
pub mod format;
pub mod ghost;
pub mod guid;
pub mod player;
pub mod recorder;
pub mod rewrite;
pub mod sqlite;
pub mod store;

pub use codec::CodecError;
pub use config::{ConfigError, ReplayConfig};
pub use container::{ContainerLayout, Entry};
pub use coordinator::{ReplayCoordinator, ReplayError, ReplayInfo};
pub use filter::TagFilter;
pub use format::{CapturedMessage, FormatError, MatchCategory, MatchLog, TeamSummary};
pub use ghost::{GhostAllocator, GhostError, IdentifierRemap};
pub use player::{PlaybackStats, ReplaySession, ReplayViewer, TickOutcome};
pub use recorder::{MatchRecorder, RecorderError, RecordingStats, Side};
pub use rewrite::{PayloadRewriter, RewriteProfile};
pub use sqlite::SqliteRepository;
pub use store::{
    MemoryRepository, MemoryStateStore, NewReplay, ReplayRepository, SessionKey, StateStore,
    StoreError, StoredReplay,
};
