// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite replay repository.

use crate::format::{MatchCategory, TeamSummary};
use crate::store::{NewReplay, ReplayRepository, StoreError, StoredReplay};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-backed [`ReplayRepository`].
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE arena_replays (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     bracket INTEGER NOT NULL,
///     type_id INTEGER NOT NULL,
///     map_id INTEGER NOT NULL,
///     content_size INTEGER NOT NULL,
///     contents TEXT NOT NULL,
///     participants TEXT NOT NULL,     -- JSON array of identifiers
///     team_a_name TEXT NOT NULL,
///     team_a_rating INTEGER NOT NULL,
///     team_b_name TEXT NOT NULL,
///     team_b_rating INTEGER NOT NULL,
///     recorded_at TEXT NOT NULL
/// );
/// CREATE TABLE saved_replays (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     owner INTEGER NOT NULL,
///     replay_id INTEGER NOT NULL,
///     UNIQUE (owner, replay_id)
/// );
/// ```
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

/// Row fields before the participants column is parsed.
struct RawReplay {
    replay: StoredReplay,
    participants_json: String,
}

impl SqliteRepository {
    /// Open (or create) a database file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        tracing::debug!("Opened replay database {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS arena_replays (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bracket INTEGER NOT NULL,
                type_id INTEGER NOT NULL,
                map_id INTEGER NOT NULL,
                content_size INTEGER NOT NULL,
                contents TEXT NOT NULL,
                participants TEXT NOT NULL,
                team_a_name TEXT NOT NULL,
                team_a_rating INTEGER NOT NULL,
                team_b_name TEXT NOT NULL,
                team_b_rating INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bracket ON arena_replays(bracket)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS saved_replays (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner INTEGER NOT NULL,
                replay_id INTEGER NOT NULL,
                UNIQUE (owner, replay_id)
            )",
            [],
        )?;

        Ok(())
    }

    fn row_to_replay(row: &rusqlite::Row) -> rusqlite::Result<RawReplay> {
        Ok(RawReplay {
            replay: StoredReplay {
                id: row.get(0)?,
                category: MatchCategory::new(row.get(1)?, row.get(2)?, row.get(3)?),
                content_size: row.get(4)?,
                contents: row.get(5)?,
                participants: Vec::new(),
                teams: [
                    TeamSummary {
                        name: row.get(7)?,
                        rating: row.get(8)?,
                    },
                    TeamSummary {
                        name: row.get(9)?,
                        rating: row.get(10)?,
                    },
                ],
                recorded_at: row.get(11)?,
            },
            participants_json: row.get(6)?,
        })
    }
}

impl ReplayRepository for SqliteRepository {
    fn insert(&self, replay: NewReplay) -> Result<u32, StoreError> {
        let participants = serde_json::to_string(&replay.participants)?;
        let recorded_at = chrono::Utc::now().to_rfc3339();
        let [team_a, team_b] = &replay.teams;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO arena_replays (bracket, type_id, map_id, content_size, contents,
                participants, team_a_name, team_a_rating, team_b_name, team_b_rating, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                replay.category.bracket,
                replay.category.type_id,
                replay.category.map_id,
                replay.content_size,
                replay.contents,
                participants,
                team_a.name,
                team_a.rating,
                team_b.name,
                team_b.rating,
                recorded_at,
            ],
        )?;

        let rowid = conn.last_insert_rowid();
        u32::try_from(rowid).map_err(|_| StoreError::OutOfRange(format!("replay id {}", rowid)))
    }

    fn fetch(&self, id: u32) -> Result<Option<StoredReplay>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, bracket, type_id, map_id, content_size, contents, participants,
                        team_a_name, team_a_rating, team_b_name, team_b_rating, recorded_at
                 FROM arena_replays WHERE id = ?1",
                params![id],
                Self::row_to_replay,
            )
            .optional()?
        };

        raw.map(|raw| {
            let mut replay = raw.replay;
            replay.participants = serde_json::from_str(&raw.participants_json)?;
            Ok::<_, StoreError>(replay)
        })
        .transpose()
    }

    fn recent(&self, bracket: u8, limit: usize) -> Result<Vec<u32>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM arena_replays WHERE bracket = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let ids = stmt
            .query_map(params![bracket, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(ids)
    }

    fn bookmark(&self, owner: u64, replay_id: u32) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO saved_replays (owner, replay_id) VALUES (?1, ?2)",
            params![owner as i64, replay_id],
        )?;
        Ok(())
    }

    fn bookmarks(&self, owner: u64, limit: usize, ascending: bool) -> Result<Vec<u32>, StoreError> {
        let sql = if ascending {
            "SELECT replay_id FROM saved_replays WHERE owner = ?1 ORDER BY id ASC LIMIT ?2"
        } else {
            "SELECT replay_id FROM saved_replays WHERE owner = ?1 ORDER BY id DESC LIMIT ?2"
        };

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![owner as i64, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(ids)
    }
}
