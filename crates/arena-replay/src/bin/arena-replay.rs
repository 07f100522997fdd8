// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! arena-replay - Inspect a replay database.
//!
//! Usage:
//!   arena-replay --db replays.db list --bracket 3
//!   arena-replay --db replays.db info 42
//!   arena-replay --db replays.db dump 42 --viewer 0x2A
//!   arena-replay --db replays.db bookmark 7 42

use anyhow::Context;
use arena_replay::{
    format, CapturedMessage, ReplayConfig, ReplayCoordinator, ReplayRepository, ReplayViewer,
    SessionKey, SqliteRepository, StoredReplay,
};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "arena-replay")]
#[command(about = "Inspect recorded arena matches")]
#[command(version)]
struct Args {
    /// Database path (SQLite file)
    #[arg(short, long, default_value = "arena_replays.db")]
    db: PathBuf,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the most recent replays of a bracket
    List {
        /// Bracket size (2, 3 or 5)
        #[arg(short, long, default_value_t = 3)]
        bracket: u8,
    },
    /// Show one replay's metadata
    Info {
        /// Replay id
        id: u32,
    },
    /// Print a replay's messages
    Dump {
        /// Replay id
        id: u32,

        /// Replay as seen by this viewer (identifiers anonymized)
        #[arg(long, value_parser = parse_id)]
        viewer: Option<u64>,

        /// Maximum number of messages to print (0 = all)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },
    /// Bookmark a replay for an owner
    Bookmark {
        /// Owner identifier
        #[arg(value_parser = parse_id)]
        owner: u64,

        /// Replay id
        id: u32,
    },
    /// List an owner's bookmarks
    Bookmarks {
        /// Owner identifier
        #[arg(value_parser = parse_id)]
        owner: u64,

        /// Newest first
        #[arg(long)]
        newest: bool,
    },
}

/// Decimal or `0x`-prefixed hexadecimal identifier.
fn parse_id(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid identifier '{}': {}", s, e))
}

/// Prints messages as they are delivered.
struct PrintViewer {
    printed: usize,
    limit: usize,
}

impl ReplayViewer for PrintViewer {
    fn deliver(&mut self, message: &CapturedMessage) {
        if self.limit == 0 || self.printed < self.limit {
            print_message(message);
        }
        self.printed += 1;
    }

    fn return_to_origin(&mut self) {
        info!("Replay finished after {} delivered messages", self.printed);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReplayConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReplayConfig::default(),
    };

    let repository = SqliteRepository::new(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;
    let mut coordinator = ReplayCoordinator::new(config, repository);

    match args.command {
        Commands::List { bracket } => {
            let ids = coordinator.recent_replays(bracket)?;
            if ids.is_empty() {
                println!("No {0}v{0} replays found.", bracket);
            }
            for id in ids {
                if let Some(replay) = coordinator.repository().fetch(id)? {
                    println!("{}", summary_line(&replay));
                }
            }
        }
        Commands::Info { id } => {
            let replay = fetch(&coordinator, id)?;
            print_info(&replay);
        }
        Commands::Dump { id, viewer, limit } => match viewer {
            None => {
                let replay = fetch(&coordinator, id)?;
                let buffer = format::decode_contents(&replay.contents, replay.content_size);
                let messages = format::deserialize(&buffer);
                let shown = if limit == 0 { messages.len() } else { limit };
                for msg in messages.iter().take(shown) {
                    print_message(msg);
                }
            }
            Some(viewer_id) => {
                let key = SessionKey::new(0, 0);
                let replay_info = coordinator.start_replay(key, id, viewer_id)?;
                info!(
                    "Viewer {:#x} replays as {:#x} ({} ghosts)",
                    viewer_id, replay_info.viewer_ghost_id, replay_info.remapped
                );

                let mut printer = PrintViewer { printed: 0, limit };
                let mut clock = 0u32;
                while !coordinator
                    .tick(&key, clock, Some(&mut printer))
                    .is_finished()
                {
                    clock = clock.saturating_add(100);
                }
            }
        },
        Commands::Bookmark { owner, id } => {
            coordinator.bookmark(owner, id)?;
            println!("Replay {} bookmarked for {:#x}.", id, owner);
        }
        Commands::Bookmarks { owner, newest } => {
            let ids = coordinator.bookmarks(owner, !newest)?;
            if ids.is_empty() {
                println!("No saved replays found.");
            }
            for id in ids {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

fn fetch<R: ReplayRepository>(
    coordinator: &ReplayCoordinator<R>,
    id: u32,
) -> anyhow::Result<StoredReplay> {
    coordinator
        .repository()
        .fetch(id)?
        .with_context(|| format!("Replay {} not found", id))
}

fn summary_line(replay: &StoredReplay) -> String {
    let [a, b] = &replay.teams;
    format!(
        "#{:<6} {}v{} map {:<4} {} ({}) vs {} ({})  {}",
        replay.id,
        replay.category.bracket,
        replay.category.bracket,
        replay.category.map_id,
        a.name,
        a.rating,
        b.name,
        b.rating,
        replay.recorded_at
    )
}

fn print_info(replay: &StoredReplay) {
    let buffer = format::decode_contents(&replay.contents, replay.content_size);
    let messages = format::deserialize(&buffer);

    let mut by_tag: BTreeMap<u16, usize> = BTreeMap::new();
    for msg in &messages {
        *by_tag.entry(msg.type_tag).or_default() += 1;
    }

    println!("{}", summary_line(replay));
    println!("  Type: {}", replay.category.type_id);
    println!("  Size: {} bytes", replay.content_size);
    println!("  Participants: {}", replay.participants.len());
    for id in &replay.participants {
        println!("    - {:#x}", id);
    }
    println!("  Messages: {}", messages.len());
    println!(
        "  Duration: {:.1}s",
        messages.last().map(|m| m.timestamp).unwrap_or(0) as f64 / 1000.0
    );
    for (tag, count) in by_tag {
        println!("    {:#06x}: {}", tag, count);
    }
}

fn print_message(msg: &CapturedMessage) {
    const PREVIEW: usize = 16;
    let preview = hex_preview(&msg.payload, PREVIEW);
    println!(
        "{:>8} {:#06x} {:#018x} {:>6}  {}",
        msg.timestamp,
        msg.type_tag,
        msg.source_id,
        msg.payload.len(),
        preview
    );
}

fn hex_preview(payload: &[u8], max: usize) -> String {
    let shown = &payload[..payload.len().min(max)];
    let mut text = format::encode_contents(shown);
    if payload.len() > max {
        text.push_str("..");
    }
    text
}
