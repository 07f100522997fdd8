// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::unreadable_literal)] // Identifier constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! End-to-end capture, persistence and anonymized replay.

use arena_replay::container::{ContainerLayout, CountField, Entry, HeaderOrder, LengthWidth};
use arena_replay::guid::{self, presence_mask, PackedGuid};
use arena_replay::{
    codec, format, CapturedMessage, MatchCategory, MemoryRepository, NewReplay, ReplayConfig,
    ReplayCoordinator, ReplayRepository, ReplayViewer, RewriteProfile, SessionKey, Side,
    SqliteRepository, TeamSummary, TickOutcome,
};
use tempfile::tempdir;

const CONTAINER: u16 = 0x051E;
const COMPRESSED: u16 = 0x01F6;
const MOVE: u16 = 0x00DD;

#[derive(Default)]
struct Spectator {
    received: Vec<CapturedMessage>,
    returned: bool,
}

impl ReplayViewer for Spectator {
    fn deliver(&mut self, message: &CapturedMessage) {
        self.received.push(message.clone());
    }

    fn return_to_origin(&mut self) {
        self.returned = true;
    }
}

fn teams() -> [TeamSummary; 2] {
    [
        TeamSummary {
            name: "Gold".into(),
            rating: 2100,
        },
        TeamSummary {
            name: "Green".into(),
            rating: 2050,
        },
    ]
}

fn store_log<R: ReplayRepository>(
    repo: &R,
    messages: &[CapturedMessage],
    participants: Vec<u64>,
) -> u32 {
    let buffer = format::serialize(messages).expect("serialize");
    repo.insert(NewReplay {
        category: MatchCategory::new(3, 4, 617),
        content_size: buffer.len() as u32,
        contents: format::encode_contents(&buffer),
        participants,
        teams: teams(),
    })
    .expect("insert")
}

fn coordinator() -> ReplayCoordinator<MemoryRepository> {
    let config = ReplayConfig::builder()
        .rewrite(
            RewriteProfile::default()
                .container(CONTAINER)
                .compressed(COMPRESSED)
                .packed_only(MOVE),
        )
        .build();
    ReplayCoordinator::new(config, MemoryRepository::new())
}

#[test]
fn test_viewer_messages_suppressed_in_order() {
    let mut coord = coordinator();
    let id = store_log(
        coord.repository(),
        &[
            CapturedMessage::new(0, 7, 0, vec![]),
            CapturedMessage::new(5, 3, 42, vec![]),
            CapturedMessage::new(5, 3, 99, vec![]),
        ],
        vec![42, 99],
    );

    let key = SessionKey::new(617, 1);
    let info = coord.start_replay(key, id, 42).expect("start");
    assert_ne!(info.viewer_ghost_id, 42);
    assert_eq!(presence_mask(info.viewer_ghost_id), presence_mask(42));

    let mut spectator = Spectator::default();
    let first = coord.tick(&key, 0, Some(&mut spectator));
    assert_eq!(
        first,
        TickOutcome::Pending {
            delivered: 1,
            suppressed: 0
        }
    );
    assert_eq!(spectator.received[0].type_tag, 7);

    let second = coord.tick(&key, 5, Some(&mut spectator));
    assert_eq!(
        second,
        TickOutcome::Finished {
            delivered: 1,
            suppressed: 1
        }
    );
    assert_eq!(spectator.received.len(), 2);

    let ghost_99 = spectator.received[1].source_id;
    assert_ne!(ghost_99, 99);
    assert_ne!(ghost_99, 0);
    assert_ne!(ghost_99, info.viewer_ghost_id);
    assert_eq!(presence_mask(ghost_99), presence_mask(99));
    assert!(spectator.returned);
}

#[test]
fn test_container_rewritten_in_place() {
    let mut coord = coordinator();
    let target: u64 = 0x0000_0000_0012_3456;

    let layout = ContainerLayout {
        count: CountField::U16,
        order: HeaderOrder::LengthThenTag,
        length: LengthWidth::U16,
    };
    let mut movement = vec![0x00, 0x07];
    movement.extend_from_slice(PackedGuid::new(target).as_bytes());
    movement.extend_from_slice(&[0x10, 0x20, 0x30]);
    let entries = vec![Entry::new(MOVE, movement), Entry::new(0x0131, vec![0xEE; 5])];
    let payload = layout.rebuild(&entries).expect("rebuild");

    let id = store_log(
        coord.repository(),
        &[CapturedMessage::new(0, CONTAINER, 0, payload.clone())],
        vec![target],
    );

    let key = SessionKey::new(617, 2);
    coord.start_replay(key, id, 0x77).expect("start");

    let mut spectator = Spectator::default();
    assert!(coord.tick(&key, 0, Some(&mut spectator)).is_finished());

    let out = &spectator.received[0].payload;
    assert_eq!(out.len(), payload.len());
    assert!(!guid::contains(out, target, false));

    let parsed = layout.try_parse(out).expect("same layout");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].tag, MOVE);
    assert_eq!(&parsed[0].payload[..2], &[0x00, 0x07]);
    assert_eq!(&parsed[0].payload[6..], &[0x10, 0x20, 0x30]);
    assert_eq!(parsed[0].payload[2], PackedGuid::new(target).mask());
    assert_eq!(parsed[1], entries[1]);
}

#[test]
fn test_compressed_message_rewritten() {
    let mut coord = coordinator();
    let target: u64 = 0x0500_0000_0000_002A;

    let mut inner = vec![0x42; 64];
    inner.extend_from_slice(PackedGuid::new(target).as_bytes());
    inner.extend_from_slice(&target.to_le_bytes());
    let block = codec::compress(&inner).expect("compress");

    let id = store_log(
        coord.repository(),
        &[CapturedMessage::new(0, COMPRESSED, 0, block)],
        vec![target],
    );

    let key = SessionKey::new(617, 3);
    coord.start_replay(key, id, 0x77).expect("start");

    let mut spectator = Spectator::default();
    coord.tick(&key, 0, Some(&mut spectator));

    let decoded = codec::decompress(&spectator.received[0].payload).expect("decompress");
    assert_eq!(decoded.len(), inner.len());
    assert!(!guid::contains(&decoded[..64 + 3], target, false));
    // Raw occurrences inside a compressed block are left alone.
    assert_eq!(&decoded[64 + 3..], &target.to_le_bytes());
}

#[test]
fn test_truncated_log_keeps_complete_records() {
    let mut coord = coordinator();
    let messages = vec![
        CapturedMessage::new(0, 1, 0, vec![1, 2, 3]),
        CapturedMessage::new(1, 1, 0, vec![4, 5, 6]),
        CapturedMessage::new(2, 1, 0, vec![7; 32]),
    ];
    let buffer = format::serialize(&messages).expect("serialize");
    let cut = &buffer[..buffer.len() - 10];

    let id = coord
        .repository()
        .insert(NewReplay {
            category: MatchCategory::new(2, 4, 559),
            content_size: buffer.len() as u32,
            contents: format::encode_contents(cut),
            participants: vec![],
            teams: teams(),
        })
        .expect("insert");

    let key = SessionKey::new(559, 4);
    let info = coord.start_replay(key, id, 0x77).expect("start");
    assert_eq!(info.message_count, 2);

    let mut spectator = Spectator::default();
    assert!(coord.tick(&key, 10, Some(&mut spectator)).is_finished());
    assert_eq!(spectator.received, messages[..2].to_vec());
}

#[test]
fn test_undecodable_contents_give_empty_replay() {
    let mut coord = coordinator();
    let id = coord
        .repository()
        .insert(NewReplay {
            category: MatchCategory::new(2, 4, 559),
            content_size: 4,
            contents: "NOT HEX".into(),
            participants: vec![],
            teams: teams(),
        })
        .expect("insert");

    let key = SessionKey::new(559, 5);
    assert_eq!(coord.start_replay(key, id, 1).expect("start").message_count, 0);

    let mut spectator = Spectator::default();
    assert!(coord.tick(&key, 0, Some(&mut spectator)).is_finished());
    assert!(spectator.returned);
}

#[test]
fn test_record_persist_replay_sqlite() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("arena.db");
    let live = SessionKey::new(617, 10);

    let saved = {
        let repo = SqliteRepository::new(&path).expect("open");
        let mut coord = ReplayCoordinator::new(ReplayConfig::default(), repo);

        coord.begin_recording(live, MatchCategory::new(3, 4, 617));
        for (id, side) in [(0x2A, Side::First), (0x2B, Side::First), (0x50, Side::Second)] {
            coord.register_participant(&live, id, side);
        }

        let mut spell = vec![0x01, 0x2A, 0x02];
        spell.extend_from_slice(&0x50u64.to_le_bytes());
        assert!(coord.capture(&live, 0x2A, Side::First, 0x0131, 0x2A, &spell, 100));
        // Same message seen by a teammate: not the designated observer.
        assert!(!coord.capture(&live, 0x2B, Side::First, 0x0131, 0x2A, &spell, 100));
        // Untracked tag.
        assert!(!coord.capture(&live, 0x50, Side::Second, 0x0999, 0, &[1], 150));
        assert!(coord.capture(&live, 0x50, Side::Second, 0x0132, 0x50, &[0x01, 0x50], 90));

        coord
            .finish_recording(&live, teams())
            .expect("finish")
            .expect("saved")
    };

    let repo = SqliteRepository::new(&path).expect("reopen");
    let stored = repo.fetch(saved).expect("fetch").expect("present");
    assert_eq!(stored.participants, vec![0x2A, 0x2B, 0x50]);
    assert_eq!(stored.teams[0].name, "Gold");

    let mut coord = ReplayCoordinator::new(ReplayConfig::default(), repo);
    assert_eq!(coord.recent_replays(3).expect("recent"), vec![saved]);

    let key = SessionKey::new(617, 11);
    coord.start_replay(key, saved, 0x50).expect("start");

    let mut spectator = Spectator::default();
    // Second capture was clamped to 100, and it is about the viewer.
    assert_eq!(
        coord.tick(&key, 100, Some(&mut spectator)),
        TickOutcome::Finished {
            delivered: 1,
            suppressed: 1
        }
    );

    let spell = &spectator.received[0];
    assert_ne!(spell.source_id, 0x2A);
    assert!(!guid::contains(&spell.payload, 0x2A, true));
    assert!(!guid::contains(&spell.payload, 0x50, true));
    assert_eq!(spell.payload.len(), 11);

    coord.bookmark(0x50, saved).expect("bookmark");
    assert_eq!(coord.bookmarks(0x50, true).expect("list"), vec![saved]);
}
