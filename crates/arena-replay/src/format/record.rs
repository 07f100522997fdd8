// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flat record framing for persisted match logs.
//!
//! # Record Format
//!
//! ```text
//! +-----------------------------------------------------------------+
//! | length (4) | timestamp (4) | type_tag (2) | [source_id (8)]      |
//! | payload (length & 0x7FFF_FFFF)                                  |
//! +-----------------------------------------------------------------+
//! ```
//!
//! All integers are little-endian. Bit 31 of `length` signals that an
//! 8-byte source identifier follows the type tag.
//!
//! Decoding is best-effort: a record whose header or payload runs past the
//! end of the buffer ends the log, and every complete record before it is
//! kept.

use super::{CapturedMessage, FormatError, MAX_PAYLOAD_LEN};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

/// "Has source identifier" flag in the length field.
pub const SOURCE_FLAG: u32 = 0x8000_0000;

/// Fixed part of a record header.
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + 2;

/// Size of the optional source identifier.
pub const SOURCE_ID_SIZE: usize = 8;

/// Serialize messages into a flat buffer.
pub fn serialize(messages: &[CapturedMessage]) -> Result<Vec<u8>, FormatError> {
    let total: usize = messages.iter().map(record_size).sum();
    let mut buf = Vec::with_capacity(total);

    for (index, msg) in messages.iter().enumerate() {
        write_record(&mut buf, index, msg)?;
    }

    Ok(buf)
}

fn record_size(msg: &CapturedMessage) -> usize {
    let source = if msg.has_source() { SOURCE_ID_SIZE } else { 0 };
    RECORD_HEADER_SIZE + source + msg.payload.len()
}

fn write_record(buf: &mut Vec<u8>, index: usize, msg: &CapturedMessage) -> Result<(), FormatError> {
    let len = msg.payload.len();
    if len > MAX_PAYLOAD_LEN {
        return Err(FormatError::PayloadTooLarge { index, len });
    }

    let mut length_field = len as u32;
    if msg.has_source() {
        length_field |= SOURCE_FLAG;
    }

    buf.write_u32::<LittleEndian>(length_field)?;
    buf.write_u32::<LittleEndian>(msg.timestamp)?;
    buf.write_u16::<LittleEndian>(msg.type_tag)?;
    if msg.has_source() {
        buf.write_u64::<LittleEndian>(msg.source_id)?;
    }
    buf.extend_from_slice(&msg.payload);

    Ok(())
}

/// Deserialize a flat buffer, dropping any trailing partial record.
pub fn deserialize(buf: &[u8]) -> Vec<CapturedMessage> {
    let mut cursor = Cursor::new(buf);
    let mut messages = Vec::new();

    while let Some(msg) = read_record(&mut cursor, buf.len()) {
        messages.push(msg);
    }

    let consumed = cursor.position() as usize;
    if consumed < buf.len() {
        tracing::debug!(
            "Dropped {} trailing bytes after {} records",
            buf.len() - consumed,
            messages.len()
        );
    }

    messages
}

/// Read one record; on `None` the cursor is left at the record start.
fn read_record(cursor: &mut Cursor<&[u8]>, total: usize) -> Option<CapturedMessage> {
    let start = cursor.position();
    let result = try_read_record(cursor, total);
    if result.is_none() {
        cursor.set_position(start);
    }
    result
}

fn try_read_record(cursor: &mut Cursor<&[u8]>, total: usize) -> Option<CapturedMessage> {
    let remaining = |pos: u64| total - pos as usize;
    if remaining(cursor.position()) < RECORD_HEADER_SIZE {
        return None;
    }

    let length_field = cursor.read_u32::<LittleEndian>().ok()?;
    let timestamp = cursor.read_u32::<LittleEndian>().ok()?;
    let type_tag = cursor.read_u16::<LittleEndian>().ok()?;

    let source_id = if length_field & SOURCE_FLAG != 0 {
        if remaining(cursor.position()) < SOURCE_ID_SIZE {
            return None;
        }
        cursor.read_u64::<LittleEndian>().ok()?
    } else {
        0
    };

    let len = (length_field & !SOURCE_FLAG) as usize;
    if remaining(cursor.position()) < len {
        return None;
    }

    let mut payload = vec![0u8; len];
    cursor.read_exact(&mut payload).ok()?;

    Some(CapturedMessage {
        timestamp,
        type_tag,
        source_id,
        payload,
    })
}
