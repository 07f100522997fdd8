// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Container message layouts.
//!
//! One message type carries several embedded messages back to back, but
//! its framing is not fixed:
//!
//! ```text
//! [count (none | u16 | u32)]
//! repeat {
//!     tag (u16) | length (u16 | u32)      or
//!     length (u16 | u32) | tag (u16)
//!     payload (length bytes)
//! }
//! ```
//!
//! The resolver tries the 12 combinations in a fixed order and keeps the
//! first one that consumes the whole payload. Short or degenerate payloads
//! may parse under more than one layout; the first match wins and that
//! ambiguity is accepted.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use thiserror::Error;

/// Leading entry-count field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountField {
    /// No count; entries run to the end of the payload.
    Absent,
    U16,
    U32,
}

/// Order of the fields in an entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOrder {
    TagThenLength,
    LengthThenTag,
}

/// Width of the per-entry length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    U16,
    U32,
}

/// A candidate container framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    pub count: CountField,
    pub order: HeaderOrder,
    pub length: LengthWidth,
}

/// A message embedded in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub tag: u16,
    pub payload: Vec<u8>,
}

impl Entry {
    pub fn new(tag: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

/// Container encoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("entry count {0} does not fit the count field")]
    CountOverflow(usize),

    #[error("entry {index} length {len} does not fit the length field")]
    LengthOverflow { index: usize, len: usize },
}

const fn layout(count: CountField, order: HeaderOrder, length: LengthWidth) -> ContainerLayout {
    ContainerLayout {
        count,
        order,
        length,
    }
}

impl ContainerLayout {
    /// Resolution order. Counted framings come first because the count
    /// check rejects more misreadings than an uncounted parse.
    pub const CANDIDATES: [ContainerLayout; 12] = [
        layout(CountField::U16, HeaderOrder::LengthThenTag, LengthWidth::U16),
        layout(CountField::U16, HeaderOrder::LengthThenTag, LengthWidth::U32),
        layout(CountField::U16, HeaderOrder::TagThenLength, LengthWidth::U16),
        layout(CountField::U16, HeaderOrder::TagThenLength, LengthWidth::U32),
        layout(CountField::U32, HeaderOrder::LengthThenTag, LengthWidth::U16),
        layout(CountField::U32, HeaderOrder::LengthThenTag, LengthWidth::U32),
        layout(CountField::U32, HeaderOrder::TagThenLength, LengthWidth::U16),
        layout(CountField::U32, HeaderOrder::TagThenLength, LengthWidth::U32),
        layout(CountField::Absent, HeaderOrder::LengthThenTag, LengthWidth::U16),
        layout(CountField::Absent, HeaderOrder::LengthThenTag, LengthWidth::U32),
        layout(CountField::Absent, HeaderOrder::TagThenLength, LengthWidth::U16),
        layout(CountField::Absent, HeaderOrder::TagThenLength, LengthWidth::U32),
    ];

    /// Size of one entry header in bytes.
    pub fn header_size(&self) -> usize {
        2 + match self.length {
            LengthWidth::U16 => 2,
            LengthWidth::U32 => 4,
        }
    }

    /// Parse `payload` under this layout.
    ///
    /// Returns `None` if an entry overruns the buffer, bytes are left over,
    /// or a declared count disagrees with the entries found.
    pub fn try_parse(&self, payload: &[u8]) -> Option<Vec<Entry>> {
        let mut cursor = Cursor::new(payload);

        let declared = match self.count {
            CountField::Absent => None,
            CountField::U16 => Some(cursor.read_u16::<LittleEndian>().ok()? as usize),
            CountField::U32 => Some(cursor.read_u32::<LittleEndian>().ok()? as usize),
        };

        let mut entries = Vec::new();
        loop {
            let remaining = payload.len() - cursor.position() as usize;
            if remaining == 0 {
                break;
            }
            if remaining < self.header_size() {
                return None;
            }

            let (tag, len) = self.read_header(&mut cursor).ok()?;
            if len > payload.len() - cursor.position() as usize {
                return None;
            }

            let mut body = vec![0u8; len];
            cursor.read_exact(&mut body).ok()?;
            entries.push(Entry { tag, payload: body });
        }

        match declared {
            Some(count) if count != entries.len() => None,
            _ => Some(entries),
        }
    }

    /// Encode `entries` under this layout.
    pub fn rebuild(&self, entries: &[Entry]) -> Result<Vec<u8>, ContainerError> {
        let body_len: usize = entries
            .iter()
            .map(|e| self.header_size() + e.payload.len())
            .sum();
        let mut buf = Vec::with_capacity(4 + body_len);

        match self.count {
            CountField::Absent => {}
            CountField::U16 => {
                let count = u16::try_from(entries.len())
                    .map_err(|_| ContainerError::CountOverflow(entries.len()))?;
                push_u16(&mut buf, count);
            }
            CountField::U32 => {
                let count = u32::try_from(entries.len())
                    .map_err(|_| ContainerError::CountOverflow(entries.len()))?;
                push_u32(&mut buf, count);
            }
        }

        for (index, entry) in entries.iter().enumerate() {
            let len = entry.payload.len();
            let overflow = ContainerError::LengthOverflow { index, len };
            let mut length = Vec::with_capacity(4);
            match self.length {
                LengthWidth::U16 => {
                    let len = u16::try_from(len).map_err(|_| overflow)?;
                    push_u16(&mut length, len);
                }
                LengthWidth::U32 => {
                    let len = u32::try_from(len).map_err(|_| overflow)?;
                    push_u32(&mut length, len);
                }
            }

            match self.order {
                HeaderOrder::TagThenLength => {
                    push_u16(&mut buf, entry.tag);
                    buf.extend_from_slice(&length);
                }
                HeaderOrder::LengthThenTag => {
                    buf.extend_from_slice(&length);
                    push_u16(&mut buf, entry.tag);
                }
            }
            buf.extend_from_slice(&entry.payload);
        }

        Ok(buf)
    }

    fn read_header(&self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<(u16, usize)> {
        match self.order {
            HeaderOrder::TagThenLength => {
                let tag = cursor.read_u16::<LittleEndian>()?;
                let len = self.read_length(cursor)?;
                Ok((tag, len))
            }
            HeaderOrder::LengthThenTag => {
                let len = self.read_length(cursor)?;
                let tag = cursor.read_u16::<LittleEndian>()?;
                Ok((tag, len))
            }
        }
    }

    fn read_length(&self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<usize> {
        Ok(match self.length {
            LengthWidth::U16 => cursor.read_u16::<LittleEndian>()? as usize,
            LengthWidth::U32 => cursor.read_u32::<LittleEndian>()? as usize,
        })
    }
}

/// Find the first candidate layout that parses all of `payload`.
pub fn resolve(payload: &[u8]) -> Option<(ContainerLayout, Vec<Entry>)> {
    ContainerLayout::CANDIDATES
        .iter()
        .find_map(|layout| layout.try_parse(payload).map(|entries| (*layout, entries)))
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    // Writing into a Vec cannot fail.
    let _ = buf.write_u16::<LittleEndian>(v);
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    let _ = buf.write_u32::<LittleEndian>(v);
}
