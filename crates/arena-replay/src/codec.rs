// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefixed zlib codec.
//!
//! Used for the compressed entity-snapshot message type, whose payload is
//! the uncompressed size followed by a zlib stream:
//!
//! ```text
//! +----------------------+--------------------------------+
//! | orig_len (u32 LE)    | zlib stream (var)              |
//! +----------------------+--------------------------------+
//! ```

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;
use thiserror::Error;

/// Size of the uncompressed-length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Compression level used when re-encoding rewritten payloads.
const COMPRESSION_LEVEL: u32 = 6;

/// Upper bound on the initial inflate buffer, relative to the block size.
const INITIAL_RATIO: usize = 32;

/// Codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("cannot compress an empty block")]
    EmptyInput,

    #[error("compressed block truncated ({0} bytes)")]
    Truncated(usize),

    #[error("declared uncompressed length is zero")]
    ZeroLength,

    #[error("zlib stream did not finish cleanly")]
    Incomplete,

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("block too large: {0} bytes")]
    TooLarge(usize),

    #[error("zlib error: {0}")]
    Zlib(String),
}

/// Compress `data`, prefixing the uncompressed length.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() {
        return Err(CodecError::EmptyInput);
    }
    let orig_len = u32::try_from(data.len()).map_err(|_| CodecError::TooLarge(data.len()))?;

    let mut output = Vec::with_capacity(LENGTH_PREFIX + data.len() / 2);
    output.extend_from_slice(&orig_len.to_le_bytes());

    let mut encoder = ZlibEncoder::new(output, Compression::new(COMPRESSION_LEVEL));
    encoder
        .write_all(data)
        .map_err(|e| CodecError::Zlib(e.to_string()))?;
    encoder.finish().map_err(|e| CodecError::Zlib(e.to_string()))
}

/// Decompress a block produced by [`compress`].
///
/// Inflates exactly the declared number of bytes; a stream that ends early,
/// overflows the declared size or never reaches its end marker is rejected.
pub fn decompress(block: &[u8]) -> Result<Vec<u8>, CodecError> {
    if block.len() < LENGTH_PREFIX {
        return Err(CodecError::Truncated(block.len()));
    }

    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&block[..LENGTH_PREFIX]);
    let orig_len = u32::from_le_bytes(prefix) as usize;
    if orig_len == 0 {
        return Err(CodecError::ZeroLength);
    }

    // The declared length is untrusted; grow towards it as output arrives.
    let stream = &block[LENGTH_PREFIX..];
    let mut inflater = Decompress::new(true);
    let initial = orig_len.min(stream.len().saturating_mul(INITIAL_RATIO));
    let mut output = Vec::with_capacity(initial);

    loop {
        if output.len() == output.capacity() {
            let grow = output.capacity().max(64).min(orig_len + 1 - output.len());
            output.reserve(grow);
        }

        let consumed = inflater.total_in() as usize;
        let before = output.len();
        let status = inflater
            .decompress_vec(&stream[consumed..], &mut output, FlushDecompress::Finish)
            .map_err(|e| CodecError::Zlib(e.to_string()))?;

        match status {
            Status::StreamEnd => break,
            _ if output.len() > orig_len => break,
            _ if output.len() == before && inflater.total_in() as usize == consumed => {
                return Err(CodecError::Incomplete);
            }
            _ => {}
        }
    }

    if output.len() != orig_len {
        return Err(CodecError::LengthMismatch {
            expected: orig_len,
            actual: output.len(),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_prefixes_length() {
        let data: Vec<u8> = (0..300).map(|i| (i % 7) as u8).collect();
        let block = compress(&data).expect("compress");

        assert_eq!(&block[..4], &300u32.to_le_bytes());
        assert!(block.len() < data.len());
        assert_eq!(decompress(&block).expect("decompress"), data);
    }

    #[test]
    fn test_compress_rejects_empty() {
        assert_eq!(compress(&[]), Err(CodecError::EmptyInput));
    }

    #[test]
    fn test_decompress_truncated_prefix() {
        assert_eq!(decompress(&[1, 0]), Err(CodecError::Truncated(2)));
    }

    #[test]
    fn test_decompress_zero_length() {
        assert_eq!(decompress(&[0, 0, 0, 0, 0x78]), Err(CodecError::ZeroLength));
    }

    #[test]
    fn test_decompress_truncated_stream() {
        let data = vec![0xAB; 512];
        let block = compress(&data).expect("compress");
        let cut = &block[..block.len() - 3];

        assert!(decompress(cut).is_err());
    }

    #[test]
    fn test_decompress_wrong_declared_length() {
        let data = vec![0x11; 64];
        let mut block = compress(&data).expect("compress");
        block[..4].copy_from_slice(&32u32.to_le_bytes());

        assert!(decompress(&block).is_err());

        block[..4].copy_from_slice(&128u32.to_le_bytes());
        assert_eq!(
            decompress(&block),
            Err(CodecError::LengthMismatch {
                expected: 128,
                actual: 64
            })
        );
    }

    #[test]
    fn test_decompress_huge_declared_length() {
        let data = vec![0x22; 64];
        let mut block = compress(&data).expect("compress");
        block[..4].copy_from_slice(&u32::MAX.to_le_bytes());

        assert_eq!(
            decompress(&block),
            Err(CodecError::LengthMismatch {
                expected: u32::MAX as usize,
                actual: 64
            })
        );
    }

    #[test]
    fn test_decompress_grows_past_initial_buffer() {
        // Highly compressible: the output dwarfs 32x the stream size.
        let data = vec![0u8; 200_000];
        let block = compress(&data).expect("compress");
        assert!((block.len() - LENGTH_PREFIX) * INITIAL_RATIO < data.len());

        assert_eq!(decompress(&block).expect("decompress"), data);
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(decompress(&[0x10, 0, 0, 0, 0xFF, 0xFF, 0xFF]).is_err());
    }
}
