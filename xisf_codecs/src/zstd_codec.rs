use crate::codec::{Codec, CompressionCodec, MAX_BLOCK_SIZE_32};
use crate::error::{CodecError, Result};

/// Zstandard block codec.
///
/// Each sub-block is an independent zstd frame. A level of -1 (or anything
/// outside 1..=22) maps to zstd's own default level.
pub struct ZstdCodec;

fn level_of(level: i32) -> i32 {
    match level {
        1..=22 => level,
        _ => zstd::DEFAULT_COMPRESSION_LEVEL,
    }
}

impl Codec for ZstdCodec {
    fn kind(&self) -> CompressionCodec {
        CompressionCodec::Zstd
    }

    fn max_block_size(&self) -> usize {
        MAX_BLOCK_SIZE_32
    }

    fn max_expansion(&self) -> u64 {
        // A 4-byte RLE block expands to at most 128 KiB.
        32 * 1024
    }

    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::bulk::compress(raw, level_of(level)).map_err(|e| CodecError::CompressionFailed {
            codec: "zstd",
            reason: e.to_string(),
        })
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let raw = zstd::bulk::decompress(compressed, raw_len).map_err(|e| {
            CodecError::DecompressionFailed {
                codec: "zstd",
                reason: e.to_string(),
            }
        })?;
        if raw.len() != raw_len {
            return Err(CodecError::SizeMismatch {
                codec: "zstd",
                expected: raw_len as u64,
                actual: raw.len() as u64,
            });
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_outside_range_use_default() {
        assert_eq!(level_of(-1), zstd::DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(level_of(0), zstd::DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(level_of(19), 19);
    }

    #[test]
    fn round_trip() {
        let raw = b"the quick brown fox jumps over the lazy dog. ".repeat(100);
        let compressed = ZstdCodec.compress_block(&raw, 9).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(ZstdCodec.decompress_block(&compressed, raw.len()).unwrap(), raw);
    }
}
