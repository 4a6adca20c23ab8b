use lz4_flex::block::{compress, decompress};

use crate::codec::{Codec, CompressionCodec, LZ4_MAX_BLOCK_SIZE};
use crate::error::{CodecError, Result};

/// LZ4 block codec, raw block format without a size prefix.
///
/// `lz4hc` blocks share the LZ4 block format and decode with the same
/// routine. `lz4_flex` has no high-compression mode, so [`Lz4Codec::hc`]
/// writes fast-mode blocks under the `lz4hc` token; any LZ4 decoder reads
/// them back.
pub struct Lz4Codec {
    high_compression: bool,
}

impl Lz4Codec {
    pub fn new() -> Self {
        Self {
            high_compression: false,
        }
    }

    pub fn hc() -> Self {
        Self {
            high_compression: true,
        }
    }
}

impl Default for Lz4Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Lz4Codec {
    fn kind(&self) -> CompressionCodec {
        if self.high_compression {
            CompressionCodec::Lz4Hc
        } else {
            CompressionCodec::Lz4
        }
    }

    fn max_block_size(&self) -> usize {
        LZ4_MAX_BLOCK_SIZE
    }

    fn max_expansion(&self) -> u64 {
        // One length byte per 255 bytes of match at best.
        256
    }

    fn compress_block(&self, raw: &[u8], _level: i32) -> Result<Vec<u8>> {
        if raw.len() > LZ4_MAX_BLOCK_SIZE {
            return Err(CodecError::CompressionFailed {
                codec: self.name(),
                reason: format!("input of {} bytes exceeds LZ4 limit", raw.len()),
            });
        }
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let raw = decompress(compressed, raw_len).map_err(|e| CodecError::DecompressionFailed {
            codec: self.name(),
            reason: e.to_string(),
        })?;
        if raw.len() != raw_len {
            return Err(CodecError::SizeMismatch {
                codec: self.name(),
                expected: raw_len as u64,
                actual: raw.len() as u64,
            });
        }
        Ok(raw)
    }
}
