use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::trace;

use crate::codec::{Codec, CompressionCodec, MAX_BLOCK_SIZE_32};
use crate::error::{CodecError, Result};

/// zlib (RFC 1950) block codec.
///
/// XISF stores the bare zlib stream, without the 4-byte big-endian length
/// prefix some toolkits prepend; the decompressed length comes from the
/// `compression` attribute or the sub-block table instead.
pub struct ZlibCodec;

fn level_of(level: i32) -> Compression {
    match level {
        0..=9 => Compression::new(level as u32),
        _ => Compression::default(),
    }
}

impl Codec for ZlibCodec {
    fn kind(&self) -> CompressionCodec {
        CompressionCodec::Zlib
    }

    fn max_block_size(&self) -> usize {
        MAX_BLOCK_SIZE_32
    }

    fn max_expansion(&self) -> u64 {
        // Deflate's ceiling: 258-byte matches coded in 2 bits.
        1032
    }

    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>> {
        trace!("zlib compression of {} bytes at level {}", raw.len(), level);
        let failed = |e: std::io::Error| CodecError::CompressionFailed {
            codec: "zlib",
            reason: e.to_string(),
        };
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), level_of(level));
        encoder.write_all(raw).map_err(failed)?;
        encoder.finish().map_err(failed)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        trace!("zlib decompression of {} bytes", compressed.len());
        let mut out = Vec::with_capacity(raw_len);
        // One byte past the expected length is enough to report a mismatch.
        ZlibDecoder::new(compressed)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::DecompressionFailed {
                codec: "zlib",
                reason: e.to_string(),
            })?;
        if out.len() != raw_len {
            return Err(CodecError::SizeMismatch {
                codec: "zlib",
                expected: raw_len as u64,
                actual: out.len() as u64,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_bare_zlib_stream() {
        let raw = vec![7u8; 4096];
        let compressed = ZlibCodec.compress_block(&raw, -1).unwrap();
        // CMF byte: deflate with a 32K window
        assert_eq!(compressed[0], 0x78);
        assert_eq!(ZlibCodec.decompress_block(&compressed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let compressed = ZlibCodec.compress_block(b"abcdef", 6).unwrap();
        assert!(matches!(
            ZlibCodec.decompress_block(&compressed, 10),
            Err(CodecError::SizeMismatch { expected: 10, actual: 6, .. })
        ));
    }
}
