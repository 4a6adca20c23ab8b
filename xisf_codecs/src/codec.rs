use std::fmt;

use crate::error::Result;

/// Largest input a single zlib or zstd call is fed. Both carry 32-bit
/// length fields in the XISF sub-block table, so chunks stay below 4 GiB.
pub const MAX_BLOCK_SIZE_32: usize = u32::MAX as usize;

/// `LZ4_MAX_INPUT_SIZE` from the reference LZ4 implementation.
pub const LZ4_MAX_BLOCK_SIZE: usize = 0x7E00_0000;

/// Compression algorithm applied to a data block.
///
/// The on-disk token is what appears before the optional `+sh` suffix in the
/// `compression` attribute. `None` never appears on disk: an uncompressed
/// block simply has no `compression` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionCodec {
    #[default]
    None,
    Zlib,
    Lz4,
    Lz4Hc,
    Zstd,
}

impl CompressionCodec {
    pub const ALL: [CompressionCodec; 5] = [
        CompressionCodec::None,
        CompressionCodec::Zlib,
        CompressionCodec::Lz4,
        CompressionCodec::Lz4Hc,
        CompressionCodec::Zstd,
    ];

    /// Token used in the `compression` attribute, `None` for uncompressed blocks.
    pub fn token(self) -> Option<&'static str> {
        match self {
            CompressionCodec::None => None,
            CompressionCodec::Zlib => Some("zlib"),
            CompressionCodec::Lz4 => Some("lz4"),
            CompressionCodec::Lz4Hc => Some("lz4hc"),
            CompressionCodec::Zstd => Some("zstd"),
        }
    }

    /// Parse an attribute token. Matching is exact; `+sh` must already be stripped.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "zlib" => Some(CompressionCodec::Zlib),
            "lz4" => Some(CompressionCodec::Lz4),
            "lz4hc" => Some(CompressionCodec::Lz4Hc),
            "zstd" => Some(CompressionCodec::Zstd),
            _ => None,
        }
    }

    /// Human-readable name, including `"none"`.
    pub fn name(self) -> &'static str {
        self.token().unwrap_or("none")
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core compression abstraction.
///
/// Each `Codec` implementation:
/// - Is identified by the [`CompressionCodec`] it implements.
/// - Compresses and decompresses individual sub-blocks independently. The
///   chunking pipeline never hands a codec more than [`Codec::max_block_size`]
///   bytes at once.
/// - Reports failures as errors; there is no retry.
pub trait Codec: Send + Sync {
    fn kind(&self) -> CompressionCodec;

    /// Human-readable codec name for logs and CLI display.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Largest raw input accepted by a single [`Codec::compress_block`] call.
    fn max_block_size(&self) -> usize;

    /// Largest ratio of decompressed to compressed bytes the format can
    /// encode. A sub-block claiming more is rejected before anything is
    /// allocated for it.
    fn max_expansion(&self) -> u64;

    /// Compress a single independent sub-block. `level` of -1 selects the
    /// codec's default; codecs without levels ignore it.
    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>>;

    /// Decompress a single sub-block whose decompressed length is `raw_len`.
    ///
    /// Implementations must fail rather than return a buffer of any other
    /// length.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>>;
}
