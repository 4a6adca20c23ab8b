//! Compression engine for XISF data blocks.
//!
//! Codecs are consumed as black boxes through the [`Codec`] trait; this crate
//! adds the byte-shuffle filter and the sub-block chunking that keeps every
//! codec call under its input limit.

pub mod codec;
pub mod error;
mod lz4_codec;
mod passthrough;
pub mod pipeline;
pub mod shuffle;
mod zlib_codec;
#[cfg(feature = "zstd")]
mod zstd_codec;

use std::sync::Arc;

pub use codec::{Codec, CompressionCodec};
pub use error::{CodecError, Result};
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use pipeline::{compress, compress_with_limit, decompress, Compressed, SubBlock};
pub use zlib_codec::ZlibCodec;
#[cfg(feature = "zstd")]
pub use zstd_codec::ZstdCodec;

/// Resolve the implementation for a codec named in a data block.
///
/// Fails with [`CodecError::Unavailable`] when the codec was compiled out.
pub fn codec_for(codec: CompressionCodec) -> Result<Arc<dyn Codec>> {
    match codec {
        CompressionCodec::None => Ok(Arc::new(PassThroughCodec)),
        CompressionCodec::Zlib => Ok(Arc::new(ZlibCodec)),
        CompressionCodec::Lz4 => Ok(Arc::new(Lz4Codec::new())),
        CompressionCodec::Lz4Hc => Ok(Arc::new(Lz4Codec::hc())),
        #[cfg(feature = "zstd")]
        CompressionCodec::Zstd => Ok(Arc::new(ZstdCodec)),
        #[cfg(not(feature = "zstd"))]
        CompressionCodec::Zstd => Err(CodecError::Unavailable("zstd")),
    }
}

/// Whether `codec` can be used in this build. Check before selecting a codec
/// for writing.
pub fn is_codec_available(codec: CompressionCodec) -> bool {
    match codec {
        CompressionCodec::Zstd => cfg!(feature = "zstd"),
        _ => true,
    }
}
