use crate::codec::{Codec, CompressionCodec};
use crate::error::{CodecError, Result};

/// No-op codec: stores blocks verbatim.
///
/// Selected for blocks without a `compression` attribute. It keeps the
/// pipeline uniform; sizes are still checked on decode so a truncated
/// attachment is caught here rather than later as a geometry mismatch.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn kind(&self) -> CompressionCodec {
        CompressionCodec::None
    }

    fn max_block_size(&self) -> usize {
        usize::MAX
    }

    fn max_expansion(&self) -> u64 {
        1
    }

    fn compress_block(&self, raw: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        if compressed.len() != raw_len {
            return Err(CodecError::SizeMismatch {
                codec: self.name(),
                expected: raw_len as u64,
                actual: compressed.len() as u64,
            });
        }
        Ok(compressed.to_vec())
    }
}
