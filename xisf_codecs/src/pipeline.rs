//! Shuffle + chunked compression pipeline
//!
//! ```text
//! raw ──shuffle(item)──▶ shuffled ──split(max_block)──▶ chunk₀ chunk₁ …
//!                                                        │      │
//!                                                  compress_block each
//!                                                        ▼      ▼
//!                                     compressed = c₀ ‖ c₁ ‖ …, table = [(|cᵢ|, |chunkᵢ|)]
//! ```
//!
//! Decompression replays the table. An empty table means one implicit chunk
//! covering the whole payload, which is what writers that predate sub-blocks
//! produce.

use tracing::debug;

use crate::codec::{Codec, CompressionCodec};
use crate::codec_for;
use crate::error::{CodecError, Result};
use crate::shuffle::{shuffle, unshuffle};

/// One entry of the sub-block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBlock {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Output of [`compress`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compressed {
    pub data: Vec<u8>,
    /// Chunk table used to produce `data`, in order.
    pub subblocks: Vec<SubBlock>,
    pub uncompressed_size: u64,
}

/// Shuffle, split and compress `data` with the codec's own block limit.
///
/// `shuffle_item` of 0 or 1 disables the shuffle filter. For
/// [`CompressionCodec::None`] the data is returned untouched with an empty
/// table.
pub fn compress(
    data: &[u8],
    codec: CompressionCodec,
    level: i32,
    shuffle_item: u32,
) -> Result<Compressed> {
    let implementation = codec_for(codec)?;
    let limit = implementation.max_block_size();
    compress_with(implementation.as_ref(), data, level, shuffle_item, limit)
}

/// Like [`compress`] but splits at `max_chunk` bytes, clamped to the codec
/// limit. Used to exercise multi-chunk files without gigabyte buffers.
pub fn compress_with_limit(
    data: &[u8],
    codec: CompressionCodec,
    level: i32,
    shuffle_item: u32,
    max_chunk: usize,
) -> Result<Compressed> {
    let implementation = codec_for(codec)?;
    let limit = max_chunk.clamp(1, implementation.max_block_size());
    compress_with(implementation.as_ref(), data, level, shuffle_item, limit)
}

fn compress_with(
    codec: &dyn Codec,
    data: &[u8],
    level: i32,
    shuffle_item: u32,
    max_chunk: usize,
) -> Result<Compressed> {
    if codec.kind() == CompressionCodec::None {
        return Ok(Compressed {
            data: data.to_vec(),
            subblocks: Vec::new(),
            uncompressed_size: data.len() as u64,
        });
    }

    let shuffled = shuffle(data, shuffle_item as usize);
    let mut out = Vec::new();
    let mut subblocks = Vec::new();
    for chunk in shuffled.chunks(max_chunk) {
        let compressed = codec.compress_block(chunk, level)?;
        subblocks.push(SubBlock {
            compressed_size: compressed.len() as u64,
            uncompressed_size: chunk.len() as u64,
        });
        out.extend_from_slice(&compressed);
    }
    // An empty payload still gets one (empty) frame so readers have something
    // to decode.
    if subblocks.is_empty() {
        let compressed = codec.compress_block(&[], level)?;
        subblocks.push(SubBlock {
            compressed_size: compressed.len() as u64,
            uncompressed_size: 0,
        });
        out = compressed;
    }

    debug!(
        "{}: {} bytes -> {} bytes in {} sub-block(s)",
        codec.name(),
        data.len(),
        out.len(),
        subblocks.len()
    );

    Ok(Compressed {
        data: out,
        subblocks,
        uncompressed_size: data.len() as u64,
    })
}

/// Decompress a payload produced by [`compress`] (or any conforming writer).
pub fn decompress(
    compressed: &[u8],
    codec: CompressionCodec,
    shuffle_item: u32,
    uncompressed_size: u64,
    subblocks: &[SubBlock],
) -> Result<Vec<u8>> {
    let implementation = codec_for(codec)?;
    if codec == CompressionCodec::None {
        return Ok(compressed.to_vec());
    }

    let implicit = [SubBlock {
        compressed_size: compressed.len() as u64,
        uncompressed_size,
    }];
    let table = if subblocks.is_empty() {
        &implicit[..]
    } else {
        subblocks
    };
    validate_table(table, compressed.len() as u64, uncompressed_size)?;
    check_expansion(implementation.as_ref(), table)?;

    let capacity = usize::try_from(uncompressed_size).map_err(|_| {
        CodecError::InvalidSubblocks(format!("{uncompressed_size} bytes do not fit in memory"))
    })?;
    let mut out = Vec::new();
    out.try_reserve_exact(capacity).map_err(|e| {
        CodecError::InvalidSubblocks(format!("cannot hold {uncompressed_size} bytes: {e}"))
    })?;
    let mut offset = 0usize;
    for block in table {
        let end = offset + block.compressed_size as usize;
        let raw = implementation
            .decompress_block(&compressed[offset..end], block.uncompressed_size as usize)?;
        out.extend_from_slice(&raw);
        offset = end;
    }

    debug!(
        "{}: {} bytes -> {} bytes from {} sub-block(s)",
        implementation.name(),
        compressed.len(),
        out.len(),
        table.len()
    );

    Ok(unshuffle(&out, shuffle_item as usize))
}

fn validate_table(table: &[SubBlock], compressed_len: u64, uncompressed_size: u64) -> Result<()> {
    let compressed_total = table
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_add(b.compressed_size));
    let uncompressed_total = table
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_add(b.uncompressed_size));
    if compressed_total != Some(compressed_len) {
        return Err(CodecError::InvalidSubblocks(format!(
            "compressed sizes sum to {compressed_total:?}, payload is {compressed_len} bytes"
        )));
    }
    if uncompressed_total != Some(uncompressed_size) {
        return Err(CodecError::InvalidSubblocks(format!(
            "uncompressed sizes sum to {uncompressed_total:?}, block declares {uncompressed_size}"
        )));
    }
    Ok(())
}

/// Reject sub-blocks whose declared size no stream of their compressed
/// length could decode to.
fn check_expansion(codec: &dyn Codec, table: &[SubBlock]) -> Result<()> {
    let ratio = codec.max_expansion();
    for (i, block) in table.iter().enumerate() {
        let bound = block.compressed_size.saturating_mul(ratio);
        if block.uncompressed_size > bound {
            return Err(CodecError::InvalidSubblocks(format!(
                "sub-block {i}: {} {} bytes cannot decode to {} bytes",
                codec.name(),
                block.compressed_size,
                block.uncompressed_size
            )));
        }
    }
    Ok(())
}
