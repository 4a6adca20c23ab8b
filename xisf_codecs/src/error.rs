//! Error types for codec invocations

use thiserror::Error;

/// Result type for compression engine operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Compression engine error types
#[derive(Error, Debug)]
pub enum CodecError {
    /// The underlying compressor reported a failure
    #[error("{codec} compression failed: {reason}")]
    CompressionFailed { codec: &'static str, reason: String },

    /// The underlying decompressor reported a failure
    #[error("{codec} decompression failed: {reason}")]
    DecompressionFailed { codec: &'static str, reason: String },

    /// Codec compiled out of this build
    #[error("compression codec {0} is not available in this build")]
    Unavailable(&'static str),

    /// Decoded length does not match the recorded length
    #[error("{codec} produced {actual} bytes, expected {expected}")]
    SizeMismatch {
        codec: &'static str,
        expected: u64,
        actual: u64,
    },

    /// Sub-block table inconsistent with the payload it describes
    #[error("invalid sub-block table: {0}")]
    InvalidSubblocks(String),
}
