//! Error types for reading and writing XISF containers

use thiserror::Error;
use xisf_codecs::CodecError;

/// Result type for XISF operations
pub type Result<T> = std::result::Result<T, Error>;

/// XISF error types. Every error is fatal to the open/read/save call that
/// raised it; there is no partial success.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// First eight bytes are not `XISF0100`
    #[error("invalid XISF signature: expected \"XISF0100\", got {0:?}")]
    InvalidSignature([u8; 8]),

    /// Structural violation in the header: bad root, geometry, attribute grammar, ...
    #[error("invalid XISF header: {0}")]
    Format(String),

    /// XML could not be parsed or serialized
    #[error("XML error: {0}")]
    Xml(String),

    /// Compression or decompression failure, or a codec missing from this build
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Strict insert of a property whose id is already present
    #[error("duplicate property id: {0}")]
    DuplicateProperty(String),

    #[error("image index {index} is out of range ({count} images)")]
    ImageIndexOutOfRange { index: usize, count: usize },

    /// Stored digest does not match the block bytes
    #[error("{algorithm} checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        algorithm: &'static str,
        expected: String,
        actual: String,
    },
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}
