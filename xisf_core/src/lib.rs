//! Reading and writing XISF 1.0 image containers.
//!
//! A file is a 16-byte preamble, an XML header describing images and
//! properties, and the attachment region holding (optionally compressed)
//! pixel data. [`Reader`] parses the header eagerly and fetches pixels on
//! demand; [`Writer`] compresses images as they are added and lays the file
//! out on [`Writer::save`].

pub mod bytes;
pub mod config;
pub mod datablock;
pub mod error;
pub mod fits;
pub mod format;
pub mod image;
pub mod property;
pub mod reader;
pub mod variant;
pub mod writer;
pub mod xml;

pub use bytes::ByteArray;
pub use datablock::{BlockState, DataBlock};
pub use error::{Error, Result};
pub use format::{ChecksumAlgorithm, Location};
pub use image::{ColorFilterArray, ColorSpace, Image, ImageType, PixelStorage, SampleFormat};
pub use property::{FitsKeyword, Properties, Property};
pub use reader::Reader;
pub use variant::{Complex32, Complex64, Matrix, Variant, VariantType};
pub use writer::Writer;
pub use xisf_codecs::{is_codec_available, CompressionCodec};
