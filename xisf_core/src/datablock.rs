//! Payload descriptor shared by image pixels, ICC profiles and out-of-line
//! properties.
//!
//! A block is in one of three states:
//!
//! ```text
//!   Deferred ──(reader fetches pos/size)──▶ decompress ──▶ Resolved
//!   Resolved ──(writer)──▶ compress ──▶ Compressed
//! ```
//!
//! Inline and embedded payloads skip `Deferred`: their text is decoded and
//! decompressed while the header is parsed.

use tracing::trace;
use xisf_codecs::{CompressionCodec, SubBlock};

use crate::bytes::ByteArray;
use crate::error::{Error, Result};
use crate::format::{
    format_subblocks, parse_subblocks, Checksum, ChecksumAlgorithm, CompressionSpec, Encoding,
    Location,
};
use crate::xml::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    /// Attachment not read yet; only `attachment_pos`/`attachment_size` are meaningful.
    Deferred,
    /// `data` holds the decompressed payload.
    #[default]
    Resolved,
    /// `data` holds the stored (compressed, shuffled) bytes pending write.
    Compressed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataBlock {
    pub embedded: bool,
    /// Shuffle item size in bytes; 0 or 1 disables the filter.
    pub byte_shuffling: u32,
    /// 0 while the block is not attached.
    pub attachment_pos: u64,
    pub attachment_size: u64,
    pub uncompressed_size: u64,
    pub codec: CompressionCodec,
    /// Codec specific; -1 selects the codec default.
    pub compress_level: i32,
    pub subblocks: Vec<SubBlock>,
    /// Digest to emit when the block is compressed for writing.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Digest of the stored bytes, read from the header or computed by `compress`.
    pub checksum: Option<Checksum>,
    data: ByteArray,
    state: BlockState,
}

impl DataBlock {
    /// Resolved, uncompressed block holding `data`.
    pub fn new(data: impl Into<ByteArray>) -> Self {
        let data = data.into();
        Self {
            uncompressed_size: data.len() as u64,
            compress_level: -1,
            data,
            ..Self::default()
        }
    }

    pub fn with_codec(mut self, codec: CompressionCodec, level: i32) -> Self {
        self.codec = codec;
        self.compress_level = level;
        self
    }

    pub fn with_shuffle(mut self, item_size: u32) -> Self {
        self.byte_shuffling = item_size;
        self
    }

    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = Some(algorithm);
        self
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        self.state == BlockState::Resolved
    }

    /// Payload bytes; decompressed only in the `Resolved` state.
    pub fn data(&self) -> &ByteArray {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ByteArray {
        &mut self.data
    }

    /// Replace the payload with decompressed bytes.
    pub fn set_data(&mut self, data: impl Into<ByteArray>) {
        self.data = data.into();
        self.uncompressed_size = self.data.len() as u64;
        self.subblocks.clear();
        self.state = BlockState::Resolved;
    }

    /// Shuffle and compress the resolved payload in place. `data` then holds
    /// the stored bytes and `subblocks` the chunk table that produced them.
    pub fn compress(&mut self) -> Result<()> {
        if self.state != BlockState::Resolved {
            return Err(Error::format("only a resolved data block can be compressed"));
        }
        let compressed = xisf_codecs::compress(
            &self.data,
            self.codec,
            self.compress_level,
            self.byte_shuffling,
        )?;
        self.uncompressed_size = compressed.uncompressed_size;
        // A single chunk needs no table.
        self.subblocks = if compressed.subblocks.len() > 1 {
            compressed.subblocks
        } else {
            Vec::new()
        };
        self.data = ByteArray::from(compressed.data);
        self.checksum = self
            .checksum_algorithm
            .map(|alg| Checksum::compute(alg, &self.data));
        self.state = BlockState::Compressed;
        Ok(())
    }

    /// Verify and decompress `stored` (exactly the bytes found in the file
    /// after any text decoding) into the payload.
    pub fn decompress(&mut self, stored: &[u8]) -> Result<()> {
        if let Some(checksum) = &self.checksum {
            checksum.verify(stored)?;
        }
        let raw = if self.codec == CompressionCodec::None {
            stored.to_vec()
        } else {
            xisf_codecs::decompress(
                stored,
                self.codec,
                self.byte_shuffling,
                self.uncompressed_size,
                &self.subblocks,
            )?
        };
        if self.codec != CompressionCodec::None && raw.len() as u64 != self.uncompressed_size {
            return Err(Error::format(format!(
                "{} block decompressed to {} bytes, expected {}",
                self.codec,
                raw.len(),
                self.uncompressed_size
            )));
        }
        trace!(
            "decompressed {} stored bytes into {} ({})",
            stored.len(),
            raw.len(),
            self.codec
        );
        self.uncompressed_size = raw.len() as u64;
        self.subblocks.clear();
        self.attachment_pos = 0;
        self.data = ByteArray::from(raw);
        self.state = BlockState::Resolved;
        Ok(())
    }

    fn decode_text(&mut self, text: &str, encoding: Encoding) -> Result<()> {
        let stored = match encoding {
            Encoding::Base64 => ByteArray::from_base64(text.as_bytes())?,
            Encoding::Base16 => ByteArray::from_hex(text.as_bytes())?,
        };
        self.decompress(&stored)
    }

    /// Read the data-block attributes of `element`. Inline and embedded
    /// payloads are decoded now; attachments are left `Deferred`.
    pub(crate) fn from_element(element: &Element) -> Result<Self> {
        let mut block = DataBlock {
            compress_level: -1,
            ..DataBlock::default()
        };
        if let Some(text) = element.attr("compression") {
            let spec = CompressionSpec::parse(text)?;
            block.codec = spec.codec;
            block.uncompressed_size = spec.uncompressed_size;
            block.byte_shuffling = spec.shuffle_item;
        }
        if let Some(text) = element.attr("subblocks") {
            block.subblocks = parse_subblocks(text)?;
        }
        if let Some(text) = element.attr("checksum") {
            let checksum = Checksum::parse(text)?;
            block.checksum_algorithm = Some(checksum.algorithm);
            block.checksum = Some(checksum);
        }

        match Location::parse(element.required_attr("location")?)? {
            Location::Embedded => {
                block.embedded = true;
                let data = element.child("Data").ok_or_else(|| {
                    Error::format(format!("<{}> is embedded but has no <Data>", element.name))
                })?;
                let encoding = data.attr("encoding").map(Encoding::parse).transpose()?;
                // The Data element may carry its own compression attributes.
                if let Some(text) = data.attr("compression") {
                    let spec = CompressionSpec::parse(text)?;
                    block.codec = spec.codec;
                    block.uncompressed_size = spec.uncompressed_size;
                    block.byte_shuffling = spec.shuffle_item;
                }
                block.decode_text(&data.text, encoding.unwrap_or_default())?;
            }
            Location::Inline(encoding) => block.decode_text(&element.text, encoding)?,
            Location::Attachment { pos, size } => {
                block.attachment_pos = pos;
                block.attachment_size = size;
                block.state = BlockState::Deferred;
            }
        }
        Ok(block)
    }

    /// Write compression, subblocks, checksum and location attributes.
    ///
    /// A block with a nonzero `attachment_pos` is written as an attachment
    /// reference; otherwise the stored bytes go into the element as base64,
    /// either as text or in a `<Data>` child when `embedded` is set.
    pub(crate) fn write_to(&self, element: &mut Element) -> Result<()> {
        if self.state == BlockState::Deferred {
            return Err(Error::format("cannot write a data block that was never read"));
        }
        let spec = CompressionSpec {
            codec: self.codec,
            uncompressed_size: self.uncompressed_size,
            shuffle_item: self.byte_shuffling,
        };
        if let Some(attr) = spec.to_attr() {
            element.set_attr("compression", attr);
        }
        if !self.subblocks.is_empty() {
            element.set_attr("subblocks", format_subblocks(&self.subblocks));
        }
        if let Some(checksum) = &self.checksum {
            element.set_attr("checksum", checksum.to_attr());
        }

        if self.attachment_pos != 0 {
            let location = Location::Attachment {
                pos: self.attachment_pos,
                size: self.data.len() as u64,
            };
            element.set_attr("location", location.to_string());
        } else if self.embedded {
            element.set_attr("location", Location::Embedded.to_string());
            let mut data = Element::new("Data").with_attr("encoding", Encoding::Base64.as_str());
            data.set_text(self.data.to_base64());
            element.push_child(data);
        } else {
            element.set_attr("location", Location::Inline(Encoding::Base64).to_string());
            element.set_text(self.data.to_base64());
        }
        Ok(())
    }
}
