use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use crate::config::{compression_override, CompressionOverride};
use crate::datablock::DataBlock;
use crate::error::{Error, Result};
use crate::format::{
    Preamble, IO_CHUNK, PREAMBLE_SIZE, ROOT_ELEMENT, SCHEMA_LOCATION, XISF_NAMESPACE,
    XISF_VERSION, XSI_NAMESPACE,
};
use crate::image::Image;
use crate::property::{Properties, Property};
use crate::variant::Variant;
use crate::xml::{self, Element};

pub const DEFAULT_CREATOR: &str = concat!("xisf_core ", env!("CARGO_PKG_VERSION"));

/// Writer for XISF 1.0 files.
///
/// # Write contract
/// [`write_image`](Writer::write_image) copies the image and compresses its
/// pixels straight away; nothing touches the output until
/// [`save`](Writer::save).
///
/// # Format layout written
/// ```text
/// [PREAMBLE: 16 bytes]  "XISF0100" + header_len:u32 + reserved[4]
/// [XML HEADER]          header_len bytes
/// [ZERO PADDING]        up to the first attachment
/// [IMAGE 0] [IMAGE 1] ... [THUMBNAIL]      ← each aligned to block_alignment
/// ```
///
/// Attachment positions are written into the header as plain decimals. The
/// header is serialized with candidate positions, and if it does not fit in
/// front of the first attachment the attachment region is moved further
/// back and the header serialized again, until it fits.
pub struct Writer {
    images: Vec<Image>,
    thumbnail: Option<Image>,
    properties: Properties,
    creator_application: String,
    block_alignment: u64,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            thumbnail: None,
            properties: Properties::new(),
            creator_application: DEFAULT_CREATOR.to_string(),
            block_alignment: 1,
        }
    }

    /// Name recorded as `XISF:CreatorApplication`.
    pub fn set_creator_application(&mut self, name: impl Into<String>) {
        self.creator_application = name.into();
    }

    /// Start every attachment at a multiple of `alignment` bytes (1 = packed).
    pub fn set_block_alignment(&mut self, alignment: u64) {
        self.block_alignment = alignment.max(1);
    }

    /// Queue an image. Its pixels must be resolved and match the geometry.
    ///
    /// `XISF_COMPRESSION`, when set, replaces the image's codec settings.
    pub fn write_image(&mut self, image: &Image) -> Result<()> {
        let prepared = prepare(image)?;
        self.images.push(prepared);
        Ok(())
    }

    pub fn set_thumbnail(&mut self, image: &Image) -> Result<()> {
        self.thumbnail = Some(prepare(image)?);
        Ok(())
    }

    pub fn images_count(&self) -> usize {
        self.images.len()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Strict insert of a document-scope property.
    pub fn add_property(&mut self, property: Property) -> Result<()> {
        self.properties.add(property)
    }

    pub fn update_property(&mut self, property: Property) {
        self.properties.update(property);
    }

    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    pub fn remove_property(&mut self, id: &str) -> Option<Property> {
        self.properties.remove(id)
    }

    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.save(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn save_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save(&mut out)?;
        Ok(out)
    }

    /// Write the complete file to `out`.
    pub fn save<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let created = Utc::now().trunc_subsecs(0);
        let header = self.layout(created)?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| Error::format(format!("XML header of {} bytes is too large", header.len())))?;

        out.write_all(&Preamble { header_len }.to_bytes())?;
        out.write_all(&header)?;
        let mut written = (PREAMBLE_SIZE + header.len()) as u64;

        for image in self.images.iter().chain(self.thumbnail.as_ref()) {
            let block = &image.data_block;
            write_zeros(out, block.attachment_pos - written)?;
            for chunk in block.data().chunks(IO_CHUNK) {
                out.write_all(chunk)?;
            }
            written = block.attachment_pos + block.data().len() as u64;
        }
        debug!(
            "saved XISF: {} image(s), header {header_len} bytes, {written} bytes total",
            self.images.len()
        );
        Ok(())
    }

    /// Settle attachment positions and return the serialized header.
    fn layout(&mut self, created: DateTime<Utc>) -> Result<Vec<u8>> {
        let align = self.block_alignment;
        let mut data_start = align_up(PREAMBLE_SIZE as u64, align);
        let mut iteration = 0;
        loop {
            iteration += 1;
            let mut pos = data_start;
            for image in self.images.iter_mut().chain(self.thumbnail.as_mut()) {
                image.data_block.attachment_pos = pos;
                image.data_block.attachment_size = image.data_block.data().len() as u64;
                pos = align_up(pos + image.data_block.attachment_size, align);
            }

            let header = self.header_xml(created)?;
            let needed = (PREAMBLE_SIZE + header.len()) as u64;
            debug!("layout pass {iteration}: header ends at {needed}, attachments at {data_start}");
            if needed <= data_start {
                return Ok(header);
            }
            data_start = align_up(needed, align);
        }
    }

    fn header_xml(&self, created: DateTime<Utc>) -> Result<Vec<u8>> {
        let mut root = Element::new(ROOT_ELEMENT)
            .with_attr("version", XISF_VERSION)
            .with_attr("xmlns", XISF_NAMESPACE)
            .with_attr("xmlns:xsi", XSI_NAMESPACE)
            .with_attr("xsi:schemaLocation", SCHEMA_LOCATION);

        for image in &self.images {
            root.push_child(image.to_element()?);
        }
        if let Some(thumbnail) = &self.thumbnail {
            let mut element = thumbnail.to_element()?;
            element.name = "Thumbnail".to_string();
            root.push_child(element);
        }
        for property in &self.properties {
            root.push_child(property.to_element());
        }

        let mut metadata = Element::new("Metadata");
        metadata.push_child(Property::new("XISF:CreationTime", Variant::TimePoint(created)).to_element());
        metadata.push_child(
            Property::new("XISF:CreatorApplication", self.creator_application.as_str()).to_element(),
        );
        root.push_child(metadata);

        let comment = format!(
            "\nExtensible Image Serialization Format - XISF version 1.0\nCreated with {}\n",
            self.creator_application
        );
        xml::write(&root, Some(&comment))
    }
}

/// Copy `image`, apply the environment override and compress its pixels.
fn prepare(image: &Image) -> Result<Image> {
    prepare_with(image, compression_override())
}

/// `settings`, when given, replaces the image's own codec, level and shuffle.
fn prepare_with(image: &Image, settings: Option<CompressionOverride>) -> Result<Image> {
    if !image.data_block.is_resolved() {
        return Err(Error::format("image pixels must be resolved before writing"));
    }
    image.check_size(image.pixels().len())?;

    let mut prepared = image.clone();
    let block: &mut DataBlock = &mut prepared.data_block;
    if let Some(settings) = settings {
        block.codec = settings.codec;
        block.compress_level = settings.level;
        block.byte_shuffling = if settings.shuffle {
            image.sample_format.size() as u32
        } else {
            0
        };
    }
    block.embedded = false;
    block.attachment_pos = 0;
    block.compress()?;
    Ok(prepared)
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

fn write_zeros<W: Write>(out: &mut W, mut count: u64) -> Result<()> {
    const ZEROS: [u8; 4096] = [0u8; 4096];
    while count > 0 {
        let step = count.min(ZEROS.len() as u64) as usize;
        out.write_all(&ZEROS[..step])?;
        count -= step as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datablock::BlockState;
    use crate::image::SampleFormat;
    use crate::reader::Reader;
    use xisf_codecs::CompressionCodec;

    #[test]
    fn align_up_rounds() {
        assert_eq!(align_up(0, 1), 0);
        assert_eq!(align_up(17, 1), 17);
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(32, 16), 32);
    }

    #[test]
    fn header_carries_metadata_and_namespaces() {
        let mut writer = Writer::new();
        writer.set_creator_application("unit test");
        writer.write_image(&Image::new(2, 2, 1, SampleFormat::UInt8)).unwrap();
        let bytes = writer.save_to_vec().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Created with unit test"));
        assert!(text.contains(r#"xmlns="http://www.pixinsight.com/xisf""#));
        assert!(text.contains("xsi:schemaLocation"));

        let reader = Reader::from_bytes(bytes).unwrap();
        assert_eq!(
            reader.metadata().get("XISF:CreatorApplication").unwrap().value.as_str(),
            Some("unit test")
        );
        assert!(matches!(
            reader.metadata().get("XISF:CreationTime").unwrap().value,
            Variant::TimePoint(_)
        ));
    }

    #[test]
    fn aligned_attachments() {
        let mut writer = Writer::new();
        writer.set_block_alignment(4096);
        for w in [3, 5] {
            writer.write_image(&Image::new(w, 1, 1, SampleFormat::UInt8)).unwrap();
        }
        let bytes = writer.save_to_vec().unwrap();
        let reader = Reader::from_bytes(bytes.clone()).unwrap();
        assert_eq!(reader.image_header(0).unwrap().data_block.attachment_pos, 4096);
        assert_eq!(reader.image_header(1).unwrap().data_block.attachment_pos, 8192);
        assert_eq!(bytes.len(), 8192 + 5);
    }

    fn gradient(width: u64) -> Image {
        let mut image = Image::new(width, 4, 1, SampleFormat::UInt16);
        let pixels: Vec<u8> = (0..width * 4).flat_map(|v| (v as u16).to_le_bytes()).collect();
        image.set_pixels(pixels).unwrap();
        image
    }

    #[test]
    fn override_replaces_image_settings() {
        let mut image = gradient(64);
        image.data_block.codec = CompressionCodec::Lz4;
        image.data_block.compress_level = 3;

        let settings = CompressionOverride {
            codec: CompressionCodec::Zlib,
            shuffle: true,
            level: 9,
        };
        let prepared = prepare_with(&image, Some(settings)).unwrap();
        let block = &prepared.data_block;
        assert_eq!(block.codec, CompressionCodec::Zlib);
        assert_eq!(block.compress_level, 9);
        assert_eq!(block.byte_shuffling, 2);
        assert_eq!(block.state(), BlockState::Compressed);
        assert_eq!(block.uncompressed_size, 512);

        let settings = CompressionOverride {
            codec: CompressionCodec::Lz4Hc,
            shuffle: false,
            level: -1,
        };
        image.data_block.byte_shuffling = 2;
        let prepared = prepare_with(&image, Some(settings)).unwrap();
        assert_eq!(prepared.data_block.codec, CompressionCodec::Lz4Hc);
        assert_eq!(prepared.data_block.byte_shuffling, 0);
    }

    #[test]
    fn override_none_stores_raw_pixels() {
        let mut image = gradient(16);
        image.data_block.codec = CompressionCodec::Zlib;
        image.data_block.byte_shuffling = 2;
        let settings = CompressionOverride {
            codec: CompressionCodec::None,
            shuffle: false,
            level: -1,
        };
        let prepared = prepare_with(&image, Some(settings)).unwrap();
        assert_eq!(prepared.data_block.codec, CompressionCodec::None);
        assert_eq!(prepared.data_block.data(), image.pixels());

        let mut element = Element::new("Image");
        prepared.data_block.write_to(&mut element).unwrap();
        assert_eq!(element.attr("compression"), None);
    }

    #[test]
    fn without_override_image_settings_stand() {
        let mut image = gradient(16);
        image.data_block.codec = CompressionCodec::Zlib;
        image.data_block.compress_level = 1;
        let prepared = prepare_with(&image, None).unwrap();
        assert_eq!(prepared.data_block.codec, CompressionCodec::Zlib);
        assert_eq!(prepared.data_block.compress_level, 1);
        assert_eq!(prepared.data_block.byte_shuffling, 0);
    }

    #[test]
    fn rejects_wrong_pixel_size() {
        let mut image = Image::new(4, 4, 1, SampleFormat::UInt16);
        image.data_block.set_data(vec![0u8; 10]);
        assert!(matches!(Writer::new().write_image(&image), Err(Error::Format(_))));
    }
}
