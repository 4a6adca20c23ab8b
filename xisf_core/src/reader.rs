use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, trace};

use crate::datablock::{BlockState, DataBlock};
use crate::error::{Error, Result};
use crate::format::{Preamble, IO_CHUNK, PREAMBLE_SIZE, ROOT_ELEMENT, XISF_VERSION};
use crate::image::Image;
use crate::property::{Properties, Property};
use crate::xml::{self, Element};

/// An image plus the pieces of it that may still live in the stream.
#[derive(Debug)]
struct Entry {
    image: Image,
    icc: Option<DataBlock>,
}

/// Reader for XISF 1.0 files.
///
/// # Open sequence
/// 1. Read the 16-byte preamble (signature check, header length).
/// 2. Read and parse the XML header; the root must be `<xisf version="1.0">`.
/// 3. Build every image, the thumbnail, and the document and metadata
///    properties. Inline payloads and attached property values are decoded
///    here.
///
/// # Access pattern
/// Pixel data and ICC profiles are attachments left in the stream until
/// [`image`](Reader::image) asks for them. Each image resolves on its own;
/// [`image_header`](Reader::image_header) never touches the stream.
pub struct Reader<R> {
    stream: R,
    stream_len: u64,
    header_len: u32,
    entries: Vec<Entry>,
    thumbnail: Option<Entry>,
    properties: Properties,
    metadata: Properties,
}

impl Reader<BufReader<File>> {
    /// Open an XISF file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl Reader<Cursor<Vec<u8>>> {
    /// Read a file already held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(Cursor::new(bytes.into()))
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Parse the header from any seekable stream positioned anywhere.
    pub fn new(mut stream: R) -> Result<Self> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        // ── Preamble ────────────────────────────────────────────────────────
        let mut preamble_buf = [0u8; PREAMBLE_SIZE];
        stream.read_exact(&mut preamble_buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::format("file is shorter than the XISF preamble"),
            _ => Error::Io(e),
        })?;
        let preamble = Preamble::from_bytes(&preamble_buf)?;

        // ── XML header ──────────────────────────────────────────────────────
        let header_end = PREAMBLE_SIZE as u64 + u64::from(preamble.header_len);
        if header_end > stream_len {
            return Err(Error::format(format!(
                "header length {} runs past the end of the file ({stream_len} bytes)",
                preamble.header_len
            )));
        }
        let mut header = vec![0u8; preamble.header_len as usize];
        stream.read_exact(&mut header)?;
        // Some writers count the zero padding as part of the header.
        while header.last() == Some(&0) {
            header.pop();
        }
        debug!("XISF header: {} bytes of XML", header.len());
        let root = xml::parse(&header)?;

        if root.name != ROOT_ELEMENT || root.attr("version") != Some(XISF_VERSION) {
            return Err(Error::format(format!(
                "unknown root element <{} version={:?}>",
                root.name,
                root.attr("version").unwrap_or_default()
            )));
        }

        let mut reader = Self {
            stream,
            stream_len,
            header_len: preamble.header_len,
            entries: Vec::new(),
            thumbnail: None,
            properties: Properties::new(),
            metadata: Properties::new(),
        };

        for child in &root.children {
            match child.name.as_str() {
                "Image" => {
                    let entry = reader.read_image(child)?;
                    reader.entries.push(entry);
                }
                "Thumbnail" => {
                    // Image attributes on the Thumbnail itself, or a nested Image.
                    let element = child.child("Image").unwrap_or(child);
                    reader.thumbnail = Some(reader.read_image(element)?);
                }
                "Property" => {
                    let property = reader.read_property(child)?;
                    reader.properties.add(property)?;
                }
                "Metadata" => {
                    for element in child.children_named("Property") {
                        let property = reader.read_property(element)?;
                        reader.metadata.update(property);
                    }
                }
                other => trace!("skipping <{other}>"),
            }
        }

        debug!(
            "opened XISF: {} image(s), {} document properties",
            reader.entries.len(),
            reader.properties.len()
        );
        Ok(reader)
    }

    fn read_image(&mut self, element: &Element) -> Result<Entry> {
        let (mut image, property_elements) = Image::from_element(element)?;
        for property_element in property_elements {
            let property = self.read_property(property_element)?;
            image.add_property(property)?;
        }
        let icc = element
            .child("ICCProfile")
            .map(DataBlock::from_element)
            .transpose()?;
        if let Some(block) = icc.as_ref().filter(|b| b.is_resolved()) {
            image.icc_profile = Some(block.data().clone());
        }
        if image.data_block.is_resolved() {
            image.check_size(image.pixels().len())?;
        }
        Ok(Entry { image, icc })
    }

    /// Properties with a `location` have their payload fetched right away.
    fn read_property(&mut self, element: &Element) -> Result<Property> {
        if !element.has_attr("location") {
            return Property::from_element(element, None);
        }
        let mut block = DataBlock::from_element(element)?;
        resolve_block(&mut self.stream, self.stream_len, &mut block)?;
        Property::from_element(element, Some(block.data()))
    }

    pub fn images_count(&self) -> usize {
        self.entries.len()
    }

    /// Image `n` without reading its attachments. The data block still
    /// reports the attachment position and size.
    pub fn image_header(&self, n: usize) -> Result<&Image> {
        self.entries
            .get(n)
            .map(|e| &e.image)
            .ok_or(Error::ImageIndexOutOfRange {
                index: n,
                count: self.entries.len(),
            })
    }

    /// Image `n` with pixel data and ICC profile resolved.
    pub fn image(&mut self, n: usize) -> Result<&Image> {
        let count = self.entries.len();
        let entry = self
            .entries
            .get_mut(n)
            .ok_or(Error::ImageIndexOutOfRange { index: n, count })?;
        resolve_entry(&mut self.stream, self.stream_len, entry)?;
        Ok(&entry.image)
    }

    pub fn thumbnail(&mut self) -> Result<Option<&Image>> {
        match self.thumbnail.as_mut() {
            Some(entry) => {
                resolve_entry(&mut self.stream, self.stream_len, entry)?;
                Ok(Some(&entry.image))
            }
            None => Ok(None),
        }
    }

    /// Document-scope properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Properties from the `<Metadata>` element (creation time, creator...).
    pub fn metadata(&self) -> &Properties {
        &self.metadata
    }

    /// XML header length as stored in the preamble.
    pub fn header_len(&self) -> u32 {
        self.header_len
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

fn resolve_entry<R: Read + Seek>(stream: &mut R, stream_len: u64, entry: &mut Entry) -> Result<()> {
    let image = &mut entry.image;
    if image.data_block.state() == BlockState::Deferred {
        resolve_block(stream, stream_len, &mut image.data_block)?;
        image.check_size(image.pixels().len())?;
    }
    if let Some(icc) = entry.icc.as_mut() {
        if icc.state() == BlockState::Deferred {
            resolve_block(stream, stream_len, icc)?;
        }
        if image.icc_profile.is_none() {
            image.icc_profile = Some(icc.data().clone());
        }
    }
    Ok(())
}

/// Fetch a deferred attachment and decompress it in place.
fn resolve_block<R: Read + Seek>(stream: &mut R, stream_len: u64, block: &mut DataBlock) -> Result<()> {
    if block.state() != BlockState::Deferred {
        return Ok(());
    }
    let (pos, size) = (block.attachment_pos, block.attachment_size);
    if pos.checked_add(size).map_or(true, |end| end > stream_len) {
        return Err(Error::format(format!(
            "attachment {pos}:{size} lies outside the file ({stream_len} bytes)"
        )));
    }

    stream.seek(SeekFrom::Start(pos))?;
    let mut stored = Vec::with_capacity(size as usize);
    let mut remaining = size;
    while remaining > 0 {
        let step = remaining.min(IO_CHUNK as u64) as usize;
        let start = stored.len();
        stored.resize(start + step, 0);
        stream.read_exact(&mut stored[start..])?;
        remaining -= step as u64;
    }
    debug!("read attachment at {pos}, {size} bytes");
    block.decompress(&stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteArray;

    #[test]
    fn rejects_short_and_foreign_files() {
        assert!(matches!(Reader::from_bytes(b"XISF".to_vec()), Err(Error::Format(_))));
        let mut fits = b"SIMPLE  =                    T".to_vec();
        fits.resize(64, b' ');
        assert!(matches!(Reader::from_bytes(fits), Err(Error::InvalidSignature(_))));
    }

    fn document(xml: &str) -> Vec<u8> {
        let mut out = Preamble {
            header_len: xml.len() as u32,
        }
        .to_bytes()
        .to_vec();
        out.extend_from_slice(xml.as_bytes());
        out
    }

    #[test]
    fn rejects_wrong_root() {
        let err = Reader::from_bytes(document(r#"<fits version="1.0"/>"#));
        assert!(matches!(err, Err(Error::Format(_))));
        let err = Reader::from_bytes(document(r#"<xisf version="2.0"/>"#));
        assert!(matches!(err, Err(Error::Format(_))));
    }

    #[test]
    fn header_length_past_eof() {
        let mut bytes = document(r#"<xisf version="1.0"/>"#);
        bytes[8] = 0xFF;
        assert!(matches!(Reader::from_bytes(bytes), Err(Error::Format(_))));
    }

    #[test]
    fn inline_image_and_attached_property() {
        // 2x1 UInt8 image inline; a String property stored as an attachment
        // right after the header.
        let value = "attached text";
        let pos = 512;
        let xml = format!(
            r#"<xisf version="1.0"><Image geometry="2:1:1" sampleFormat="UInt8" location="inline:base16">0a0b</Image><Property id="Note" type="String" location="attachment:{pos}:{}"/></xisf>"#,
            value.len()
        );
        let mut bytes = document(&xml);
        bytes.resize(pos, 0);
        bytes.extend_from_slice(value.as_bytes());

        let mut reader = Reader::from_bytes(bytes).unwrap();
        assert_eq!(reader.properties().get("Note").unwrap().value.as_str(), Some(value));
        assert_eq!(reader.image(0).unwrap().pixels().as_slice(), &[10, 11]);
        assert!(matches!(
            reader.image(1),
            Err(Error::ImageIndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn attachment_outside_file() {
        let xml = r#"<xisf version="1.0"><Image geometry="2:1:1" sampleFormat="UInt8" location="attachment:100000:2"/></xisf>"#;
        let mut reader = Reader::from_bytes(document(xml)).unwrap();
        assert_eq!(reader.image_header(0).unwrap().data_block.attachment_pos, 100000);
        assert!(matches!(reader.image(0), Err(Error::Format(_))));
    }

    #[test]
    fn absurd_uncompressed_size_is_an_error() {
        let xml = r#"<xisf version="1.0"><Image geometry="2:1:1" sampleFormat="UInt8" compression="zlib:18446744073709551615" location="inline:base16">789c0300</Image></xisf>"#;
        assert!(matches!(Reader::from_bytes(document(xml)), Err(Error::Format(_))));

        // Same hint on a property: no geometry to compare with, the codec
        // layer refuses it.
        let xml = r#"<xisf version="1.0"><Property id="Blob" type="UI8Vector" length="2" compression="zlib:18446744073709551615" location="inline:base16">789c0300</Property></xisf>"#;
        assert!(matches!(Reader::from_bytes(document(xml)), Err(Error::Codec(_))));
    }

    #[test]
    fn shuffle_item_larger_than_block() {
        let stored = xisf_codecs::compress(&[10, 11], xisf_codecs::CompressionCodec::Zlib, -1, 0)
            .unwrap()
            .data;
        let xml = format!(
            r#"<xisf version="1.0"><Image geometry="2:1:1" sampleFormat="UInt8" compression="zlib+sh:2:4294967295" location="inline:base16">{}</Image></xisf>"#,
            ByteArray::from(stored).to_hex()
        );
        let mut reader = Reader::from_bytes(document(&xml)).unwrap();
        assert_eq!(reader.image(0).unwrap().pixels().as_slice(), &[10, 11]);
    }

    #[test]
    fn pixel_size_must_match_geometry() {
        let xml = r#"<xisf version="1.0"><Image geometry="2:2:1" sampleFormat="UInt8" location="inline:base16">0a0b</Image></xisf>"#;
        assert!(matches!(Reader::from_bytes(document(xml)), Err(Error::Format(_))));
    }
}
