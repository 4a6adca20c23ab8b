use std::fmt;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use xisf_codecs::{CompressionCodec, SubBlock};

use crate::error::{Error, Result};

/// First eight bytes of every XISF 1.0 file.
pub const SIGNATURE: &[u8; 8] = b"XISF0100";

/// Fixed size of the file preamble in bytes.
///   signature[8] + header_len:u32 + reserved[4]
///   = 8 + 4 + 4 = 16
pub const PREAMBLE_SIZE: usize = 16;

/// Root element tag and version accepted by the reader.
pub const ROOT_ELEMENT: &str = "xisf";
pub const XISF_VERSION: &str = "1.0";

pub const XISF_NAMESPACE: &str = "http://www.pixinsight.com/xisf";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const SCHEMA_LOCATION: &str =
    "http://www.pixinsight.com/xisf http://pixinsight.com/xisf/xisf-1.0.xsd";

/// Ceiling for a single read or write call on the underlying stream.
pub const IO_CHUNK: usize = 1 << 30;

// ── Preamble ───────────────────────────────────────────────────────────────

/// Decoded 16-byte preamble in front of the XML header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    /// Byte length of the XML header that follows.
    pub header_len: u32,
}

impl Preamble {
    /// Serialize to exactly `PREAMBLE_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let mut buf = [0u8; PREAMBLE_SIZE];
        buf[..8].copy_from_slice(SIGNATURE);
        buf[8..12].copy_from_slice(&self.header_len.to_le_bytes());
        // reserved[4] stays zero
        buf
    }

    /// Deserialize from `PREAMBLE_SIZE` bytes, checking the signature.
    pub fn from_bytes(buf: &[u8; PREAMBLE_SIZE]) -> Result<Self> {
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&buf[..8]);
        if &signature != SIGNATURE {
            return Err(Error::InvalidSignature(signature));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[8..12]);
        Ok(Self {
            header_len: u32::from_le_bytes(len),
        })
    }
}

// ── compression="codec[+sh]:size[:item]" ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSpec {
    pub codec: CompressionCodec,
    pub uncompressed_size: u64,
    /// 0 when byte shuffling is off.
    pub shuffle_item: u32,
}

impl CompressionSpec {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |why: &str| Error::format(format!("compression {text:?}: {why}"));
        let mut fields = text.split(':');
        let head = fields.next().unwrap_or_default();
        let (token, shuffled) = match head.strip_suffix("+sh") {
            Some(token) => (token, true),
            None => (head, false),
        };
        let codec = CompressionCodec::from_token(token).ok_or_else(|| invalid("unknown codec"))?;
        let uncompressed_size = fields
            .next()
            .ok_or_else(|| invalid("missing uncompressed size"))?
            .parse()
            .map_err(|_| invalid("bad uncompressed size"))?;
        let shuffle_item = match (shuffled, fields.next()) {
            (true, Some(item)) => item.parse().map_err(|_| invalid("bad shuffle item size"))?,
            (true, None) => return Err(invalid("missing shuffle item size")),
            (false, Some(_)) => return Err(invalid("item size without +sh")),
            (false, None) => 0,
        };
        if fields.next().is_some() {
            return Err(invalid("too many fields"));
        }
        Ok(Self {
            codec,
            uncompressed_size,
            shuffle_item,
        })
    }

    /// `None` for an uncompressed block, which carries no attribute.
    pub fn to_attr(&self) -> Option<String> {
        let token = self.codec.token()?;
        Some(if self.shuffle_item > 1 {
            format!("{token}+sh:{}:{}", self.uncompressed_size, self.shuffle_item)
        } else {
            format!("{token}:{}", self.uncompressed_size)
        })
    }
}

// ── subblocks="c,d:c,d" ────────────────────────────────────────────────────

pub fn parse_subblocks(text: &str) -> Result<Vec<SubBlock>> {
    let invalid = || Error::format(format!("invalid subblocks {text:?}"));
    text.split(':')
        .map(|pair| {
            let (c, d) = pair.split_once(',').ok_or_else(invalid)?;
            Ok(SubBlock {
                compressed_size: c.trim().parse().map_err(|_| invalid())?,
                uncompressed_size: d.trim().parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

pub fn format_subblocks(table: &[SubBlock]) -> String {
    table
        .iter()
        .map(|b| format!("{},{}", b.compressed_size, b.uncompressed_size))
        .collect::<Vec<_>>()
        .join(":")
}

// ── location="embedded | inline:enc | attachment:pos:size" ─────────────────

/// Text encoding of an inline or embedded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Base64,
    Base16,
}

impl Encoding {
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "base64" => Ok(Encoding::Base64),
            "base16" | "hex" => Ok(Encoding::Base16),
            _ => Err(Error::format(format!("unknown data encoding {text:?}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Base16 => "base16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Payload lives in a `<Data>` child element.
    Embedded,
    /// Payload is the element's own text.
    Inline(Encoding),
    Attachment { pos: u64, size: u64 },
}

impl Location {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::format(format!("invalid location {text:?}"));
        let mut fields = text.split(':');
        let location = match fields.next() {
            Some("embedded") => Location::Embedded,
            Some("inline") => Location::Inline(Encoding::parse(fields.next().ok_or_else(invalid)?)?),
            Some("attachment") => {
                let pos = fields.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
                let size = fields.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
                Location::Attachment { pos, size }
            }
            _ => return Err(invalid()),
        };
        if fields.next().is_some() {
            return Err(invalid());
        }
        Ok(location)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Embedded => f.write_str("embedded"),
            Location::Inline(enc) => write!(f, "inline:{}", enc.as_str()),
            Location::Attachment { pos, size } => write!(f, "attachment:{pos}:{size}"),
        }
    }
}

// ── checksum="alg:hex" ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "sha1" | "sha-1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(Error::format(format!("unsupported checksum algorithm {text:?}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex.
    pub digest: String,
}

impl Checksum {
    pub fn parse(text: &str) -> Result<Self> {
        let (alg, digest) = text
            .split_once(':')
            .ok_or_else(|| Error::format(format!("invalid checksum {text:?}")))?;
        Ok(Self {
            algorithm: ChecksumAlgorithm::parse(alg)?,
            digest: digest.trim().to_ascii_lowercase(),
        })
    }

    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(data),
        }
    }

    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = self.algorithm.digest(data);
        if actual != self.digest {
            return Err(Error::ChecksumMismatch {
                algorithm: self.algorithm.as_str(),
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_attr(&self) -> String {
        format!("{}:{}", self.algorithm.as_str(), self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_roundtrip() {
        let p = Preamble { header_len: 4321 };
        let bytes = p.to_bytes();
        assert_eq!(&bytes[..8], b"XISF0100");
        assert_eq!(&bytes[12..], &[0, 0, 0, 0]);
        assert_eq!(Preamble::from_bytes(&bytes).unwrap(), p);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = Preamble { header_len: 1 }.to_bytes();
        bytes[4] = b'9';
        assert!(matches!(
            Preamble::from_bytes(&bytes),
            Err(Error::InvalidSignature(s)) if &s == b"XISF9100"
        ));
    }

    #[test]
    fn test_compression_attr() {
        let spec = CompressionSpec::parse("zlib+sh:1000:2").unwrap();
        assert_eq!(spec.codec, CompressionCodec::Zlib);
        assert_eq!(spec.uncompressed_size, 1000);
        assert_eq!(spec.shuffle_item, 2);
        assert_eq!(spec.to_attr().as_deref(), Some("zlib+sh:1000:2"));

        let spec = CompressionSpec::parse("lz4hc:77").unwrap();
        assert_eq!(spec.codec, CompressionCodec::Lz4Hc);
        assert_eq!(spec.shuffle_item, 0);
        assert_eq!(spec.to_attr().as_deref(), Some("lz4hc:77"));

        for bad in ["zip:10", "zlib", "zlib+sh:10", "zlib:abc", "lz4:10:2", "zstd+sh:1:2:3"] {
            assert!(CompressionSpec::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_subblocks_attr() {
        let table = parse_subblocks("10,20:5,7").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[1].compressed_size, 5);
        assert_eq!(table[1].uncompressed_size, 7);
        assert_eq!(format_subblocks(&table), "10,20:5,7");
        assert!(parse_subblocks("10:5,7").is_err());
        assert!(parse_subblocks("").is_err());
    }

    #[test]
    fn test_location_attr() {
        assert_eq!(Location::parse("embedded").unwrap(), Location::Embedded);
        assert_eq!(
            Location::parse("inline:base16").unwrap(),
            Location::Inline(Encoding::Base16)
        );
        let loc = Location::parse("attachment:4096:70").unwrap();
        assert_eq!(loc, Location::Attachment { pos: 4096, size: 70 });
        assert_eq!(loc.to_string(), "attachment:4096:70");
        for bad in ["", "inline", "inline:rot13", "attachment:1", "attachment:x:1", "url:x"] {
            assert!(Location::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_checksum() {
        let c = Checksum::compute(ChecksumAlgorithm::Sha1, b"abc");
        assert_eq!(c.digest, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(c.to_attr(), "sha1:a9993e364706816aba3e25717850c26c9cd0d89d");

        let parsed = Checksum::parse("SHA-1:A9993E364706816ABA3E25717850C26C9CD0D89D");
        assert!(parsed.is_err());
        let parsed = Checksum::parse("sha-1:A9993E364706816ABA3E25717850C26C9CD0D89D").unwrap();
        assert!(parsed.verify(b"abc").is_ok());
        assert!(matches!(
            parsed.verify(b"abd"),
            Err(Error::ChecksumMismatch { algorithm: "sha1", .. })
        ));
        assert!(Checksum::parse("md5:00").is_err());
    }
}
