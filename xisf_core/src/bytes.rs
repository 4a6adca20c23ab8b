//! Shared, copy-on-write byte buffer

use std::fmt;
use std::ops::{Deref, Index, IndexMut};
use std::sync::Arc;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::{Error, Result};

/// Accepts padded and unpadded input; XISF writers differ on this.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Byte buffer with value semantics.
///
/// Clones share storage until one of them is mutated; the mutator then gets
/// its own copy, so independent handles never observe each other's writes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteArray {
    data: Arc<Vec<u8>>,
}

impl ByteArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::from(vec![0u8; len])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view; detaches from any other handle first.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    pub fn resize(&mut self, len: usize) {
        Arc::make_mut(&mut self.data).resize(len, 0);
    }

    pub fn push(&mut self, byte: u8) {
        Arc::make_mut(&mut self.data).push(byte);
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        Arc::make_mut(&mut self.data).extend_from_slice(bytes);
    }

    /// Take the bytes out, copying only if storage is still shared.
    pub fn into_vec(self) -> Vec<u8> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }

    /// True when both handles point at the same storage.
    pub fn shares_storage(&self, other: &ByteArray) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.as_slice())
    }

    /// Decode base64 text. ASCII whitespace (line breaks in XML text) is skipped.
    pub fn from_base64(text: &[u8]) -> Result<Self> {
        let compact = strip_whitespace(text);
        BASE64
            .decode(compact)
            .map(Self::from)
            .map_err(|e| Error::format(format!("invalid base64 data: {e}")))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }

    /// Decode base16 text, either case. ASCII whitespace is skipped.
    pub fn from_hex(text: &[u8]) -> Result<Self> {
        let compact = strip_whitespace(text);
        hex::decode(compact)
            .map(Self::from)
            .map_err(|e| Error::format(format!("invalid base16 data: {e}")))
    }
}

fn strip_whitespace(text: &[u8]) -> Vec<u8> {
    text.iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect()
}

impl Deref for ByteArray {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Index<usize> for ByteArray {
    type Output = u8;

    fn index(&self, i: usize) -> &u8 {
        &self.data[i]
    }
}

impl IndexMut<usize> for ByteArray {
    fn index_mut(&mut self, i: usize) -> &mut u8 {
        &mut Arc::make_mut(&mut self.data)[i]
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

impl From<&[u8]> for ByteArray {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = &self.data[..self.data.len().min(16)];
        write!(f, "ByteArray({} bytes: {}", self.data.len(), hex::encode(preview))?;
        if self.data.len() > preview.len() {
            f.write_str("…")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_until_written() {
        let a = ByteArray::from(vec![1, 2, 3]);
        let mut b = a.clone();
        assert!(a.shares_storage(&b));

        b[0] = 9;
        assert!(!a.shares_storage(&b));
        assert_eq!(a.as_slice(), &[1, 2, 3]);
        assert_eq!(b.as_slice(), &[9, 2, 3]);
    }

    #[test]
    fn resize_and_append_detach() {
        let a = ByteArray::zeroed(4);
        let mut b = a.clone();
        b.resize(6);
        b.push(7);
        b.extend_from_slice(&[8, 9]);
        assert_eq!(a.len(), 4);
        assert_eq!(b.as_slice(), &[0, 0, 0, 0, 0, 0, 7, 8, 9]);
    }

    #[test]
    fn into_vec_of_shared_copies() {
        let a = ByteArray::from(vec![5u8; 10]);
        let b = a.clone();
        let v = b.into_vec();
        assert_eq!(v, vec![5u8; 10]);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn base64_round_trip_and_whitespace() {
        let a = ByteArray::from(b"Hello XISF!".to_vec());
        let text = a.to_base64();
        assert_eq!(text, "SGVsbG8gWElTRiE=");
        assert_eq!(ByteArray::from_base64(text.as_bytes()).unwrap(), a);
        assert_eq!(ByteArray::from_base64(b"SGVs\nbG8gWElT\n RiE").unwrap(), a);
    }

    #[test]
    fn hex_round_trip() {
        let a = ByteArray::from(vec![0x00, 0xAB, 0xff, 0x10]);
        assert_eq!(a.to_hex(), "00abff10");
        assert_eq!(ByteArray::from_hex(b"00ABFF10").unwrap(), a);
        assert!(ByteArray::from_hex(b"abc").is_err());
    }

    #[test]
    fn invalid_base64_is_an_error() {
        assert!(matches!(ByteArray::from_base64(b"@@@@"), Err(Error::Format(_))));
    }
}
