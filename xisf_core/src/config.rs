//! Process-wide compression override from `XISF_COMPRESSION`
//!
//! Grammar: `codec[+sh][:level]`, e.g. `zstd+sh:9`, `lz4hc`, `none`.
//! Read once, on first use; an unparsable value is ignored with a warning.

use once_cell::sync::Lazy;
use tracing::{debug, warn};
use xisf_codecs::CompressionCodec;

pub const COMPRESSION_ENV: &str = "XISF_COMPRESSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOverride {
    pub codec: CompressionCodec,
    /// Shuffle with the image's sample size as item size.
    pub shuffle: bool,
    pub level: i32,
}

impl CompressionOverride {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (head, level) = match text.split_once(':') {
            Some((head, level)) => (head, level.trim().parse().ok()?),
            None => (text, -1),
        };
        let (token, shuffle) = match head.strip_suffix("+sh") {
            Some(token) => (token, true),
            None => (head, false),
        };
        let codec = match token {
            "none" => CompressionCodec::None,
            other => CompressionCodec::from_token(other)?,
        };
        Some(Self {
            codec,
            shuffle,
            level,
        })
    }
}

static OVERRIDE: Lazy<Option<CompressionOverride>> = Lazy::new(|| {
    let text = std::env::var(COMPRESSION_ENV).ok()?;
    match CompressionOverride::parse(&text) {
        Some(parsed) => {
            debug!("{COMPRESSION_ENV}={text} overrides image compression");
            Some(parsed)
        }
        None => {
            warn!("ignoring invalid {COMPRESSION_ENV}={text:?}");
            None
        }
    }
});

/// The override in effect for this process, if any.
pub fn compression_override() -> Option<CompressionOverride> {
    *OVERRIDE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_override_grammar() {
        assert_eq!(
            CompressionOverride::parse("zstd+sh:9"),
            Some(CompressionOverride {
                codec: CompressionCodec::Zstd,
                shuffle: true,
                level: 9
            })
        );
        assert_eq!(
            CompressionOverride::parse("lz4hc"),
            Some(CompressionOverride {
                codec: CompressionCodec::Lz4Hc,
                shuffle: false,
                level: -1
            })
        );
        assert_eq!(
            CompressionOverride::parse("none").map(|o| o.codec),
            Some(CompressionCodec::None)
        );
        assert_eq!(CompressionOverride::parse("gzip"), None);
        assert_eq!(CompressionOverride::parse("zlib:fast"), None);
    }
}
