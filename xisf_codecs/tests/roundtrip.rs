/// Integration test: every available codec, with and without the shuffle
/// filter, decompresses its own output back to the original bytes, including
/// payloads split across several sub-blocks.
use proptest::prelude::*;

use xisf_codecs::{
    compress, compress_with_limit, decompress, is_codec_available, CompressionCodec,
};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// 16-bit samples of a smooth gradient with a little noise: what a sky
/// background looks like to the compressor.
fn gradient_u16(pixels: usize) -> Vec<u8> {
    let noise = pseudo_random_bytes(pixels, 7);
    (0..pixels)
        .flat_map(|i| (1000u16 + (i / 64) as u16 + (noise[i] % 4) as u16).to_le_bytes())
        .collect()
}

fn available_codecs() -> Vec<CompressionCodec> {
    CompressionCodec::ALL
        .into_iter()
        .filter(|c| is_codec_available(*c))
        .collect()
}

#[test]
fn test_every_codec_round_trips() {
    let data = gradient_u16(64 * 1024);
    for codec in available_codecs() {
        for shuffle in [0u32, 2] {
            let c = compress(&data, codec, -1, shuffle).unwrap();
            let back = decompress(&c.data, codec, shuffle, c.uncompressed_size, &c.subblocks)
                .unwrap_or_else(|e| panic!("{codec} shuffle={shuffle}: {e}"));
            assert_eq!(back, data, "{codec} shuffle={shuffle}");
        }
    }
}

#[test]
fn test_shuffle_helps_sample_data() {
    let data = gradient_u16(128 * 1024);
    let plain = compress(&data, CompressionCodec::Zlib, -1, 0).unwrap();
    let shuffled = compress(&data, CompressionCodec::Zlib, -1, 2).unwrap();
    eprintln!(
        "zlib: {} bytes plain, {} bytes shuffled",
        plain.data.len(),
        shuffled.data.len()
    );
    assert!(shuffled.data.len() < plain.data.len());
}

#[test]
fn test_multi_chunk_for_every_codec() {
    let data = pseudo_random_bytes(10_000, 0xDEAD_BEEF);
    for codec in available_codecs() {
        if codec == CompressionCodec::None {
            continue;
        }
        let c = compress_with_limit(&data, codec, -1, 4, 1500).unwrap();
        assert_eq!(c.subblocks.len(), 7, "{codec}");
        let back = decompress(&c.data, codec, 4, c.uncompressed_size, &c.subblocks).unwrap();
        assert_eq!(back, data, "{codec}");
    }
}

#[test]
fn test_truncated_payload_fails() {
    let data = gradient_u16(4096);
    let c = compress(&data, CompressionCodec::Lz4, -1, 2).unwrap();
    let truncated = &c.data[..c.data.len() / 2];
    assert!(decompress(truncated, CompressionCodec::Lz4, 2, c.uncompressed_size, &[]).is_err());
}

#[cfg(not(feature = "zstd"))]
#[test]
fn test_zstd_reports_unavailable() {
    assert!(!is_codec_available(CompressionCodec::Zstd));
    assert!(matches!(
        compress(b"abc", CompressionCodec::Zstd, -1, 0),
        Err(xisf_codecs::CodecError::Unavailable("zstd"))
    ));
}

fn codec_strategy() -> impl Strategy<Value = CompressionCodec> {
    prop::sample::select(available_codecs())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn chunked_round_trip(
        data in prop::collection::vec(any::<u8>(), 0..6000),
        codec in codec_strategy(),
        shuffle in prop_oneof![Just(0u32), 1u32..9],
        chunk in 64usize..4096,
    ) {
        let c = compress_with_limit(&data, codec, -1, shuffle, chunk).unwrap();
        let total: u64 = c.subblocks.iter().map(|b| b.uncompressed_size).sum();
        if codec != CompressionCodec::None {
            prop_assert_eq!(total, data.len() as u64);
        }
        let back = decompress(&c.data, codec, shuffle, c.uncompressed_size, &c.subblocks).unwrap();
        prop_assert_eq!(back, data);
    }
}
