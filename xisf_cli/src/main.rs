use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use xisf_codecs::{is_codec_available, CompressionCodec};
use xisf_core::{Image, PixelStorage, Reader, SampleFormat, Writer};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xisf",
    about = "Extensible Image Serialization Format: inspect, extract, recompress, and benchmark XISF files",
    version
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print images, data blocks, and properties
    Info {
        /// XISF file to inspect
        file: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the raw pixel bytes of one image
    Extract {
        /// XISF file
        file: PathBuf,
        /// Zero-based image index
        #[arg(short, long, default_value_t = 0)]
        image: usize,
        /// Destination file for the raw samples
        #[arg(short, long)]
        output: PathBuf,
        /// Interleave channels per pixel instead of channel planes
        #[arg(long)]
        normal: bool,
    },
    /// Recompress every image with another codec
    Convert {
        /// Source XISF file
        input: PathBuf,
        /// Destination XISF file
        output: PathBuf,
        /// Codec to use: none | zlib | lz4 | lz4hc | zstd
        #[arg(short, long, default_value = "zstd")]
        codec: String,
        /// Byte-shuffle samples before compressing
        #[arg(long)]
        shuffle: bool,
        /// Codec level (-1 = codec default)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        level: i32,
    },
    /// Write and read a synthetic image with every codec
    Bench {
        #[arg(long, default_value_t = 2048)]
        width: u64,
        #[arg(long, default_value_t = 2048)]
        height: u64,
        /// Fixed noise seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn codec_from_name(name: &str) -> anyhow::Result<CompressionCodec> {
    let codec = match name {
        "none" | "passthrough" => CompressionCodec::None,
        other => CompressionCodec::from_token(other).ok_or_else(|| {
            anyhow::anyhow!("unknown codec '{}'. Valid options: none, zlib, lz4, lz4hc, zstd", other)
        })?,
    };
    if !is_codec_available(codec) {
        anyhow::bail!("codec '{}' is not available in this build", codec);
    }
    Ok(codec)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

// ── info ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FileSummary {
    file: String,
    header_len: u32,
    images: Vec<ImageSummary>,
    properties: Vec<PropertySummary>,
    metadata: Vec<PropertySummary>,
}

#[derive(Serialize)]
struct ImageSummary {
    geometry: [u64; 3],
    sample_format: String,
    color_space: String,
    pixel_storage: String,
    image_type: String,
    bounds: (f64, f64),
    codec: String,
    byte_shuffling: u32,
    attachment_pos: u64,
    attachment_size: u64,
    uncompressed_size: u64,
    checksum: Option<String>,
    color_filter_array: Option<String>,
    properties: Vec<PropertySummary>,
    fits_keywords: Vec<(String, String, String)>,
}

#[derive(Serialize)]
struct PropertySummary {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
}

fn summarize_properties<'a>(
    properties: impl IntoIterator<Item = &'a xisf_core::Property>,
) -> Vec<PropertySummary> {
    properties
        .into_iter()
        .map(|p| PropertySummary {
            id: p.id.clone(),
            kind: p.value.type_name().to_string(),
            value: p.value.to_string(),
            comment: p.comment.clone(),
        })
        .collect()
}

fn summarize_image(image: &Image) -> ImageSummary {
    let block = &image.data_block;
    ImageSummary {
        geometry: [image.width, image.height, image.channel_count],
        sample_format: image.sample_format.to_string(),
        color_space: image.color_space.to_string(),
        pixel_storage: image.pixel_storage.to_string(),
        image_type: image.image_type.to_string(),
        bounds: image.bounds,
        codec: block.codec.to_string(),
        byte_shuffling: block.byte_shuffling,
        attachment_pos: block.attachment_pos,
        attachment_size: block.attachment_size,
        uncompressed_size: block.uncompressed_size,
        checksum: block.checksum.as_ref().map(|c| c.to_attr()),
        color_filter_array: image
            .color_filter_array
            .as_ref()
            .map(|cfa| format!("{} ({}x{})", cfa.pattern, cfa.width, cfa.height)),
        properties: summarize_properties(image.properties()),
        fits_keywords: image
            .fits_keywords()
            .iter()
            .map(|k| (k.name.clone(), k.value.clone(), k.comment.clone()))
            .collect(),
    }
}

fn run_info(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let reader = Reader::open(&file).with_context(|| format!("opening {:?}", file))?;
    let images = (0..reader.images_count())
        .map(|i| reader.image_header(i).map(summarize_image))
        .collect::<Result<Vec<_>, _>>()?;
    let summary = FileSummary {
        file: file.display().to_string(),
        header_len: reader.header_len(),
        images,
        properties: summarize_properties(reader.properties()),
        metadata: summarize_properties(reader.metadata()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let file_size = std::fs::metadata(&file)?.len();
    println!("=== XISF File: {:?} ===", file);
    println!();
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  header         : {}", human_bytes(summary.header_len as u64));
    println!("  images         : {}", summary.images.len());
    for p in &summary.metadata {
        println!("  {:<14} : {}", p.id.trim_start_matches("XISF:"), p.value);
    }

    for (i, image) in summary.images.iter().enumerate() {
        println!();
        println!(
            "  [{}] {}x{}x{} {} {} {} {}",
            i,
            image.geometry[0],
            image.geometry[1],
            image.geometry[2],
            image.sample_format,
            image.color_space,
            image.pixel_storage,
            image.image_type
        );
        let shuffle = if image.byte_shuffling > 1 {
            format!(" +sh({})", image.byte_shuffling)
        } else {
            String::new()
        };
        println!(
            "      data       : {}{} at {} ({} stored, {} raw)",
            image.codec,
            shuffle,
            image.attachment_pos,
            human_bytes(image.attachment_size),
            human_bytes(image.uncompressed_size)
        );
        if let Some(checksum) = &image.checksum {
            println!("      checksum   : {}", checksum);
        }
        if let Some(cfa) = &image.color_filter_array {
            println!("      CFA        : {}", cfa);
        }
        for p in &image.properties {
            println!("      {} ({}) = {}", p.id, p.kind, p.value);
        }
        for (name, value, comment) in &image.fits_keywords {
            println!("      FITS {:<8} = {:<20} / {}", name, value, comment);
        }
    }

    if !summary.properties.is_empty() {
        println!();
        println!("  document properties:");
        for p in &summary.properties {
            println!("      {} ({}) = {}", p.id, p.kind, p.value);
        }
    }
    Ok(())
}

// ── extract ────────────────────────────────────────────────────────────────

fn run_extract(file: PathBuf, index: usize, output: PathBuf, normal: bool) -> anyhow::Result<()> {
    let mut reader = Reader::open(&file).with_context(|| format!("opening {:?}", file))?;

    let t0 = Instant::now();
    let mut image = reader
        .image(index)
        .with_context(|| format!("reading image {}", index))?
        .clone();
    if normal {
        image.convert_pixel_storage_to(PixelStorage::Normal)?;
    }
    let elapsed = t0.elapsed();

    std::fs::write(&output, image.pixels().as_slice())
        .with_context(|| format!("writing {:?}", output))?;

    eprintln!(
        "  image       : {}x{}x{} {}",
        image.width, image.height, image.channel_count, image.sample_format
    );
    eprintln!("  layout      : {}", image.pixel_storage);
    eprintln!("  raw size    : {}", human_bytes(image.pixels().len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    eprintln!("  written to {:?}", output);
    Ok(())
}

// ── convert ────────────────────────────────────────────────────────────────

fn run_convert(
    input: PathBuf,
    output: PathBuf,
    codec_name: &str,
    shuffle: bool,
    level: i32,
) -> anyhow::Result<()> {
    let codec = codec_from_name(codec_name)?;
    let mut reader = Reader::open(&input).with_context(|| format!("opening {:?}", input))?;
    let mut writer = Writer::new();

    let t0 = Instant::now();
    let mut raw_total = 0u64;
    for i in 0..reader.images_count() {
        let mut image = reader.image(i)?.clone();
        image.data_block.codec = codec;
        image.data_block.compress_level = level;
        image.data_block.byte_shuffling = if shuffle {
            image.sample_format.size() as u32
        } else {
            0
        };
        raw_total += image.pixels().len() as u64;
        writer.write_image(&image)?;
        debug!("image {} queued", i);
    }
    if let Some(thumbnail) = reader.thumbnail()? {
        writer.set_thumbnail(thumbnail)?;
    }
    for property in reader.properties() {
        writer.add_property(property.clone())?;
    }
    writer
        .save_to_path(&output)
        .with_context(|| format!("writing {:?}", output))?;
    let elapsed = t0.elapsed();

    let in_size = std::fs::metadata(&input)?.len();
    let out_size = std::fs::metadata(&output)?.len();
    eprintln!(
        "  codec       : {}{}",
        codec,
        if shuffle { " +sh" } else { "" }
    );
    eprintln!("  images      : {}", reader.images_count());
    eprintln!("  raw pixels  : {}", human_bytes(raw_total));
    eprintln!("  input       : {}", human_bytes(in_size));
    eprintln!("  output      : {}", human_bytes(out_size));
    eprintln!("  ratio       : {:.2}x", raw_total as f64 / out_size as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

// ── bench ──────────────────────────────────────────────────────────────────

/// Sky-like 16-bit frame: a gentle gradient plus a few ADU of noise.
fn synthetic_frame(width: u64, height: u64, seed: u64) -> anyhow::Result<Image> {
    let mut image = Image::new(width, height, 1, SampleFormat::UInt16);
    let mut rng = seed;
    let mut pixels = Vec::with_capacity((width * height * 2) as usize);
    for y in 0..height {
        for x in 0..width {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let noise = (rng >> 60) as u16;
            let sample = 1000 + (x / 32) as u16 + (y / 32) as u16 + noise;
            pixels.extend_from_slice(&sample.to_le_bytes());
        }
    }
    image.set_pixels(pixels)?;
    Ok(image)
}

fn run_bench(width: u64, height: u64, seed: u64) -> anyhow::Result<()> {
    let frame = synthetic_frame(width, height, seed)?;
    let raw = frame.pixels().len() as u64;

    println!();
    println!("=== XISF Codec Benchmark ({}x{} UInt16, {}) ===", width, height, human_bytes(raw));
    println!(
        "  {:<10}  {:>12}  {:>8}  {:>14}  {:>14}",
        "codec", "file size", "ratio", "write", "read"
    );
    println!("  {}", "-".repeat(66));

    for codec in CompressionCodec::ALL {
        if !is_codec_available(codec) {
            println!("  {:<10}  (not available in this build)", codec.name());
            continue;
        }
        for shuffle in [false, true] {
            if shuffle && codec == CompressionCodec::None {
                continue;
            }
            let mut image = frame.clone();
            image.data_block.codec = codec;
            image.data_block.byte_shuffling = if shuffle { 2 } else { 0 };

            let t_write = Instant::now();
            let mut writer = Writer::new();
            writer.write_image(&image)?;
            let bytes = writer.save_to_vec()?;
            let write_elapsed = t_write.elapsed();

            let t_read = Instant::now();
            let size = bytes.len() as u64;
            let mut reader = Reader::from_bytes(bytes)?;
            let back = reader.image(0)?;
            if back.pixels() != frame.pixels() {
                anyhow::bail!("{} round trip changed the pixels", codec);
            }
            let read_elapsed = t_read.elapsed();

            let label = format!("{}{}", codec.name(), if shuffle { "+sh" } else { "" });
            println!(
                "  {:<10}  {:>12}  {:>7.2}x  {:>12}/s  {:>12}/s",
                label,
                human_bytes(size),
                raw as f64 / size as f64,
                human_bytes((raw as f64 / write_elapsed.as_secs_f64()) as u64),
                human_bytes((raw as f64 / read_elapsed.as_secs_f64()) as u64)
            );
        }
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Info { file, json } => run_info(file, json),
        Commands::Extract {
            file,
            image,
            output,
            normal,
        } => run_extract(file, image, output, normal),
        Commands::Convert {
            input,
            output,
            codec,
            shuffle,
            level,
        } => run_convert(input, output, &codec, shuffle, level),
        Commands::Bench {
            width,
            height,
            seed,
        } => run_bench(width, height, seed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_names() {
        assert_eq!(codec_from_name("none").unwrap(), CompressionCodec::None);
        assert_eq!(codec_from_name("lz4hc").unwrap(), CompressionCodec::Lz4Hc);
        assert!(codec_from_name("gzip").is_err());
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn synthetic_frame_matches_geometry() {
        let frame = synthetic_frame(16, 8, 1).unwrap();
        assert_eq!(frame.pixels().len(), 16 * 8 * 2);
    }
}
