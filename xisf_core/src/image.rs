//! Image entity and its enumerated attributes

use std::fmt;

use tracing::warn;

use crate::bytes::ByteArray;
use crate::datablock::DataBlock;
use crate::error::{Error, Result};
use crate::fits::keyword_to_property;
use crate::format::CompressionSpec;
use crate::property::{FitsKeyword, Properties, Property};
use crate::xml::Element;

/// Declare a string-mapped enum with a fallback for unrecognized text.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, default = $default:ident, [$($variant:ident),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }

            /// Unrecognized text maps to the default rather than failing.
            pub fn from_attr(text: &str) -> Self {
                match text {
                    $(stringify!($variant) => $name::$variant,)+
                    _ => $name::$default,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Frame role, from the `imageType` attribute.
    ImageType,
    default = Light,
    [
        Bias,
        Dark,
        Flat,
        Light,
        MasterBias,
        MasterDark,
        MasterFlat,
        DefectMap,
        RejectionMapHigh,
        RejectionMapLow,
        BinaryRejectionMapHigh,
        BinaryRejectionMapLow,
        SlopeMap,
        WeightMap,
    ]
);

string_enum!(
    /// Planar is channel-major; Normal interleaves channels per pixel.
    PixelStorage,
    default = Planar,
    [Planar, Normal]
);

string_enum!(
    SampleFormat,
    default = UInt16,
    [UInt8, UInt16, UInt32, UInt64, Float32, Float64, Complex32, Complex64]
);

string_enum!(ColorSpace, default = Gray, [Gray, RGB, CIELab]);

impl SampleFormat {
    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            SampleFormat::UInt8 => 1,
            SampleFormat::UInt16 => 2,
            SampleFormat::UInt32 | SampleFormat::Float32 => 4,
            SampleFormat::UInt64 | SampleFormat::Float64 | SampleFormat::Complex32 => 8,
            SampleFormat::Complex64 => 16,
        }
    }

    pub fn is_float(self) -> bool {
        !matches!(
            self,
            SampleFormat::UInt8 | SampleFormat::UInt16 | SampleFormat::UInt32 | SampleFormat::UInt64
        )
    }
}

/// Bayer or other mosaic description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColorFilterArray {
    /// One letter per cell, row-major, e.g. `"RGGB"`.
    pub pattern: String,
    pub width: u32,
    pub height: u32,
}

impl ColorFilterArray {
    pub fn new(pattern: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            pattern: pattern.into(),
            width,
            height,
        }
    }

    pub(crate) fn from_element(element: &Element) -> Result<Self> {
        let dim = |name: &str| -> Result<u32> {
            let text = element.required_attr(name)?;
            text.trim()
                .parse()
                .map_err(|_| Error::format(format!("invalid ColorFilterArray {name} {text:?}")))
        };
        Ok(Self {
            pattern: element.required_attr("pattern")?.to_string(),
            width: dim("width")?,
            height: dim("height")?,
        })
    }

    pub(crate) fn to_element(&self) -> Element {
        Element::new("ColorFilterArray")
            .with_attr("pattern", self.pattern.as_str())
            .with_attr("width", self.width.to_string())
            .with_attr("height", self.height.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u64,
    pub height: u64,
    pub channel_count: u64,
    pub sample_format: SampleFormat,
    pub color_space: ColorSpace,
    pub pixel_storage: PixelStorage,
    pub image_type: ImageType,
    /// Representable sample range, `[0, 1]` unless stated.
    pub bounds: (f64, f64),
    pub data_block: DataBlock,
    pub icc_profile: Option<ByteArray>,
    pub color_filter_array: Option<ColorFilterArray>,
    properties: Properties,
    fits_keywords: Vec<FitsKeyword>,
}

impl Default for Image {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            channel_count: 0,
            sample_format: SampleFormat::default(),
            color_space: ColorSpace::default(),
            pixel_storage: PixelStorage::default(),
            image_type: ImageType::default(),
            bounds: (0.0, 1.0),
            data_block: DataBlock::default(),
            icc_profile: None,
            color_filter_array: None,
            properties: Properties::new(),
            fits_keywords: Vec::new(),
        }
    }
}

impl Image {
    /// Zero-filled image of the given geometry, stored uncompressed.
    pub fn new(width: u64, height: u64, channel_count: u64, sample_format: SampleFormat) -> Self {
        let mut image = Self {
            width,
            height,
            channel_count,
            sample_format,
            color_space: if channel_count >= 3 {
                ColorSpace::RGB
            } else {
                ColorSpace::Gray
            },
            ..Self::default()
        };
        let len = image.expected_data_size().unwrap_or(0);
        image.data_block = DataBlock::new(vec![0u8; len]);
        image
    }

    /// `width * height * channels * sample size`, `None` on overflow.
    pub fn expected_data_size(&self) -> Option<usize> {
        let samples = self
            .width
            .checked_mul(self.height)?
            .checked_mul(self.channel_count)?;
        usize::try_from(samples).ok()?.checked_mul(self.sample_format.size())
    }

    /// Resolved pixel bytes.
    pub fn pixels(&self) -> &ByteArray {
        self.data_block.data()
    }

    pub fn pixels_mut(&mut self) -> &mut ByteArray {
        self.data_block.data_mut()
    }

    pub fn set_pixels(&mut self, data: impl Into<ByteArray>) -> Result<()> {
        let data = data.into();
        self.check_size(data.len())?;
        self.data_block.set_data(data);
        Ok(())
    }

    pub(crate) fn check_size(&self, len: usize) -> Result<()> {
        match self.expected_data_size() {
            Some(expected) if expected == len => Ok(()),
            expected => Err(Error::format(format!(
                "{}x{}x{} {} image needs {} bytes of pixel data, got {len}",
                self.width,
                self.height,
                self.channel_count,
                self.sample_format,
                expected.map_or_else(|| "too many".to_string(), |e| e.to_string())
            ))),
        }
    }

    /// Reorder resolved pixel data between Planar and Normal layouts.
    pub fn convert_pixel_storage_to(&mut self, storage: PixelStorage) -> Result<()> {
        if self.pixel_storage == storage {
            return Ok(());
        }
        if !self.data_block.is_resolved() {
            return Err(Error::format("pixel data must be resolved before conversion"));
        }
        self.check_size(self.pixels().len())?;

        let sample = self.sample_format.size();
        let channels = self.channel_count as usize;
        let plane = (self.width * self.height) as usize;
        let input = self.pixels().as_slice();
        let mut output = vec![0u8; input.len()];
        for pixel in 0..plane {
            for channel in 0..channels {
                let planar = (channel * plane + pixel) * sample;
                let normal = (pixel * channels + channel) * sample;
                let (from, to) = match storage {
                    PixelStorage::Normal => (planar, normal),
                    PixelStorage::Planar => (normal, planar),
                };
                output[to..to + sample].copy_from_slice(&input[from..from + sample]);
            }
        }
        self.data_block.set_data(output);
        self.pixel_storage = storage;
        Ok(())
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Strict insert; an existing id is [`Error::DuplicateProperty`].
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

    pub fn fits_keywords(&self) -> &[FitsKeyword] {
        &self.fits_keywords
    }

    pub fn add_fits_keyword(&mut self, keyword: FitsKeyword) {
        self.fits_keywords.push(keyword);
    }

    /// Upsert the XISF property a legacy FITS keyword maps to. Returns
    /// whether `name` is in the mapping table.
    pub fn add_fits_keyword_as_property(&mut self, name: &str, value: &str) -> Result<bool> {
        match keyword_to_property(name, value)? {
            Some(property) => {
                self.update_property(property);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read geometry, enums, bounds, and nested entities. The data block
    /// is parsed but attachments stay deferred; properties are returned
    /// with their elements so the reader can resolve out-of-line values.
    pub(crate) fn from_element(element: &Element) -> Result<(Self, Vec<&Element>)> {
        let geometry = element.required_attr("geometry")?;
        let dims: Vec<&str> = geometry.split(':').collect();
        if dims.len() != 3 {
            return Err(Error::format(format!(
                "geometry {geometry:?}: only 2-D images (width:height:channels) are supported"
            )));
        }
        let mut parsed = [0u64; 3];
        for (slot, text) in parsed.iter_mut().zip(&dims) {
            *slot = text
                .trim()
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| Error::format(format!("invalid geometry {geometry:?}")))?;
        }

        let mut image = Image {
            width: parsed[0],
            height: parsed[1],
            channel_count: parsed[2],
            image_type: ImageType::from_attr(element.attr("imageType").unwrap_or_default()),
            pixel_storage: PixelStorage::from_attr(element.attr("pixelStorage").unwrap_or_default()),
            sample_format: SampleFormat::from_attr(element.attr("sampleFormat").unwrap_or_default()),
            color_space: ColorSpace::from_attr(element.attr("colorSpace").unwrap_or_default()),
            ..Image::default()
        };
        for (attr, label) in [
            ("imageType", image.image_type.as_str()),
            ("pixelStorage", image.pixel_storage.as_str()),
            ("sampleFormat", image.sample_format.as_str()),
            ("colorSpace", image.color_space.as_str()),
        ] {
            if let Some(text) = element.attr(attr) {
                if text != label {
                    warn!("unrecognized {attr} {text:?}, using {label}");
                }
            }
        }

        if let Some(bounds) = element.attr("bounds") {
            image.bounds = parse_bounds(bounds)?;
        }

        image.check_declared_size(element)?;
        image.data_block = DataBlock::from_element(element)?;

        let mut property_elements = Vec::new();
        for child in &element.children {
            match child.name.as_str() {
                "Property" => property_elements.push(child),
                "FITSKeyword" => image.fits_keywords.push(FitsKeyword::from_element(child)?),
                "ColorFilterArray" => {
                    image.color_filter_array = Some(ColorFilterArray::from_element(child)?)
                }
                _ => {}
            }
        }
        Ok((image, property_elements))
    }

    /// A compressed pixel block must declare exactly the size the geometry
    /// calls for. Checked before the payload is decoded or fetched.
    fn check_declared_size(&self, element: &Element) -> Result<()> {
        let declared = [Some(element), element.child("Data")]
            .into_iter()
            .flatten()
            .filter_map(|e| e.attr("compression"));
        for text in declared {
            let spec = CompressionSpec::parse(text)?;
            let len = usize::try_from(spec.uncompressed_size).map_err(|_| {
                Error::format(format!("uncompressed size {} is too large", spec.uncompressed_size))
            })?;
            self.check_size(len)?;
        }
        Ok(())
    }

    /// Serialize everything except resolved property payloads, which are
    /// always inline.
    pub(crate) fn to_element(&self) -> Result<Element> {
        let mut element = Element::new("Image")
            .with_attr(
                "geometry",
                format!("{}:{}:{}", self.width, self.height, self.channel_count),
            )
            .with_attr("sampleFormat", self.sample_format.as_str());
        if self.sample_format.is_float() || self.bounds != (0.0, 1.0) {
            element.set_attr("bounds", format!("{}:{}", self.bounds.0, self.bounds.1));
        }
        element.set_attr("colorSpace", self.color_space.as_str());
        element.set_attr("imageType", self.image_type.as_str());
        element.set_attr("pixelStorage", self.pixel_storage.as_str());
        self.data_block.write_to(&mut element)?;

        for property in &self.properties {
            element.push_child(property.to_element());
        }
        for keyword in &self.fits_keywords {
            element.push_child(keyword.to_element());
        }
        if let Some(cfa) = &self.color_filter_array {
            element.push_child(cfa.to_element());
        }
        if let Some(icc) = &self.icc_profile {
            let mut block = DataBlock::new(icc.clone());
            block.compress()?;
            let mut profile = Element::new("ICCProfile");
            block.write_to(&mut profile)?;
            element.push_child(profile);
        }
        Ok(element)
    }
}

fn parse_bounds(text: &str) -> Result<(f64, f64)> {
    let invalid = || Error::format(format!("invalid bounds {text:?}"));
    let (lo, hi) = text.split_once(':').ok_or_else(invalid)?;
    Ok((
        lo.trim().parse().map_err(|_| invalid())?,
        hi.trim().parse().map_err(|_| invalid())?,
    ))
}
