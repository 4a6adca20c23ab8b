//! Legacy FITS keywords with a well-known XISF property equivalent

use tracing::debug;

use crate::error::{Error, Result};
use crate::property::Property;
use crate::variant::{parse_time, Variant, VariantType};

/// One row of the legacy keyword table.
#[derive(Debug, Clone, Copy)]
pub struct FitsMapping {
    pub keyword: &'static str,
    pub property_id: &'static str,
    pub value_type: VariantType,
    /// Multiplier applied to numeric values on import.
    pub scale: f64,
}

const fn map(
    keyword: &'static str,
    property_id: &'static str,
    value_type: VariantType,
) -> FitsMapping {
    FitsMapping {
        keyword,
        property_id,
        value_type,
        scale: 1.0,
    }
}

const MM_TO_M: f64 = 0.001;

pub const FITS_MAPPINGS: [FitsMapping; 26] = [
    map("OBSERVER", "Observer:Name", VariantType::String),
    map("OBJECT", "Observation:Object:Name", VariantType::String),
    map("RA", "Observation:Object:RA", VariantType::Float64),
    map("DEC", "Observation:Object:Dec", VariantType::Float64),
    map("DATE-OBS", "Observation:Time:Start", VariantType::TimePoint),
    map("DATE-END", "Observation:Time:End", VariantType::TimePoint),
    map("SITELAT", "Observation:Location:Latitude", VariantType::Float64),
    map("SITELONG", "Observation:Location:Longitude", VariantType::Float64),
    map("SITEELEV", "Observation:Location:Elevation", VariantType::Float64),
    map("EQUINOX", "Observation:Equinox", VariantType::Float64),
    map("TELESCOP", "Instrument:Telescope:Name", VariantType::String),
    FitsMapping {
        keyword: "APTDIA",
        property_id: "Instrument:Telescope:Aperture",
        value_type: VariantType::Float32,
        scale: MM_TO_M,
    },
    FitsMapping {
        keyword: "FOCALLEN",
        property_id: "Instrument:Telescope:FocalLength",
        value_type: VariantType::Float32,
        scale: MM_TO_M,
    },
    map("INSTRUME", "Instrument:Camera:Name", VariantType::String),
    map("EXPTIME", "Instrument:ExposureTime", VariantType::Float32),
    map("EXPOSURE", "Instrument:ExposureTime", VariantType::Float32),
    map("XBINNING", "Instrument:Camera:XBinning", VariantType::Int32),
    map("YBINNING", "Instrument:Camera:YBinning", VariantType::Int32),
    map("GAIN", "Instrument:Camera:Gain", VariantType::Float32),
    map("ISOSPEED", "Instrument:Camera:ISOSpeed", VariantType::Int32),
    map("CCD-TEMP", "Instrument:Sensor:Temperature", VariantType::Float32),
    map("SET-TEMP", "Instrument:Sensor:TargetTemperature", VariantType::Float32),
    map("XPIXSZ", "Instrument:Sensor:XPixelSize", VariantType::Float32),
    map("YPIXSZ", "Instrument:Sensor:YPixelSize", VariantType::Float32),
    map("FILTER", "Instrument:Filter:Name", VariantType::String),
    map("FOCUSPOS", "Instrument:Focuser:Position", VariantType::Float32),
];

pub fn mapping_for(keyword: &str) -> Option<&'static FitsMapping> {
    FITS_MAPPINGS.iter().find(|m| m.keyword == keyword)
}

/// Card value text without surrounding quotes and blanks.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .trim()
}

/// Convert a FITS card into its mapped property, `None` for keywords
/// outside the table.
pub fn keyword_to_property(name: &str, value: &str) -> Result<Option<Property>> {
    let Some(mapping) = mapping_for(name) else {
        return Ok(None);
    };
    let text = unquote(value);
    let invalid = || Error::format(format!("FITS keyword {name}: cannot read {value:?}"));
    let number = || text.parse::<f64>().map_err(|_| invalid());

    let variant = match mapping.value_type {
        VariantType::String => Variant::String(text.to_string()),
        VariantType::Float64 => Variant::Float64(number()? * mapping.scale),
        VariantType::Float32 => Variant::Float32((number()? * mapping.scale) as f32),
        VariantType::Int32 => Variant::Int32(match text.parse::<i32>() {
            Ok(v) => v,
            // Some writers emit integral cards as "2." or "2.0".
            Err(_) => {
                let v = number()?;
                if v.fract() != 0.0 || v < f64::from(i32::MIN) || v > f64::from(i32::MAX) {
                    return Err(invalid());
                }
                v as i32
            }
        }),
        VariantType::TimePoint => Variant::TimePoint(parse_fits_date(text).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    debug!("FITS {name} -> {} = {variant}", mapping.property_id);
    Ok(Some(Property::new(mapping.property_id, variant)))
}

/// DATE-OBS is usually written without a zone suffix and sometimes with
/// fractional seconds.
fn parse_fits_date(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(t) = parse_time(text) {
        return Some(t);
    }
    let base = text.split('.').next().unwrap_or(text);
    parse_time(&format!("{base}Z")).ok()
}
