//! Typed property values
//!
//! A [`Variant`] holds exactly one of the XISF property kinds. Scalars are
//! stored as text in the `value` attribute; strings as element text; vectors
//! and matrices as packed little-endian elements, base64 encoded in the
//! element text (or fetched from an attachment by the reader).

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use tracing::warn;

use crate::bytes::ByteArray;
use crate::error::{Error, Result};
use crate::xml::Element;

/// Text form of `TimePoint` values: UTC, whole seconds.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex32 {
    pub real: f32,
    pub imag: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex64 {
    pub real: f64,
    pub imag: f64,
}

/// Row-major matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    elements: Vec<T>,
}

impl<T: Clone + Default> Matrix<T> {
    /// `rows × cols` matrix of default elements.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            elements: vec![T::default(); rows * cols],
        }
    }
}

impl<T> Matrix<T> {
    pub fn from_vec(rows: usize, cols: usize, elements: Vec<T>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(elements.len()) {
            return Err(Error::format(format!(
                "matrix {rows}x{cols} needs {} elements, got {}",
                rows.saturating_mul(cols),
                elements.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            elements,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.elements.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.elements[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.elements[row * self.cols + col]
    }
}

/// Fixed-width element that can be packed into a vector or matrix blob.
pub trait Scalar: Copy + Default {
    const SIZE: usize;
    fn put(self, out: &mut Vec<u8>);
    /// `bytes` is exactly `SIZE` long.
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn put(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn take(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Scalar for Complex32 {
    const SIZE: usize = 8;

    fn put(self, out: &mut Vec<u8>) {
        self.real.put(out);
        self.imag.put(out);
    }

    fn take(bytes: &[u8]) -> Self {
        Self {
            real: f32::take(&bytes[..4]),
            imag: f32::take(&bytes[4..]),
        }
    }
}

impl Scalar for Complex64 {
    const SIZE: usize = 16;

    fn put(self, out: &mut Vec<u8>) {
        self.real.put(out);
        self.imag.put(out);
    }

    fn take(bytes: &[u8]) -> Self {
        Self {
            real: f64::take(&bytes[..8]),
            imag: f64::take(&bytes[8..]),
        }
    }
}

pub(crate) fn pack<T: Scalar>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for v in values {
        v.put(&mut out);
    }
    out
}

pub(crate) fn unpack<T: Scalar>(bytes: &[u8], count: usize) -> Result<Vec<T>> {
    let needed = count
        .checked_mul(T::SIZE)
        .ok_or_else(|| Error::format(format!("element count {count} overflows")))?;
    if bytes.len() != needed {
        return Err(Error::format(format!(
            "property payload has {} bytes, {count} elements need {needed}",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(T::SIZE).map(T::take).collect())
}

/// Discriminant of a [`Variant`], with its XISF type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    Monostate,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Complex32,
    Complex64,
    String,
    TimePoint,
    I8Vector,
    UI8Vector,
    I16Vector,
    UI16Vector,
    I32Vector,
    UI32Vector,
    I64Vector,
    UI64Vector,
    F32Vector,
    F64Vector,
    C32Vector,
    C64Vector,
    I8Matrix,
    UI8Matrix,
    I16Matrix,
    UI16Matrix,
    I32Matrix,
    UI32Matrix,
    I64Matrix,
    UI64Matrix,
    F32Matrix,
    F64Matrix,
    C32Matrix,
    C64Matrix,
}

const TYPE_NAMES: [(VariantType, &str); 40] = [
    (VariantType::Monostate, "Monostate"),
    (VariantType::Boolean, "Boolean"),
    (VariantType::Int8, "Int8"),
    (VariantType::UInt8, "UInt8"),
    (VariantType::Int16, "Int16"),
    (VariantType::UInt16, "UInt16"),
    (VariantType::Int32, "Int32"),
    (VariantType::UInt32, "UInt32"),
    (VariantType::Int64, "Int64"),
    (VariantType::UInt64, "UInt64"),
    (VariantType::Float32, "Float32"),
    (VariantType::Float64, "Float64"),
    (VariantType::Complex32, "Complex32"),
    (VariantType::Complex64, "Complex64"),
    (VariantType::String, "String"),
    (VariantType::TimePoint, "TimePoint"),
    (VariantType::I8Vector, "I8Vector"),
    (VariantType::UI8Vector, "UI8Vector"),
    (VariantType::I16Vector, "I16Vector"),
    (VariantType::UI16Vector, "UI16Vector"),
    (VariantType::I32Vector, "I32Vector"),
    (VariantType::UI32Vector, "UI32Vector"),
    (VariantType::I64Vector, "I64Vector"),
    (VariantType::UI64Vector, "UI64Vector"),
    (VariantType::F32Vector, "F32Vector"),
    (VariantType::F64Vector, "F64Vector"),
    (VariantType::C32Vector, "C32Vector"),
    (VariantType::C64Vector, "C64Vector"),
    (VariantType::I8Matrix, "I8Matrix"),
    (VariantType::UI8Matrix, "UI8Matrix"),
    (VariantType::I16Matrix, "I16Matrix"),
    (VariantType::UI16Matrix, "UI16Matrix"),
    (VariantType::I32Matrix, "I32Matrix"),
    (VariantType::UI32Matrix, "UI32Matrix"),
    (VariantType::I64Matrix, "I64Matrix"),
    (VariantType::UI64Matrix, "UI64Matrix"),
    (VariantType::F32Matrix, "F32Matrix"),
    (VariantType::F64Matrix, "F64Matrix"),
    (VariantType::C32Matrix, "C32Matrix"),
    (VariantType::C64Matrix, "C64Matrix"),
];

impl VariantType {
    pub fn name(self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, n)| *n)
            .unwrap_or("Monostate")
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TYPE_NAMES.iter().find(|(_, n)| *n == name).map(|(t, _)| *t)
    }

    pub fn is_vector(self) -> bool {
        matches!(
            self,
            VariantType::I8Vector
                | VariantType::UI8Vector
                | VariantType::I16Vector
                | VariantType::UI16Vector
                | VariantType::I32Vector
                | VariantType::UI32Vector
                | VariantType::I64Vector
                | VariantType::UI64Vector
                | VariantType::F32Vector
                | VariantType::F64Vector
                | VariantType::C32Vector
                | VariantType::C64Vector
        )
    }

    pub fn is_matrix(self) -> bool {
        matches!(
            self,
            VariantType::I8Matrix
                | VariantType::UI8Matrix
                | VariantType::I16Matrix
                | VariantType::UI16Matrix
                | VariantType::I32Matrix
                | VariantType::UI32Matrix
                | VariantType::I64Matrix
                | VariantType::UI64Matrix
                | VariantType::F32Matrix
                | VariantType::F64Matrix
                | VariantType::C32Matrix
                | VariantType::C64Matrix
        )
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property value. `Monostate` stands for "no value", which is also what
/// unknown type tags read back as.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Monostate,
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Complex32(Complex32),
    Complex64(Complex64),
    String(String),
    TimePoint(DateTime<Utc>),
    I8Vector(Vec<i8>),
    UI8Vector(Vec<u8>),
    I16Vector(Vec<i16>),
    UI16Vector(Vec<u16>),
    I32Vector(Vec<i32>),
    UI32Vector(Vec<u32>),
    I64Vector(Vec<i64>),
    UI64Vector(Vec<u64>),
    F32Vector(Vec<f32>),
    F64Vector(Vec<f64>),
    C32Vector(Vec<Complex32>),
    C64Vector(Vec<Complex64>),
    I8Matrix(Matrix<i8>),
    UI8Matrix(Matrix<u8>),
    I16Matrix(Matrix<i16>),
    UI16Matrix(Matrix<u16>),
    I32Matrix(Matrix<i32>),
    UI32Matrix(Matrix<u32>),
    I64Matrix(Matrix<i64>),
    UI64Matrix(Matrix<u64>),
    F32Matrix(Matrix<f32>),
    F64Matrix(Matrix<f64>),
    C32Matrix(Matrix<Complex32>),
    C64Matrix(Matrix<Complex64>),
}

macro_rules! variant_from {
    ($($kind:ident => $t:ty),* $(,)?) => {
        $(
            impl From<$t> for Variant {
                fn from(v: $t) -> Self {
                    Variant::$kind(v)
                }
            }
        )*
    };
}

variant_from!(
    Boolean => bool,
    Int8 => i8,
    UInt8 => u8,
    Int16 => i16,
    UInt16 => u16,
    Int32 => i32,
    UInt32 => u32,
    Int64 => i64,
    UInt64 => u64,
    Float32 => f32,
    Float64 => f64,
    Complex32 => Complex32,
    Complex64 => Complex64,
    String => String,
    TimePoint => DateTime<Utc>,
    I8Vector => Vec<i8>,
    UI8Vector => Vec<u8>,
    I16Vector => Vec<i16>,
    UI16Vector => Vec<u16>,
    I32Vector => Vec<i32>,
    UI32Vector => Vec<u32>,
    I64Vector => Vec<i64>,
    UI64Vector => Vec<u64>,
    F32Vector => Vec<f32>,
    F64Vector => Vec<f64>,
    C32Vector => Vec<Complex32>,
    C64Vector => Vec<Complex64>,
    I8Matrix => Matrix<i8>,
    UI8Matrix => Matrix<u8>,
    I16Matrix => Matrix<i16>,
    UI16Matrix => Matrix<u16>,
    I32Matrix => Matrix<i32>,
    UI32Matrix => Matrix<u32>,
    I64Matrix => Matrix<i64>,
    UI64Matrix => Matrix<u64>,
    F32Matrix => Matrix<f32>,
    F64Matrix => Matrix<f64>,
    C32Matrix => Matrix<Complex32>,
    C64Matrix => Matrix<Complex64>,
);

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Monostate => VariantType::Monostate,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::Int8(_) => VariantType::Int8,
            Variant::UInt8(_) => VariantType::UInt8,
            Variant::Int16(_) => VariantType::Int16,
            Variant::UInt16(_) => VariantType::UInt16,
            Variant::Int32(_) => VariantType::Int32,
            Variant::UInt32(_) => VariantType::UInt32,
            Variant::Int64(_) => VariantType::Int64,
            Variant::UInt64(_) => VariantType::UInt64,
            Variant::Float32(_) => VariantType::Float32,
            Variant::Float64(_) => VariantType::Float64,
            Variant::Complex32(_) => VariantType::Complex32,
            Variant::Complex64(_) => VariantType::Complex64,
            Variant::String(_) => VariantType::String,
            Variant::TimePoint(_) => VariantType::TimePoint,
            Variant::I8Vector(_) => VariantType::I8Vector,
            Variant::UI8Vector(_) => VariantType::UI8Vector,
            Variant::I16Vector(_) => VariantType::I16Vector,
            Variant::UI16Vector(_) => VariantType::UI16Vector,
            Variant::I32Vector(_) => VariantType::I32Vector,
            Variant::UI32Vector(_) => VariantType::UI32Vector,
            Variant::I64Vector(_) => VariantType::I64Vector,
            Variant::UI64Vector(_) => VariantType::UI64Vector,
            Variant::F32Vector(_) => VariantType::F32Vector,
            Variant::F64Vector(_) => VariantType::F64Vector,
            Variant::C32Vector(_) => VariantType::C32Vector,
            Variant::C64Vector(_) => VariantType::C64Vector,
            Variant::I8Matrix(_) => VariantType::I8Matrix,
            Variant::UI8Matrix(_) => VariantType::UI8Matrix,
            Variant::I16Matrix(_) => VariantType::I16Matrix,
            Variant::UI16Matrix(_) => VariantType::UI16Matrix,
            Variant::I32Matrix(_) => VariantType::I32Matrix,
            Variant::UI32Matrix(_) => VariantType::UI32Matrix,
            Variant::I64Matrix(_) => VariantType::I64Matrix,
            Variant::UI64Matrix(_) => VariantType::UI64Matrix,
            Variant::F32Matrix(_) => VariantType::F32Matrix,
            Variant::F64Matrix(_) => VariantType::F64Matrix,
            Variant::C32Matrix(_) => VariantType::C32Matrix,
            Variant::C64Matrix(_) => VariantType::C64Matrix,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.variant_type().name()
    }

    pub fn is_monostate(&self) -> bool {
        matches!(self, Variant::Monostate)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any real scalar widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Variant::Int8(v) => Some(v.into()),
            Variant::UInt8(v) => Some(v.into()),
            Variant::Int16(v) => Some(v.into()),
            Variant::UInt16(v) => Some(v.into()),
            Variant::Int32(v) => Some(v.into()),
            Variant::UInt32(v) => Some(v.into()),
            Variant::Int64(v) => Some(v as f64),
            Variant::UInt64(v) => Some(v as f64),
            Variant::Float32(v) => Some(v.into()),
            Variant::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Write the `type` attribute and the value representation into
    /// `element`. Vectors and matrices go inline as base64 text with
    /// `location="inline:base64"`.
    pub fn serialize(&self, element: &mut Element) {
        element.set_attr("type", self.type_name());
        match self {
            Variant::Monostate => {}
            Variant::Boolean(v) => element.set_attr("value", if *v { "1" } else { "0" }),
            Variant::Int8(v) => element.set_attr("value", v.to_string()),
            Variant::UInt8(v) => element.set_attr("value", v.to_string()),
            Variant::Int16(v) => element.set_attr("value", v.to_string()),
            Variant::UInt16(v) => element.set_attr("value", v.to_string()),
            Variant::Int32(v) => element.set_attr("value", v.to_string()),
            Variant::UInt32(v) => element.set_attr("value", v.to_string()),
            Variant::Int64(v) => element.set_attr("value", v.to_string()),
            Variant::UInt64(v) => element.set_attr("value", v.to_string()),
            Variant::Float32(v) => element.set_attr("value", v.to_string()),
            Variant::Float64(v) => element.set_attr("value", v.to_string()),
            Variant::Complex32(c) => element.set_attr("value", format!("({},{})", c.real, c.imag)),
            Variant::Complex64(c) => element.set_attr("value", format!("({},{})", c.real, c.imag)),
            Variant::String(s) => element.set_text(s.as_str()),
            Variant::TimePoint(t) => element.set_attr("value", t.format(TIME_FORMAT).to_string()),
            Variant::I8Vector(v) => write_vector(element, v),
            Variant::UI8Vector(v) => write_vector(element, v),
            Variant::I16Vector(v) => write_vector(element, v),
            Variant::UI16Vector(v) => write_vector(element, v),
            Variant::I32Vector(v) => write_vector(element, v),
            Variant::UI32Vector(v) => write_vector(element, v),
            Variant::I64Vector(v) => write_vector(element, v),
            Variant::UI64Vector(v) => write_vector(element, v),
            Variant::F32Vector(v) => write_vector(element, v),
            Variant::F64Vector(v) => write_vector(element, v),
            Variant::C32Vector(v) => write_vector(element, v),
            Variant::C64Vector(v) => write_vector(element, v),
            Variant::I8Matrix(m) => write_matrix(element, m),
            Variant::UI8Matrix(m) => write_matrix(element, m),
            Variant::I16Matrix(m) => write_matrix(element, m),
            Variant::UI16Matrix(m) => write_matrix(element, m),
            Variant::I32Matrix(m) => write_matrix(element, m),
            Variant::UI32Matrix(m) => write_matrix(element, m),
            Variant::I64Matrix(m) => write_matrix(element, m),
            Variant::UI64Matrix(m) => write_matrix(element, m),
            Variant::F32Matrix(m) => write_matrix(element, m),
            Variant::F64Matrix(m) => write_matrix(element, m),
            Variant::C32Matrix(m) => write_matrix(element, m),
            Variant::C64Matrix(m) => write_matrix(element, m),
        }
    }

    /// Rebuild a value from a Property-like element.
    ///
    /// `payload` carries the already resolved bytes when the element has a
    /// `location` attribute (inline text decoded, or attachment fetched).
    /// Unknown type tags yield [`Variant::Monostate`].
    pub fn deserialize(element: &Element, payload: Option<&ByteArray>) -> Result<Variant> {
        let tag = element.required_attr("type")?;
        let Some(kind) = VariantType::from_name(tag) else {
            warn!("unknown property type {tag:?}, keeping no value");
            return Ok(Variant::Monostate);
        };

        if kind == VariantType::String {
            return match payload {
                Some(bytes) => String::from_utf8(bytes.to_vec())
                    .map(Variant::String)
                    .map_err(|e| Error::format(format!("String property is not UTF-8: {e}"))),
                None => Ok(Variant::String(element.text.clone())),
            };
        }
        if kind.is_vector() {
            let len = count_attr(element, "length")?;
            return read_vector(kind, len, blob(element, payload)?);
        }
        if kind.is_matrix() {
            let rows = count_attr(element, "rows")?;
            let cols = count_attr(element, "columns")?;
            return read_matrix(kind, rows, cols, blob(element, payload)?);
        }
        if kind == VariantType::Monostate {
            return Ok(Variant::Monostate);
        }

        let text = element.required_attr("value")?.trim();
        let value = match kind {
            VariantType::Boolean => Variant::Boolean(parse_bool(text)?),
            VariantType::Int8 => Variant::Int8(parse_number(kind, text)?),
            VariantType::UInt8 => Variant::UInt8(parse_number(kind, text)?),
            VariantType::Int16 => Variant::Int16(parse_number(kind, text)?),
            VariantType::UInt16 => Variant::UInt16(parse_number(kind, text)?),
            VariantType::Int32 => Variant::Int32(parse_number(kind, text)?),
            VariantType::UInt32 => Variant::UInt32(parse_number(kind, text)?),
            VariantType::Int64 => Variant::Int64(parse_number(kind, text)?),
            VariantType::UInt64 => Variant::UInt64(parse_number(kind, text)?),
            VariantType::Float32 => Variant::Float32(parse_number(kind, text)?),
            VariantType::Float64 => Variant::Float64(parse_number(kind, text)?),
            VariantType::Complex32 => {
                let (real, imag) = parse_complex(kind, text)?;
                Variant::Complex32(Complex32 { real, imag })
            }
            VariantType::Complex64 => {
                let (real, imag) = parse_complex(kind, text)?;
                Variant::Complex64(Complex64 { real, imag })
            }
            VariantType::TimePoint => Variant::TimePoint(parse_time(text)?),
            _ => Variant::Monostate,
        };
        Ok(value)
    }
}

fn write_vector<T: Scalar>(element: &mut Element, values: &[T]) {
    element.set_attr("length", values.len().to_string());
    element.set_attr("location", "inline:base64");
    element.set_text(ByteArray::from(pack(values)).to_base64());
}

fn write_matrix<T: Scalar>(element: &mut Element, matrix: &Matrix<T>) {
    element.set_attr("rows", matrix.rows().to_string());
    element.set_attr("columns", matrix.cols().to_string());
    element.set_attr("location", "inline:base64");
    element.set_text(ByteArray::from(pack(matrix.as_slice())).to_base64());
}

fn blob<'a>(element: &Element, payload: Option<&'a ByteArray>) -> Result<&'a [u8]> {
    payload.map(ByteArray::as_slice).ok_or_else(|| {
        Error::format(format!(
            "{} property {:?} has no data",
            element.attr("type").unwrap_or_default(),
            element.attr("id").unwrap_or_default()
        ))
    })
}

fn count_attr(element: &Element, name: &str) -> Result<usize> {
    let text = element.required_attr(name)?;
    text.trim()
        .parse()
        .map_err(|_| Error::format(format!("invalid {name} attribute {text:?}")))
}

fn parse_number<T: FromStr>(kind: VariantType, text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| Error::format(format!("invalid {kind} value {text:?}")))
}

fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::format(format!("invalid Boolean value {text:?}"))),
    }
}

/// `(<real>,<imag>)`
fn parse_complex<T: FromStr>(kind: VariantType, text: &str) -> Result<(T, T)> {
    let invalid = || Error::format(format!("invalid {kind} value {text:?}"));
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let (real, imag) = inner.split_once(',').ok_or_else(invalid)?;
    let real = real.trim().parse().map_err(|_| invalid())?;
    let imag = imag.trim().parse().map_err(|_| invalid())?;
    Ok((real, imag))
}

/// Fixed `YYYY-MM-DDTHH:MM:SSZ` first; RFC 3339 with fractions or offsets is
/// accepted too and truncated to whole seconds in UTC.
pub(crate) fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|_| Error::format(format!("invalid TimePoint value {text:?}")))
}

fn read_vector(kind: VariantType, len: usize, bytes: &[u8]) -> Result<Variant> {
    let value = match kind {
        VariantType::I8Vector => Variant::I8Vector(unpack(bytes, len)?),
        VariantType::UI8Vector => Variant::UI8Vector(unpack(bytes, len)?),
        VariantType::I16Vector => Variant::I16Vector(unpack(bytes, len)?),
        VariantType::UI16Vector => Variant::UI16Vector(unpack(bytes, len)?),
        VariantType::I32Vector => Variant::I32Vector(unpack(bytes, len)?),
        VariantType::UI32Vector => Variant::UI32Vector(unpack(bytes, len)?),
        VariantType::I64Vector => Variant::I64Vector(unpack(bytes, len)?),
        VariantType::UI64Vector => Variant::UI64Vector(unpack(bytes, len)?),
        VariantType::F32Vector => Variant::F32Vector(unpack(bytes, len)?),
        VariantType::F64Vector => Variant::F64Vector(unpack(bytes, len)?),
        VariantType::C32Vector => Variant::C32Vector(unpack(bytes, len)?),
        VariantType::C64Vector => Variant::C64Vector(unpack(bytes, len)?),
        _ => Variant::Monostate,
    };
    Ok(value)
}

fn matrix_of<T: Scalar>(rows: usize, cols: usize, bytes: &[u8]) -> Result<Matrix<T>> {
    let count = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::format(format!("matrix {rows}x{cols} overflows")))?;
    Matrix::from_vec(rows, cols, unpack(bytes, count)?)
}

fn read_matrix(kind: VariantType, rows: usize, cols: usize, bytes: &[u8]) -> Result<Variant> {
    let value = match kind {
        VariantType::I8Matrix => Variant::I8Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::UI8Matrix => Variant::UI8Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::I16Matrix => Variant::I16Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::UI16Matrix => Variant::UI16Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::I32Matrix => Variant::I32Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::UI32Matrix => Variant::UI32Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::I64Matrix => Variant::I64Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::UI64Matrix => Variant::UI64Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::F32Matrix => Variant::F32Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::F64Matrix => Variant::F64Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::C32Matrix => Variant::C32Matrix(matrix_of(rows, cols, bytes)?),
        VariantType::C64Matrix => Variant::C64Matrix(matrix_of(rows, cols, bytes)?),
        _ => Variant::Monostate,
    };
    Ok(value)
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Monostate => f.write_str("<none>"),
            Variant::Boolean(v) => write!(f, "{v}"),
            Variant::Int8(v) => write!(f, "{v}"),
            Variant::UInt8(v) => write!(f, "{v}"),
            Variant::Int16(v) => write!(f, "{v}"),
            Variant::UInt16(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Int64(v) => write!(f, "{v}"),
            Variant::UInt64(v) => write!(f, "{v}"),
            Variant::Float32(v) => write!(f, "{v}"),
            Variant::Float64(v) => write!(f, "{v}"),
            Variant::Complex32(c) => write!(f, "({},{})", c.real, c.imag),
            Variant::Complex64(c) => write!(f, "({},{})", c.real, c.imag),
            Variant::String(s) => write!(f, "{s:?}"),
            Variant::TimePoint(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Variant::I8Vector(v) => write!(f, "[{} x Int8]", v.len()),
            Variant::UI8Vector(v) => write!(f, "[{} x UInt8]", v.len()),
            Variant::I16Vector(v) => write!(f, "[{} x Int16]", v.len()),
            Variant::UI16Vector(v) => write!(f, "[{} x UInt16]", v.len()),
            Variant::I32Vector(v) => write!(f, "[{} x Int32]", v.len()),
            Variant::UI32Vector(v) => write!(f, "[{} x UInt32]", v.len()),
            Variant::I64Vector(v) => write!(f, "[{} x Int64]", v.len()),
            Variant::UI64Vector(v) => write!(f, "[{} x UInt64]", v.len()),
            Variant::F32Vector(v) => write!(f, "[{} x Float32]", v.len()),
            Variant::F64Vector(v) => write!(f, "[{} x Float64]", v.len()),
            Variant::C32Vector(v) => write!(f, "[{} x Complex32]", v.len()),
            Variant::C64Vector(v) => write!(f, "[{} x Complex64]", v.len()),
            Variant::I8Matrix(m) => write!(f, "[{}x{} Int8]", m.rows(), m.cols()),
            Variant::UI8Matrix(m) => write!(f, "[{}x{} UInt8]", m.rows(), m.cols()),
            Variant::I16Matrix(m) => write!(f, "[{}x{} Int16]", m.rows(), m.cols()),
            Variant::UI16Matrix(m) => write!(f, "[{}x{} UInt16]", m.rows(), m.cols()),
            Variant::I32Matrix(m) => write!(f, "[{}x{} Int32]", m.rows(), m.cols()),
            Variant::UI32Matrix(m) => write!(f, "[{}x{} UInt32]", m.rows(), m.cols()),
            Variant::I64Matrix(m) => write!(f, "[{}x{} Int64]", m.rows(), m.cols()),
            Variant::UI64Matrix(m) => write!(f, "[{}x{} UInt64]", m.rows(), m.cols()),
            Variant::F32Matrix(m) => write!(f, "[{}x{} Float32]", m.rows(), m.cols()),
            Variant::F64Matrix(m) => write!(f, "[{}x{} Float64]", m.rows(), m.cols()),
            Variant::C32Matrix(m) => write!(f, "[{}x{} Complex32]", m.rows(), m.cols()),
            Variant::C64Matrix(m) => write!(f, "[{}x{} Complex64]", m.rows(), m.cols()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Serialize into a fresh Property element and read it back, decoding
    /// inline payloads the way the reader does.
    fn round_trip(value: &Variant) -> Variant {
        let mut element = Element::new("Property").with_attr("id", "Test");
        value.serialize(&mut element);
        let payload = match element.attr("location") {
            Some("inline:base64") => Some(ByteArray::from_base64(element.text.as_bytes()).unwrap()),
            _ => None,
        };
        Variant::deserialize(&element, payload.as_ref()).unwrap()
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 17, 21, 4, 59).unwrap()
    }

    fn scalar_samples() -> Vec<Variant> {
        vec![
            Variant::Boolean(true),
            Variant::Boolean(false),
            Variant::Int8(i8::MIN),
            Variant::Int8(i8::MAX),
            Variant::UInt8(u8::MAX),
            Variant::Int16(i16::MIN),
            Variant::UInt16(u16::MAX),
            Variant::Int32(i32::MIN),
            Variant::Int32(32),
            Variant::UInt32(u32::MAX),
            Variant::Int64(i64::MIN),
            Variant::Int64(i64::MAX),
            Variant::UInt64(u64::MAX),
            Variant::Float32(0.32),
            Variant::Float32(f32::MIN_POSITIVE),
            Variant::Float32(f32::INFINITY),
            Variant::Float64(0.64),
            Variant::Float64(-1.0e300),
            Variant::Float64(f64::NEG_INFINITY),
            Variant::Complex32(Complex32 { real: 3.0, imag: -2.0 }),
            Variant::Complex64(Complex64 { real: -3.5, imag: 2.25e-10 }),
            Variant::String("Hello XISF".into()),
            Variant::String("Ωmega ∑ 星 🌌 <&>".into()),
            Variant::String(String::new()),
            Variant::TimePoint(timestamp()),
        ]
    }

    fn container_samples() -> Vec<Variant> {
        vec![
            Variant::I8Vector(vec![i8::MIN, -1, 0, 1, i8::MAX]),
            Variant::UI8Vector(vec![]),
            Variant::I16Vector(vec![i16::MIN, 16, i16::MAX]),
            Variant::UI16Vector(vec![0, 1, u16::MAX]),
            Variant::I32Vector(vec![i32::MIN, 0, i32::MAX]),
            Variant::UI32Vector(vec![u32::MAX; 3]),
            Variant::I64Vector(vec![i64::MIN, i64::MAX]),
            Variant::UI64Vector(vec![u64::MAX, 0]),
            Variant::F32Vector(vec![-0.0, 1.5, f32::MAX]),
            Variant::F64Vector(vec![f64::MIN, 0.1, f64::EPSILON]),
            Variant::C32Vector(vec![Complex32 { real: 1.0, imag: -1.0 }]),
            Variant::C64Vector(vec![Complex64 { real: 0.5, imag: 0.25 }; 4]),
            Variant::I8Matrix(Matrix::from_vec(2, 3, vec![1, -2, 3, -4, 5, -6]).unwrap()),
            Variant::UI8Matrix(Matrix::new(0, 0)),
            Variant::I16Matrix(Matrix::from_vec(1, 2, vec![i16::MIN, i16::MAX]).unwrap()),
            Variant::UI16Matrix(Matrix::new(3, 3)),
            Variant::I32Matrix(Matrix::from_vec(2, 1, vec![7, 8]).unwrap()),
            Variant::UI32Matrix(Matrix::from_vec(1, 1, vec![u32::MAX]).unwrap()),
            Variant::I64Matrix(Matrix::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap()),
            Variant::UI64Matrix(Matrix::new(0, 5)),
            Variant::F32Matrix(Matrix::from_vec(1, 3, vec![0.5, -0.5, 1e-3]).unwrap()),
            Variant::F64Matrix(Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]).unwrap()),
            Variant::C32Matrix(Matrix::new(2, 2)),
            Variant::C64Matrix(
                Matrix::from_vec(1, 2, vec![Complex64 { real: 1.0, imag: 2.0 }; 2]).unwrap(),
            ),
        ]
    }

    #[test]
    fn scalars_round_trip() {
        for value in scalar_samples() {
            assert_eq!(round_trip(&value), value, "{}", value.type_name());
        }
    }

    #[test]
    fn vectors_and_matrices_round_trip() {
        for value in container_samples() {
            assert_eq!(round_trip(&value), value, "{}", value.type_name());
        }
    }

    #[test]
    fn signed_zero_and_nan_survive() {
        let Variant::Float64(z) = round_trip(&Variant::Float64(-0.0)) else {
            panic!("wrong kind");
        };
        assert!(z == 0.0 && z.is_sign_negative());

        let Variant::Float32(n) = round_trip(&Variant::Float32(f32::NAN)) else {
            panic!("wrong kind");
        };
        assert!(n.is_nan());
    }

    #[test]
    fn every_kind_has_a_distinct_name() {
        let mut names: Vec<_> = TYPE_NAMES.iter().map(|(_, n)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TYPE_NAMES.len());
        for (kind, name) in TYPE_NAMES {
            assert_eq!(VariantType::from_name(name), Some(kind));
            assert_eq!(kind.name(), name);
        }
    }

    #[test]
    fn text_forms() {
        let mut e = Element::new("Property");
        Variant::Boolean(true).serialize(&mut e);
        assert_eq!(e.attr("value"), Some("1"));

        let mut e = Element::new("Property");
        Variant::Complex32(Complex32 { real: 3.0, imag: -2.0 }).serialize(&mut e);
        assert_eq!(e.attr("value"), Some("(3,-2)"));

        let mut e = Element::new("Property");
        Variant::TimePoint(timestamp()).serialize(&mut e);
        assert_eq!(e.attr("value"), Some("2023-05-17T21:04:59Z"));

        let mut e = Element::new("Property");
        Variant::UI16Vector(vec![1, 2]).serialize(&mut e);
        assert_eq!(e.attr("length"), Some("2"));
        assert_eq!(e.text, "AQACAA==");
    }

    #[test]
    fn time_point_accepts_fractions_and_offsets() {
        assert_eq!(parse_time("2023-05-17T21:04:59.987Z").unwrap(), timestamp());
        assert_eq!(parse_time("2023-05-17T23:04:59+02:00").unwrap(), timestamp());
        assert!(parse_time("17/05/2023").is_err());
    }

    #[test]
    fn unknown_type_is_monostate() {
        let e = Element::new("Property")
            .with_attr("id", "X")
            .with_attr("type", "Quaternion")
            .with_attr("value", "1");
        assert_eq!(Variant::deserialize(&e, None).unwrap(), Variant::Monostate);
    }

    #[test]
    fn malformed_scalars_are_errors() {
        for (kind, text) in [
            ("Int8", "128"),
            ("UInt16", "-1"),
            ("Int32", "1,000"),
            ("Float64", "0,64"),
            ("Boolean", "yes"),
            ("Complex32", "3,-2"),
        ] {
            let e = Element::new("Property")
                .with_attr("type", kind)
                .with_attr("value", text);
            assert!(matches!(Variant::deserialize(&e, None), Err(Error::Format(_))), "{kind} {text}");
        }
    }

    #[test]
    fn short_vector_payload_is_an_error() {
        let e = Element::new("Property")
            .with_attr("type", "I32Vector")
            .with_attr("length", "4")
            .with_attr("location", "inline:base64");
        let payload = ByteArray::zeroed(12);
        assert!(Variant::deserialize(&e, Some(&payload)).is_err());
    }

    #[test]
    fn long_vector_payload_is_an_error() {
        let e = Element::new("Property")
            .with_attr("type", "UI16Vector")
            .with_attr("length", "2")
            .with_attr("location", "inline:base64");
        let payload = ByteArray::zeroed(6);
        assert!(matches!(
            Variant::deserialize(&e, Some(&payload)),
            Err(Error::Format(_))
        ));

        let e = Element::new("Property")
            .with_attr("type", "F32Matrix")
            .with_attr("rows", "1")
            .with_attr("columns", "2")
            .with_attr("location", "inline:base64");
        let payload = ByteArray::zeroed(12);
        assert!(matches!(
            Variant::deserialize(&e, Some(&payload)),
            Err(Error::Format(_))
        ));
    }
}
