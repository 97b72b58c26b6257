//! Typed n-dimensional arrays carried inside a frame.
//!
//! The set of element types is closed: every array on the wire is one of
//! the [`DType`] variants, identified by a one-byte tag.

use std::fmt;

use crate::error::StreamError;

/// Maximum number of dimensions a single array may declare.
pub const MAX_DIMS: usize = 8;

// ── DType ────────────────────────────────────────────────────────

/// Element type of an [`NdArray`].
///
/// The discriminant is the wire tag and must never be renumbered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Unsigned 8-bit (color samples).
    U8 = 0x01,
    /// Unsigned 16-bit (depth in millimeters).
    U16 = 0x02,
    /// IEEE-754 single precision.
    F32 = 0x03,
    /// IEEE-754 double precision.
    F64 = 0x04,
}

impl DType {
    /// Bytes consumed by a single element of this type.
    pub const fn size(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::U16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Whether this is a floating-point type.
    pub const fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl TryFrom<u8> for DType {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(DType::U8),
            0x02 => Ok(DType::U16),
            0x03 => Ok(DType::F32),
            0x04 => Ok(DType::F64),
            _ => Err(StreamError::UnknownVariant {
                type_name: "DType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::U8 => write!(f, "uint8"),
            DType::U16 => write!(f, "uint16"),
            DType::F32 => write!(f, "float32"),
            DType::F64 => write!(f, "float64"),
        }
    }
}

// ── ArrayData ────────────────────────────────────────────────────

/// Contiguous element storage, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::U8(_) => DType::U8,
            ArrayData::U16(_) => DType::U16,
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
        }
    }

    /// Number of elements stored.
    pub fn len(&self) -> usize {
        match self {
            ArrayData::U8(v) => v.len(),
            ArrayData::U16(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── NdArray ──────────────────────────────────────────────────────

/// A shaped, typed array.
///
/// The element count always equals the product of the shape; the
/// constructors reject anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Wrap `data` with `shape`, checking that they agree.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, StreamError> {
        if shape.is_empty() || shape.len() > MAX_DIMS {
            return Err(StreamError::encoding(
                "array",
                format!("dimension count {} outside 1..={MAX_DIMS}", shape.len()),
            ));
        }
        let expected = element_count(&shape).ok_or_else(|| {
            StreamError::encoding("array", format!("shape {shape:?} overflows usize"))
        })?;
        if data.len() != expected {
            return Err(StreamError::encoding(
                "array",
                format!(
                    "shape {shape:?} needs {expected} elements, storage holds {}",
                    data.len()
                ),
            ));
        }
        Ok(Self { shape, data })
    }

    /// Wrap storage whose length is known to match `shape`.
    pub(crate) fn from_parts(shape: Vec<usize>, data: ArrayData) -> Self {
        debug_assert_eq!(element_count(&shape), Some(data.len()));
        Self { shape, data }
    }

    pub fn from_u8(shape: Vec<usize>, data: Vec<u8>) -> Result<Self, StreamError> {
        Self::new(shape, ArrayData::U8(data))
    }

    pub fn from_u16(shape: Vec<usize>, data: Vec<u16>) -> Result<Self, StreamError> {
        Self::new(shape, ArrayData::U16(data))
    }

    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, StreamError> {
        Self::new(shape, ArrayData::F32(data))
    }

    pub fn from_f64(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, StreamError> {
        Self::new(shape, ArrayData::F64(data))
    }

    /// A zero-filled array of the given type and shape.
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Result<Self, StreamError> {
        let n = element_count(&shape).ok_or_else(|| {
            StreamError::encoding("array", format!("shape {shape:?} overflows usize"))
        })?;
        let data = match dtype {
            DType::U8 => ArrayData::U8(vec![0; n]),
            DType::U16 => ArrayData::U16(vec![0; n]),
            DType::F32 => ArrayData::F32(vec![0.0; n]),
            DType::F64 => ArrayData::F64(vec![0.0; n]),
        };
        Self::new(shape, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the raw element content in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * self.dtype().size()
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match &self.data {
            ArrayData::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            ArrayData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Element `index` widened to `f64`, regardless of dtype.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match &self.data {
            ArrayData::U8(v) => v.get(index).map(|&x| x as f64),
            ArrayData::U16(v) => v.get(index).map(|&x| x as f64),
            ArrayData::F32(v) => v.get(index).map(|&x| x as f64),
            ArrayData::F64(v) => v.get(index).copied(),
        }
    }
}

/// Product of `shape`, or `None` on overflow.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}
