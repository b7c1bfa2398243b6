//! Native element types and conversion of decoded records.
//!
//! Records come out of a decoder as a [`RawArray`] in whatever element type the
//! container stores them. Callers ask for a target type through [`Element`];
//! conversion is a plain element-wise `as` cast with no range checks, no fill
//! value masking and no scale/offset handling.

use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

/// Native number type of a record, following the HDF4 number types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// IEEE 754 single precision
    Float32,
    /// IEEE 754 double precision
    Float64,
}

impl DataType {
    /// HDF4 number type code (`DFNT_*`).
    pub fn code(self) -> i32 {
        match self {
            DataType::Int8 => 20,
            DataType::UInt8 => 21,
            DataType::Int16 => 22,
            DataType::UInt16 => 23,
            DataType::Int32 => 24,
            DataType::UInt32 => 25,
            DataType::Float32 => 5,
            DataType::Float64 => 6,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

/// A decoded record in its native element type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArray {
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Dispatch an expression over every `RawArray` variant.
macro_rules! each_variant {
    ($raw:expr, $arr:ident => $body:expr) => {
        match $raw {
            RawArray::I8($arr) => $body,
            RawArray::U8($arr) => $body,
            RawArray::I16($arr) => $body,
            RawArray::U16($arr) => $body,
            RawArray::I32($arr) => $body,
            RawArray::U32($arr) => $body,
            RawArray::F32($arr) => $body,
            RawArray::F64($arr) => $body,
        }
    };
}

impl RawArray {
    /// Native element type.
    pub fn data_type(&self) -> DataType {
        match self {
            RawArray::I8(_) => DataType::Int8,
            RawArray::U8(_) => DataType::UInt8,
            RawArray::I16(_) => DataType::Int16,
            RawArray::U16(_) => DataType::UInt16,
            RawArray::I32(_) => DataType::Int32,
            RawArray::U32(_) => DataType::UInt32,
            RawArray::F32(_) => DataType::Float32,
            RawArray::F64(_) => DataType::Float64,
        }
    }

    /// Shape of the native array.
    pub fn shape(&self) -> &[usize] {
        each_variant!(self, a => a.shape())
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        each_variant!(self, a => a.len())
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert every element to `T`, keeping the native shape.
    pub fn cast<T: Element>(&self) -> ArrayD<T> {
        match self {
            RawArray::I8(a) => a.mapv(|v| T::from_i64(i64::from(v))),
            RawArray::U8(a) => a.mapv(|v| T::from_u64(u64::from(v))),
            RawArray::I16(a) => a.mapv(|v| T::from_i64(i64::from(v))),
            RawArray::U16(a) => a.mapv(|v| T::from_u64(u64::from(v))),
            RawArray::I32(a) => a.mapv(|v| T::from_i64(i64::from(v))),
            RawArray::U32(a) => a.mapv(|v| T::from_u64(u64::from(v))),
            RawArray::F32(a) => a.mapv(|v| T::from_f64(f64::from(v))),
            RawArray::F64(a) => a.mapv(T::from_f64),
        }
    }

    /// Convert every element to `T` and flatten to one dimension in
    /// logical (row-major) order.
    pub fn cast_flat<T: Element>(&self) -> ArrayD<T> {
        Array1::from_iter(self.cast::<T>().iter().copied()).into_dyn()
    }
}

macro_rules! impl_from_array {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<ArrayD<$ty>> for RawArray {
                fn from(array: ArrayD<$ty>) -> Self {
                    RawArray::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
);

/// Target element type of a read.
///
/// Every native type widens losslessly into `i64`, `u64` or `f64` first, so
/// the result is the same as a direct `as` cast from the native type.
pub trait Element: Copy + 'static {
    /// Cast from a signed integer.
    fn from_i64(v: i64) -> Self;
    /// Cast from an unsigned integer.
    fn from_u64(v: u64) -> Self;
    /// Cast from a float.
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl Element for $ty {
                fn from_i64(v: i64) -> Self {
                    v as $ty
                }

                fn from_u64(v: u64) -> Self {
                    v as $ty
                }

                fn from_f64(v: f64) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

impl_element!(i8, u8, i16, u16, i32, u32, f32);

impl Element for i64 {
    fn from_i64(v: i64) -> Self {
        v
    }

    fn from_u64(v: u64) -> Self {
        v as i64
    }

    fn from_f64(v: f64) -> Self {
        v as i64
    }
}

impl Element for u64 {
    fn from_i64(v: i64) -> Self {
        v as u64
    }

    fn from_u64(v: u64) -> Self {
        v
    }

    fn from_f64(v: f64) -> Self {
        v as u64
    }
}

impl Element for f64 {
    fn from_i64(v: i64) -> Self {
        v as f64
    }

    fn from_u64(v: u64) -> Self {
        v as f64
    }

    fn from_f64(v: f64) -> Self {
        v
    }
}
