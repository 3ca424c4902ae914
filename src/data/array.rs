//! Named field arrays attached to mesh blocks.
//!
//! Values live behind `Arc<[T]>` so a simulation can hand its buffers to an
//! adaptor without copying; every clone of a [`FieldArray`] shares the same
//! storage.

use crate::sensei_error::SenseiError;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Name of the reserved array flagging duplicated (non-owned) points/cells.
///
/// Entries with a non-zero value are excluded from statistics.
pub const GHOST_ARRAY_NAME: &str = "vtkGhostType";

/// Whether an array's values sit on mesh points or mesh cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Association {
    Point,
    Cell,
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Association::Point => f.write_str("point"),
            Association::Cell => f.write_str("cell"),
        }
    }
}

impl FromStr for Association {
    type Err = SenseiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point" => Ok(Association::Point),
            "cell" => Ok(Association::Cell),
            other => Err(SenseiError::InvalidConfiguration(format!(
                "invalid association `{other}` (expected `point` or `cell`)"
            ))),
        }
    }
}

/// Scalar element type of an array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ScalarType {
    F32 = 1,
    F64 = 2,
    I32 = 3,
    I64 = 4,
    U8 = 5,
}

impl ScalarType {
    pub fn size_of(self) -> usize {
        match self {
            ScalarType::F32 | ScalarType::I32 => 4,
            ScalarType::F64 | ScalarType::I64 => 8,
            ScalarType::U8 => 1,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ScalarType::F32),
            2 => Some(ScalarType::F64),
            3 => Some(ScalarType::I32),
            4 => Some(ScalarType::I64),
            5 => Some(ScalarType::U8),
            _ => None,
        }
    }
}

/// Shared, typed value storage.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValues {
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
    I32(Arc<[i32]>),
    I64(Arc<[i64]>),
    U8(Arc<[u8]>),
}

impl ArrayValues {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ArrayValues::F32(_) => ScalarType::F32,
            ArrayValues::F64(_) => ScalarType::F64,
            ArrayValues::I32(_) => ScalarType::I32,
            ArrayValues::I64(_) => ScalarType::I64,
            ArrayValues::U8(_) => ScalarType::U8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValues::F32(v) => v.len(),
            ArrayValues::F64(v) => v.len(),
            ArrayValues::I32(v) => v.len(),
            ArrayValues::I64(v) => v.len(),
            ArrayValues::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw element `i` widened to `f64`.
    #[inline]
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        fn widen<T: AsPrimitive<f64>>(v: &[T], i: usize) -> Option<f64> {
            v.get(i).map(|x| x.as_())
        }
        match self {
            ArrayValues::F32(v) => widen(v, i),
            ArrayValues::F64(v) => widen(v, i),
            ArrayValues::I32(v) => widen(v, i),
            ArrayValues::I64(v) => widen(v, i),
            ArrayValues::U8(v) => widen(v, i),
        }
    }

    /// Little-endian byte image of the values.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        fn pack<T: Copy, const N: usize>(v: &[T], f: impl Fn(T) -> [u8; N]) -> Vec<u8> {
            v.iter().flat_map(|&x| f(x)).collect()
        }
        match self {
            ArrayValues::F32(v) => pack(v, f32::to_le_bytes),
            ArrayValues::F64(v) => pack(v, f64::to_le_bytes),
            ArrayValues::I32(v) => pack(v, i32::to_le_bytes),
            ArrayValues::I64(v) => pack(v, i64::to_le_bytes),
            ArrayValues::U8(v) => v.to_vec(),
        }
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes).
    pub fn from_le_bytes(ty: ScalarType, bytes: &[u8]) -> Result<Self, SenseiError> {
        let width = ty.size_of();
        if bytes.len() % width != 0 {
            return Err(SenseiError::Wire(format!(
                "{} bytes is not a whole number of {ty:?} values",
                bytes.len()
            )));
        }
        fn unpack<T, const N: usize>(bytes: &[u8], f: impl Fn([u8; N]) -> T) -> Arc<[T]>
        where
            [u8; N]: bytemuck::Pod,
        {
            bytes
                .chunks_exact(N)
                .map(|c| f(bytemuck::pod_read_unaligned(c)))
                .collect()
        }
        let values = match ty {
            ScalarType::F32 => ArrayValues::F32(unpack(bytes, f32::from_le_bytes)),
            ScalarType::F64 => ArrayValues::F64(unpack(bytes, f64::from_le_bytes)),
            ScalarType::I32 => ArrayValues::I32(unpack(bytes, i32::from_le_bytes)),
            ScalarType::I64 => ArrayValues::I64(unpack(bytes, i64::from_le_bytes)),
            ScalarType::U8 => ArrayValues::U8(Arc::from(bytes)),
        };
        Ok(values)
    }
}

impl From<Vec<f32>> for ArrayValues {
    fn from(v: Vec<f32>) -> Self {
        ArrayValues::F32(v.into())
    }
}
impl From<Vec<f64>> for ArrayValues {
    fn from(v: Vec<f64>) -> Self {
        ArrayValues::F64(v.into())
    }
}
impl From<Vec<i32>> for ArrayValues {
    fn from(v: Vec<i32>) -> Self {
        ArrayValues::I32(v.into())
    }
}
impl From<Vec<i64>> for ArrayValues {
    fn from(v: Vec<i64>) -> Self {
        ArrayValues::I64(v.into())
    }
}
impl From<Vec<u8>> for ArrayValues {
    fn from(v: Vec<u8>) -> Self {
        ArrayValues::U8(v.into())
    }
}
impl From<Arc<[f32]>> for ArrayValues {
    fn from(v: Arc<[f32]>) -> Self {
        ArrayValues::F32(v)
    }
}
impl From<Arc<[f64]>> for ArrayValues {
    fn from(v: Arc<[f64]>) -> Self {
        ArrayValues::F64(v)
    }
}
impl From<Arc<[i32]>> for ArrayValues {
    fn from(v: Arc<[i32]>) -> Self {
        ArrayValues::I32(v)
    }
}
impl From<Arc<[i64]>> for ArrayValues {
    fn from(v: Arc<[i64]>) -> Self {
        ArrayValues::I64(v)
    }
}
impl From<Arc<[u8]>> for ArrayValues {
    fn from(v: Arc<[u8]>) -> Self {
        ArrayValues::U8(v)
    }
}

/// A named, centered array of `components`-tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldArray {
    pub name: String,
    pub association: Association,
    pub components: usize,
    pub values: ArrayValues,
}

impl FieldArray {
    pub fn new(
        name: impl Into<String>,
        association: Association,
        components: usize,
        values: impl Into<ArrayValues>,
    ) -> Self {
        Self {
            name: name.into(),
            association,
            components: components.max(1),
            values: values.into(),
        }
    }

    /// Single-component array.
    pub fn scalar(
        name: impl Into<String>,
        association: Association,
        values: impl Into<ArrayValues>,
    ) -> Self {
        Self::new(name, association, 1, values)
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.values.scalar_type()
    }

    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    /// Value of tuple `i`: the component itself for scalars, the Euclidean
    /// magnitude otherwise.
    pub fn tuple_value(&self, i: usize) -> Option<f64> {
        if self.components == 1 {
            return self.values.get_f64(i);
        }
        let base = i * self.components;
        let mut sum = 0.0;
        for c in 0..self.components {
            let x = self.values.get_f64(base + c)?;
            sum += x * x;
        }
        Some(sum.sqrt())
    }

    /// `(min, max)` over all tuples, `None` when empty.
    pub fn range(&self) -> Option<(f64, f64)> {
        (0..self.num_tuples())
            .filter_map(|i| self.tuple_value(i))
            .fold(None, |acc, x| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
    }
}
