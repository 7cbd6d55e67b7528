use crate::prelude::*;
use ndarray::{ArrayD, IxDyn};

/// Element type of a [`TypedArray`]. The discriminant is the code used when a
/// data type is passed as an integer op argument.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    I32 = 2,
    I64 = 3,
}

pub const ALL_FLOATS: &[DataType] = &[DataType::F32, DataType::F64];
pub const ALL_INTS: &[DataType] = &[DataType::I32, DataType::I64];
pub const ALL_INDICES: &[DataType] = ALL_INTS;
pub const INTS_AND_FLOATS: &[DataType] = &[DataType::F32, DataType::F64, DataType::I32, DataType::I64];
pub const ANY: &[DataType] = INTS_AND_FLOATS;

impl DataType {
    pub fn from_code(code: i64) -> Result<Self> {
        Ok(match code {
            0 => DataType::F32,
            1 => DataType::F64,
            2 => DataType::I32,
            3 => DataType::I64,
            other => return Err(NNError::InvalidDataType(format!("unknown data type code {}", other))),
        })
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Dynamically shaped array carrying its element type, the unit of data
/// exchanged with custom ops.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
}

impl TypedArray {
    pub fn zeros(shape: &[usize], data_type: DataType) -> Self {
        let dim = IxDyn(shape);
        match data_type {
            DataType::F32 => TypedArray::F32(ArrayD::zeros(dim)),
            DataType::F64 => TypedArray::F64(ArrayD::zeros(dim)),
            DataType::I32 => TypedArray::I32(ArrayD::zeros(dim)),
            DataType::I64 => TypedArray::I64(ArrayD::zeros(dim)),
        }
    }

    /// Casts an `f64` array to `data_type`. Integer targets truncate toward zero.
    pub fn from_f64(array: ArrayD<f64>, data_type: DataType) -> Self {
        match data_type {
            DataType::F64 => TypedArray::F64(array),
            DataType::F32 => TypedArray::F32(array.mapv(|v| v as f32)),
            DataType::I32 => TypedArray::I32(array.mapv(|v| v as i32)),
            DataType::I64 => TypedArray::I64(array.mapv(|v| v as i64)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TypedArray::F32(_) => DataType::F32,
            TypedArray::F64(_) => DataType::F64,
            TypedArray::I32(_) => DataType::I32,
            TypedArray::I64(_) => DataType::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TypedArray::F32(a) => a.shape(),
            TypedArray::F64(a) => a.shape(),
            TypedArray::I32(a) => a.shape(),
            TypedArray::I64(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            TypedArray::F32(a) => a.mapv(f64::from),
            TypedArray::F64(a) => a.clone(),
            TypedArray::I32(a) => a.mapv(f64::from),
            TypedArray::I64(a) => a.mapv(|v| v as f64),
        }
    }

    pub fn cast_to(self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self;
        }
        TypedArray::from_f64(self.to_f64(), data_type)
    }

    /// First element in logical order, as `f64`.
    pub fn first_f64(&self) -> Option<f64> {
        match self {
            TypedArray::F32(a) => a.iter().next().map(|&v| f64::from(v)),
            TypedArray::F64(a) => a.iter().next().copied(),
            TypedArray::I32(a) => a.iter().next().map(|&v| f64::from(v)),
            TypedArray::I64(a) => a.iter().next().map(|&v| v as f64),
        }
    }

    /// Applies `f` to every element in place, computing in `f64`.
    pub fn map_inplace(&mut self, f: impl Fn(f64) -> f64) {
        match self {
            TypedArray::F32(a) => a.mapv_inplace(|v| f(f64::from(v)) as f32),
            TypedArray::F64(a) => a.mapv_inplace(f),
            TypedArray::I32(a) => a.mapv_inplace(|v| f(f64::from(v)) as i32),
            TypedArray::I64(a) => a.mapv_inplace(|v| f(v as f64) as i64),
        }
    }

    /// Converts into a 2-D `f64` array, casting when needed.
    pub fn into_array2(self) -> Result<Array2<f64>> {
        let array = match self {
            TypedArray::F64(a) => a,
            other => other.to_f64(),
        };
        Ok(array.into_dimensionality::<Ix2>()?)
    }
}

impl From<ArrayD<f64>> for TypedArray {
    fn from(array: ArrayD<f64>) -> Self {
        TypedArray::F64(array)
    }
}

impl From<Array2<f64>> for TypedArray {
    fn from(array: Array2<f64>) -> Self {
        TypedArray::F64(array.into_dyn())
    }
}

impl From<ArrayD<f32>> for TypedArray {
    fn from(array: ArrayD<f32>) -> Self {
        TypedArray::F32(array)
    }
}

impl From<ArrayD<i32>> for TypedArray {
    fn from(array: ArrayD<i32>) -> Self {
        TypedArray::I32(array)
    }
}

impl From<ArrayD<i64>> for TypedArray {
    fn from(array: ArrayD<i64>) -> Self {
        TypedArray::I64(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cast_truncates_toward_zero() {
        let a = TypedArray::from(array![[1.7, -2.9]].into_dyn());
        let cast = a.cast_to(DataType::I32);
        assert_eq!(cast, TypedArray::I32(array![[1, -2]].into_dyn()));
    }

    #[test]
    fn data_type_codes() {
        for dt in INTS_AND_FLOATS {
            assert_eq!(DataType::from_code(dt.code()).unwrap(), *dt);
        }
        assert!(DataType::from_code(17).is_err());
    }

    #[test]
    fn into_array2_rejects_other_ranks() {
        let a = TypedArray::zeros(&[2, 2, 2], DataType::F64);
        assert!(matches!(a.into_array2(), Err(NNError::Shape(_))));
    }
}
