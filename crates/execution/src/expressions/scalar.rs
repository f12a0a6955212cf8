use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array,
    Int32Array, Int64Array, StringArray, UInt8Array, UInt16Array, UInt32Array, UInt64Array,
    new_null_array,
};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{
    Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use arrow_schema::DataType;
use fdset_common::{DatasetError, Result};

/// A single typed value, used for literals and partition keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int8(_) => DataType::Int8,
            ScalarValue::Int16(_) => DataType::Int16,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::UInt8(_) => DataType::UInt8,
            ScalarValue::UInt16(_) => DataType::UInt16,
            ScalarValue::UInt32(_) => DataType::UInt32,
            ScalarValue::UInt64(_) => DataType::UInt64,
            ScalarValue::Float32(_) => DataType::Float32,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Repeats the value `len` times.
    pub fn to_array(&self, len: usize) -> ArrayRef {
        match self {
            ScalarValue::Null => new_null_array(&DataType::Null, len),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; len])),
            ScalarValue::Int8(v) => Arc::new(Int8Array::from(vec![*v; len])),
            ScalarValue::Int16(v) => Arc::new(Int16Array::from(vec![*v; len])),
            ScalarValue::Int32(v) => Arc::new(Int32Array::from(vec![*v; len])),
            ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
            ScalarValue::UInt8(v) => Arc::new(UInt8Array::from(vec![*v; len])),
            ScalarValue::UInt16(v) => Arc::new(UInt16Array::from(vec![*v; len])),
            ScalarValue::UInt32(v) => Arc::new(UInt32Array::from(vec![*v; len])),
            ScalarValue::UInt64(v) => Arc::new(UInt64Array::from(vec![*v; len])),
            ScalarValue::Float32(v) => Arc::new(Float32Array::from(vec![*v; len])),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![*v; len])),
            ScalarValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
        }
    }

    /// Repeats the value `len` times as an array of `data_type`; nulls become
    /// a typed null array.
    pub fn to_array_of_type(&self, data_type: &DataType, len: usize) -> Result<ArrayRef> {
        if self.is_null() {
            return Ok(new_null_array(data_type, len));
        }
        let arr = self.to_array(len);
        if arr.data_type() == data_type {
            return Ok(arr);
        }
        cast_strict(&arr, data_type)
    }

    /// Reads the value at `row`. A null slot yields [`ScalarValue::Null`].
    pub fn try_from_array(array: &dyn Array, row: usize) -> Result<Self> {
        if row >= array.len() {
            return Err(DatasetError::Expression(format!(
                "row {row} out of bounds for array of length {}",
                array.len()
            )));
        }
        if array.is_null(row) {
            return Ok(ScalarValue::Null);
        }
        let v = match array.data_type() {
            DataType::Null => ScalarValue::Null,
            DataType::Boolean => ScalarValue::Boolean(array.as_boolean().value(row)),
            DataType::Int8 => ScalarValue::Int8(array.as_primitive::<Int8Type>().value(row)),
            DataType::Int16 => ScalarValue::Int16(array.as_primitive::<Int16Type>().value(row)),
            DataType::Int32 => ScalarValue::Int32(array.as_primitive::<Int32Type>().value(row)),
            DataType::Int64 => ScalarValue::Int64(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt8 => ScalarValue::UInt8(array.as_primitive::<UInt8Type>().value(row)),
            DataType::UInt16 => {
                ScalarValue::UInt16(array.as_primitive::<UInt16Type>().value(row))
            }
            DataType::UInt32 => {
                ScalarValue::UInt32(array.as_primitive::<UInt32Type>().value(row))
            }
            DataType::UInt64 => {
                ScalarValue::UInt64(array.as_primitive::<UInt64Type>().value(row))
            }
            DataType::Float32 => {
                ScalarValue::Float32(array.as_primitive::<Float32Type>().value(row))
            }
            DataType::Float64 => {
                ScalarValue::Float64(array.as_primitive::<Float64Type>().value(row))
            }
            DataType::Utf8 => ScalarValue::Utf8(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => {
                ScalarValue::Utf8(array.as_string::<i64>().value(row).to_string())
            }
            other => {
                return Err(DatasetError::Unsupported(format!(
                    "scalar values of type {other:?} are not supported"
                )));
            }
        };
        Ok(v)
    }

    /// Converts to `data_type`, failing when the value does not fit or parse.
    pub fn cast_to(&self, data_type: &DataType) -> Result<Self> {
        if self.is_null() || &self.data_type() == data_type {
            return Ok(self.clone());
        }
        let arr = cast_strict(&self.to_array(1), data_type)?;
        Self::try_from_array(arr.as_ref(), 0)
    }

    /// Parses a path segment into a value of `data_type`.
    pub fn parse_as(text: &str, data_type: &DataType) -> Result<Self> {
        ScalarValue::Utf8(text.to_string())
            .cast_to(data_type)
            .map_err(|_| {
                DatasetError::Expression(format!("cannot parse '{text}' as {data_type:?}"))
            })
    }
}

impl ScalarValue {
    fn as_i128(&self) -> Option<i128> {
        match *self {
            ScalarValue::Int8(v) => Some(v.into()),
            ScalarValue::Int16(v) => Some(v.into()),
            ScalarValue::Int32(v) => Some(v.into()),
            ScalarValue::Int64(v) => Some(v.into()),
            ScalarValue::UInt8(v) => Some(v.into()),
            ScalarValue::UInt16(v) => Some(v.into()),
            ScalarValue::UInt32(v) => Some(v.into()),
            ScalarValue::UInt64(v) => Some(v.into()),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            ScalarValue::Float32(v) => Some(v.into()),
            ScalarValue::Float64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }
}

fn cast_strict(arr: &ArrayRef, data_type: &DataType) -> Result<ArrayRef> {
    let opts = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(arr, data_type, &opts).map_err(|e| {
        DatasetError::Expression(format!(
            "cannot cast {:?} to {data_type:?}: {e}",
            arr.data_type()
        ))
    })
}

impl PartialOrd for ScalarValue {
    /// Values of the same variant are ordered, as are any two numerics.
    /// Nulls are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use ScalarValue::*;
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
                return a.partial_cmp(&b);
            }
            return self.as_f64()?.partial_cmp(&other.as_f64()?);
        }
        match (self, other) {
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Int8(a), Int8(b)) => a.partial_cmp(b),
            (Int16(a), Int16(b)) => a.partial_cmp(b),
            (Int32(a), Int32(b)) => a.partial_cmp(b),
            (Int64(a), Int64(b)) => a.partial_cmp(b),
            (UInt8(a), UInt8(b)) => a.partial_cmp(b),
            (UInt16(a), UInt16(b)) => a.partial_cmp(b),
            (UInt32(a), UInt32(b)) => a.partial_cmp(b),
            (UInt64(a), UInt64(b)) => a.partial_cmp(b),
            (Float32(a), Float32(b)) => a.partial_cmp(b),
            (Float64(a), Float64(b)) => a.partial_cmp(b),
            (Utf8(a), Utf8(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Int8(v) => write!(f, "{v}"),
            ScalarValue::Int16(v) => write!(f, "{v}"),
            ScalarValue::Int32(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::UInt8(v) => write!(f, "{v}"),
            ScalarValue::UInt16(v) => write!(f, "{v}"),
            ScalarValue::UInt32(v) => write!(f, "{v}"),
            ScalarValue::UInt64(v) => write!(f, "{v}"),
            ScalarValue::Float32(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_native {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for ScalarValue {
                fn from(v: $t) -> Self {
                    ScalarValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Boolean,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
);

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, Int32Array};
    use arrow_schema::DataType;

    use super::ScalarValue;

    #[test]
    fn parse_detects_bad_segments() {
        assert_eq!(
            ScalarValue::parse_as("2018", &DataType::Int32).expect("int"),
            ScalarValue::Int32(2018)
        );
        assert_eq!(
            ScalarValue::parse_as("1.5", &DataType::Float64).expect("float"),
            ScalarValue::Float64(1.5)
        );
        assert!(ScalarValue::parse_as("CA", &DataType::Int32).is_err());
        assert!(ScalarValue::parse_as("300", &DataType::Int8).is_err());
    }

    #[test]
    fn numerics_of_different_widths_are_ordered() {
        use std::cmp::Ordering;
        assert_eq!(
            ScalarValue::Int32(2019).partial_cmp(&ScalarValue::Float64(2018.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            ScalarValue::Int32(7).partial_cmp(&ScalarValue::UInt64(7)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            ScalarValue::Int32(1).partial_cmp(&ScalarValue::Utf8("1".to_string())),
            None
        );
    }

    #[test]
    fn reads_values_and_nulls_from_arrays() {
        let arr = Int32Array::from(vec![Some(4), None]);
        assert_eq!(
            ScalarValue::try_from_array(&arr, 0).expect("value"),
            ScalarValue::Int32(4)
        );
        assert!(ScalarValue::try_from_array(&arr, 1).expect("null").is_null());
        assert!(ScalarValue::try_from_array(&arr, 2).is_err());
    }

    #[test]
    fn ordering_is_defined_within_a_type_only() {
        assert!(ScalarValue::Int32(1) < ScalarValue::Int32(2));
        assert!(ScalarValue::from("a") < ScalarValue::from("b"));
        assert_eq!(
            ScalarValue::Int32(1).partial_cmp(&ScalarValue::Int64(1)),
            None
        );
        assert_eq!(ScalarValue::Null.partial_cmp(&ScalarValue::Null), None);
    }

    #[test]
    fn typed_null_arrays_keep_their_type() {
        let arr = ScalarValue::Null
            .to_array_of_type(&DataType::Utf8, 3)
            .expect("nulls");
        assert_eq!(arr.data_type(), &DataType::Utf8);
        assert_eq!(arr.null_count(), 3);
        let arr = ScalarValue::Int64(9)
            .to_array_of_type(&DataType::Int32, 2)
            .expect("cast");
        assert_eq!(arr.data_type(), &DataType::Int32);
    }
}
