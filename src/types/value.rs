//! Scalar values

use crate::error::{QueryError, Result};
use crate::types::LogicalType;
use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, StringArray,
};
use arrow::datatypes::{
    DataType, Date32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
};
use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// A single typed value
///
/// Ordering is only meaningful between values of the same type (or NULL,
/// which sorts first).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(OrderedFloat<f64>),
    Varchar(String),
    /// Days since the unix epoch
    Date(i32),
}

impl ScalarValue {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            ScalarValue::Null => LogicalType::SqlNull,
            ScalarValue::Boolean(_) => LogicalType::Boolean,
            ScalarValue::TinyInt(_) => LogicalType::TinyInt,
            ScalarValue::SmallInt(_) => LogicalType::SmallInt,
            ScalarValue::Integer(_) => LogicalType::Integer,
            ScalarValue::BigInt(_) => LogicalType::BigInt,
            ScalarValue::Double(_) => LogicalType::Double,
            ScalarValue::Varchar(_) => LogicalType::Varchar,
            ScalarValue::Date(_) => LogicalType::Date,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn double(v: f64) -> Self {
        ScalarValue::Double(OrderedFloat(v))
    }

    pub fn varchar(v: impl Into<String>) -> Self {
        ScalarValue::Varchar(v.into())
    }

    /// Zero of a numeric type, used to detect division by zero
    pub fn zero_of(ty: LogicalType) -> Result<Self> {
        Ok(match ty {
            LogicalType::TinyInt => ScalarValue::TinyInt(0),
            LogicalType::SmallInt => ScalarValue::SmallInt(0),
            LogicalType::Integer => ScalarValue::Integer(0),
            LogicalType::BigInt => ScalarValue::BigInt(0),
            LogicalType::Double => ScalarValue::double(0.0),
            other => {
                return Err(QueryError::Type(format!("{} is not a numeric type", other)))
            }
        })
    }

    /// Widen an integral value to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::TinyInt(v) => Some(*v as i64),
            ScalarValue::SmallInt(v) => Some(*v as i64),
            ScalarValue::Integer(v) => Some(*v as i64),
            ScalarValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Double(v) => Some(v.into_inner()),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Repeat this value `len` times as an array
    pub fn to_array(&self, len: usize) -> ArrayRef {
        match self {
            ScalarValue::Null => new_null_array(&DataType::Null, len),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; len])),
            ScalarValue::TinyInt(v) => Arc::new(Int8Array::from(vec![*v; len])),
            ScalarValue::SmallInt(v) => Arc::new(Int16Array::from(vec![*v; len])),
            ScalarValue::Integer(v) => Arc::new(Int32Array::from(vec![*v; len])),
            ScalarValue::BigInt(v) => Arc::new(Int64Array::from(vec![*v; len])),
            ScalarValue::Double(v) => Arc::new(Float64Array::from(vec![v.into_inner(); len])),
            ScalarValue::Varchar(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
            ScalarValue::Date(v) => Arc::new(Date32Array::from(vec![*v; len])),
        }
    }

    /// Repeat this value `len` times as an array of the given type; NULL
    /// becomes a typed null array.
    pub fn to_array_of_type(&self, ty: LogicalType, len: usize) -> ArrayRef {
        if self.is_null() {
            new_null_array(&ty.physical_type(), len)
        } else {
            self.to_array(len)
        }
    }

    /// Read the value at `row` of an array
    pub fn try_from_array(array: &dyn Array, row: usize) -> Result<Self> {
        if row >= array.len() {
            return Err(QueryError::Internal(format!(
                "row {} out of range for array of length {}",
                row,
                array.len()
            )));
        }
        if array.is_null(row) {
            return Ok(ScalarValue::Null);
        }
        let value = match array.data_type() {
            DataType::Null => ScalarValue::Null,
            DataType::Boolean => ScalarValue::Boolean(array.as_boolean().value(row)),
            DataType::Int8 => ScalarValue::TinyInt(array.as_primitive::<Int8Type>().value(row)),
            DataType::Int16 => ScalarValue::SmallInt(array.as_primitive::<Int16Type>().value(row)),
            DataType::Int32 => ScalarValue::Integer(array.as_primitive::<Int32Type>().value(row)),
            DataType::Int64 => ScalarValue::BigInt(array.as_primitive::<Int64Type>().value(row)),
            DataType::Float64 => {
                ScalarValue::double(array.as_primitive::<Float64Type>().value(row))
            }
            DataType::Utf8 => ScalarValue::Varchar(array.as_string::<i32>().value(row).to_string()),
            DataType::Date32 => ScalarValue::Date(array.as_primitive::<Date32Type>().value(row)),
            other => {
                return Err(QueryError::NotImplemented(format!(
                    "Unsupported physical type {:?}",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// Build an array of `ty` from values; every non-null value must be of `ty`
    pub fn iter_to_array(
        ty: LogicalType,
        values: impl IntoIterator<Item = ScalarValue>,
    ) -> Result<ArrayRef> {
        fn mismatch(ty: LogicalType, v: &ScalarValue) -> QueryError {
            QueryError::Internal(format!("value {} does not have type {}", v, ty))
        }

        macro_rules! build {
            ($array:ty, $variant:ident, $conv:expr) => {{
                let items = values
                    .into_iter()
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::$variant(x) => Ok(Some($conv(x))),
                        other => Err(mismatch(ty, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(<$array>::from(items)) as ArrayRef
            }};
        }

        let array = match ty {
            LogicalType::SqlNull => {
                let len = values.into_iter().count();
                new_null_array(&DataType::Null, len)
            }
            LogicalType::Boolean => build!(BooleanArray, Boolean, |x: bool| x),
            LogicalType::TinyInt => build!(Int8Array, TinyInt, |x: i8| x),
            LogicalType::SmallInt => build!(Int16Array, SmallInt, |x: i16| x),
            LogicalType::Integer => build!(Int32Array, Integer, |x: i32| x),
            LogicalType::BigInt => build!(Int64Array, BigInt, |x: i64| x),
            LogicalType::Double => {
                build!(Float64Array, Double, |x: OrderedFloat<f64>| x.into_inner())
            }
            LogicalType::Varchar => build!(StringArray, Varchar, |x: String| x),
            LogicalType::Date => build!(Date32Array, Date, |x: i32| x),
        };
        Ok(array)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::TinyInt(v) => write!(f, "{}", v),
            ScalarValue::SmallInt(v) => write!(f, "{}", v),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::BigInt(v) => write!(f, "{}", v),
            ScalarValue::Double(v) => write!(f, "{}", v),
            ScalarValue::Varchar(v) => write!(f, "'{}'", v),
            ScalarValue::Date(v) => write!(f, "DATE({})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back_from_array() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![Some(7), None, Some(-1)]));
        assert_eq!(
            ScalarValue::try_from_array(array.as_ref(), 0).unwrap(),
            ScalarValue::Integer(7)
        );
        assert!(ScalarValue::try_from_array(array.as_ref(), 1).unwrap().is_null());
        assert!(ScalarValue::try_from_array(array.as_ref(), 3).is_err());
    }

    #[test]
    fn test_iter_to_array_with_nulls() {
        let array = ScalarValue::iter_to_array(
            LogicalType::Varchar,
            vec![ScalarValue::varchar("a"), ScalarValue::Null],
        )
        .unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.null_count(), 1);
        assert_eq!(array.data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_iter_to_array_rejects_mismatch() {
        let result =
            ScalarValue::iter_to_array(LogicalType::BigInt, vec![ScalarValue::Boolean(true)]);
        assert!(matches!(result, Err(QueryError::Internal(_))));
    }

    #[test]
    fn test_null_sorts_first() {
        let mut values = vec![ScalarValue::BigInt(2), ScalarValue::Null, ScalarValue::BigInt(1)];
        values.sort();
        assert_eq!(
            values,
            vec![ScalarValue::Null, ScalarValue::BigInt(1), ScalarValue::BigInt(2)]
        );
    }
}
