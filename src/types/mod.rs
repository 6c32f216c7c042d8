//! Logical and physical type system

mod value;

pub use value::ScalarValue;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of rows a chunk holds by default
pub const VECTOR_SIZE: usize = 1024;

/// SQL-level column type
///
/// Every logical type is stored with exactly one physical representation
/// (an arrow [`DataType`]); operators compare physical types when checking
/// chunk invariants and logical types when type-checking plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    SqlNull,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Varchar,
    Date,
}

impl LogicalType {
    /// Physical storage type of this logical type
    pub fn physical_type(&self) -> DataType {
        match self {
            LogicalType::SqlNull => DataType::Null,
            LogicalType::Boolean => DataType::Boolean,
            LogicalType::TinyInt => DataType::Int8,
            LogicalType::SmallInt => DataType::Int16,
            LogicalType::Integer => DataType::Int32,
            LogicalType::BigInt => DataType::Int64,
            LogicalType::Double => DataType::Float64,
            LogicalType::Varchar => DataType::Utf8,
            LogicalType::Date => DataType::Date32,
        }
    }

    /// Map a physical type back to its logical type
    pub fn from_physical(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Null => Some(LogicalType::SqlNull),
            DataType::Boolean => Some(LogicalType::Boolean),
            DataType::Int8 => Some(LogicalType::TinyInt),
            DataType::Int16 => Some(LogicalType::SmallInt),
            DataType::Int32 => Some(LogicalType::Integer),
            DataType::Int64 => Some(LogicalType::BigInt),
            DataType::Float64 => Some(LogicalType::Double),
            DataType::Utf8 => Some(LogicalType::Varchar),
            DataType::Date32 => Some(LogicalType::Date),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || *self == LogicalType::Double
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::SqlNull => "NULL",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::TinyInt => "TINYINT",
            LogicalType::SmallInt => "SMALLINT",
            LogicalType::Integer => "INTEGER",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
            LogicalType::Date => "DATE",
        };
        write!(f, "{}", name)
    }
}
