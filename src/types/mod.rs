use serde::{Deserialize, Serialize};

mod value;
pub use value::*;

use crate::layout::ENTRY_SIZE;

/// A logical column type.
///
/// Nested types carry their child types; `Decimal` and `Blob` are logical
/// refinements that ride on an existing physical representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Decimal { width: u8, scale: u8 },
    Interval,
    Varchar,
    Blob,
    List(Box<DataType>),
    Struct(Vec<(String, DataType)>),
}

impl DataType {
    /// The physical representation backing this logical type.
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            DataType::Bool => PhysicalType::Bool,
            DataType::Int8 => PhysicalType::Int8,
            DataType::Int16 => PhysicalType::Int16,
            DataType::Int32 => PhysicalType::Int32,
            DataType::Int64 => PhysicalType::Int64,
            DataType::Int128 => PhysicalType::Int128,
            DataType::UInt8 => PhysicalType::UInt8,
            DataType::UInt16 => PhysicalType::UInt16,
            DataType::UInt32 => PhysicalType::UInt32,
            DataType::UInt64 => PhysicalType::UInt64,
            DataType::Float32 => PhysicalType::Float32,
            DataType::Float64 => PhysicalType::Float64,
            // Decimals are stored as their scaled integer mantissa, sized by
            // the decimal width.
            DataType::Decimal { width, .. } => match width {
                0..=4 => PhysicalType::Int16,
                5..=9 => PhysicalType::Int32,
                10..=18 => PhysicalType::Int64,
                _ => PhysicalType::Int128,
            },
            DataType::Interval => PhysicalType::Interval,
            DataType::Varchar | DataType::Blob => PhysicalType::Varchar,
            DataType::List(_) => PhysicalType::List,
            DataType::Struct(_) => PhysicalType::Struct,
        }
    }

    /// Whether values of this type carry child vectors.
    pub fn is_nested(&self) -> bool {
        matches!(
            self.physical_type(),
            PhysicalType::List | PhysicalType::Struct
        )
    }

    /// The element type of a list. Panics on non-list types.
    pub fn list_child(&self) -> &DataType {
        match self {
            DataType::List(child) => child,
            other => panic!("list_child on non-list type {other:?}"),
        }
    }

    /// The ordered `(name, type)` fields of a struct. Panics on non-struct
    /// types.
    pub fn struct_fields(&self) -> &[(String, DataType)] {
        match self {
            DataType::Struct(fields) => fields,
            other => panic!("struct_fields on non-struct type {other:?}"),
        }
    }
}

/// The closed set of physical representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Interval,
    Varchar,
    List,
    Struct,
}

impl PhysicalType {
    /// Bytes occupied by one entry of this physical type in a vector buffer.
    ///
    /// Struct vectors carry no payload of their own, only validity.
    pub const fn size(self) -> usize {
        match self {
            PhysicalType::Bool | PhysicalType::Int8 | PhysicalType::UInt8 => 1,
            PhysicalType::Int16 | PhysicalType::UInt16 => 2,
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float32 => 4,
            PhysicalType::Int64 | PhysicalType::UInt64 | PhysicalType::Float64 => 8,
            PhysicalType::Int128 | PhysicalType::Interval => 16,
            PhysicalType::Varchar | PhysicalType::List => ENTRY_SIZE,
            PhysicalType::Struct => 0,
        }
    }
}

/// Interval value: months, days and microseconds are independent components.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const fn new(months: i32, days: i32, micros: i64) -> Self {
        Interval {
            months,
            days,
            micros,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} months {} days {} us",
            self.months, self.days, self.micros
        )
    }
}
