//! Data type definitions for Tarn.
//!
//! This module defines the column types a mirrored table can declare.

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
}

impl DataType {
    /// Resolves a SQL type name, case-insensitively.
    ///
    /// ```
    /// use tarn_core::DataType;
    /// assert_eq!(DataType::from_sql_name("INTEGER"), Some(DataType::Int64));
    /// assert_eq!(DataType::from_sql_name("string"), Some(DataType::String));
    /// assert_eq!(DataType::from_sql_name("BLOB"), None);
    /// ```
    pub fn from_sql_name(name: &str) -> Option<Self> {
        const NAMES: &[(&str, DataType)] = &[
            ("INTEGER", DataType::Int64),
            ("INT", DataType::Int64),
            ("BIGINT", DataType::Int64),
            ("REAL", DataType::Float64),
            ("FLOAT", DataType::Float64),
            ("DOUBLE", DataType::Float64),
            ("TEXT", DataType::String),
            ("STRING", DataType::String),
            ("VARCHAR", DataType::String),
            ("BOOLEAN", DataType::Boolean),
            ("BOOL", DataType::Boolean),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, dt)| *dt)
    }

    /// Returns whether a value of type `got` may be stored in a column of this type.
    ///
    /// Integers widen into floating point columns.
    pub fn accepts(&self, got: DataType) -> bool {
        *self == got || (*self == DataType::Float64 && got == DataType::Int64)
    }
}
