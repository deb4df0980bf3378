// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The column-type vector the TSV Codec is driven by,
//! and the typed values it produces.

use chrono::{DateTime, Utc};

/// One ClickHouse column's expected shape, as reported by
/// `SELECT * FROM metrics LIMIT 1` and cached by the ClickHouse adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    /// The layout `"YYYY-MM-DD HH:MM:SS -ZZZZ TZN"`.
    Time,
    /// A bracketed, comma-separated sequence of any of the above, e.g.
    /// `[1,2,3]`.
    Slice(Box<ColumnType>),
}

/// A single decoded field. `Slice` mirrors [`ColumnType::Slice`]'s nesting
/// so the writer can re-serialize without re-deriving the element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Time(DateTime<Utc>),
    Slice(Vec<ColumnValue>),
}

impl ColumnType {
    /// Human-readable name for the `unknown type` error path.
    pub fn name(&self) -> String {
        match self {
            ColumnType::Int8 => "Int8".into(),
            ColumnType::Int16 => "Int16".into(),
            ColumnType::Int32 => "Int32".into(),
            ColumnType::Int64 => "Int64".into(),
            ColumnType::UInt8 => "UInt8".into(),
            ColumnType::UInt16 => "UInt16".into(),
            ColumnType::UInt32 => "UInt32".into(),
            ColumnType::UInt64 => "UInt64".into(),
            ColumnType::Float32 => "Float32".into(),
            ColumnType::Float64 => "Float64".into(),
            ColumnType::String => "String".into(),
            ColumnType::Time => "DateTime".into(),
            ColumnType::Slice(inner) => format!("Array({})", inner.name()),
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self, ColumnType::Time)
    }
}
