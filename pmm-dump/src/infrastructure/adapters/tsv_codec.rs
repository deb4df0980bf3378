// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! TSV Codec: tab-delimited serialization of one
//! ClickHouse row. Decoding is driven entirely by an externally supplied
//! [`ColumnType`] vector - the codec never infers a column's kind from the
//! bytes on the wire.

use chrono::{DateTime, FixedOffset, Utc};
use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::value_objects::{ColumnType, ColumnValue};

/// `YYYY-MM-DD HH:MM:SS -ZZZZ TZN`. The trailing named
/// zone is descriptive only; `chrono` doesn't parse it, so it's stripped
/// before parsing and re-appended as `UTC` on write (every Time column is
/// normalized to UTC before archiving).
const TIME_LAYOUT_SUFFIX: &str = "UTC";

/// Serializes one row's fields as tab-separated text. Callers provide
/// already-stringified fields (the ClickHouse adapter renders each
/// `ColumnValue` before calling this); the writer accepts a
/// sequence of string fields.
pub fn write_row(fields: &[String]) -> String {
    fields.join("\t")
}

/// Renders one column value the way the writer represents it in a row:
/// scalars via `Display`, slices bracketed and comma-separated, times
/// through the shared layout.
pub fn render_value(value: &ColumnValue) -> String {
    match value {
        ColumnValue::Int(v) => v.to_string(),
        ColumnValue::UInt(v) => v.to_string(),
        ColumnValue::Float(v) => v.to_string(),
        ColumnValue::String(v) => v.clone(),
        ColumnValue::Time(t) => render_time(t),
        ColumnValue::Slice(values) => {
            let inner: Vec<String> = values.iter().map(render_value).collect();
            format!("[{}]", inner.join(","))
        }
    }
}

fn render_time(t: &DateTime<Utc>) -> String {
    format!("{} +0000 {}", t.format("%Y-%m-%d %H:%M:%S"), TIME_LAYOUT_SUFFIX)
}

/// Parses one tab-delimited row into typed values, guided by `columns`.
/// Fails with `columns mismatch` if the field count disagrees with the
/// column-type vector's length.
pub fn parse_row(line: &str, columns: &[ColumnType]) -> DumpResult<Vec<ColumnValue>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != columns.len() {
        return Err(DumpError::corrupt_archive(format!(
            "columns mismatch: row has {} fields, expected {}",
            fields.len(),
            columns.len()
        )));
    }
    fields
        .iter()
        .zip(columns.iter())
        .map(|(field, column)| parse_field(field, column))
        .collect()
}

fn parse_field(field: &str, column: &ColumnType) -> DumpResult<ColumnValue> {
    match column {
        ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => field
            .parse::<i64>()
            .map(ColumnValue::Int)
            .map_err(|e| DumpError::corrupt_archive(format!("invalid {}: {e}", column.name()))),
        ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => field
            .parse::<u64>()
            .map(ColumnValue::UInt)
            .map_err(|e| DumpError::corrupt_archive(format!("invalid {}: {e}", column.name()))),
        ColumnType::Float32 | ColumnType::Float64 => field
            .parse::<f64>()
            .map(ColumnValue::Float)
            .map_err(|e| DumpError::corrupt_archive(format!("invalid {}: {e}", column.name()))),
        ColumnType::String => Ok(ColumnValue::String(field.to_string())),
        ColumnType::Time => parse_time(field).map(ColumnValue::Time),
        ColumnType::Slice(inner) => parse_slice(field, inner),
    }
}

fn parse_time(field: &str) -> DumpResult<DateTime<Utc>> {
    // Strip the trailing named zone ("UTC"), which `chrono` has no format
    // specifier for; the numeric offset before it is authoritative.
    let numeric_part = field.rsplit_once(' ').map(|(head, _)| head).unwrap_or(field);
    let parsed = DateTime::parse_from_str(numeric_part, "%Y-%m-%d %H:%M:%S %z")
        .map_err(|e| DumpError::corrupt_archive(format!("invalid DateTime {field:?}: {e}")))?;
    if parsed.offset() != &FixedOffset::east_opt(0).unwrap() {
        return Err(DumpError::corrupt_archive(format!(
            "non-UTC timestamp {field:?}: import requires every Time column normalized to UTC before archiving"
        )));
    }
    Ok(parsed.with_timezone(&Utc))
}

fn parse_slice(field: &str, inner: &ColumnType) -> DumpResult<ColumnValue> {
    let trimmed = field
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| DumpError::corrupt_archive(format!("invalid slice {field:?}: missing brackets")))?;
    if trimmed.is_empty() {
        return Ok(ColumnValue::Slice(Vec::new()));
    }
    trimmed
        .split(',')
        .map(|element| parse_field(element, inner))
        .collect::<DumpResult<Vec<_>>>()
        .map(ColumnValue::Slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_every_scalar_kind() {
        let columns = vec![
            ColumnType::Int64,
            ColumnType::UInt32,
            ColumnType::Float64,
            ColumnType::String,
            ColumnType::Time,
        ];
        let time = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap();
        let values = vec![
            ColumnValue::Int(-42),
            ColumnValue::UInt(7),
            ColumnValue::Float(3.5),
            ColumnValue::String("hello world".into()),
            ColumnValue::Time(time),
        ];
        let rendered: Vec<String> = values.iter().map(render_value).collect();
        let line = write_row(&rendered);
        let parsed = parse_row(&line, &columns).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn round_trips_nested_slice() {
        let columns = vec![ColumnType::Slice(Box::new(ColumnType::Int64))];
        let values = vec![ColumnValue::Slice(vec![ColumnValue::Int(1), ColumnValue::Int(2), ColumnValue::Int(3)])];
        let line = write_row(&values.iter().map(render_value).collect::<Vec<_>>());
        assert_eq!(line, "[1,2,3]");
        assert_eq!(parse_row(&line, &columns).unwrap(), values);
    }

    #[test]
    fn empty_slice_round_trips() {
        let columns = vec![ColumnType::Slice(Box::new(ColumnType::String))];
        let line = "[]".to_string();
        let parsed = parse_row(&line, &columns).unwrap();
        assert_eq!(parsed, vec![ColumnValue::Slice(Vec::new())]);
    }

    #[test]
    fn rejects_mismatched_column_count() {
        let columns = vec![ColumnType::Int64];
        let err = parse_row("1\t2", &columns).unwrap_err();
        assert!(err.to_string().contains("columns mismatch"));
    }

    #[test]
    fn rejects_unparsable_numeric_field() {
        let columns = vec![ColumnType::Int64];
        assert!(parse_row("not-a-number", &columns).is_err());
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let columns = vec![ColumnType::Time];
        let line = "2024-03-05 12:30:00 +0300 MSK".to_string();
        let err = parse_row(&line, &columns).unwrap_err();
        assert!(err.to_string().contains("non-UTC"));
    }
}
