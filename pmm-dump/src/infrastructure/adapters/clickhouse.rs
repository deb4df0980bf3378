// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! ClickHouse Adapter: the QAN `metrics` table,
//! row-range chunk planning, TSV (de)serialization of dynamically typed
//! columns.
//!
//! The `clickhouse` crate's typed `Row` derive assumes a schema known at
//! compile time; this table's column set is whatever `DESCRIBE TABLE`
//! reports at connect time, so rows are decoded through `JSONEachRow` and
//! mapped by name against the cached [`ColumnType`] vector instead. Session
//! timezone is pinned to UTC at connect time so every `DateTime` value
//! ClickHouse hands back is already a UTC string before archiving.
//!
//! Writes are buffered in
//! memory and executed as one multi-row `INSERT` in `finalize_writes`,
//! which is how ClickHouse's own atomicity actually works (one inserted
//! block is all-or-nothing).

use async_trait::async_trait;
use parking_lot::Mutex;
use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::source_adapter::SourceAdapter;
use pmm_dump_domain::value_objects::{Chunk, ChunkMeta, ColumnType, ColumnValue, SourceType};
use serde_json::Value as Json;

use crate::infrastructure::adapters::tsv_codec;

const TABLE: &str = "metrics";
const TS_COLUMN: &str = "period_start";

pub struct ClickHouseAdapter {
    client: clickhouse::Client,
    columns: Vec<(String, ColumnType)>,
    where_clause: Option<String>,
    start: Option<i64>,
    end: Option<i64>,
    pending_rows: Mutex<Vec<String>>,
}

impl ClickHouseAdapter {
    /// Opens one connection, pins the session to UTC, and caches column
    /// types via `DESCRIBE TABLE` on construction. `start`/`end` (unix
    /// seconds) are the export window, fixed for the adapter's lifetime so
    /// the row count `plan_chunks` counts against and the rows
    /// `read_chunks` pages through are filtered by the same `WHERE` clause.
    pub async fn connect(
        url: &str,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
        where_clause: Option<String>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> DumpResult<Self> {
        let mut client = clickhouse::Client::default()
            .with_url(url)
            .with_database(database)
            .with_option("session_timezone", "UTC");
        if let Some(user) = user {
            client = client.with_user(user);
        }
        if let Some(password) = password {
            client = client.with_password(password);
        }

        let columns = describe_columns(&client).await?;
        Ok(Self {
            client,
            columns,
            where_clause,
            start,
            end,
            pending_rows: Mutex::new(Vec::new()),
        })
    }

    fn where_sql(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(custom) = &self.where_clause {
            if !custom.trim().is_empty() {
                clauses.push(format!("({custom})"));
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            clauses.push(format!("{TS_COLUMN} BETWEEN toDateTime({start}) AND toDateTime({end})"));
        }
        if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        }
    }

    /// `splitIntoChunks`: counts rows matching the filter and emits
    /// `ceil(count/rows_per_chunk)` row-range [`ChunkMeta`]s with ascending
    /// `index`. A zero count returns an empty plan.
    pub async fn plan_chunks(&self, rows_per_chunk: u64) -> DumpResult<Vec<ChunkMeta>> {
        let where_sql = self.where_sql();
        let count: u64 = self
            .client
            .query(&format!("SELECT count() FROM {TABLE} WHERE {where_sql}"))
            .fetch_one()
            .await
            .map_err(ch_err)?;

        if count == 0 {
            return Ok(Vec::new());
        }
        let chunk_count = count.div_ceil(rows_per_chunk);
        Ok((0..chunk_count).map(|index| ChunkMeta::row_range(SourceType::ClickHouse, index, rows_per_chunk)).collect())
    }
}

#[async_trait]
impl SourceAdapter for ClickHouseAdapter {
    fn source(&self) -> SourceType {
        SourceType::ClickHouse
    }

    async fn read_chunks(&self, meta: ChunkMeta) -> DumpResult<Vec<Chunk>> {
        let offset = meta.index * meta.rows_len;
        let where_sql = self.where_sql();
        let column_list = self.columns.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT {column_list} FROM {TABLE} WHERE {where_sql} ORDER BY {TS_COLUMN}, queryid LIMIT {} OFFSET {offset} FORMAT JSONEachRow",
            meta.rows_len
        );
        let bytes = self.client.query(&sql).fetch_bytes("JSONEachRow").map_err(ch_err)?.collect().await.map_err(ch_err)?;
        let text = std::str::from_utf8(&bytes).map_err(|e| DumpError::corrupt_archive(format!("non-UTF8 ClickHouse row: {e}")))?;

        let mut lines = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let row: Json = serde_json::from_str(line)?;
            let values = self.row_from_json(&row)?;
            let rendered: Vec<String> = values.iter().map(tsv_codec::render_value).collect();
            lines.push(tsv_codec::write_row(&rendered));
        }

        let filename = format!("{}.tsv", meta.index);
        if lines.is_empty() {
            return Ok(vec![Chunk::new(meta, Vec::new(), filename)]);
        }
        Ok(vec![Chunk::new(meta, lines.join("\n").into_bytes(), filename)])
    }

    async fn write_chunk(&self, chunk: Chunk) -> DumpResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(&chunk.content).map_err(|e| DumpError::corrupt_archive(format!("non-UTF8 TSV chunk: {e}")))?;
        let types: Vec<ColumnType> = self.columns.iter().map(|(_, ty)| ty.clone()).collect();

        let mut tuples = Vec::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let values = tsv_codec::parse_row(line, &types)?;
            let rendered: Vec<String> = values.iter().map(render_literal).collect();
            tuples.push(format!("({})", rendered.join(",")));
        }

        self.pending_rows.lock().extend(tuples);
        Ok(())
    }

    async fn finalize_writes(&self) -> DumpResult<()> {
        let tuples = std::mem::take(&mut *self.pending_rows.lock());
        if tuples.is_empty() {
            return Ok(());
        }
        let column_list = self.columns.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT INTO {TABLE} ({column_list}) VALUES {}", tuples.join(","));
        self.client.query(&sql).execute().await.map_err(ch_err)
    }
}

impl ClickHouseAdapter {
    fn row_from_json(&self, row: &Json) -> DumpResult<Vec<ColumnValue>> {
        self.columns
            .iter()
            .map(|(name, ty)| {
                let field = row.get(name).ok_or_else(|| DumpError::corrupt_archive(format!("missing column `{name}` in ClickHouse row")))?;
                json_to_column_value(field, ty)
            })
            .collect()
    }
}

fn json_to_column_value(value: &Json, ty: &ColumnType) -> DumpResult<ColumnValue> {
    match ty {
        ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => json_as_i64(value, ty).map(ColumnValue::Int),
        ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => json_as_u64(value, ty).map(ColumnValue::UInt),
        ColumnType::Float32 | ColumnType::Float64 => json_as_f64(value, ty).map(ColumnValue::Float),
        ColumnType::String => Ok(ColumnValue::String(json_as_str(value, ty)?.to_string())),
        ColumnType::Time => {
            let s = json_as_str(value, ty)?;
            let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| DumpError::corrupt_archive(format!("invalid ClickHouse DateTime `{s}`: {e}")))?;
            Ok(ColumnValue::Time(naive.and_utc()))
        }
        ColumnType::Slice(inner) => {
            let array = value
                .as_array()
                .ok_or_else(|| DumpError::corrupt_archive(format!("expected {} array, got {value}", ty.name())))?;
            array.iter().map(|v| json_to_column_value(v, inner)).collect::<DumpResult<Vec<_>>>().map(ColumnValue::Slice)
        }
    }
}

// ClickHouse's JSONEachRow renders 64-bit integers as strings to dodge
// JavaScript precision limits, so numeric fields accept either shape.
fn json_as_i64(value: &Json, ty: &ColumnType) -> DumpResult<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| DumpError::corrupt_archive(format!("expected {}, got {value}", ty.name())))
}

fn json_as_u64(value: &Json, ty: &ColumnType) -> DumpResult<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| DumpError::corrupt_archive(format!("expected {}, got {value}", ty.name())))
}

fn json_as_f64(value: &Json, ty: &ColumnType) -> DumpResult<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| DumpError::corrupt_archive(format!("expected {}, got {value}", ty.name())))
}

fn json_as_str<'a>(value: &'a Json, ty: &ColumnType) -> DumpResult<&'a str> {
    value.as_str().ok_or_else(|| DumpError::corrupt_archive(format!("expected {}, got {value}", ty.name())))
}

/// Renders one value as a ClickHouse SQL literal for the batched `INSERT`.
fn render_literal(value: &ColumnValue) -> String {
    match value {
        ColumnValue::Int(v) => v.to_string(),
        ColumnValue::UInt(v) => v.to_string(),
        ColumnValue::Float(v) => v.to_string(),
        ColumnValue::String(s) => format!("'{}'", escape_string_literal(s)),
        ColumnValue::Time(t) => format!("'{}'", t.format("%Y-%m-%d %H:%M:%S")),
        ColumnValue::Slice(values) => format!("[{}]", values.iter().map(render_literal).collect::<Vec<_>>().join(",")),
    }
}

fn escape_string_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn describe_columns(client: &clickhouse::Client) -> DumpResult<Vec<(String, ColumnType)>> {
    let bytes = client
        .query(&format!("DESCRIBE TABLE {TABLE} FORMAT TSV"))
        .fetch_bytes("TSV")
        .map_err(ch_err)?
        .collect()
        .await
        .map_err(ch_err)?;
    let text = std::str::from_utf8(&bytes).map_err(|e| DumpError::corrupt_archive(format!("non-UTF8 DESCRIBE TABLE response: {e}")))?;

    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next().ok_or_else(|| DumpError::corrupt_archive("DESCRIBE TABLE row missing column name"))?;
            let ch_type = fields.next().ok_or_else(|| DumpError::corrupt_archive("DESCRIBE TABLE row missing column type"))?;
            Ok((name.to_string(), parse_ch_type(ch_type)?))
        })
        .collect()
}

fn parse_ch_type(s: &str) -> DumpResult<ColumnType> {
    match s {
        "Int8" => Ok(ColumnType::Int8),
        "Int16" => Ok(ColumnType::Int16),
        "Int32" => Ok(ColumnType::Int32),
        "Int64" => Ok(ColumnType::Int64),
        "UInt8" => Ok(ColumnType::UInt8),
        "UInt16" => Ok(ColumnType::UInt16),
        "UInt32" => Ok(ColumnType::UInt32),
        "UInt64" => Ok(ColumnType::UInt64),
        "Float32" => Ok(ColumnType::Float32),
        "Float64" => Ok(ColumnType::Float64),
        other if other.starts_with("String") || other.starts_with("FixedString") => Ok(ColumnType::String),
        other if other.starts_with("DateTime") => Ok(ColumnType::Time),
        other if other.starts_with("Array(") && other.ends_with(')') => {
            let inner = &other[6..other.len() - 1];
            Ok(ColumnType::Slice(Box::new(parse_ch_type(inner)?)))
        }
        other => Err(DumpError::validation(format!("unknown type {other}"))),
    }
}

fn ch_err(e: clickhouse::error::Error) -> DumpError {
    DumpError::ClickHouse { code: 0, message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_and_nested_array_types() {
        assert_eq!(parse_ch_type("UInt64").unwrap(), ColumnType::UInt64);
        assert_eq!(parse_ch_type("DateTime('UTC')").unwrap(), ColumnType::Time);
        assert_eq!(parse_ch_type("Array(Float64)").unwrap(), ColumnType::Slice(Box::new(ColumnType::Float64)));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(parse_ch_type("Tuple(UInt8, String)").is_err());
    }

    #[test]
    fn decodes_stringified_uint64_from_json() {
        let value = Json::String("18446744073709551615".to_string());
        assert_eq!(json_to_column_value(&value, &ColumnType::UInt64).unwrap(), ColumnValue::UInt(u64::MAX));
    }

    #[test]
    fn decodes_naive_datetime_as_utc() {
        let value = Json::String("2024-03-05 12:30:00".to_string());
        let decoded = json_to_column_value(&value, &ColumnType::Time).unwrap();
        assert_eq!(tsv_codec::render_value(&decoded), "2024-03-05 12:30:00 +0000 UTC");
    }

    #[test]
    fn escapes_quotes_and_backslashes_in_string_literals() {
        assert_eq!(escape_string_literal(r"it's \ok"), r"it\'s \\ok");
    }
}
