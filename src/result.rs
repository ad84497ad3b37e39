//! Materialized query results.
//!
//! Drains a [`Cursor`] into ordered [`Row`]s and encodes the same rows as a
//! JSON array of objects.
//!
//! Rows keep column order. Their JSON objects list keys in byte order, and
//! `<`, `>` and `&` are written as `\u003c`, `\u003e` and `\u0026` so the
//! blob can be embedded in HTML unchanged.

use std::collections::BTreeMap;
use std::io;

use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::Cursor;
use crate::error::{QueryError, Result};
use crate::value::Value;

/// One result row: column name to normalized value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from column names and raw values of equal length.
    pub fn from_values(columns: &[String], values: &[Value]) -> Self {
        let mut row = Self {
            cells: Vec::with_capacity(columns.len()),
        };
        for (column, value) in columns.iter().zip(values) {
            row.insert(column.clone(), value.normalize());
        }
        row
    }

    /// Sets `column`. A repeated name keeps its first position and takes the
    /// new value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let sorted: BTreeMap<&str, &str> = self.iter().collect();
        sorted.serialize(serializer)
    }
}

/// Compact JSON that escapes HTML-significant characters and the two
/// Unicode line separators.
struct HtmlSafeFormatter;

impl Formatter for HtmlSafeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(&fragment.as_bytes()[start..idx])?;
            writer.write_all(escaped.as_bytes())?;
            start = idx + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

fn encode_rows(rows: &[Row]) -> std::result::Result<String, serde_json::Error> {
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, HtmlSafeFormatter);
    rows.serialize(&mut serializer)?;
    // The formatter only ever writes ASCII escapes around valid UTF-8 fragments.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// The complete outcome of one successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOutput {
    /// Rows in the order the engine emitted them.
    pub rows: Vec<Row>,

    /// `rows` encoded as a JSON array of objects with sorted keys.
    pub result_json: String,
}

impl QueryOutput {
    /// Encodes `rows` and pairs them with their JSON form.
    pub fn from_rows(rows: Vec<Row>) -> Result<Self> {
        let result_json = encode_rows(&rows).map_err(|e| QueryError::Encode(e.to_string()))?;
        Ok(Self { rows, result_json })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Reads every row from `cursor`.
///
/// Column names are read once up front. Any cell read failure fails the whole
/// invocation, as does a fault reported after the last row.
pub fn materialize(cursor: &mut dyn Cursor, cancel: &CancellationToken) -> Result<QueryOutput> {
    let columns = cursor
        .column_names()
        .map_err(|e| QueryError::columns(e.to_string()))?;

    let mut rows = Vec::with_capacity(16);
    while cursor.advance() {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let values = cursor
            .read_row()
            .map_err(|e| QueryError::scan(e.to_string()))?;
        if values.len() != columns.len() {
            return Err(QueryError::scan(format!(
                "expected {} values, got {}",
                columns.len(),
                values.len()
            )));
        }

        rows.push(Row::from_values(&columns, &values));
    }

    if let Some(err) = cursor.terminal_error() {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        return Err(QueryError::row_iteration(err.to_string()));
    }

    debug!(rows = rows.len(), columns = columns.len(), "materialized query result");
    QueryOutput::from_rows(rows)
}
