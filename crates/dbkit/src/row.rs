//! Result rows and row mapping traits

use crate::driver::DriverError;
use crate::error::{DbError, DbResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One result row: shared column names plus the values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of a column, if the column exists.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed column access, returning [`DbError::Decode`] on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::decode(column, "no such column"))?;
        T::from_value(value).map_err(|e| DbError::decode(column, e))
    }

    /// Map the row onto a `Deserialize` type through a JSON object.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| DbError::decode("<row>", e.to_string()))
    }
}

/// Trait for types that can be built from a result row.
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> DbResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(row.clone())
    }
}

/// Rows returned by a read, or the outcome of a write.
///
/// When debug mode is off a failed statement still yields a `ResultSet`;
/// [`ResultSet::error`] then carries the backend failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<Row>,
    affected_rows: u64,
    error: Option<DriverError>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            affected_rows: 0,
            error: None,
        }
    }

    pub(crate) fn written(affected_rows: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows,
            error: None,
        }
    }

    /// Rows from a write with `RETURNING`, plus the link's change count.
    pub(crate) fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    pub(crate) fn failed(error: DriverError) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows: 0,
            error: Some(error),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&DriverError> {
        self.error.as_ref()
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Map every row through [`FromRow`].
    pub fn rows_as<T: FromRow>(&self) -> DbResult<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }

    /// Map every row through serde.
    pub fn deserialize_all<T: DeserializeOwned>(&self) -> DbResult<Vec<T>> {
        self.rows.iter().map(Row::deserialize).collect()
    }

    /// First column of the first row, typed.
    pub fn scalar<T: FromValue>(&self) -> DbResult<Option<T>> {
        match self.rows.first() {
            None => Ok(None),
            Some(row) => {
                let column = row.columns().first().cloned().unwrap_or_default();
                let value = row
                    .get_index(0)
                    .ok_or_else(|| DbError::decode(&column, "row has no columns"))?;
                T::from_value(value)
                    .map(Some)
                    .map_err(|e| DbError::decode(column, e))
            }
        }
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
