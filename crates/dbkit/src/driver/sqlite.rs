//! SQLite backend on top of `rusqlite`.
//!
//! `database` is a file path, or `:memory:` (or empty) for a private
//! in-memory database.

use super::{Driver, DriverError, Link, LinkResult, Platform};
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::Value;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{ToSql, params_from_iter};
use std::sync::Arc;

/// Driver registered under the `sqlite` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn tag(&self) -> &'static str {
        "sqlite"
    }

    fn platform(&self) -> Platform {
        Platform::sqlite()
    }

    fn connect(&self, config: &Config) -> DbResult<Box<dyn Link>> {
        if config.encrypt.as_ref().is_some_and(|e| e.verify) {
            return Err(DbError::Connection(
                "sqlite does not support verified TLS connections".to_string(),
            ));
        }
        let path = config.database.trim();
        let conn = if path.is_empty() || path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| DbError::Connection(format!("sqlite open '{path}': {e}")))?;

        Ok(Box::new(SqliteLink {
            conn: Some(conn),
            affected: 0,
        }))
    }
}

struct SqliteLink {
    conn: Option<rusqlite::Connection>,
    affected: u64,
}

impl SqliteLink {
    fn conn(&self) -> LinkResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DriverError::new("SQLITE_MISUSE", "connection is closed"))
    }
}

fn driver_error(err: rusqlite::Error) -> DriverError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => DriverError::new(
            failure.extended_code.to_string(),
            message.clone().unwrap_or_else(|| err.to_string()),
        ),
        _ => DriverError::new("SQLITE_ERROR", err.to_string()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
            Value::Json(j) => ToSqlOutput::Owned(SqliteValue::Text(j.to_string())),
            Value::DateTime(dt) => ToSqlOutput::Owned(SqliteValue::Text(
                dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            )),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl Link for SqliteLink {
    fn execute(&mut self, sql: &str, params: &[Value]) -> LinkResult<u64> {
        let changed = self
            .conn()?
            .execute(sql, params_from_iter(params.iter()))
            .map_err(driver_error)?;
        self.affected = changed as u64;
        Ok(self.affected)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> LinkResult<Vec<Row>> {
        let (out, changed) = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(sql).map_err(driver_error)?;
            let readonly = stmt.readonly();
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt
                .query(params_from_iter(params.iter()))
                .map_err(driver_error)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(driver_error)? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(read_value(row.get_ref(i).map_err(driver_error)?));
                }
                out.push(Row::new(Arc::clone(&columns), values));
            }
            // `changes()` still reports the previous write after a plain read
            let changed = if readonly { 0 } else { conn.changes() as u64 };
            (out, changed)
        };
        self.affected = changed;
        Ok(out)
    }

    fn begin(&mut self) -> LinkResult<()> {
        self.conn()?.execute_batch("BEGIN").map_err(driver_error)
    }

    fn commit(&mut self) -> LinkResult<()> {
        self.conn()?.execute_batch("COMMIT").map_err(driver_error)
    }

    fn rollback(&mut self) -> LinkResult<()> {
        self.conn()?.execute_batch("ROLLBACK").map_err(driver_error)
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn last_insert_id(&mut self) -> Option<Value> {
        let id = self.conn().ok()?.last_insert_rowid();
        (id != 0).then_some(Value::Int(id))
    }

    fn ping(&mut self) -> bool {
        self.conn()
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(driver_error)
            })
            .is_ok()
    }

    fn server_version(&mut self) -> LinkResult<String> {
        Ok(rusqlite::version().to_string())
    }

    fn close(mut self: Box<Self>) {
        if let Some(conn) = self.conn.take()
            && let Err((_, err)) = conn.close()
        {
            tracing::warn!(target: "dbkit", error = %err, "sqlite close failed");
        }
    }
}
