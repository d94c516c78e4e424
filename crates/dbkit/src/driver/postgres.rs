//! PostgreSQL backend on top of `tokio-postgres`.
//!
//! Each link owns a current-thread tokio runtime. The connection task is
//! spawned on it and makes progress whenever a call blocks on the runtime,
//! so every primitive is a plain blocking round trip.

use super::{Driver, DriverError, Link, LinkResult, Platform};
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::Value;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::Display;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, Column, NoTls};
use tracing::warn;
use uuid::Uuid;

const DEFAULT_PORT: u16 = 5432;
const LASTVAL_SAVEPOINT: &str = "dbkit_lastval";
/// SQLSTATE `data_exception`, reported when a column cannot be decoded.
const DECODE_STATE: &str = "22000";

/// Driver registered under the `postgres` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    fn tag(&self) -> &'static str {
        "postgres"
    }

    fn platform(&self) -> Platform {
        Platform::postgres()
    }

    fn connect(&self, config: &Config) -> DbResult<Box<dyn Link>> {
        if config.encrypt.as_ref().is_some_and(|e| e.verify) {
            return Err(DbError::Connection(
                "the built-in postgres driver only opens plain connections".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::Connection(format!("runtime: {e}")))?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.hostname)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .application_name("dbkit");
        if !config.username.is_empty() {
            pg.user(&config.username);
        }
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        if !config.database.is_empty() {
            pg.dbname(&config.database);
        }

        let (client, connection) = runtime
            .block_on(pg.connect(NoTls))
            .map_err(|e| DbError::Connection(e.to_string()))?;
        runtime.spawn(async move {
            if let Err(err) = connection.await {
                warn!(target: "dbkit", error = %err, "postgres connection closed");
            }
        });

        Ok(Box::new(PostgresLink {
            runtime,
            client,
            affected: 0,
            in_transaction: false,
        }))
    }
}

struct PostgresLink {
    runtime: Runtime,
    client: Client,
    affected: u64,
    in_transaction: bool,
}

fn driver_error(err: tokio_postgres::Error) -> DriverError {
    match err.as_db_error() {
        Some(db_err) => DriverError::new(db_err.code().code(), db_err.message()),
        None => DriverError::new(
            err.code().map_or("08000", |state| state.code()),
            err.to_string(),
        ),
    }
}

fn decode_error(column: &Column, detail: impl Display) -> DriverError {
    DriverError::new(
        DECODE_STATE,
        format!("column `{}` of type {}: {detail}", column.name(), column.type_()),
    )
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::String(s) => match *ty {
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
                Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
                Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
                Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Json(j) => match *ty {
                Type::TEXT | Type::VARCHAR => j.to_string().to_sql(ty, out),
                _ => j.to_sql(ty, out),
            },
            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                Type::DATE => dt.date_naive().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Column `idx` as a [`Value`]. Types without a conversion fail with
/// [`DECODE_STATE`] rather than a connection error.
fn read_value(row: &tokio_postgres::Row, idx: usize) -> LinkResult<Value> {
    let column = &row.columns()[idx];
    decode(row, idx, column.type_())
        .map_err(|err| decode_error(column, err))?
        .ok_or_else(|| decode_error(column, "no conversion available; cast it to text"))
}

fn decode(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Option<Value>, tokio_postgres::Error> {
    let value: Value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| d.to_string())
            .into(),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|t| t.to_string())
            .into(),
        // Exact decimal text; `f64` and `i64` parse it back through `FromValue`.
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|d| d.to_string())
            .into(),
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map(|u| u.to_string())
            .into(),
        Type::INET => row
            .try_get::<_, Option<IpAddr>>(idx)?
            .map(|ip| ip.to_string())
            .into(),
        _ if <String as FromSql>::accepts(ty) => row.try_get::<_, Option<String>>(idx)?.into(),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

impl PostgresLink {
    fn params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }

    fn batch(&mut self, sql: &str) -> LinkResult<()> {
        self.runtime
            .block_on(self.client.batch_execute(sql))
            .map_err(driver_error)
    }
}

impl Link for PostgresLink {
    fn execute(&mut self, sql: &str, params: &[Value]) -> LinkResult<u64> {
        let refs = Self::params(params);
        let affected = self
            .runtime
            .block_on(self.client.execute(sql, &refs))
            .map_err(driver_error)?;
        self.affected = affected;
        Ok(affected)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> LinkResult<Vec<Row>> {
        let refs = Self::params(params);
        let rows = self
            .runtime
            .block_on(self.client.query(sql, &refs))
            .map_err(driver_error)?;
        self.affected = rows.len() as u64;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns: Arc<[String]> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        rows.iter()
            .map(|row| {
                let values = (0..columns.len())
                    .map(|idx| read_value(row, idx))
                    .collect::<LinkResult<Vec<_>>>()?;
                Ok::<_, DriverError>(Row::new(Arc::clone(&columns), values))
            })
            .collect()
    }

    fn begin(&mut self) -> LinkResult<()> {
        self.batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> LinkResult<()> {
        self.batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> LinkResult<()> {
        self.batch("ROLLBACK")?;
        self.in_transaction = false;
        Ok(())
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    /// `LASTVAL()`, guarded by a savepoint inside transactions since it
    /// errors when no sequence was used in this session.
    fn last_insert_id(&mut self) -> Option<Value> {
        if self.in_transaction {
            self.batch(&format!("SAVEPOINT {LASTVAL_SAVEPOINT}")).ok()?;
        }
        let id = self
            .runtime
            .block_on(self.client.query_one("SELECT LASTVAL()", &[]))
            .and_then(|row| row.try_get::<_, i64>(0));
        if self.in_transaction {
            let cleanup = if id.is_ok() {
                format!("RELEASE SAVEPOINT {LASTVAL_SAVEPOINT}")
            } else {
                format!("ROLLBACK TO SAVEPOINT {LASTVAL_SAVEPOINT}; RELEASE SAVEPOINT {LASTVAL_SAVEPOINT}")
            };
            if let Err(err) = self.batch(&cleanup) {
                warn!(target: "dbkit", error = %err, "lastval savepoint cleanup failed");
            }
        }
        id.ok().map(Value::Int)
    }

    fn ping(&mut self) -> bool {
        !self.client.is_closed()
            && self
                .runtime
                .block_on(self.client.simple_query("SELECT 1"))
                .is_ok()
    }

    fn server_version(&mut self) -> LinkResult<String> {
        let row = self
            .runtime
            .block_on(self.client.query_one("SHOW server_version", &[]))
            .map_err(driver_error)?;
        row.try_get::<_, String>(0).map_err(driver_error)
    }

    fn close(self: Box<Self>) {
        let PostgresLink { runtime, client, .. } = *self;
        drop(client);
        runtime.shutdown_background();
    }
}
