//! Backend driver seam.
//!
//! A [`Driver`] turns a [`Config`] into a live [`Link`]; the link exposes the
//! handful of blocking primitives the connection layer needs. Nothing above
//! this module knows a backend's wire protocol.

pub mod platform;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod mock;

pub use platform::{DatePart, FieldListing, LimitStyle, PlaceholderStyle, Platform};

use crate::config::Config;
use crate::error::DbResult;
use crate::row::Row;
use crate::value::Value;
use std::fmt;

/// Backend-native failure of one primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: String,
    pub message: String,
}

impl DriverError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for DriverError {}

pub type LinkResult<T> = Result<T, DriverError>;

/// Constructor bundle for one backend.
pub trait Driver: Send + Sync {
    /// Registry tag, e.g. `"sqlite"`.
    fn tag(&self) -> &'static str;

    /// Dialect description used by the builder.
    fn platform(&self) -> Platform;

    /// Open a native link. Called once per attempt (primary, then each failover).
    fn connect(&self, config: &Config) -> DbResult<Box<dyn Link>>;
}

/// A live native handle.
///
/// `sql` is already rendered in the platform's placeholder style and `params`
/// holds the positional values in slot order.
pub trait Link: Send {
    fn execute(&mut self, sql: &str, params: &[Value]) -> LinkResult<u64>;

    fn query(&mut self, sql: &str, params: &[Value]) -> LinkResult<Vec<Row>>;

    /// Escape a raw string for inclusion between single quotes.
    fn escape_string(&self, raw: &str) -> String {
        raw.replace('\'', "''")
    }

    fn begin(&mut self) -> LinkResult<()>;

    fn commit(&mut self) -> LinkResult<()>;

    fn rollback(&mut self) -> LinkResult<()>;

    /// Rows touched by the most recent write.
    fn affected_rows(&self) -> u64;

    fn last_insert_id(&mut self) -> Option<Value>;

    /// Cheap liveness probe.
    fn ping(&mut self) -> bool;

    fn server_version(&mut self) -> LinkResult<String>;

    /// Release the native handle.
    fn close(self: Box<Self>);
}
