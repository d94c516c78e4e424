//! # dbkit
//!
//! A fluent SQL query builder with identifier protection, connection
//! failover and nested transactions, over pluggable blocking backends.
//!
//! ## Features
//!
//! - **Fluent builder**: `select / from / join / where / group_by / having / order_by / limit`
//!   plus INSERT, UPDATE, REPLACE, DELETE and their batch variants
//! - **Identifier protection**: table prefixes and platform escape characters
//!   applied to every table and column reference, aliases respected
//! - **Named binds**: values never reach the SQL text; `:name` placeholders are
//!   rewritten into the backend's style right before execution
//! - **Failover**: an ordered list of fallback configurations tried on connect
//! - **Nested transactions**: only the outermost level reaches the backend,
//!   with strict or forgiving failure propagation between groups
//! - **Backends**: SQLite (`sqlite` feature) and PostgreSQL (`postgres` feature)
//!   behind the [`Driver`] / [`Link`] traits
//!
//! ## Example
//!
//! ```ignore
//! use dbkit::prelude::*;
//!
//! let mut conn = Connection::open(Config::new("sqlite").database(":memory:"))?;
//! conn.simple_query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")?;
//!
//! conn.table("users").insert(record! { "name" => "Jo", "age" => 31 })?;
//!
//! let adults = conn
//!     .table("users")
//!     .select("id, name")
//!     .where_("age >=", 18)
//!     .order_by("name", OrderDirection::Asc)
//!     .get()?;
//! ```
//!
//! ## Logging
//!
//! Events go through `tracing`: lifecycle events under the `dbkit` target,
//! statements under `dbkit.sql`. The crate installs no subscriber.

pub mod bind;
pub mod bracket;
pub mod builder;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod ident;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod row;
pub mod value;

pub use bind::{BindRegistry, Statement};
pub use bracket::BracketTracker;
pub use builder::{DEFAULT_BATCH_SIZE, JoinType, LikeSide, OrderDirection, QueryBuilder};
pub use config::{Config, EncryptConfig, EscapeCharacter, PoolConfig};
pub use connection::{Connection, DEFAULT_LOG_SQL_BYTES};
pub use dialect::Dialect;
pub use driver::{
    DatePart, Driver, DriverError, FieldListing, Link, LimitStyle, LinkResult, PlaceholderStyle,
    Platform,
};
pub use error::{DbError, DbResult};
pub use ident::{Escape, IdentifierProtector, Protect};
pub use pool::{BackendRegistry, ConnectionPool};
pub use query::{Query, QueryType};
pub use row::{FromRow, ResultSet, Row};
pub use value::{FromValue, Record, Value, into_record};

#[cfg(feature = "postgres")]
pub use driver::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use driver::sqlite::SqliteDriver;
