//! Convenient imports for typical `dbkit` usage.
//!
//! ```ignore
//! use dbkit::prelude::*;
//! ```

pub use crate::record;
pub use crate::{
    Config, Connection, ConnectionPool, DbError, DbResult, Escape, FromRow, JoinType, LikeSide,
    OrderDirection, QueryBuilder, Record, ResultSet, Row, Value,
};
