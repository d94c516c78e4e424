//! Fluent query builder.
//!
//! Mutators only append to the builder's cache; nothing is rendered until a
//! terminal operation (`get`, `insert`, `update`, ...) or one of the
//! `compile_*` accessors runs.
//!
//! ## Design
//!
//! - Placeholders are always named (`:age`, `:age_0`); the connection
//!   rewrites them into the backend's style right before execution.
//! - Identifiers are escaped and prefixed through the connection's
//!   [`IdentifierProtector`](crate::IdentifierProtector).
//! - A terminal operation consumes the cache it compiled: reads reset
//!   everything, writes keep the target table so the next write can reuse it.
//!
//! # Example
//! ```ignore
//! let rows = conn
//!     .table("users")
//!     .select("id, name")
//!     .where_("age >", 18)
//!     .limit(10)
//!     .get()?;
//! ```

mod cache;
mod compile;
mod operator;
mod select;
mod where_builder;
mod write;

pub use select::{JoinType, OrderDirection};
pub use where_builder::LikeSide;

use crate::bind::{BindRegistry, Statement};
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::{Escape, Protect};
use crate::row::ResultSet;
use cache::BuilderCache;
use std::fmt;
use std::sync::Arc;

/// Default number of rows per statement for the batch helpers.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Stateful statement accumulator.
///
/// Obtained from [`Connection::table`](crate::Connection::table) or
/// [`Connection::builder`](crate::Connection::builder); a detached builder
/// from [`QueryBuilder::subquery`] can only render SQL.
pub struct QueryBuilder<'c> {
    conn: Option<&'c mut Connection>,
    dialect: Arc<Dialect>,
    cache: BuilderCache,
    test_mode: bool,
    batch_size: usize,
    last_statement: Option<Statement>,
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("attached", &self.conn.is_some())
            .field("platform", &self.dialect.platform().name)
            .field("test_mode", &self.test_mode)
            .finish_non_exhaustive()
    }
}

impl QueryBuilder<'static> {
    /// A builder that renders SQL for `dialect` but cannot execute.
    pub fn new(dialect: Arc<Dialect>) -> Self {
        Self {
            conn: None,
            dialect,
            cache: BuilderCache::default(),
            test_mode: false,
            batch_size: DEFAULT_BATCH_SIZE,
            last_statement: None,
        }
    }
}

impl<'c> QueryBuilder<'c> {
    pub(crate) fn attached(conn: &'c mut Connection) -> Self {
        let dialect = conn.dialect();
        Self {
            conn: Some(conn),
            dialect,
            cache: BuilderCache::default(),
            test_mode: false,
            batch_size: DEFAULT_BATCH_SIZE,
            last_statement: None,
        }
    }

    /// Detached builder sharing this builder's dialect, for nested statements.
    pub fn subquery(&self) -> QueryBuilder<'static> {
        QueryBuilder::new(Arc::clone(&self.dialect))
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn is_detached(&self) -> bool {
        self.conn.is_none()
    }

    /// Compile terminal operations without executing or resetting them.
    pub fn test_mode(&mut self, enabled: bool) -> &mut Self {
        self.test_mode = enabled;
        self
    }

    /// Rows per statement for `insert_batch`, `update_batch` and `replace_batch`.
    pub fn batch_size(&mut self, size: usize) -> &mut Self {
        self.batch_size = size.max(1);
        self
    }

    /// Last statement compiled by a terminal operation.
    pub fn last_statement(&self) -> Option<&Statement> {
        self.last_statement.as_ref()
    }

    /// Current bind values.
    pub fn binds(&self) -> &BindRegistry {
        &self.cache.binds
    }

    /// Throw away everything accumulated so far.
    pub fn reset_query(&mut self) -> &mut Self {
        self.cache.reset_getter();
        self
    }

    // ==================== Internal helpers ====================

    fn ensure_executable(&self) -> DbResult<()> {
        if self.test_mode || self.conn.is_some() {
            Ok(())
        } else {
            Err(DbError::invalid(
                "a detached sub-query builder cannot execute statements",
            ))
        }
    }

    /// Run `statement`, or just record it in test mode.
    fn dispatch(&mut self, statement: Statement) -> DbResult<ResultSet> {
        self.last_statement = Some(statement.clone());
        if self.test_mode {
            return Ok(ResultSet::empty());
        }
        match self.conn.as_deref_mut() {
            Some(conn) => conn.run(&statement),
            None => Err(DbError::invalid(
                "a detached sub-query builder cannot execute statements",
            )),
        }
    }

    fn protects_by_default(&self) -> bool {
        self.dialect.protector().protects_by_default()
    }

    fn resolve(&self, escape: Escape) -> bool {
        escape.resolve(self.protects_by_default())
    }

    /// Protect a column reference against the aliases tracked so far.
    fn protect_column(&self, item: &str, escape: bool) -> String {
        self.dialect.protector().protect(
            item,
            Protect::column().escape(Escape::from(escape)),
            &self.cache.aliases,
        )
    }

    fn protect_table(&self, item: &str, escape: bool) -> String {
        self.dialect.protector().protect(
            item,
            Protect::table().escape(Escape::from(escape)),
            &self.cache.aliases,
        )
    }

    fn escape_alias(&self, alias: &str) -> String {
        self.dialect.protector().escape_identifiers(alias)
    }

    /// Compile a detached builder's SELECT and fold its binds into ours.
    fn absorb_subquery(&mut self, mut sub: QueryBuilder<'_>) -> Option<String> {
        match sub.compile_select(true) {
            Ok(statement) => Some(self.cache.binds.absorb(statement.binds, &statement.sql)),
            Err(err) => {
                self.cache.record_error(err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
