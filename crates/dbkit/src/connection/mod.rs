//! Connection lifecycle, statement execution and the query log.
//!
//! A [`Connection`] owns one live [`Link`] plus everything that hangs off it:
//! the [`Dialect`] builders render with, the transaction state and the
//! metadata caches. It is a single-owner value; hand whole connections to
//! workers rather than sharing one.
//!
//! # Example
//!
//! ```ignore
//! use dbkit::{Config, Connection};
//!
//! let mut conn = Connection::open(Config::new("sqlite").database(":memory:"))?;
//! conn.simple_query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.table("users").insert([("name", "Jo")])?;
//! let rows = conn.table("users").get()?;
//! ```

mod metadata;
mod transaction;

use crate::bind::{BindRegistry, Statement};
use crate::builder::QueryBuilder;
use crate::config::Config;
use crate::dialect::Dialect;
use crate::driver::{Driver, Link, Platform};
use crate::error::{DbError, DbResult};
use crate::ident::Protect;
use crate::pool::BackendRegistry;
use crate::query::{Query, QueryType, returns_rows, truncate_sql};
use crate::row::ResultSet;
use crate::value::Value;
use chrono::Utc;
use metadata::MetadataCache;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use transaction::TransactionState;

/// Default byte limit for SQL written to the `dbkit.sql` log target.
pub const DEFAULT_LOG_SQL_BYTES: usize = 1024;

/// A live database connection.
pub struct Connection {
    /// Primary configuration, failover list included.
    config: Config,
    /// The configuration that produced the current link.
    active: Config,
    driver: Arc<dyn Driver>,
    link: Option<Box<dyn Link>>,
    dialect: Arc<Dialect>,
    debug: bool,
    log_sql_bytes: usize,
    queries: Vec<Query>,
    last_query: Option<Query>,
    query_count: usize,
    total_duration: Duration,
    affected_rows: u64,
    trans: TransactionState,
    metadata: MetadataCache,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.driver.tag())
            .field("target", &self.active.label())
            .field("connected", &self.link.is_some())
            .field("debug", &self.debug)
            .field("query_count", &self.query_count)
            .field("transaction_depth", &self.trans.depth)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect using the built-in backend registered under `config.driver`.
    pub fn open(config: Config) -> DbResult<Self> {
        let driver = BackendRegistry::default().resolve(&config.driver)?;
        Self::connect(config, driver)
    }

    /// Connect through `driver`: the primary configuration first, then each
    /// failover entry in order. Fails with [`DbError::Connection`] when none
    /// of them produces a link.
    pub fn connect(config: Config, driver: Arc<dyn Driver>) -> DbResult<Self> {
        config.validate()?;
        let dialect = Arc::new(Dialect::from_config(&config, driver.platform()));
        let mut conn = Self {
            active: config.clone(),
            debug: config.debug_enabled,
            trans: TransactionState::new(config.trans_enabled, config.strict_on),
            config,
            driver,
            link: None,
            dialect,
            log_sql_bytes: DEFAULT_LOG_SQL_BYTES,
            queries: Vec::new(),
            last_query: None,
            query_count: 0,
            total_duration: Duration::ZERO,
            affected_rows: 0,
            metadata: MetadataCache::default(),
        };
        conn.establish()?;
        Ok(conn)
    }

    fn establish(&mut self) -> DbResult<()> {
        let candidates: Vec<Config> = std::iter::once(self.config.clone())
            .chain(self.config.failover.iter().cloned())
            .collect();

        let mut failures = Vec::with_capacity(candidates.len());
        for (attempt, candidate) in candidates.into_iter().enumerate() {
            match self.driver.connect(&candidate) {
                Ok(link) => {
                    info!(
                        target: "dbkit",
                        driver = self.driver.tag(),
                        target_db = %candidate.label(),
                        failover = attempt > 0,
                        "connected"
                    );
                    self.dialect = Arc::new(Dialect::from_config(&candidate, self.driver.platform()));
                    self.active = candidate;
                    self.link = Some(link);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        target: "dbkit",
                        driver = self.driver.tag(),
                        target_db = %candidate.label(),
                        attempt,
                        error = %err,
                        "connection attempt failed"
                    );
                    failures.push(format!("{}: {err}", candidate.label()));
                }
            }
        }

        Err(DbError::Connection(format!(
            "unable to connect to the database ({})",
            failures.join("; ")
        )))
    }

    // ==================== Builders ====================

    /// A builder targeting `table`.
    pub fn table(&mut self, table: &str) -> QueryBuilder<'_> {
        let mut builder = QueryBuilder::attached(self);
        builder.from(table);
        builder
    }

    /// A builder with no table selected yet.
    pub fn builder(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::attached(self)
    }

    pub(crate) fn dialect(&self) -> Arc<Dialect> {
        Arc::clone(&self.dialect)
    }

    // ==================== Execution ====================

    /// Run a compiled statement.
    pub fn run(&mut self, statement: &Statement) -> DbResult<ResultSet> {
        self.execute_template(&statement.sql, &statement.binds)
    }

    /// Run raw SQL with `:name` binds. Reads go through the row-returning
    /// path, everything else through execute.
    pub fn query(&mut self, sql: &str, binds: &BindRegistry) -> DbResult<ResultSet> {
        self.execute_template(sql, binds)
    }

    /// Run raw SQL without binds.
    pub fn simple_query(&mut self, sql: &str) -> DbResult<ResultSet> {
        self.execute_template(sql, &BindRegistry::new())
    }

    fn execute_template(&mut self, template: &str, binds: &BindRegistry) -> DbResult<ResultSet> {
        let dialect = Arc::clone(&self.dialect);
        let platform = dialect.platform();
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DbError::Connection("not connected".to_string()))?;

        let swapped = dialect.protector().swap_prefixes_in(template);
        let (sql, params) = binds.render(&swapped, platform.placeholder, |value| {
            render_literal(platform, |raw| link.escape_string(raw), value)
        });

        let query_type = QueryType::from_sql(&sql);
        let started_at = Utc::now();
        let timer = Instant::now();
        let outcome = if returns_rows(&sql) {
            match link.query(&sql, &params) {
                Ok(rows) if query_type.is_write() => {
                    Ok(ResultSet::new(rows).with_affected_rows(link.affected_rows()))
                }
                other => other.map(ResultSet::new),
            }
        } else {
            link.execute(&sql, &params).map(ResultSet::written)
        };
        let duration = timer.elapsed();

        self.query_count += 1;
        self.total_duration += duration;

        match outcome {
            Ok(result) => {
                self.affected_rows = result.affected_rows();
                debug!(
                    target: "dbkit.sql",
                    query_type = ?query_type,
                    param_count = params.len(),
                    elapsed_us = duration.as_micros() as u64,
                    affected_rows = self.affected_rows,
                    sql = %truncate_sql(&sql, self.log_sql_bytes),
                );
                self.record(Query::new(
                    template.to_string(),
                    binds.clone(),
                    sql,
                    started_at,
                    duration,
                    self.affected_rows,
                    None,
                ));
                if query_type.invalidates_metadata() {
                    self.metadata.clear();
                }
                Ok(result)
            }
            Err(err) => {
                error!(
                    target: "dbkit.sql",
                    query_type = ?query_type,
                    code = %err.code,
                    message = %err.message,
                    sql = %truncate_sql(&sql, self.log_sql_bytes),
                    "statement failed"
                );
                self.affected_rows = 0;
                self.record(Query::new(
                    template.to_string(),
                    binds.clone(),
                    sql.clone(),
                    started_at,
                    duration,
                    0,
                    Some(err.clone()),
                ));
                if self.trans.depth > 0 {
                    self.trans.status = false;
                }
                if self.debug {
                    self.unwind_transactions();
                    return Err(DbError::statement(err.code, err.message, sql));
                }
                Ok(ResultSet::failed(err))
            }
        }
    }

    fn record(&mut self, query: Query) {
        if self.active.save_queries {
            self.queries.push(query.clone());
        }
        self.last_query = Some(query);
    }

    // ==================== Query log ====================

    /// Most recent statement, kept even when `saveQueries` is off.
    pub fn last_query(&self) -> Option<&Query> {
        self.last_query.as_ref()
    }

    /// Every statement run so far, when `saveQueries` is on.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Statements run so far, logged or not.
    pub fn query_count(&self) -> usize {
        self.query_count
    }

    /// Time spent inside the backend across all statements.
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Rows touched by the most recent statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Id generated by the most recent INSERT, if the backend reports one.
    pub fn insert_id(&mut self) -> Option<Value> {
        self.link.as_mut().and_then(|link| link.last_insert_id())
    }

    /// Byte limit for SQL written to the `dbkit.sql` log target.
    pub fn set_log_sql_bytes(&mut self, max_bytes: usize) {
        self.log_sql_bytes = max_bytes;
    }

    // ==================== State ====================

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Liveness probe; false when disconnected.
    pub fn ping(&mut self) -> bool {
        self.link.as_mut().is_some_and(|link| link.ping())
    }

    /// Close the link. Open transaction state is dropped with it.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.close();
            info!(target: "dbkit", target_db = %self.active.label(), "disconnected");
        }
        self.trans.reset();
    }

    /// Drop the current link and connect again, failover included.
    pub fn reconnect(&mut self) -> DbResult<()> {
        self.disconnect();
        self.establish()
    }

    /// Point the connection (and its failover entries) at another database.
    pub fn set_database(&mut self, database: &str) -> DbResult<()> {
        self.config.database = database.to_string();
        for failover in &mut self.config.failover {
            failover.database = database.to_string();
        }
        self.invalidate_metadata();
        self.reconnect()
    }

    /// Surface statement failures as errors instead of failed results.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn platform(&self) -> &Platform {
        self.dialect.platform()
    }

    /// The configuration that produced the current link.
    pub fn config(&self) -> &Config {
        &self.active
    }

    pub fn driver_tag(&self) -> &'static str {
        self.driver.tag()
    }

    /// Server version string reported by the backend.
    pub fn version(&mut self) -> DbResult<String> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DbError::Connection("not connected".to_string()))?;
        link.server_version()
            .map_err(|e| DbError::statement(e.code, e.message, "<server version>"))
    }

    // ==================== Escaping ====================

    /// Render `value` as a SQL literal.
    pub fn escape(&self, value: impl Into<Value>) -> String {
        let value = value.into();
        render_literal(self.dialect.platform(), |raw| self.escape_string(raw), &value)
    }

    /// Escape `raw` for use between single quotes.
    pub fn escape_string(&self, raw: &str) -> String {
        match &self.link {
            Some(link) => link.escape_string(raw),
            None => raw.replace('\'', "''"),
        }
    }

    /// [`escape_string`](Self::escape_string) plus LIKE wildcard escaping.
    pub fn escape_like_string(&self, raw: &str) -> String {
        self.escape_string(&self.dialect.escape_like_string(raw))
    }

    pub fn escape_identifiers(&self, item: &str) -> String {
        self.dialect.protector().escape_identifiers(item)
    }

    pub fn protect_identifiers(&self, item: &str, opts: Protect) -> String {
        self.dialect.protector().protect(item, opts, &[] as &[&str])
    }

    pub fn prefix_table(&self, table: &str) -> String {
        self.dialect.protector().prefix_table(table)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.trans.depth > 0 {
            warn!(
                target: "dbkit",
                depth = self.trans.depth,
                "connection dropped with an open transaction"
            );
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

/// Render a value as a literal for `platform`, escaping strings through `escape`.
fn render_literal(platform: &Platform, escape: impl Fn(&str) -> String, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => platform.bool_literal(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("'{}'", escape(s)),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Json(json) => format!("'{}'", escape(&json.to_string())),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
    }
}

#[cfg(test)]
mod tests;
