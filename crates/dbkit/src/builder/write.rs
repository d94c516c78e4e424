//! Set-lists and terminal operations.

use super::QueryBuilder;
use crate::bind::Statement;
use crate::error::DbResult;
use crate::ident::Escape;
use crate::row::ResultSet;
use crate::value::{Record, Value};
use tracing::warn;

impl<'c> QueryBuilder<'c> {
    // ==================== Set-list ====================

    /// Bind `value` to `column` for the next INSERT, UPDATE or REPLACE.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.set_with(column, value, Escape::Default)
    }

    pub fn set_with(
        &mut self,
        column: &str,
        value: impl Into<Value>,
        escape: impl Into<Escape>,
    ) -> &mut Self {
        let column = column.trim();
        let escape = self.resolve(escape.into());
        let protected = self.protect_column(column, escape);
        let placeholder = self.cache.binds.bind(column, value);
        self.cache.set_entry(protected, format!(":{placeholder}"));
        self
    }

    /// Assign a raw SQL expression, e.g. `set_raw("hits", "hits + 1")`.
    pub fn set_raw(&mut self, column: &str, expr: &str) -> &mut Self {
        let protected = self.protect_column(column.trim(), self.protects_by_default());
        self.cache.set_entry(protected, expr.trim().to_string());
        self
    }

    pub fn set_many<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (column, value) in values {
            self.set(column.as_ref(), value);
        }
        self
    }

    // ==================== Reads ====================

    /// Compile and run the SELECT, then start over.
    pub fn get(&mut self) -> DbResult<ResultSet> {
        self.ensure_executable()?;
        let statement = self.compile_select(!self.test_mode)?;
        self.dispatch(statement)
    }

    /// `from(table)`, AND every condition, apply paging, then [`get`](Self::get).
    pub fn get_where<I, K, V>(
        &mut self,
        table: &str,
        conditions: I,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> DbResult<ResultSet>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        if !table.trim().is_empty() {
            self.from(table);
        }
        self.where_map(conditions).limit(limit).offset(offset);
        self.get()
    }

    /// Rows in `table` (or the current table), ignoring conditions.
    pub fn count_all(&mut self, table: Option<&str>) -> DbResult<u64> {
        self.ensure_executable()?;
        let sql = self.render_count_all(table);
        if !self.test_mode {
            self.cache.reset_getter();
        }
        let result = self.dispatch(Statement::raw(sql?))?;
        Self::count_of(&result)
    }

    /// Rows the current SELECT would return.
    pub fn count_all_results(&mut self, reset: bool) -> DbResult<u64> {
        self.ensure_executable()?;
        let statement = self.compile_count_all_results(reset && !self.test_mode)?;
        let result = self.dispatch(statement)?;
        Self::count_of(&result)
    }

    fn count_of(result: &ResultSet) -> DbResult<u64> {
        let count = result.scalar::<i64>()?.unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ==================== Writes ====================

    /// INSERT the set-list plus `values` into the current table.
    pub fn insert<I, K, V>(&mut self, values: I) -> DbResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.set_many(values);
        self.ensure_executable()?;
        let statement = self.compile_insert(!self.test_mode)?;
        Ok(self.dispatch(statement)?.is_success())
    }

    /// REPLACE (delete-then-insert on key conflict) where the platform has it.
    pub fn replace<I, K, V>(&mut self, values: I) -> DbResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.set_many(values);
        self.ensure_executable()?;
        let statement = self.compile_replace(!self.test_mode)?;
        Ok(self.dispatch(statement)?.is_success())
    }

    /// UPDATE the current table with the set-list plus `values`, filtered by WHERE.
    pub fn update<I, K, V>(&mut self, values: I) -> DbResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.set_many(values);
        self.ensure_executable()?;
        let statement = self.compile_update(!self.test_mode)?;
        Ok(self.dispatch(statement)?.is_success())
    }

    /// DELETE matching rows. A DELETE without conditions is refused.
    pub fn delete(&mut self) -> DbResult<bool> {
        self.ensure_executable()?;
        let statement = self.compile_delete(!self.test_mode)?;
        Ok(self.dispatch(statement)?.is_success())
    }

    /// TRUNCATE, or `DELETE FROM` where the platform has no TRUNCATE.
    pub fn truncate(&mut self, table: Option<&str>) -> DbResult<bool> {
        self.run_clear(table, false)
    }

    /// `DELETE FROM table` with no conditions.
    pub fn empty_table(&mut self, table: Option<&str>) -> DbResult<bool> {
        self.run_clear(table, true)
    }

    fn run_clear(&mut self, table: Option<&str>, force_delete: bool) -> DbResult<bool> {
        self.ensure_executable()?;
        let sql = self.render_truncate(table, force_delete)?;
        if !self.test_mode {
            self.cache.reset_modifier();
        }
        Ok(self.dispatch(Statement::raw(sql))?.is_success())
    }

    // ==================== Batches ====================

    /// INSERT `rows` in chunks of `batch_size`. Returns the affected row total.
    pub fn insert_batch(&mut self, rows: &[Record]) -> DbResult<u64> {
        self.ensure_executable()?;
        let statements = self.compile_insert_batch(rows);
        self.run_batch(statements)
    }

    pub fn replace_batch(&mut self, rows: &[Record]) -> DbResult<u64> {
        self.ensure_executable()?;
        let statements = self.compile_replace_batch(rows);
        self.run_batch(statements)
    }

    /// UPDATE `rows` keyed by `index`, in chunks of `batch_size`.
    pub fn update_batch(&mut self, rows: &[Record], index: &str) -> DbResult<u64> {
        self.ensure_executable()?;
        let statements = self.compile_update_batch(rows, index);
        self.run_batch(statements)
    }

    fn run_batch(&mut self, statements: DbResult<Vec<Statement>>) -> DbResult<u64> {
        let statements = statements?;
        if !self.test_mode {
            self.cache.reset_modifier();
        }
        let mut total = 0;
        for statement in statements {
            let result = self.dispatch(statement)?;
            if !result.is_success() {
                warn!(target: "dbkit", "batch chunk failed; remaining chunks skipped");
                break;
            }
            total += result.affected_rows();
        }
        Ok(total)
    }
}
