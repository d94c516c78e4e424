//! Statement rendering.
//!
//! Read phases run in a fixed order: SELECT, INTO, FROM, JOIN, WHERE (with
//! BETWEEN entries in place), GROUP BY, HAVING, ORDER BY, LIMIT.

use super::QueryBuilder;
use super::cache::ConditionEntry;
use super::operator::{find_operator, split_joints};
use crate::bind::{BindRegistry, Statement};
use crate::error::{DbError, DbResult};
use crate::value::{Record, record_get};
use std::mem;

/// Alias of the derived table wrapped around a grouped/limited count.
const COUNT_WRAPPER_ALIAS: &str = "dbkit_count_all_results";

/// Column name carrying the result of the count helpers.
pub(crate) const COUNT_ALIAS: &str = "numrows";

/// Join compiled fragments with single spaces, but not inside `(` ... `)`.
fn join_fragments(parts: impl IntoIterator<Item = String>) -> String {
    let mut out = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('(') && !part.starts_with(')') {
            out.push(' ');
        }
        out.push_str(&part);
    }
    out
}

impl<'c> QueryBuilder<'c> {
    /// Surface mutator errors and unbalanced groups.
    fn check_state(&self) -> DbResult<()> {
        if let Some(err) = &self.cache.build_error {
            return Err(err.clone());
        }
        self.cache.brackets.ensure_balanced()
    }

    fn write_table(&self) -> DbResult<String> {
        self.cache
            .from
            .first()
            .cloned()
            .ok_or_else(|| DbError::invalid("no table selected; call table() or from() first"))
    }

    // ==================== Conditions ====================

    /// Protect the left-hand operand of one `field <op> rhs` piece.
    fn protect_condition(&self, piece: &str) -> String {
        let trimmed = piece.trim();
        let body = trimmed.trim_start_matches(['(', ' ']);
        let parens = &trimmed[..trimmed.len() - body.len()];
        match find_operator(body) {
            Some((start, end)) if start > 0 => {
                let field = self.protect_column(body[..start].trim(), true);
                let op = body[start..end].trim();
                let rhs = body[end..].trim();
                if rhs.is_empty() {
                    format!("{parens}{field} {op}")
                } else {
                    format!("{parens}{field} {op} {rhs}")
                }
            }
            _ => trimmed.to_string(),
        }
    }

    fn compile_entry(&self, entry: &ConditionEntry) -> String {
        match entry {
            ConditionEntry::Compiled(sql) => sql.clone(),
            ConditionEntry::Bracket(fragment) => {
                fragment.split_whitespace().collect::<Vec<_>>().join(" ")
            }
            ConditionEntry::Between(between) => {
                let field = if between.escape {
                    self.protect_column(&between.field, true)
                } else {
                    between.field.clone()
                };
                format!(
                    "{}{field} {}BETWEEN :{} AND :{}",
                    between.joiner,
                    if between.not { "NOT " } else { "" },
                    between.low,
                    between.high
                )
            }
            ConditionEntry::Pending { fragment, escape } if !escape => fragment.clone(),
            ConditionEntry::Pending { fragment, .. } => {
                let pieces = split_joints(fragment)
                    .into_iter()
                    .map(|(is_joint, piece)| {
                        if is_joint {
                            piece.trim().to_ascii_uppercase()
                        } else {
                            self.protect_condition(piece)
                        }
                    })
                    .collect::<Vec<_>>();
                pieces.join(" ")
            }
        }
    }

    fn compile_conditions(&self, entries: &[ConditionEntry]) -> String {
        join_fragments(entries.iter().map(|entry| self.compile_entry(entry)))
    }

    fn where_clause(&self) -> String {
        let conditions = self.compile_conditions(&self.cache.wheres);
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {conditions}")
        }
    }

    fn having_clause(&self) -> String {
        let conditions = self.compile_conditions(&self.cache.havings);
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" HAVING {conditions}")
        }
    }

    // ==================== Read phases ====================

    fn select_list(&self) -> String {
        if self.cache.select.is_empty() {
            return "*".to_string();
        }
        self.cache
            .select
            .iter()
            .map(|item| {
                if item.escape {
                    self.protect_column(&item.expr, true)
                } else {
                    item.expr.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn into_clause(&self) -> DbResult<String> {
        match &self.cache.into {
            None => Ok(String::new()),
            Some(_) if !self.dialect.platform().supports_select_into => Err(DbError::Unsupported(
                format!("SELECT INTO on {}", self.dialect.platform().name),
            )),
            Some(table) => Ok(format!(" INTO {table}")),
        }
    }

    fn from_clause(&self) -> String {
        if self.cache.from.is_empty() {
            String::new()
        } else {
            format!(" FROM {}", self.cache.from.join(", "))
        }
    }

    fn join_clause(&self) -> String {
        self.cache
            .joins
            .iter()
            .map(|join| format!(" {join}"))
            .collect()
    }

    fn group_clause(&self) -> String {
        if self.cache.group_by.is_empty() {
            return String::new();
        }
        let fields = self
            .cache
            .group_by
            .iter()
            .map(|item| {
                if item.escape {
                    self.protect_column(&item.field, true)
                } else {
                    item.field.clone()
                }
            })
            .collect::<Vec<_>>();
        format!(" GROUP BY {}", fields.join(", "))
    }

    fn order_clause(&self) -> String {
        if self.cache.order_by.is_empty() {
            return String::new();
        }
        let fields = self
            .cache
            .order_by
            .iter()
            .map(|item| {
                let field = if item.escape {
                    self.protect_column(&item.field, true)
                } else {
                    item.field.clone()
                };
                if item.direction.is_empty() {
                    field
                } else {
                    format!("{field} {}", item.direction)
                }
            })
            .collect::<Vec<_>>();
        format!(" ORDER BY {}", fields.join(", "))
    }

    fn limit_clause(&self) -> String {
        self.dialect
            .platform()
            .limit_clause(self.cache.limit, self.cache.offset)
    }

    fn render_select(&self) -> DbResult<String> {
        self.check_state()?;
        let mut sql = String::from("SELECT ");
        if self.cache.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select_list());
        sql.push_str(&self.into_clause()?);
        sql.push_str(&self.from_clause());
        sql.push_str(&self.join_clause());
        sql.push_str(&self.where_clause());
        sql.push_str(&self.group_clause());
        sql.push_str(&self.having_clause());
        sql.push_str(&self.order_clause());
        sql.push_str(&self.limit_clause());
        Ok(sql)
    }

    /// `COUNT(*)` over the current read state.
    ///
    /// DISTINCT, GROUP BY and LIMIT/OFFSET change the row count, so those
    /// statements are wrapped in a derived table.
    pub(super) fn render_count_all_results(&self) -> DbResult<String> {
        self.check_state()?;
        let alias = self.escape_alias(COUNT_ALIAS);
        let cache = &self.cache;
        if cache.distinct || !cache.group_by.is_empty() || cache.limit.is_some() || cache.offset.is_some() {
            let inner = self.render_select()?;
            return Ok(format!(
                "SELECT COUNT(*) AS {alias} FROM ({inner}) {}",
                self.escape_alias(COUNT_WRAPPER_ALIAS)
            ));
        }
        Ok(format!(
            "SELECT COUNT(*) AS {alias}{}{}{}{}",
            self.from_clause(),
            self.join_clause(),
            self.where_clause(),
            self.having_clause()
        ))
    }

    pub(super) fn render_count_all(&self, table: Option<&str>) -> DbResult<String> {
        let table = match table {
            Some(table) => self.protect_table(table, self.protects_by_default()),
            None => self.write_table()?,
        };
        Ok(format!(
            "SELECT COUNT(*) AS {} FROM {table}",
            self.escape_alias(COUNT_ALIAS)
        ))
    }

    // ==================== Write phases ====================

    fn write_tail(&self, verb: &str) -> DbResult<String> {
        let order = self.order_clause();
        let limit = self.dialect.platform().limit_clause(self.cache.limit, None);
        if (!order.is_empty() || !limit.is_empty()) && !self.dialect.platform().supports_write_limit {
            return Err(DbError::Unsupported(format!(
                "ORDER BY/LIMIT on {verb} for {}",
                self.dialect.platform().name
            )));
        }
        Ok(format!("{order}{limit}"))
    }

    fn render_insert(&self, keyword: &str) -> DbResult<String> {
        self.check_state()?;
        let table = self.write_table()?;
        if self.cache.set.is_empty() {
            return Err(DbError::invalid(format!("{keyword} requires at least one column")));
        }
        let (columns, values): (Vec<&str>, Vec<&str>) = self
            .cache
            .set
            .iter()
            .map(|(c, v)| (c.as_str(), v.as_str()))
            .unzip();
        Ok(format!(
            "{keyword} INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ))
    }

    fn replace_keyword(&self) -> DbResult<&'static str> {
        self.dialect.platform().replace_keyword.ok_or_else(|| {
            DbError::Unsupported(format!("REPLACE on {}", self.dialect.platform().name))
        })
    }

    fn render_update(&self) -> DbResult<String> {
        self.check_state()?;
        let table = self.write_table()?;
        if self.cache.set.is_empty() {
            return Err(DbError::invalid("UPDATE requires at least one column"));
        }
        let assignments = self
            .cache
            .set
            .iter()
            .map(|(column, value)| format!("{column} = {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "UPDATE {table} SET {assignments}{}{}",
            self.where_clause(),
            self.write_tail("UPDATE")?
        ))
    }

    fn render_delete(&self) -> DbResult<String> {
        self.check_state()?;
        let table = self.write_table()?;
        if !self.cache.has_conditions() {
            return Err(DbError::invalid(
                "refusing to DELETE without a WHERE clause; use empty_table() to clear a table",
            ));
        }
        Ok(format!(
            "DELETE FROM {table}{}{}",
            self.where_clause(),
            self.write_tail("DELETE")?
        ))
    }

    pub(super) fn render_truncate(&self, table: Option<&str>, force_delete: bool) -> DbResult<String> {
        let table = match table {
            Some(table) => self.protect_table(table, self.protects_by_default()),
            None => self.write_table()?,
        };
        match self.dialect.platform().truncate_keyword {
            Some(keyword) if !force_delete => Ok(format!("{keyword} {table}")),
            _ => Ok(format!("DELETE FROM {table}")),
        }
    }

    // ==================== Public accessors ====================

    /// A failed render leaves the cache untouched so the caller can repair it.
    fn finish_read(&mut self, sql: DbResult<String>, reset: bool) -> DbResult<Statement> {
        let sql = sql?;
        let binds = if reset {
            self.cache.reset_getter().binds
        } else {
            self.cache.binds.clone()
        };
        Ok(Statement::new(sql, binds))
    }

    fn finish_write(&mut self, sql: DbResult<String>, reset: bool) -> DbResult<Statement> {
        let sql = sql?;
        let binds = if reset {
            let binds = mem::take(&mut self.cache.binds);
            self.cache.reset_modifier();
            binds
        } else {
            self.cache.binds.clone()
        };
        Ok(Statement::new(sql, binds))
    }

    /// Render the SELECT. With `reset`, the builder starts over afterwards.
    pub fn compile_select(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self.render_select();
        self.finish_read(sql, reset)
    }

    /// Render the row count of the current SELECT.
    pub fn compile_count_all_results(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self.render_count_all_results();
        self.finish_read(sql, reset)
    }

    pub fn compile_insert(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self.render_insert("INSERT");
        self.finish_write(sql, reset)
    }

    pub fn compile_replace(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self
            .replace_keyword()
            .and_then(|keyword| self.render_insert(keyword));
        self.finish_write(sql, reset)
    }

    pub fn compile_update(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self.render_update();
        self.finish_write(sql, reset)
    }

    pub fn compile_delete(&mut self, reset: bool) -> DbResult<Statement> {
        let sql = self.render_delete();
        self.finish_write(sql, reset)
    }

    // ==================== Batches ====================

    fn batch_columns(rows: &[Record]) -> DbResult<Vec<&str>> {
        let first = rows
            .first()
            .ok_or_else(|| DbError::invalid("batch requires at least one row"))?;
        let columns: Vec<&str> = first.iter().map(|(c, _)| c.as_str()).collect();
        if columns.is_empty() {
            return Err(DbError::invalid("batch rows have no columns"));
        }
        for (i, row) in rows.iter().enumerate().skip(1) {
            let same = row.len() == columns.len()
                && columns.iter().all(|c| row.iter().any(|(k, _)| k == c));
            if !same {
                return Err(DbError::invalid(format!(
                    "batch row {i} does not have the same columns as row 0"
                )));
            }
        }
        Ok(columns)
    }

    fn render_insert_batch(&self, keyword: &str, rows: &[Record]) -> DbResult<Vec<Statement>> {
        self.check_state()?;
        let table = self.write_table()?;
        let columns = Self::batch_columns(rows)?;
        let escape = self.protects_by_default();
        let protected = columns
            .iter()
            .map(|c| self.protect_column(c, escape))
            .collect::<Vec<_>>()
            .join(", ");

        let mut statements = Vec::new();
        for chunk in rows.chunks(self.batch_size) {
            let mut binds = BindRegistry::new();
            let mut tuples = Vec::with_capacity(chunk.len());
            for row in chunk {
                let mut placeholders = Vec::with_capacity(columns.len());
                for column in &columns {
                    let value = record_get(row, column)?.clone();
                    placeholders.push(format!(":{}", binds.bind(column, value)));
                }
                tuples.push(format!("({})", placeholders.join(", ")));
            }
            let sql = format!(
                "{keyword} INTO {table} ({protected}) VALUES {}",
                tuples.join(", ")
            );
            statements.push(Statement::new(sql, binds));
        }
        Ok(statements)
    }

    /// One INSERT per `batch_size` rows. Every row must carry the same columns.
    pub fn compile_insert_batch(&self, rows: &[Record]) -> DbResult<Vec<Statement>> {
        self.render_insert_batch("INSERT", rows)
    }

    pub fn compile_replace_batch(&self, rows: &[Record]) -> DbResult<Vec<Statement>> {
        let keyword = self.replace_keyword()?;
        self.render_insert_batch(keyword, rows)
    }

    /// One `UPDATE ... SET col = CASE WHEN index = .. THEN .. ELSE col END`
    /// per `batch_size` rows, restricted to the listed index values and the
    /// current WHERE conditions.
    ///
    /// Fails with [`DbError::MissingBatchIndex`] before rendering anything if
    /// a row lacks `index`.
    pub fn compile_update_batch(&self, rows: &[Record], index: &str) -> DbResult<Vec<Statement>> {
        self.check_state()?;
        let table = self.write_table()?;
        if rows.is_empty() {
            return Err(DbError::invalid("batch requires at least one row"));
        }
        if let Some(row) = rows.iter().position(|r| !r.iter().any(|(k, _)| k == index)) {
            return Err(DbError::MissingBatchIndex {
                index: index.to_string(),
                row,
            });
        }

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for (column, _) in row {
                if column != index && !columns.contains(&column.as_str()) {
                    columns.push(column);
                }
            }
        }
        if columns.is_empty() {
            return Err(DbError::invalid("batch update has no columns besides the index"));
        }

        let escape = self.protects_by_default();
        let protected_index = self.protect_column(index, escape);
        let conditions = self.compile_conditions(&self.cache.wheres);

        let mut statements = Vec::new();
        for chunk in rows.chunks(self.batch_size) {
            let mut binds = self.cache.binds.clone();
            let mut ids = Vec::with_capacity(chunk.len());
            for row in chunk {
                let id = record_get(row, index)?.clone();
                ids.push(binds.bind(index, id));
            }

            let mut assignments = Vec::with_capacity(columns.len());
            for column in &columns {
                let mut cases = String::new();
                for (row, id) in chunk.iter().zip(&ids) {
                    if let Some((_, value)) = row.iter().find(|(k, _)| k == column) {
                        let placeholder = binds.bind(column, value.clone());
                        cases.push_str(&format!(
                            " WHEN {protected_index} = :{id} THEN :{placeholder}"
                        ));
                    }
                }
                if cases.is_empty() {
                    continue;
                }
                let protected = self.protect_column(column, escape);
                assignments.push(format!("{protected} = CASE{cases} ELSE {protected} END"));
            }

            let id_list = ids
                .iter()
                .map(|id| format!(":{id}"))
                .collect::<Vec<_>>()
                .join(", ");
            let filter = format!("{protected_index} IN ({id_list})");
            let where_sql = if conditions.is_empty() {
                format!(" WHERE {filter}")
            } else {
                format!(" WHERE ({conditions}) AND {filter}")
            };
            let sql = format!("UPDATE {table} SET {}{where_sql}", assignments.join(", "));
            statements.push(Statement::new(sql, binds));
        }
        Ok(statements)
    }
}
