//! Memoized schema lookups.

use super::Connection;
use crate::bind::BindRegistry;
use crate::driver::FieldListing;
use crate::error::{DbError, DbResult};
use crate::row::ResultSet;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct MetadataCache {
    tables: Option<Vec<String>>,
    fields: HashMap<String, Vec<String>>,
    databases: Option<Vec<String>>,
}

impl MetadataCache {
    pub(crate) fn clear(&mut self) {
        self.tables = None;
        self.fields.clear();
        self.databases = None;
    }
}

/// Names from `column` (or the first column when absent) of every row.
fn names(result: &ResultSet, column: &str) -> Vec<String> {
    result
        .iter()
        .filter_map(|row| row.get(column).or_else(|| row.get_index(0)))
        .map(|value| value.to_string())
        .collect()
}

/// A failed metadata lookup is an error even outside debug mode.
fn checked(result: ResultSet, sql: &str) -> DbResult<ResultSet> {
    match result.error() {
        Some(err) => Err(DbError::statement(&err.code, &err.message, sql)),
        None => Ok(result),
    }
}

impl Connection {
    /// Table names in the current database.
    ///
    /// With `constrain_by_prefix`, only tables starting with the table prefix.
    pub fn get_tables(&mut self, constrain_by_prefix: bool) -> DbResult<Vec<String>> {
        let tables = match &self.metadata.tables {
            Some(tables) => tables.clone(),
            None => {
                let platform = self.platform().clone();
                let result = self.simple_query(platform.list_tables)?;
                let tables = names(&checked(result, platform.list_tables)?, platform.name_column);
                self.metadata.tables = Some(tables.clone());
                tables
            }
        };

        let prefix = self.active.table_prefix.as_str();
        if constrain_by_prefix && !prefix.is_empty() {
            Ok(tables.into_iter().filter(|t| t.starts_with(prefix)).collect())
        } else {
            Ok(tables)
        }
    }

    /// Column names of `table` (prefix applied), in declaration order.
    pub fn get_table_fields(&mut self, table: &str) -> DbResult<Vec<String>> {
        let table = self.prefix_table(table.trim());
        if let Some(fields) = self.metadata.fields.get(&table) {
            return Ok(fields.clone());
        }

        let listing = self.platform().list_fields;
        let fields = match listing {
            FieldListing::Query { sql, column } => {
                let mut binds = BindRegistry::new();
                binds.bind("table", table.as_str());
                let result = self.query(sql, &binds)?;
                names(&checked(result, sql)?, column)
            }
            FieldListing::Pragma { template, column } => {
                let sql = template.replace("{}", &self.escape_identifiers(&table));
                let result = self.simple_query(&sql)?;
                names(&checked(result, &sql)?, column)
            }
        };

        self.metadata.fields.insert(table, fields.clone());
        Ok(fields)
    }

    /// Whether `table` (prefix applied) exists.
    pub fn is_table_exists(&mut self, table: &str) -> DbResult<bool> {
        let table = self.prefix_table(table.trim());
        Ok(self.get_tables(false)?.contains(&table))
    }

    pub fn is_table_field_exists(&mut self, field: &str, table: &str) -> DbResult<bool> {
        let field = field.trim();
        Ok(self.get_table_fields(table)?.iter().any(|f| f == field))
    }

    /// Databases visible to the connected user.
    pub fn get_databases(&mut self) -> DbResult<Vec<String>> {
        if let Some(databases) = &self.metadata.databases {
            return Ok(databases.clone());
        }
        let platform = self.platform().clone();
        let result = self.simple_query(platform.list_databases)?;
        let databases = names(&checked(result, platform.list_databases)?, platform.name_column);
        self.metadata.databases = Some(databases.clone());
        Ok(databases)
    }

    /// Forget cached tables, fields and databases.
    pub fn invalidate_metadata(&mut self) {
        self.metadata.clear();
    }
}
