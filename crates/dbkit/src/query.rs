//! Execution records.

use crate::bind::BindRegistry;
use crate::driver::DriverError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Statement kind, detected from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    /// CREATE / ALTER / DROP / TRUNCATE / RENAME
    Ddl,
    /// BEGIN / COMMIT / ROLLBACK / SAVEPOINT
    Transaction,
    /// SHOW / PRAGMA / EXPLAIN / DESCRIBE and other row-returning utilities
    Utility,
    Other,
}

impl QueryType {
    /// Detect the statement kind.
    ///
    /// For CTEs (`WITH ...`), the keyword after the last top-level
    /// parenthesised definition decides.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        match first_keyword(trimmed).as_str() {
            "SELECT" | "VALUES" => QueryType::Select,
            "INSERT" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            "REPLACE" => QueryType::Replace,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => QueryType::Ddl,
            "BEGIN" | "START" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "END" => {
                QueryType::Transaction
            }
            "SHOW" | "PRAGMA" | "EXPLAIN" | "DESCRIBE" | "DESC" => QueryType::Utility,
            "WITH" => Self::detect_cte_dml(trimmed),
            _ => QueryType::Other,
        }
    }

    fn detect_cte_dml(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut depth: i32 = 0;
        let mut last_top_level = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        last_top_level = i + 1;
                    }
                }
                b'\'' => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        match first_keyword(sql[last_top_level..].trim_start()).as_str() {
            "INSERT" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            _ => QueryType::Select,
        }
    }

    /// The statement changes data (or schema) rather than reading it.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            QueryType::Insert
                | QueryType::Update
                | QueryType::Delete
                | QueryType::Replace
                | QueryType::Ddl
                | QueryType::Other
        )
    }

    /// Schema-changing statements invalidate cached table and field lists.
    pub fn invalidates_metadata(self) -> bool {
        self == QueryType::Ddl
    }
}

/// True when `sql` should go through the row-returning path.
pub(crate) fn returns_rows(sql: &str) -> bool {
    match QueryType::from_sql(sql) {
        QueryType::Select | QueryType::Utility => true,
        QueryType::Transaction => false,
        _ => has_returning(sql),
    }
}

fn has_returning(sql: &str) -> bool {
    sql.split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("RETURNING"))
}

/// Skip whitespace, comments and leading parentheses.
fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            return s;
        }
    }
}

fn first_keyword(sql: &str) -> String {
    sql.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Cut `sql` to at most `max_bytes` on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Log-friendly form of `sql`, with `...` when it was cut.
pub(crate) fn truncate_sql(sql: &str, max_bytes: usize) -> String {
    if sql.len() > max_bytes {
        format!("{}...", truncate_sql_bytes(sql, max_bytes))
    } else {
        sql.to_string()
    }
}

/// One executed statement.
///
/// Built once the statement has finished and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    template: String,
    binds: BindRegistry,
    sql: String,
    query_type: QueryType,
    started_at: DateTime<Utc>,
    duration: Duration,
    affected_rows: u64,
    error: Option<DriverError>,
}

impl Query {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        template: String,
        binds: BindRegistry,
        sql: String,
        started_at: DateTime<Utc>,
        duration: Duration,
        affected_rows: u64,
        error: Option<DriverError>,
    ) -> Self {
        let query_type = QueryType::from_sql(&template);
        Self {
            template,
            binds,
            sql,
            query_type,
            started_at,
            duration,
            affected_rows,
            error,
        }
    }

    /// Statement as compiled, with `:name` placeholders.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn binds(&self) -> &BindRegistry {
        &self.binds
    }

    /// Statement as sent to the backend (prefixes swapped, placeholders rewritten).
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn error(&self) -> Option<&DriverError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
