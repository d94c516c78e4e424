//! Dialect facts the builder and connection need from a backend.

use crate::config::EscapeCharacter;

/// How named `:binds` are rewritten before they reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (one slot per distinct name)
    Dollar,
    /// `?1, ?2, ...` (one slot per distinct name)
    QuestionNumbered,
    /// `?` (one slot per occurrence)
    Question,
    /// Escaped literals are spliced into the statement.
    Inline,
}

/// Syntax of the LIMIT/OFFSET tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`; OFFSET may stand alone.
    LimitOffset,
    /// `LIMIT n OFFSET m`; a bare offset needs `LIMIT -1`.
    LimitOffsetRequiresLimit,
    /// `LIMIT m, n`
    OffsetComma,
}

/// How the column list of a table is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldListing {
    /// A query with a `:table` bind; names come from `column`.
    Query {
        sql: &'static str,
        column: &'static str,
    },
    /// A statement template where `{}` receives the escaped table name.
    Pragma {
        template: &'static str,
        column: &'static str,
    },
}

/// Date parts accepted by the date helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn keyword(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }

    fn strftime(self) -> &'static str {
        match self {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        }
    }
}

/// Static description of a SQL dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub name: &'static str,
    pub escape: EscapeCharacter,
    /// Unseeded random-order keyword.
    pub random_keyword: &'static str,
    /// Seeded variant; `{}` receives the seed.
    pub random_seeded: Option<&'static str>,
    pub placeholder: PlaceholderStyle,
    pub limit_style: LimitStyle,
    pub replace_keyword: Option<&'static str>,
    /// `None` falls back to `DELETE FROM`.
    pub truncate_keyword: Option<&'static str>,
    pub bool_literals: (&'static str, &'static str),
    pub supports_select_into: bool,
    /// ORDER BY / LIMIT are accepted on UPDATE and DELETE.
    pub supports_write_limit: bool,
    pub list_tables: &'static str,
    pub list_fields: FieldListing,
    pub list_databases: &'static str,
    /// Column holding the name in `list_tables`/`list_databases` results.
    pub name_column: &'static str,
}

impl Platform {
    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            escape: EscapeCharacter::single("\""),
            random_keyword: "RANDOM()",
            random_seeded: None,
            placeholder: PlaceholderStyle::Dollar,
            limit_style: LimitStyle::LimitOffset,
            replace_keyword: None,
            truncate_keyword: Some("TRUNCATE"),
            bool_literals: ("TRUE", "FALSE"),
            supports_select_into: true,
            supports_write_limit: false,
            list_tables: "SELECT table_name AS name FROM information_schema.tables \
                          WHERE table_schema = current_schema() ORDER BY table_name",
            list_fields: FieldListing::Query {
                sql: "SELECT column_name FROM information_schema.columns \
                      WHERE table_schema = current_schema() AND table_name = :table \
                      ORDER BY ordinal_position",
                column: "column_name",
            },
            list_databases: "SELECT datname AS name FROM pg_database WHERE datistemplate = false",
            name_column: "name",
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "sqlite",
            escape: EscapeCharacter::single("\""),
            random_keyword: "RANDOM()",
            random_seeded: None,
            placeholder: PlaceholderStyle::QuestionNumbered,
            limit_style: LimitStyle::LimitOffsetRequiresLimit,
            replace_keyword: Some("REPLACE"),
            truncate_keyword: None,
            bool_literals: ("1", "0"),
            supports_select_into: false,
            supports_write_limit: false,
            list_tables: "SELECT name FROM sqlite_master \
                          WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            list_fields: FieldListing::Pragma {
                template: "PRAGMA table_info({})",
                column: "name",
            },
            list_databases: "PRAGMA database_list",
            name_column: "name",
        }
    }

    /// A MySQL-flavoured dialect: backtick identifiers, `LIMIT m, n`, seeded `RAND(n)`.
    pub fn mysql() -> Self {
        Self {
            name: "mysql",
            escape: EscapeCharacter::single("`"),
            random_keyword: "RAND()",
            random_seeded: Some("RAND({})"),
            placeholder: PlaceholderStyle::Question,
            limit_style: LimitStyle::OffsetComma,
            replace_keyword: Some("REPLACE"),
            truncate_keyword: Some("TRUNCATE"),
            bool_literals: ("1", "0"),
            supports_select_into: false,
            supports_write_limit: true,
            list_tables: "SHOW TABLES",
            list_fields: FieldListing::Pragma {
                template: "SHOW COLUMNS FROM {}",
                column: "Field",
            },
            list_databases: "SHOW DATABASES",
            name_column: "Database",
        }
    }

    /// Random-order keyword, seeded when the platform supports it.
    pub fn random(&self, seed: Option<u64>) -> String {
        match (seed, self.random_seeded) {
            (Some(seed), Some(template)) => template.replace("{}", &seed.to_string()),
            _ => self.random_keyword.to_string(),
        }
    }

    /// Render the LIMIT/OFFSET tail (with a leading space), or an empty string.
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let offset = offset.filter(|o| *o > 0);
        match (self.limit_style, limit, offset) {
            (_, None, None) => String::new(),
            (LimitStyle::OffsetComma, Some(l), Some(o)) => format!(" LIMIT {o}, {l}"),
            (LimitStyle::OffsetComma, Some(l), None) => format!(" LIMIT {l}"),
            (LimitStyle::OffsetComma, None, Some(o)) => format!(" LIMIT {o}, {}", u64::MAX),
            (_, Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (_, Some(l), None) => format!(" LIMIT {l}"),
            (LimitStyle::LimitOffsetRequiresLimit, None, Some(o)) => format!(" LIMIT -1 OFFSET {o}"),
            (LimitStyle::LimitOffset, None, Some(o)) => format!(" OFFSET {o}"),
        }
    }

    /// Template for FORMAT(field, pattern); `{0}` is the field, `{1}` the quoted pattern.
    pub fn format_template(&self) -> &'static str {
        match self.name {
            "postgres" => "TO_CHAR({0}, {1})",
            "sqlite" => "STRFTIME({1}, {0})",
            _ => "FORMAT({0}, {1})",
        }
    }

    /// Expression extracting a date part from a field.
    pub fn date_part(&self, part: DatePart, field: &str) -> String {
        match self.name {
            "sqlite" => format!(
                "CAST(STRFTIME('{}', {field}) AS INTEGER)",
                part.strftime()
            ),
            _ => format!("EXTRACT({} FROM {field})", part.keyword()),
        }
    }

    pub fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            self.bool_literals.0
        } else {
            self.bool_literals.1
        }
    }
}
