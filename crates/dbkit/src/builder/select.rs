//! SELECT list, sources, joins, grouping, ordering and paging.

use super::QueryBuilder;
use super::cache::{GroupItem, OrderItem, SelectItem};
use super::operator::{has_operator, split_comparison, split_joints};
use crate::driver::DatePart;
use crate::error::DbError;
use crate::ident::Escape;
use std::fmt;
use std::str::FromStr;

/// JOIN flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    /// Bare `JOIN`.
    #[default]
    Plain,
    Inner,
    Left,
    Right,
    Outer,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinType::Plain => "JOIN",
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Outer => "OUTER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "" => Ok(JoinType::Plain),
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "OUTER" => Ok(JoinType::Outer),
            "LEFT OUTER" => Ok(JoinType::LeftOuter),
            "RIGHT OUTER" => Ok(JoinType::RightOuter),
            _ => Err(DbError::invalid(format!("unknown join type '{s}'"))),
        }
    }
}

/// ORDER BY direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
    /// Platform random-order keyword; a numeric field is used as the seed.
    Random,
    /// No direction keyword (or whatever is embedded in the field).
    None,
}

impl OrderDirection {
    fn keyword(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
            OrderDirection::Random | OrderDirection::None => "",
        }
    }
}

impl FromStr for OrderDirection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            "RANDOM" => Ok(OrderDirection::Random),
            "" => Ok(OrderDirection::None),
            other => Err(DbError::invalid(format!("unknown order direction '{other}'"))),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderDirection::Random => "RANDOM",
            other => other.keyword(),
        })
    }
}

/// Split on commas that are not inside parentheses or quotes.
pub(super) fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Alias declared by a table reference: the last word once `AS` is dropped.
fn alias_of(table: &str) -> Option<&str> {
    let words: Vec<&str> = table
        .split_whitespace()
        .filter(|w| !w.eq_ignore_ascii_case("as"))
        .collect();
    if words.len() > 1 { words.last().copied() } else { None }
}

/// Split a trailing ` ASC`/` DESC` off an order field.
fn embedded_direction(field: &str) -> (&str, Option<&'static str>) {
    let trimmed = field.trim();
    if let Some(pos) = trimmed.rfind(char::is_whitespace) {
        let word = &trimmed[pos + 1..];
        if word.eq_ignore_ascii_case("asc") {
            return (trimmed[..pos].trim_end(), Some("ASC"));
        }
        if word.eq_ignore_ascii_case("desc") {
            return (trimmed[..pos].trim_end(), Some("DESC"));
        }
    }
    (trimmed, None)
}

impl<'c> QueryBuilder<'c> {
    // ==================== SELECT ====================

    /// Add comma-separated select expressions, protected by default.
    pub fn select(&mut self, fields: &str) -> &mut Self {
        self.select_with(fields, Escape::Default)
    }

    /// [`select`](Self::select) with an explicit escaping mode.
    pub fn select_with(&mut self, fields: &str, escape: impl Into<Escape>) -> &mut Self {
        let escape = self.resolve(escape.into());
        for expr in split_top_level(fields) {
            self.cache.select.push(SelectItem {
                expr: expr.to_string(),
                escape,
            });
        }
        self
    }

    /// Add one select expression verbatim.
    pub fn select_raw(&mut self, expr: &str) -> &mut Self {
        self.cache.select.push(SelectItem {
            expr: expr.trim().to_string(),
            escape: false,
        });
        self
    }

    /// Select a nested statement as `(<sub>) AS alias`.
    pub fn select_subquery(&mut self, sub: QueryBuilder<'_>, alias: &str) -> &mut Self {
        if let Some(sql) = self.absorb_subquery(sub) {
            let expr = format!("({sql}) AS {}", self.escape_alias(alias));
            self.select_raw(&expr);
        }
        self
    }

    pub fn distinct(&mut self, enabled: bool) -> &mut Self {
        self.cache.distinct = enabled;
        self
    }

    /// `SELECT ... INTO table`, where the platform supports it.
    pub fn select_into(&mut self, table: &str) -> &mut Self {
        let protected = self.protect_table(table, self.protects_by_default());
        self.cache.into = Some(protected);
        self
    }

    // ==================== Aggregates and scalar helpers ====================

    fn select_function(
        &mut self,
        kind: &str,
        expr: impl FnOnce(&str) -> String,
        field: &str,
        alias: Option<&str>,
    ) -> &mut Self {
        let field = field.trim();
        let default_alias;
        let alias = match alias {
            Some(alias) if !alias.trim().is_empty() => alias.trim(),
            _ => {
                default_alias = format!(
                    "{}_{}",
                    kind.to_ascii_lowercase(),
                    field.replace('*', "all").replace(['.', ' '], "_")
                );
                &default_alias
            }
        };
        let protected = self.protect_column(field, self.protects_by_default());
        let item = format!("{} AS {}", expr(&protected), self.escape_alias(alias));
        self.select_raw(&item)
    }

    /// `COUNT(field) AS alias`; the alias defaults to `count_<field>`.
    pub fn select_count(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("COUNT", |f| format!("COUNT({f})"), field, alias)
    }

    pub fn select_sum(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("SUM", |f| format!("SUM({f})"), field, alias)
    }

    pub fn select_avg(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("AVG", |f| format!("AVG({f})"), field, alias)
    }

    pub fn select_min(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("MIN", |f| format!("MIN({f})"), field, alias)
    }

    pub fn select_max(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("MAX", |f| format!("MAX({f})"), field, alias)
    }

    /// `FIRST(field)`, for dialects that provide the aggregate.
    pub fn select_first(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("FIRST", |f| format!("FIRST({f})"), field, alias)
    }

    /// `LAST(field)`, for dialects that provide the aggregate.
    pub fn select_last(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("LAST", |f| format!("LAST({f})"), field, alias)
    }

    pub fn select_ucase(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("UCASE", |f| format!("UPPER({f})"), field, alias)
    }

    pub fn select_lcase(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("LCASE", |f| format!("LOWER({f})"), field, alias)
    }

    pub fn select_len(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("LEN", |f| format!("LENGTH({f})"), field, alias)
    }

    /// `SUBSTR(field, start, length)`; `start` is 1-based.
    pub fn select_mid(
        &mut self,
        field: &str,
        start: u32,
        length: Option<u32>,
        alias: Option<&str>,
    ) -> &mut Self {
        self.select_function(
            "MID",
            |f| match length {
                Some(len) => format!("SUBSTR({f}, {start}, {len})"),
                None => format!("SUBSTR({f}, {start})"),
            },
            field,
            alias,
        )
    }

    pub fn select_round(&mut self, field: &str, decimals: u32, alias: Option<&str>) -> &mut Self {
        self.select_function("ROUND", |f| format!("ROUND({f}, {decimals})"), field, alias)
    }

    /// Format a value with a dialect-specific pattern (`TO_CHAR`, `STRFTIME`, `FORMAT`).
    pub fn select_format(&mut self, field: &str, pattern: &str, alias: Option<&str>) -> &mut Self {
        let template = self.dialect.platform().format_template();
        let pattern = format!("'{}'", pattern.replace('\'', "''"));
        self.select_function(
            "FORMAT",
            |f| template.replace("{0}", f).replace("{1}", &pattern),
            field,
            alias,
        )
    }

    /// `CURRENT_TIMESTAMP AS alias` (default alias `now`).
    pub fn select_now(&mut self, alias: Option<&str>) -> &mut Self {
        let alias = self.escape_alias(alias.unwrap_or("now"));
        self.select_raw(&format!("CURRENT_TIMESTAMP AS {alias}"))
    }

    pub fn select_date(&mut self, field: &str, alias: Option<&str>) -> &mut Self {
        self.select_function("DATE", |f| format!("DATE({f})"), field, alias)
    }

    /// Extract one date part; the alias defaults to `<part>_<field>`.
    pub fn select_date_part(
        &mut self,
        part: DatePart,
        field: &str,
        alias: Option<&str>,
    ) -> &mut Self {
        let platform = self.dialect.platform().clone();
        self.select_function(part.keyword(), |f| platform.date_part(part, f), field, alias)
    }

    // ==================== FROM ====================

    /// Add comma-separated source tables; aliases are tracked for later protection.
    pub fn from(&mut self, tables: &str) -> &mut Self {
        let escape = self.protects_by_default();
        for table in split_top_level(tables) {
            if let Some(alias) = alias_of(table) {
                self.cache.track_alias(alias);
            }
            let protected = self.protect_table(table, escape);
            if !self.cache.from.contains(&protected) {
                self.cache.from.push(protected);
            }
        }
        self
    }

    /// Replace the source list with a single table.
    pub fn table(&mut self, table: &str) -> &mut Self {
        self.cache.from.clear();
        self.from(table)
    }

    /// Use a nested statement as a derived table.
    pub fn from_subquery(&mut self, sub: QueryBuilder<'_>, alias: &str) -> &mut Self {
        if let Some(sql) = self.absorb_subquery(sub) {
            self.cache.track_alias(alias);
            let source = format!("({sql}) {}", self.escape_alias(alias));
            self.cache.from.push(source);
        }
        self
    }

    // ==================== JOIN ====================

    /// Plain `JOIN table ON condition`.
    pub fn join(&mut self, table: &str, condition: &str) -> &mut Self {
        self.join_with(table, condition, JoinType::Plain, Escape::Default)
    }

    pub fn inner_join(&mut self, table: &str, condition: &str) -> &mut Self {
        self.join_with(table, condition, JoinType::Inner, Escape::Default)
    }

    pub fn left_join(&mut self, table: &str, condition: &str) -> &mut Self {
        self.join_with(table, condition, JoinType::Left, Escape::Default)
    }

    pub fn right_join(&mut self, table: &str, condition: &str) -> &mut Self {
        self.join_with(table, condition, JoinType::Right, Escape::Default)
    }

    /// Add a join.
    ///
    /// A condition without a comparison operator becomes `USING (column)`.
    /// When escaping, both sides of every comparison are protected.
    pub fn join_with(
        &mut self,
        table: &str,
        condition: &str,
        join_type: JoinType,
        escape: impl Into<Escape>,
    ) -> &mut Self {
        let escape = self.resolve(escape.into());
        if let Some(alias) = alias_of(table) {
            self.cache.track_alias(alias);
        }
        let protected_table = self.protect_table(table, escape);
        let condition = condition.trim();

        let clause = if !has_operator(condition) {
            if escape {
                format!(
                    "USING ({})",
                    self.dialect.protector().escape_identifiers(condition)
                )
            } else {
                format!("USING ({condition})")
            }
        } else if escape {
            let rendered = split_joints(condition)
                .into_iter()
                .map(|(is_joint, piece)| {
                    if is_joint {
                        piece.trim().to_ascii_uppercase()
                    } else {
                        self.protect_join_comparison(piece)
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("ON {rendered}")
        } else {
            format!("ON {condition}")
        };

        self.cache
            .joins
            .push(format!("{} {protected_table} {clause}", join_type.keyword()));
        self
    }

    fn protect_join_comparison(&self, piece: &str) -> String {
        match split_comparison(piece) {
            Some((left, op, right)) => {
                let right = if right.starts_with([':', '\'']) {
                    right.to_string()
                } else {
                    self.protect_column(right, true)
                };
                format!("{} {op} {right}", self.protect_column(left, true))
            }
            None => piece.trim().to_string(),
        }
    }

    // ==================== GROUP / ORDER / LIMIT ====================

    pub fn group_by(&mut self, fields: &str) -> &mut Self {
        self.group_by_with(fields, Escape::Default)
    }

    pub fn group_by_with(&mut self, fields: &str, escape: impl Into<Escape>) -> &mut Self {
        let escape = self.resolve(escape.into());
        for field in split_top_level(fields) {
            self.cache.group_by.push(GroupItem {
                field: field.to_string(),
                escape,
            });
        }
        self
    }

    /// Add ORDER BY fields.
    ///
    /// `fields` may list several columns, each optionally carrying its own
    /// `ASC`/`DESC`. With [`OrderDirection::Random`] the field is ignored
    /// unless it is a numeric seed.
    pub fn order_by(&mut self, fields: &str, direction: OrderDirection) -> &mut Self {
        if direction == OrderDirection::Random {
            return self.order_by_random(fields.trim().parse().ok());
        }
        let escape = self.protects_by_default();
        for field in split_top_level(fields) {
            let (field, embedded) = embedded_direction(field);
            self.cache.order_by.push(OrderItem {
                field: field.to_string(),
                direction: embedded.unwrap_or(direction.keyword()),
                escape,
            });
        }
        self
    }

    /// Order by the platform's random keyword, seeded when supported.
    pub fn order_by_random(&mut self, seed: Option<u64>) -> &mut Self {
        let keyword = self.dialect.platform().random(seed);
        self.cache.order_by.push(OrderItem {
            field: keyword,
            direction: "",
            escape: false,
        });
        self
    }

    /// Cap the row count; `None` is ignored.
    pub fn limit(&mut self, limit: impl Into<Option<u64>>) -> &mut Self {
        if let Some(limit) = limit.into() {
            self.cache.limit = Some(limit);
        }
        self
    }

    /// Skip rows; `None` is ignored.
    pub fn offset(&mut self, offset: impl Into<Option<u64>>) -> &mut Self {
        if let Some(offset) = offset.into() {
            self.cache.offset = Some(offset);
        }
        self
    }
}
