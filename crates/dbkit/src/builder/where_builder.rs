//! WHERE / HAVING conditions and bracket groups.
//!
//! Conditions are stored as `<joiner><field> <operator> :bind` fragments.
//! Only the field is protected, and only when the statement is compiled, so
//! aliases declared after a condition still apply to it.

use super::QueryBuilder;
use super::cache::{BetweenEntry, ConditionEntry};
use super::operator::{field_of, has_operator, null_comparison};
use crate::ident::Escape;
use crate::value::Value;

/// Where the `%` wildcards go in a LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeSide {
    /// `%value%`
    #[default]
    Both,
    /// `%value`
    Before,
    /// `value%`
    After,
    /// `value`, matched exactly (wildcards in it are still escaped)
    None,
}

impl LikeSide {
    fn wrap(self, escaped: &str) -> String {
        match self {
            LikeSide::Both => format!("%{escaped}%"),
            LikeSide::Before => format!("%{escaped}"),
            LikeSide::After => format!("{escaped}%"),
            LikeSide::None => escaped.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    Having,
}

const AND: &str = "AND ";
const OR: &str = "OR ";

impl<'c> QueryBuilder<'c> {
    fn entries(&mut self, clause: Clause) -> &mut Vec<ConditionEntry> {
        match clause {
            Clause::Where => &mut self.cache.wheres,
            Clause::Having => &mut self.cache.havings,
        }
    }

    /// Joiner for a new entry: none at the start of a clause or right after `(`.
    fn joiner_for(&mut self, clause: Clause, joiner: &'static str) -> &'static str {
        match clause {
            Clause::Where => {
                let joiner = self.cache.brackets.next_joiner(joiner);
                if self.cache.wheres.is_empty() { "" } else { joiner }
            }
            Clause::Having => {
                if self.cache.havings.is_empty() {
                    ""
                } else {
                    joiner
                }
            }
        }
    }

    fn push_condition(
        &mut self,
        clause: Clause,
        joiner: &'static str,
        key: &str,
        value: Value,
        escape: Escape,
    ) -> &mut Self {
        let escape = self.resolve(escape);
        let joiner = self.joiner_for(clause, joiner);
        let key = key.trim();

        let condition = if value.is_null() {
            if !has_operator(key) {
                format!("{key} IS NULL")
            } else {
                null_comparison(key).unwrap_or_else(|| format!("{key} NULL"))
            }
        } else {
            let placeholder = self.cache.binds.bind(field_of(key), value);
            if has_operator(key) {
                format!("{key} :{placeholder}")
            } else {
                format!("{key} = :{placeholder}")
            }
        };

        self.entries(clause).push(ConditionEntry::Pending {
            fragment: format!("{joiner}{condition}"),
            escape,
        });
        self
    }

    fn push_raw(&mut self, clause: Clause, joiner: &'static str, condition: &str) -> &mut Self {
        let joiner = self.joiner_for(clause, joiner);
        let fragment = format!("{joiner}{}", condition.trim());
        self.entries(clause).push(ConditionEntry::Compiled(fragment));
        self
    }

    // ==================== WHERE ====================

    /// `AND key <op> value`.
    ///
    /// `key` is a column, optionally followed by an operator (`"age >"`,
    /// `"name !="`). Without one, `=` is used. A null value becomes
    /// `IS NULL` / `IS NOT NULL`.
    pub fn where_(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Clause::Where, AND, key, value.into(), Escape::Default)
    }

    pub fn or_where(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Clause::Where, OR, key, value.into(), Escape::Default)
    }

    /// [`where_`](Self::where_) with an explicit escaping mode for the field.
    pub fn where_with(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        escape: impl Into<Escape>,
    ) -> &mut Self {
        self.push_condition(Clause::Where, AND, key, value.into(), escape.into())
    }

    /// Add each `(key, value)` pair with AND.
    pub fn where_map<I, K, V>(&mut self, conditions: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in conditions {
            self.where_(key.as_ref(), value);
        }
        self
    }

    /// `AND <condition>`, verbatim.
    pub fn where_raw(&mut self, condition: &str) -> &mut Self {
        self.push_raw(Clause::Where, AND, condition)
    }

    pub fn or_where_raw(&mut self, condition: &str) -> &mut Self {
        self.push_raw(Clause::Where, OR, condition)
    }

    // ==================== HAVING ====================

    pub fn having(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Clause::Having, AND, key, value.into(), Escape::Default)
    }

    pub fn or_having(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.push_condition(Clause::Having, OR, key, value.into(), Escape::Default)
    }

    pub fn having_with(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        escape: impl Into<Escape>,
    ) -> &mut Self {
        self.push_condition(Clause::Having, AND, key, value.into(), escape.into())
    }

    pub fn having_raw(&mut self, condition: &str) -> &mut Self {
        self.push_raw(Clause::Having, AND, condition)
    }

    // ==================== IN ====================

    fn push_in<I, V>(&mut self, joiner: &'static str, field: &str, values: I, not: bool) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self.push_raw(Clause::Where, joiner, if not { "1=1" } else { "1=0" });
        }

        let field = field.trim();
        let placeholders = values
            .into_iter()
            .map(|value| format!(":{}", self.cache.binds.bind(field, value)))
            .collect::<Vec<_>>()
            .join(", ");
        let escape = self.protects_by_default();
        let joiner = self.joiner_for(Clause::Where, joiner);
        self.cache.wheres.push(ConditionEntry::Pending {
            fragment: format!(
                "{joiner}{field} {}IN ({placeholders})",
                if not { "NOT " } else { "" }
            ),
            escape,
        });
        self
    }

    /// `AND field IN (...)`; an empty list matches nothing.
    pub fn where_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(AND, field, values, false)
    }

    pub fn or_where_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(OR, field, values, false)
    }

    /// `AND field NOT IN (...)`; an empty list matches everything.
    pub fn where_not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(AND, field, values, true)
    }

    pub fn or_where_not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(OR, field, values, true)
    }

    /// `AND field IN (<sub-query>)`; the sub-query's binds are merged.
    pub fn where_in_subquery(&mut self, field: &str, sub: QueryBuilder<'_>) -> &mut Self {
        self.push_in_subquery(field, sub, false)
    }

    pub fn where_not_in_subquery(&mut self, field: &str, sub: QueryBuilder<'_>) -> &mut Self {
        self.push_in_subquery(field, sub, true)
    }

    fn push_in_subquery(&mut self, field: &str, sub: QueryBuilder<'_>, not: bool) -> &mut Self {
        let Some(sql) = self.absorb_subquery(sub) else {
            return self;
        };
        // The nested SQL must not be re-split on AND/OR, so protect the field now.
        let field = self.protect_column(field.trim(), self.protects_by_default());
        let condition = format!("{field} {}IN ({sql})", if not { "NOT " } else { "" });
        self.push_raw(Clause::Where, AND, &condition)
    }

    // ==================== BETWEEN ====================

    fn push_between(
        &mut self,
        joiner: &'static str,
        field: &str,
        low: Value,
        high: Value,
        not: bool,
    ) -> &mut Self {
        let field = field.trim().to_string();
        let low = self.cache.binds.bind(&field, low);
        let high = self.cache.binds.bind(&field, high);
        let escape = self.protects_by_default();
        let joiner = self.joiner_for(Clause::Where, joiner);
        self.cache.wheres.push(ConditionEntry::Between(BetweenEntry {
            joiner,
            not,
            field,
            low,
            high,
            escape,
        }));
        self
    }

    pub fn where_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_between(AND, field, low.into(), high.into(), false)
    }

    pub fn or_where_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_between(OR, field, low.into(), high.into(), false)
    }

    pub fn where_not_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_between(AND, field, low.into(), high.into(), true)
    }

    pub fn or_where_not_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_between(OR, field, low.into(), high.into(), true)
    }

    // ==================== LIKE ====================

    fn push_like(
        &mut self,
        joiner: &'static str,
        field: &str,
        pattern: &str,
        side: LikeSide,
        not: bool,
    ) -> &mut Self {
        let field = field.trim();
        let value = side.wrap(&self.dialect.escape_like_string(pattern));
        let placeholder = self.cache.binds.bind(field, value);
        let escape = self.protects_by_default();
        let joiner = self.joiner_for(Clause::Where, joiner);
        self.cache.wheres.push(ConditionEntry::Pending {
            fragment: format!(
                "{joiner}{field} {}LIKE :{placeholder}{}",
                if not { "NOT " } else { "" },
                self.dialect.like_escape_clause()
            ),
            escape,
        });
        self
    }

    /// `AND field LIKE '%pattern%'` (per `side`), with wildcards in `pattern` escaped.
    pub fn like(&mut self, field: &str, pattern: &str, side: LikeSide) -> &mut Self {
        self.push_like(AND, field, pattern, side, false)
    }

    pub fn or_like(&mut self, field: &str, pattern: &str, side: LikeSide) -> &mut Self {
        self.push_like(OR, field, pattern, side, false)
    }

    pub fn not_like(&mut self, field: &str, pattern: &str, side: LikeSide) -> &mut Self {
        self.push_like(AND, field, pattern, side, true)
    }

    pub fn or_not_like(&mut self, field: &str, pattern: &str, side: LikeSide) -> &mut Self {
        self.push_like(OR, field, pattern, side, true)
    }

    // ==================== Groups ====================

    fn open_group(&mut self, joiner: &str, not: bool) -> &mut Self {
        let first = self.cache.wheres.is_empty();
        let fragment = self.cache.brackets.open(joiner, not, first);
        self.cache.wheres.push(ConditionEntry::Bracket(fragment));
        self
    }

    /// Open `AND (`.
    pub fn group_start(&mut self) -> &mut Self {
        self.open_group(AND, false)
    }

    pub fn or_group_start(&mut self) -> &mut Self {
        self.open_group(OR, false)
    }

    pub fn not_group_start(&mut self) -> &mut Self {
        self.open_group(AND, true)
    }

    pub fn or_not_group_start(&mut self) -> &mut Self {
        self.open_group(OR, true)
    }

    /// Close the innermost group.
    pub fn group_end(&mut self) -> &mut Self {
        let fragment = self.cache.brackets.close();
        self.cache.wheres.push(ConditionEntry::Bracket(fragment));
        self
    }
}
