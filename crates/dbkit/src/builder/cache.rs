//! Builder state for one logical statement.

use crate::bind::BindRegistry;
use crate::bracket::BracketTracker;
use crate::error::DbError;
use std::mem;

/// A stored WHERE/HAVING entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConditionEntry {
    /// `<joiner><field><operator><placeholder>`; the field is protected at compile time.
    Pending { fragment: String, escape: bool },
    /// Final text, already protected.
    Compiled(String),
    /// Group open/close fragment from the bracket tracker.
    Bracket(String),
    /// BETWEEN / NOT BETWEEN, kept structured so its inner AND is not split.
    Between(BetweenEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BetweenEntry {
    pub joiner: &'static str,
    pub not: bool,
    pub field: String,
    pub low: String,
    pub high: String,
    pub escape: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectItem {
    pub expr: String,
    pub escape: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderItem {
    pub field: String,
    pub direction: &'static str,
    pub escape: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupItem {
    pub field: String,
    pub escape: bool,
}

/// Everything accumulated by the mutators.
#[derive(Debug, Clone, Default)]
pub(crate) struct BuilderCache {
    pub select: Vec<SelectItem>,
    pub distinct: bool,
    pub into: Option<String>,
    pub from: Vec<String>,
    pub joins: Vec<String>,
    pub wheres: Vec<ConditionEntry>,
    pub havings: Vec<ConditionEntry>,
    pub group_by: Vec<GroupItem>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Protected column → placeholder (or raw expression).
    pub set: Vec<(String, String)>,
    pub binds: BindRegistry,
    pub aliases: Vec<String>,
    pub brackets: BracketTracker,
    /// First error raised by a mutator, reported by the next compile.
    pub build_error: Option<DbError>,
}

impl BuilderCache {
    /// True once any WHERE, LIKE, IN or BETWEEN condition has been added.
    pub fn has_conditions(&self) -> bool {
        self.wheres
            .iter()
            .any(|entry| !matches!(entry, ConditionEntry::Bracket(_)))
    }

    pub fn set_entry(&mut self, column: String, value: String) {
        match self.set.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.set.push((column, value)),
        }
    }

    pub fn track_alias(&mut self, alias: &str) {
        if !alias.is_empty() && !self.aliases.iter().any(|a| a == alias) {
            self.aliases.push(alias.to_string());
        }
    }

    pub fn record_error(&mut self, error: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(error);
        }
    }

    /// Clear the read-side state after a read executes.
    ///
    /// Returns the consumed state. Binds are shared with the set-list, so
    /// nothing survives a read.
    pub fn reset_getter(&mut self) -> BuilderCache {
        mem::take(self)
    }

    /// Clear the write-side state after a write executes.
    ///
    /// The target table, joins, aliases and select list survive.
    pub fn reset_modifier(&mut self) {
        self.set.clear();
        self.wheres.clear();
        self.havings.clear();
        self.order_by.clear();
        self.limit = None;
        self.offset = None;
        self.binds.clear();
        self.brackets.reset();
        self.build_error = None;
    }
}
