//! Parenthesis nesting for grouped WHERE conditions.

use crate::error::{DbError, DbResult};

/// Tracks bracket depth and suppresses the joiner right after an open bracket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BracketTracker {
    depth: isize,
    just_opened: bool,
}

impl BracketTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> isize {
        self.depth
    }

    /// Joiner for the next condition: empty exactly once after an open bracket.
    pub fn next_joiner<'a>(&mut self, joiner: &'a str) -> &'a str {
        if self.just_opened {
            self.just_opened = false;
            ""
        } else {
            joiner
        }
    }

    /// Open a group, returning `<joiner><NOT ><spaces-by-depth>(`.
    ///
    /// `first` is true when nothing precedes the group in its clause.
    pub fn open(&mut self, joiner: &str, not: bool, first: bool) -> String {
        let joiner = self.next_joiner(joiner);
        let joiner = if first { "" } else { joiner };
        self.just_opened = true;
        self.depth += 1;
        format!(
            "{joiner}{}{}(",
            if not { "NOT " } else { "" },
            " ".repeat(self.depth.max(0) as usize)
        )
    }

    /// Close the innermost group, returning `<spaces-by-depth>)`.
    pub fn close(&mut self) -> String {
        self.just_opened = false;
        let fragment = format!("{})", " ".repeat(self.depth.max(0) as usize));
        self.depth -= 1;
        fragment
    }

    /// Fail unless every opened group was closed exactly once.
    pub fn ensure_balanced(&self) -> DbResult<()> {
        if self.depth == 0 {
            Ok(())
        } else {
            Err(DbError::UnbalancedBracket { depth: self.depth })
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
