//! Identifier protection.
//!
//! [`IdentifierProtector`] turns raw table/column references into escaped,
//! prefix-adjusted references. It never fails: anything it does not
//! recognise as a bare identifier (function calls, literals, numbers) is
//! returned unchanged.
//!
//! # Example
//! ```ignore
//! use dbkit::{EscapeCharacter, IdentifierProtector, Protect};
//!
//! let p = IdentifierProtector::new(&EscapeCharacter::single("`"), &["*"], "wp_", "");
//! assert_eq!(p.protect("posts.id", Protect::column(), &[]), "`wp_posts`.`id`");
//! assert_eq!(p.protect("posts p", Protect::table(), &[]), "`wp_posts` `p`");
//! ```

use crate::config::{Config, EscapeCharacter};
use crate::driver::Platform;
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Per-call escaping override, resolved against the builder default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escape {
    #[default]
    Default,
    ForceOn,
    ForceOff,
}

impl Escape {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Escape::Default => default,
            Escape::ForceOn => true,
            Escape::ForceOff => false,
        }
    }
}

impl From<bool> for Escape {
    fn from(value: bool) -> Self {
        if value { Escape::ForceOn } else { Escape::ForceOff }
    }
}

impl From<Option<bool>> for Escape {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Escape::Default, Escape::from)
    }
}

/// Options for a single [`IdentifierProtector::protect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protect {
    /// Apply the table prefix to a reference with no dots.
    pub prefix_single: bool,
    pub escape: Escape,
    /// The trailing segment is a column (false when protecting a bare table, e.g. in a join).
    pub field_exists: bool,
}

impl Default for Protect {
    fn default() -> Self {
        Self::column()
    }
}

impl Protect {
    /// Column reference: prefix only dotted table segments.
    pub fn column() -> Self {
        Self {
            prefix_single: false,
            escape: Escape::Default,
            field_exists: true,
        }
    }

    /// Table reference: prefix single segments, no trailing column.
    pub fn table() -> Self {
        Self {
            prefix_single: true,
            escape: Escape::Default,
            field_exists: false,
        }
    }

    pub fn escape(mut self, escape: Escape) -> Self {
        self.escape = escape;
        self
    }
}

/// Escapes and prefixes identifiers for one connection's dialect.
#[derive(Debug, Clone)]
pub struct IdentifierProtector {
    open: String,
    close: String,
    reserved: Vec<String>,
    prefix: String,
    swap_prefix: String,
    protect_by_default: bool,
    /// One dotted piece, optionally already wrapped, plus the trailing dot.
    pattern: Option<Regex>,
    /// Swap prefix at a word start, for raw statements.
    swap_pattern: Option<Regex>,
}

impl IdentifierProtector {
    pub fn new<S: AsRef<str>>(
        escape: &EscapeCharacter,
        reserved: &[S],
        prefix: &str,
        swap_prefix: &str,
    ) -> Self {
        let open = escape.open().to_string();
        let close = escape.close().to_string();
        let pattern = if open.is_empty() {
            None
        } else {
            Regex::new(&format!(
                "{o}?([^{c}.]+){c}?(\\.)?",
                o = regex::escape(&open),
                c = regex::escape(&close)
            ))
            .ok()
        };
        let swap_pattern = if swap_prefix.is_empty() || prefix.is_empty() || swap_prefix == prefix
        {
            None
        } else {
            Regex::new(&format!(r"(^|\W){}(\S)", regex::escape(swap_prefix))).ok()
        };

        Self {
            open,
            close,
            reserved: reserved.iter().map(|s| s.as_ref().to_string()).collect(),
            prefix: prefix.to_string(),
            swap_prefix: swap_prefix.to_string(),
            protect_by_default: true,
            pattern,
            swap_pattern,
        }
    }

    /// Build from a connection config, falling back to the platform's escape character.
    pub fn from_config(config: &Config, platform: &Platform) -> Self {
        let escape = config
            .escape_character
            .clone()
            .unwrap_or_else(|| platform.escape.clone());
        Self::new(
            &escape,
            &config.reserved_identifiers,
            &config.table_prefix,
            &config.swap_prefix,
        )
        .with_default_protection(config.protect_identifiers)
    }

    pub fn with_default_protection(mut self, enabled: bool) -> Self {
        self.protect_by_default = enabled;
        self
    }

    pub fn protects_by_default(&self) -> bool {
        self.protect_by_default
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn swap_prefix(&self) -> &str {
        &self.swap_prefix
    }

    pub fn escape_open(&self) -> &str {
        &self.open
    }

    pub fn escape_close(&self) -> &str {
        &self.close
    }

    pub fn is_reserved(&self, item: &str) -> bool {
        self.reserved.iter().any(|r| r == item)
    }

    /// Remove one level of escape wrapping, if present.
    pub fn strip_escape<'a>(&self, item: &'a str) -> &'a str {
        if self.open.is_empty() {
            return item;
        }
        item.strip_prefix(self.open.as_str())
            .and_then(|rest| rest.strip_suffix(self.close.as_str()))
            .unwrap_or(item)
    }

    /// Prepend the table prefix to a bare table name.
    pub fn prefix_table(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }

    // ==================== Escaping ====================

    /// Wrap every dot-delimited piece of `item` in the escape characters.
    ///
    /// Numbers, quoted literals, function calls and reserved identifiers are
    /// left alone.
    pub fn escape_identifiers(&self, item: &str) -> String {
        if self.open.is_empty() || item.is_empty() || self.is_reserved(item) {
            return item.to_string();
        }
        if is_numeric(item)
            || item.starts_with('\'')
            || item.contains('(')
            || self.is_foreign_quoted(item)
        {
            return item.to_string();
        }
        let Some(pattern) = &self.pattern else {
            return item.to_string();
        };

        pattern
            .replace_all(item, |caps: &Captures<'_>| {
                let piece = &caps[1];
                let dot = caps.get(2).map_or("", |m| m.as_str());
                if self.is_reserved(piece) {
                    format!("{piece}{dot}")
                } else {
                    format!("{}{piece}{}{dot}", self.open, self.close)
                }
            })
            .into_owned()
    }

    pub fn escape_all<S: AsRef<str>>(&self, items: &[S]) -> Vec<String> {
        items
            .iter()
            .map(|item| self.escape_identifiers(item.as_ref()))
            .collect()
    }

    fn is_foreign_quoted(&self, item: &str) -> bool {
        ['"', '`']
            .into_iter()
            .any(|q| item.starts_with(q) && !self.open.starts_with(q))
    }

    // ==================== Protection ====================

    /// Escape and prefix a table or column reference.
    ///
    /// `aliases` holds table aliases declared so far in the statement; a
    /// dotted reference starting with one of them is never prefixed.
    pub fn protect<S: AsRef<str>>(&self, item: &str, opts: Protect, aliases: &[S]) -> String {
        let escape = opts.escape.resolve(self.protect_by_default);

        if item.is_empty() || item.contains(['(', ')', '\'']) {
            return item.to_string();
        }

        let normalized = item.split_whitespace().collect::<Vec<_>>().join(" ");
        let (base, alias) = self.split_alias(&normalized, escape);

        // Quoted for another platform: the caller owns the name as written.
        if self.is_foreign_quoted(base) {
            return format!("{base}{alias}");
        }

        if base.contains('.') {
            return self.protect_dotted(base, &alias, opts, escape, aliases);
        }

        let mut token = Cow::Borrowed(base);
        if opts.prefix_single && !self.prefix.is_empty() {
            if let Some(prefixed) = self.apply_prefix(self.strip_escape(base)) {
                token = Cow::Owned(prefixed);
            }
        }

        if escape && !self.is_reserved(self.strip_escape(&token)) {
            format!("{}{}", self.escape_identifiers(&token), alias)
        } else {
            format!("{token}{alias}")
        }
    }

    /// Element-wise [`protect`](Self::protect).
    pub fn protect_many<S: AsRef<str>, A: AsRef<str>>(
        &self,
        items: &[S],
        opts: Protect,
        aliases: &[A],
    ) -> Vec<String> {
        items
            .iter()
            .map(|item| self.protect(item.as_ref(), opts, aliases))
            .collect()
    }

    fn protect_dotted<S: AsRef<str>>(
        &self,
        base: &str,
        alias: &str,
        opts: Protect,
        escape: bool,
        aliases: &[S],
    ) -> String {
        let mut parts: Vec<String> = base.split('.').map(str::to_string).collect();

        let head = self.strip_escape(&parts[0]);
        if aliases.iter().any(|a| a.as_ref() == head) {
            let joined = if escape {
                parts
                    .iter()
                    .map(|p| {
                        if self.is_reserved(p) {
                            p.clone()
                        } else {
                            self.escape_identifiers(p)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            } else {
                base.to_string()
            };
            return format!("{joined}{alias}");
        }

        if !self.prefix.is_empty() {
            let last = parts.len() - 1;
            let mut i = parts.len().saturating_sub(2);
            if !opts.field_exists {
                i += 1;
            }
            let i = i.min(last);
            if let Some(prefixed) = self.apply_prefix(self.strip_escape(&parts[i])) {
                parts[i] = prefixed;
            }
        }

        let joined = parts.join(".");
        if escape {
            format!("{}{}", self.escape_identifiers(&joined), alias)
        } else {
            format!("{joined}{alias}")
        }
    }

    /// Swap or prepend the table prefix; `None` when the segment is already prefixed.
    fn apply_prefix(&self, segment: &str) -> Option<String> {
        if !self.swap_prefix.is_empty() && segment.starts_with(&self.swap_prefix) {
            let rest = &segment[self.swap_prefix.len()..];
            if rest.is_empty() {
                return None;
            }
            return Some(format!("{}{}", self.prefix, rest));
        }
        if segment.starts_with(&self.prefix) {
            None
        } else {
            Some(format!("{}{}", self.prefix, segment))
        }
    }

    /// Split a trailing alias off a normalized reference.
    fn split_alias<'a>(&self, item: &'a str, escape: bool) -> (&'a str, String) {
        let lower = item.to_ascii_lowercase();
        if let Some(pos) = lower.rfind(" as ").filter(|p| *p > 0) {
            let alias = if escape {
                format!(
                    "{}{}",
                    &item[pos..pos + 4],
                    self.escape_identifiers(&item[pos + 4..])
                )
            } else {
                item[pos..].to_string()
            };
            return (&item[..pos], alias);
        }
        if let Some(pos) = item.rfind(' ').filter(|p| *p > 0) {
            let alias = if escape {
                format!(" {}", self.escape_identifiers(&item[pos + 1..]))
            } else {
                item[pos..].to_string()
            };
            return (&item[..pos], alias);
        }
        (item, String::new())
    }

    // ==================== Raw statements ====================

    /// Replace the swap prefix with the real prefix wherever it starts a word.
    pub fn swap_prefixes_in<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match &self.swap_pattern {
            Some(re) => re.replace_all(sql, |caps: &Captures<'_>| {
                format!("{}{}{}", &caps[1], self.prefix, &caps[2])
            }),
            None => Cow::Borrowed(sql),
        }
    }
}

fn is_numeric(item: &str) -> bool {
    let mut digits = 0;
    for c in item.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => {}
            _ => return false,
        }
    }
    digits > 0
}
