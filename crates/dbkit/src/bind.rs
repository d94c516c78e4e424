//! Named bind parameters.
//!
//! The builder always renders `:name` placeholders. [`BindRegistry`] hands
//! out collision-free names and, right before execution, rewrites the
//! placeholders into whatever style the backend expects.

use crate::driver::PlaceholderStyle;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Ordered name → value map with deterministic collision handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindRegistry {
    entries: Vec<(String, Value)>,
}

impl BindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, or under `name_0`, `name_1`, ... when taken.
    ///
    /// Returns the name actually used (without the leading colon).
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> String {
        let base = sanitize(name);
        let mut key = base.clone();
        let mut n = 0usize;
        while self.contains(&key) {
            key = format!("{base}_{n}");
            n += 1;
        }
        self.entries.push((key.clone(), value.into()));
        key
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merge a sub-query's binds, renaming on collision.
    ///
    /// Returns `sql` rewritten to the new placeholder names.
    pub fn absorb(&mut self, other: BindRegistry, sql: &str) -> String {
        let mut renamed: HashMap<String, String> = HashMap::new();
        for (name, value) in other.entries {
            let new_name = self.bind(&name, value);
            if new_name != name {
                renamed.insert(name, new_name);
            }
        }
        if renamed.is_empty() {
            return sql.to_string();
        }
        rewrite_placeholders(sql, |name| renamed.get(name).map(|n| format!(":{n}")))
    }

    /// Rewrite known `:name` placeholders into `style`.
    ///
    /// Returns the final SQL and the positional parameters in slot order.
    /// `inline` renders a value as a literal for [`PlaceholderStyle::Inline`].
    pub fn render(
        &self,
        sql: &str,
        style: PlaceholderStyle,
        inline: impl Fn(&Value) -> String,
    ) -> (String, Vec<Value>) {
        let mut params: Vec<Value> = Vec::new();
        let mut slots: Vec<String> = Vec::new();

        let rendered = rewrite_placeholders(sql, |name| {
            let value = self.get(name)?;
            let placeholder = match style {
                PlaceholderStyle::Inline => inline(value),
                PlaceholderStyle::Question => {
                    params.push(value.clone());
                    "?".to_string()
                }
                PlaceholderStyle::Dollar | PlaceholderStyle::QuestionNumbered => {
                    let slot = match slots.iter().position(|s| s == name) {
                        Some(i) => i + 1,
                        None => {
                            slots.push(name.to_string());
                            params.push(value.clone());
                            slots.len()
                        }
                    };
                    if style == PlaceholderStyle::Dollar {
                        format!("${slot}")
                    } else {
                        format!("?{slot}")
                    }
                }
            };
            Some(placeholder)
        });

        (rendered, params)
    }
}

/// Normalize a column reference into a placeholder-safe name.
fn sanitize(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches(':');
    let last = trimmed.rsplit('.').next().unwrap_or(trimmed);
    let mut out: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string();
    if out.is_empty() {
        out.push_str("bind");
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'p');
    }
    out
}

/// Visit every `:name` token outside quoted text, replacing it when `replace` says so.
///
/// `::` casts are skipped.
pub(crate) fn rewrite_placeholders(
    sql: &str,
    mut replace: impl FnMut(&str) -> Option<String>,
) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => {
                quote = Some(b);
                i += 1;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start && !bytes[start].is_ascii_digit() {
                    if let Some(replacement) = replace(&sql[start..end]) {
                        out.push_str(&sql[copied..i]);
                        out.push_str(&replacement);
                        copied = end;
                    }
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }

    out.push_str(&sql[copied..]);
    out
}

/// A compiled statement: `:name` SQL plus its binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: BindRegistry,
}

impl Statement {
    pub fn new(sql: impl Into<String>, binds: BindRegistry) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }

    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, BindRegistry::new())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
