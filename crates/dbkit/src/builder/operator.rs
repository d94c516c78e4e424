//! Comparison-operator detection for condition keys and join conditions.

use regex::Regex;
use std::sync::OnceLock;

fn has_operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(<|>|!|=|\sIS NULL|\sIS NOT NULL|\sEXISTS\s*\(.*\)|\sBETWEEN|\sLIKE|\sIN\s*\(|\s)")
            .expect("invalid built-in operator regex")
    })
}

fn operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\s*(?:<|>|!)?=\s*",
            r"|\s*<>?\s*",
            r"|\s*>\s*",
            r"|\s+IS NULL",
            r"|\s+IS NOT NULL",
            r"|\s+EXISTS\s*\(.*\)",
            r"|\s+NOT EXISTS\s*\(.*\)",
            r"|\s+BETWEEN\s+",
            r"|\s+IN\s*\(.*\)",
            r"|\s+NOT IN\s*\(.*\)",
            r"|\s+LIKE\s+\S.*",
            r"|\s+NOT LIKE\s+\S.*",
        ))
        .expect("invalid built-in operator regex")
    })
}

fn null_operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(!?=|<>|\sIS(?:\s+NOT)?)\s*$").expect("invalid built-in null regex")
    })
}

fn comparison_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)\s*(=|!=|<>|<=|>=|<|>)\s*(.*)$").expect("invalid built-in comparison regex")
    })
}

fn joint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|\s+)(?:AND|OR)\s+").expect("invalid built-in joint regex")
    })
}

/// True when `key` already carries a comparison (or any whitespace).
pub(crate) fn has_operator(key: &str) -> bool {
    has_operator_re().is_match(key.trim())
}

/// Byte span of the first comparison operator in `condition`.
pub(crate) fn find_operator(condition: &str) -> Option<(usize, usize)> {
    operator_re()
        .find(condition)
        .map(|m| (m.start(), m.end()))
}

/// Rewrite a trailing `=`/`!=`/`<>`/`IS`/`IS NOT` into `IS NULL`/`IS NOT NULL`.
pub(crate) fn null_comparison(key: &str) -> Option<String> {
    let caps = null_operator_re().captures(key)?;
    let whole = caps.get(0)?;
    let op = caps.get(1)?.as_str().trim().to_ascii_uppercase();
    let negated = op == "!=" || op == "<>" || op.ends_with("NOT");
    Some(format!(
        "{} {}",
        &key[..whole.start()],
        if negated { "IS NOT NULL" } else { "IS NULL" }
    ))
}

/// Left-hand field of a condition key such as `age >` or `name`.
pub(crate) fn field_of(key: &str) -> &str {
    let key = key.trim();
    match find_operator(key) {
        Some((start, _)) if start > 0 => key[..start].trim(),
        _ => key.split_whitespace().next().unwrap_or(key),
    }
}

/// `(left, operator, right)` of a simple comparison such as `a.id = b.a_id`.
pub(crate) fn split_comparison(condition: &str) -> Option<(&str, &str, &str)> {
    let caps = comparison_re().captures(condition.trim())?;
    let (Some(left), Some(op), Some(right)) = (caps.get(1), caps.get(2), caps.get(3)) else {
        return None;
    };
    Some((left.as_str(), op.as_str(), right.as_str()))
}

/// Split on `AND`/`OR` boundaries, keeping the joints as separate pieces.
pub(crate) fn split_joints(condition: &str) -> Vec<(bool, &str)> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in joint_re().find_iter(condition) {
        if m.start() > last {
            pieces.push((false, &condition[last..m.start()]));
        }
        pieces.push((true, m.as_str()));
        last = m.end();
    }
    if last < condition.len() {
        pieces.push((false, &condition[last..]));
    }
    pieces
}
