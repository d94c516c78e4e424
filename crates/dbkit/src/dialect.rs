//! Per-connection bundle of platform facts, identifier protector and LIKE settings.

use crate::config::Config;
use crate::driver::Platform;
use crate::ident::IdentifierProtector;

/// Everything a builder needs to render SQL for one connection.
///
/// Built once per connection (and again after a failover switches the
/// active configuration) and shared with every builder through an `Arc`.
#[derive(Debug, Clone)]
pub struct Dialect {
    platform: Platform,
    protector: IdentifierProtector,
    like_escape_character: char,
    like_escape_clause: String,
}

impl Dialect {
    pub fn new(platform: Platform, protector: IdentifierProtector, config: &Config) -> Self {
        Self {
            platform,
            protector,
            like_escape_character: config.like_escape_character,
            like_escape_clause: config.like_escape_clause(),
        }
    }

    pub fn from_config(config: &Config, platform: Platform) -> Self {
        let protector = IdentifierProtector::from_config(config, &platform);
        Self::new(platform, protector, config)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn protector(&self) -> &IdentifierProtector {
        &self.protector
    }

    pub fn like_escape_character(&self) -> char {
        self.like_escape_character
    }

    /// LIKE escape clause with one leading space, or empty when disabled.
    pub fn like_escape_clause(&self) -> String {
        let clause = self.like_escape_clause.trim();
        if clause.is_empty() {
            String::new()
        } else {
            format!(" {clause}")
        }
    }

    /// Escape `%`, `_` and the escape character itself for use in a LIKE pattern.
    pub fn escape_like_string(&self, raw: &str) -> String {
        let esc = self.like_escape_character;
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c == '%' || c == '_' || c == esc {
                out.push(esc);
            }
            out.push(c);
        }
        out
    }
}
