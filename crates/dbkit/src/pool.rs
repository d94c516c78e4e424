//! Backend registry and named connection groups.
//!
//! Drivers are resolved once, when the pool is built; handing out a
//! connection never looks a backend up by name again.
//!
//! # Example
//!
//! ```ignore
//! let pool = dbkit::ConnectionPool::from_toml_str(r#"
//!     default = "main"
//!     [connections.main]
//!     driver = "sqlite"
//!     database = ":memory:"
//! "#)?;
//! let mut conn = pool.connect_default()?;
//! ```

use crate::config::{Config, PoolConfig};
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{DbError, DbResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Map from backend tag to driver.
#[derive(Clone)]
pub struct BackendRegistry {
    drivers: HashMap<&'static str, Arc<dyn Driver>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags = self.tags();
        tags.sort_unstable();
        f.debug_struct("BackendRegistry").field("tags", &tags).finish()
    }
}

impl Default for BackendRegistry {
    /// Every driver compiled into this build.
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::driver::sqlite::SqliteDriver));
        #[cfg(feature = "postgres")]
        registry.register(Arc::new(crate::driver::postgres::PostgresDriver));
        registry
    }
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Add (or replace) the driver for its tag.
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(driver.tag(), driver);
        self
    }

    pub fn with(mut self, driver: Arc<dyn Driver>) -> Self {
        self.register(driver);
        self
    }

    /// Look up a driver; common aliases (`postgresql`, `pgsql`, `sqlite3`) are accepted.
    pub fn resolve(&self, tag: &str) -> DbResult<Arc<dyn Driver>> {
        let normalized = tag.trim().to_ascii_lowercase();
        let canonical = match normalized.as_str() {
            "postgresql" | "pgsql" | "pg" => "postgres",
            "sqlite3" => "sqlite",
            other => other,
        };
        self.drivers
            .get(canonical)
            .cloned()
            .ok_or_else(|| DbError::UnknownBackend(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.resolve(tag).is_ok()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.drivers.keys().copied().collect()
    }
}

struct Group {
    config: Config,
    driver: Arc<dyn Driver>,
}

/// Named connection groups with their drivers already resolved.
///
/// Every call to [`connect`](Self::connect) opens a fresh, independently
/// owned [`Connection`].
pub struct ConnectionPool {
    groups: BTreeMap<String, Group>,
    default: Option<String>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("groups", &self.groups.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

impl ConnectionPool {
    /// Resolve every group's driver through `registry`.
    pub fn new(config: PoolConfig, registry: &BackendRegistry) -> DbResult<Self> {
        let default = config.default_name().map(str::to_string);
        let mut groups = BTreeMap::new();
        for (name, group) in config.connections {
            group.validate()?;
            let driver = registry.resolve(&group.driver)?;
            groups.insert(
                name,
                Group {
                    config: group,
                    driver,
                },
            );
        }
        Ok(Self { groups, default })
    }

    /// Parse a pool document and resolve it against the built-in drivers.
    pub fn from_toml_str(raw: &str) -> DbResult<Self> {
        Self::new(PoolConfig::from_toml_str(raw)?, &BackendRegistry::default())
    }

    /// Open a connection for the group called `name`.
    pub fn connect(&self, name: &str) -> DbResult<Connection> {
        let group = self
            .groups
            .get(name)
            .ok_or_else(|| DbError::config(format!("no connection group named '{name}'")))?;
        Connection::connect(group.config.clone(), Arc::clone(&group.driver))
    }

    pub fn connect_default(&self) -> DbResult<Connection> {
        let name = self
            .default
            .as_deref()
            .ok_or_else(|| DbError::config("no connections configured"))?;
        self.connect(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn config(&self, name: &str) -> Option<&Config> {
        self.groups.get(name).map(|g| &g.config)
    }
}
