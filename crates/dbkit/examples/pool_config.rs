//! Named connection groups loaded from TOML, with failover
//!
//! Run with: cargo run --example pool_config -p dbkit
//!
//! The `main` group lists a primary database in a directory that does not
//! exist, so the connection falls over to the in-memory replica.

use dbkit::prelude::*;
use tracing_subscriber::EnvFilter;

const POOL: &str = r#"
default = "main"

[connections.main]
driver = "sqlite"
database = "/nonexistent/dbkit/primary.db"
tablePrefix = "app_"

[[connections.main.failover]]
driver = "sqlite"
database = ":memory:"
tablePrefix = "replica_"

[connections.reports]
driver = "sqlite"
database = ":memory:"
saveQueries = false
"#;

fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbkit=info")))
        .init();

    let pool = ConnectionPool::from_toml_str(POOL)?;
    println!("groups: {:?}", pool.names().collect::<Vec<_>>());

    let mut primary = pool.connect_default()?;
    println!(
        "main connected to {:?} with prefix {:?}",
        primary.config().database,
        primary.config().table_prefix
    );
    println!("prefixed table: {}", primary.prefix_table("events"));

    let mut reports = pool.connect("reports")?;
    reports.simple_query("CREATE TABLE totals (day TEXT, hits INTEGER)")?;
    reports.table("totals").insert([("day", "2024-01-01")])?;
    println!(
        "reports ran {} statement(s), kept {} in its log",
        reports.query_count(),
        reports.queries().len()
    );

    primary.disconnect();
    Ok(())
}
