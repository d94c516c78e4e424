//! Nested transactions on SQLite
//!
//! Run with: cargo run --example transactions -p dbkit
//!
//! Only the outermost begin/commit reaches the database. A failed statement
//! anywhere inside marks the group, and completing it rolls everything back.

use dbkit::prelude::*;
use tracing_subscriber::EnvFilter;

fn balance(conn: &mut Connection, name: &str) -> DbResult<i64> {
    let value = conn
        .table("accounts")
        .select("balance")
        .where_("name", name)
        .get()?
        .scalar::<i64>()?;
    Ok(value.unwrap_or_default())
}

/// Move `amount` between two accounts inside its own (possibly nested) group.
fn transfer(conn: &mut Connection, from: &str, to: &str, amount: i64) -> DbResult<()> {
    conn.transaction(|conn| {
        if balance(conn, from)? < amount {
            return Err(DbError::invalid(format!("{from} cannot cover {amount}")));
        }
        conn.table("accounts")
            .set_raw("balance", &format!("balance - {amount}"))
            .where_("name", from)
            .update(Record::new())?;
        conn.table("accounts")
            .set_raw("balance", &format!("balance + {amount}"))
            .where_("name", to)
            .update(Record::new())?;
        Ok(())
    })
}

fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("dbkit=debug"))
        .init();

    let mut conn = Connection::open(Config::new("sqlite").database(":memory:"))?;
    conn.simple_query("CREATE TABLE accounts (name TEXT PRIMARY KEY, balance INTEGER NOT NULL)")?;
    conn.table("accounts").insert_batch(&[
        record! { "name" => "alice", "balance" => 100 },
        record! { "name" => "bob", "balance" => 20 },
    ])?;

    transfer(&mut conn, "alice", "bob", 30)?;
    println!("after transfer: alice={} bob={}", balance(&mut conn, "alice")?, balance(&mut conn, "bob")?);

    // The inner group fails, so the outer one rolls back too
    conn.transaction_begin();
    transfer(&mut conn, "bob", "alice", 10)?;
    if let Err(err) = transfer(&mut conn, "bob", "alice", 1_000) {
        println!("inner transfer refused: {err}");
    }
    let committed = conn.transaction_complete();
    println!(
        "outer group committed: {committed}; alice={} bob={}",
        balance(&mut conn, "alice")?,
        balance(&mut conn, "bob")?
    );

    // Test mode: everything is rolled back regardless of outcome
    conn.transaction_begin_test();
    conn.table("accounts").where_("name", "bob").delete()?;
    conn.transaction_complete();
    println!("bob still there: {}", balance(&mut conn, "bob")? > 0);
    Ok(())
}
