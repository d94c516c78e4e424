//! Quickstart against an in-memory SQLite database
//!
//! Run with: cargo run --example sqlite_quickstart -p dbkit
//!
//! Set RUST_LOG=dbkit.sql=debug to see every statement as it runs.

use dbkit::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Book {
    id: i64,
    title: String,
    year: i64,
}

impl FromRow for Book {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
        })
    }
}

fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::new("sqlite").database(":memory:").table_prefix("lib_");
    let mut conn = Connection::open(config)?;
    println!("Connected to SQLite {}", conn.version()?);

    conn.simple_query(
        "CREATE TABLE lib_books (id INTEGER PRIMARY KEY, title TEXT NOT NULL, year INTEGER)",
    )?;

    // Multi-row insert, chunked by the builder's batch size
    let books = vec![
        record! { "title" => "The Rust Programming Language", "year" => 2018 },
        record! { "title" => "Programming Rust", "year" => 2017 },
        record! { "title" => "Rust for Rustaceans", "year" => 2021 },
        record! { "title" => "Zero To Production", "year" => 2022 },
    ];
    let inserted = conn.table("books").insert_batch(&books)?;
    println!("Inserted {inserted} books");

    let recent: Vec<Book> = conn
        .table("books")
        .select("id, title, year")
        .where_("year >=", 2018)
        .like("title", "Rust", LikeSide::Both)
        .order_by("year", OrderDirection::Desc)
        .get()?
        .rows_as()?;
    for book in &recent {
        println!("  #{} {} ({})", book.id, book.title, book.year);
    }

    let query = conn.last_query().map(|q| q.sql().to_string());
    println!("Last statement: {}", query.unwrap_or_default());

    conn.table("books")
        .where_("year <", 2018)
        .update([("title", "Programming Rust, 1st ed.")])?;
    println!("Updated {} row(s)", conn.affected_rows());

    let total = conn.table("books").count_all(None)?;
    println!("{total} books, tables: {:?}", conn.get_tables(true)?);
    Ok(())
}
