use super::*;
use crate::driver::mock::MockDriver;
use crate::record;
use crate::value::Record;

fn connect(driver: &MockDriver, config: Config) -> Connection {
    Connection::connect(config, driver.arc()).unwrap()
}

fn mock() -> (MockDriver, Connection) {
    let driver = MockDriver::mysql();
    let conn = connect(&driver, Config::new("mock"));
    (driver, conn)
}

// ==================== Connect / failover ====================

#[test]
fn test_failover_uses_first_live_entry() {
    let driver = MockDriver::mysql();
    driver.fail_host("primary");
    driver.fail_host("replica-a");
    let config = Config::new("mock")
        .hostname("primary")
        .with_failover(Config::new("mock").hostname("replica-a"))
        .with_failover(Config::new("mock").hostname("replica-b"))
        .with_failover(Config::new("mock").hostname("replica-c"));

    let conn = connect(&driver, config);
    assert!(conn.is_connected());
    assert_eq!(conn.config().hostname, "replica-b");
    assert_eq!(
        driver.state().connects,
        vec!["primary", "replica-a", "replica-b"]
    );
}

#[test]
fn test_connect_fails_when_every_entry_fails() {
    let driver = MockDriver::mysql();
    driver.fail_host("primary");
    driver.fail_host("replica");
    let config = Config::new("mock")
        .hostname("primary")
        .with_failover(Config::new("mock").hostname("replica"));

    let err = Connection::connect(config, driver.arc()).unwrap_err();
    assert!(err.is_connection());
}

#[test]
fn test_failover_prefix_drives_dialect() {
    let driver = MockDriver::mysql();
    driver.fail_host("primary");
    let config = Config::new("mock")
        .hostname("primary")
        .table_prefix("a_")
        .with_failover(Config::new("mock").hostname("replica").table_prefix("b_"));

    let mut conn = connect(&driver, config);
    conn.table("posts").get().unwrap();
    assert_eq!(driver.statements(), vec!["SELECT * FROM `b_posts`"]);
}

#[test]
fn test_disconnect_and_reconnect() {
    let (driver, mut conn) = mock();
    conn.disconnect();
    assert!(!conn.is_connected());
    assert!(!conn.ping());
    assert_eq!(driver.state().closed, 1);
    assert!(conn.simple_query("SELECT 1").unwrap_err().is_connection());

    conn.reconnect().unwrap();
    assert!(conn.ping());
    assert_eq!(conn.version().unwrap(), "mock-1.0");
}

// ==================== Execution ====================

#[test]
fn test_builder_runs_through_connection() {
    let (driver, mut conn) = mock();
    conn.table("users")
        .select("id,name")
        .where_("age >", 18)
        .limit(10)
        .get()
        .unwrap();

    let state = driver.state();
    assert_eq!(
        state.statements,
        vec!["SELECT `id`, `name` FROM `users` WHERE `age` > ? LIMIT 10"]
    );
    assert_eq!(state.params[0], vec![Value::Int(18)]);
}

#[test]
fn test_query_log_keeps_template_and_final_sql() {
    let (_driver, mut conn) = mock();
    conn.table("posts").insert([("name", "Jo")]).unwrap();

    let last = conn.last_query().unwrap();
    assert_eq!(last.template(), "INSERT INTO `posts` (`name`) VALUES (:name)");
    assert_eq!(last.sql(), "INSERT INTO `posts` (`name`) VALUES (?)");
    assert_eq!(last.query_type(), QueryType::Insert);
    assert_eq!(last.binds().get("name"), Some(&Value::from("Jo")));
    assert!(last.is_success());
    assert_eq!(conn.queries().len(), 1);
    assert_eq!(conn.query_count(), 1);
    assert_eq!(conn.affected_rows(), 1);
    assert_eq!(conn.insert_id(), Some(Value::Int(1)));
}

#[test]
fn test_save_queries_off_keeps_only_last() {
    let driver = MockDriver::mysql();
    let mut conn = connect(&driver, Config::new("mock").save_queries(false));
    conn.simple_query("SELECT 1").unwrap();
    conn.simple_query("SELECT 2").unwrap();
    assert!(conn.queries().is_empty());
    assert_eq!(conn.query_count(), 2);
    assert_eq!(conn.last_query().unwrap().sql(), "SELECT 2");
}

#[test]
fn test_failure_without_debug_is_recorded() {
    let (driver, mut conn) = mock();
    driver.fail_sql("broken");
    let result = conn.simple_query("SELECT broken FROM t").unwrap();

    assert!(!result.is_success());
    assert_eq!(result.error().unwrap().code, "1064");
    let last = conn.last_query().unwrap();
    assert!(!last.is_success());
    assert_eq!(last.error().unwrap().code, "1064");
}

#[test]
fn test_failed_write_reports_false() {
    let (driver, mut conn) = mock();
    driver.fail_sql("INSERT");
    assert!(!conn.table("posts").insert([("name", "Jo")]).unwrap());
}

#[test]
fn test_debug_failure_unwinds_transactions() {
    let driver = MockDriver::mysql();
    let mut conn = connect(&driver, Config::new("mock").debug(true));
    driver.fail_sql("broken");

    assert!(conn.transaction_begin());
    assert!(conn.transaction_begin());
    let err = conn.simple_query("UPDATE broken SET a = 1").unwrap_err();

    assert!(matches!(&err, DbError::Statement { code, .. } if code == "1064"));
    assert_eq!(conn.transaction_depth(), 0);
    let state = driver.state();
    assert_eq!(state.begins, 1);
    assert_eq!(state.rollbacks, 1);
    assert_eq!(state.commits, 0);
}

#[test]
fn test_swap_prefix_in_raw_sql() {
    let driver = MockDriver::mysql();
    let mut conn = connect(
        &driver,
        Config::new("mock").table_prefix("wp_").with_swap_prefix("db_"),
    );
    conn.simple_query("SELECT * FROM db_posts").unwrap();
    assert_eq!(driver.statements(), vec!["SELECT * FROM wp_posts"]);
}

#[test]
fn test_raw_query_with_binds_reuses_slots() {
    let driver = MockDriver::new(Platform::postgres());
    let mut conn = connect(&driver, Config::new("mock"));
    let mut binds = BindRegistry::new();
    binds.bind("id", 7);
    conn.query("SELECT * FROM t WHERE a = :id OR b = :id", &binds)
        .unwrap();

    let state = driver.state();
    assert_eq!(state.statements[0], "SELECT * FROM t WHERE a = $1 OR b = $1");
    assert_eq!(state.params[0], vec![Value::Int(7)]);
}

#[test]
fn test_returning_write_counts_rows_from_link() {
    let driver = MockDriver::new(Platform::postgres());
    let mut conn = connect(&driver, Config::new("mock"));
    driver.respond(
        "RETURNING",
        &["id"],
        vec![vec![Value::Int(1)], vec![Value::Int(2)]],
    );
    let result = conn
        .query("INSERT INTO t (a) VALUES (1), (2) RETURNING id", &BindRegistry::new())
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.affected_rows(), 2);
    assert_eq!(conn.affected_rows(), 2);

    driver.respond("FROM t", &["a"], vec![vec![Value::Int(1)]]);
    let read = conn.query("SELECT a FROM t", &BindRegistry::new()).unwrap();
    assert_eq!(read.affected_rows(), 0);
    assert_eq!(conn.affected_rows(), 0);
}

#[test]
fn test_rows_come_back_through_get() {
    let (driver, mut conn) = mock();
    driver.respond(
        "FROM `users`",
        &["id", "name"],
        vec![vec![Value::Int(1), Value::from("Jo")]],
    );
    let rows = conn.table("users").get().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.first().unwrap().try_get::<String>("name").unwrap(), "Jo");
}

#[test]
fn test_count_all_results_reads_numrows() {
    let (driver, mut conn) = mock();
    driver.respond("COUNT(*)", &["numrows"], vec![vec![Value::Int(3)]]);
    let count = conn
        .table("users")
        .where_("active", true)
        .count_all_results(true)
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        driver.statements(),
        vec!["SELECT COUNT(*) AS `numrows` FROM `users` WHERE `active` = ?"]
    );
}

#[test]
fn test_insert_batch_chunks() {
    let (driver, mut conn) = mock();
    let rows: Vec<Record> = (0..5).map(|i| record! { "n" => i }).collect();
    let total = conn.table("nums").batch_size(2).insert_batch(&rows).unwrap();
    assert_eq!(total, 3);
    assert_eq!(driver.statements().len(), 3);
}

#[test]
fn test_batch_stops_after_failed_chunk() {
    let (driver, mut conn) = mock();
    driver.fail_sql("INSERT");
    let rows: Vec<Record> = (0..4).map(|i| record! { "n" => i }).collect();
    let total = conn.table("nums").batch_size(2).insert_batch(&rows).unwrap();
    assert_eq!(total, 0);
    assert_eq!(driver.statements().len(), 1);
}

// ==================== Escaping ====================

#[test]
fn test_escape_literals() {
    let (_driver, conn) = mock();
    assert_eq!(conn.escape("O'Neil"), "'O''Neil'");
    assert_eq!(conn.escape(None::<i32>), "NULL");
    assert_eq!(conn.escape(true), "1");
    assert_eq!(conn.escape(vec![0xABu8, 0x01]), "X'AB01'");
    assert_eq!(conn.escape_like_string("50%"), "50!%");
}

#[test]
fn test_identifier_helpers() {
    let driver = MockDriver::mysql();
    let conn = connect(&driver, Config::new("mock").table_prefix("wp_"));
    assert_eq!(conn.prefix_table("posts"), "wp_posts");
    assert_eq!(conn.escape_identifiers("posts.id"), "`posts`.`id`");
    assert_eq!(
        conn.protect_identifiers("posts.id", Protect::column()),
        "`wp_posts`.`id`"
    );
}

// ==================== Transactions ====================

#[test]
fn test_nested_commit_issues_one_begin_and_commit() {
    let (driver, mut conn) = mock();
    assert!(conn.transaction_begin());
    assert!(conn.transaction_begin());
    assert_eq!(conn.transaction_depth(), 2);
    assert!(conn.transaction_commit());
    assert!(conn.transaction_commit());
    assert_eq!(conn.transaction_depth(), 0);
    assert!(!conn.transaction_commit());

    let state = driver.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 1, 0));
}

#[test]
fn test_nested_rollback_issues_one_rollback() {
    let (driver, mut conn) = mock();
    conn.transaction_begin();
    conn.transaction_begin();
    assert!(conn.transaction_rollback());
    assert!(conn.transaction_rollback());

    let state = driver.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 0, 1));
}

fn failing_group(conn: &mut Connection) -> bool {
    conn.transaction_begin();
    conn.simple_query("UPDATE broken SET a = 1").unwrap();
    conn.transaction_complete()
}

fn clean_group(conn: &mut Connection) -> bool {
    conn.transaction_begin();
    conn.simple_query("UPDATE fine SET a = 1").unwrap();
    conn.transaction_complete()
}

#[test]
fn test_non_strict_failure_does_not_leak() {
    let (driver, mut conn) = mock();
    driver.fail_sql("broken");

    assert!(!failing_group(&mut conn));
    assert!(conn.transaction_status());
    assert!(clean_group(&mut conn));

    let state = driver.state();
    assert_eq!((state.commits, state.rollbacks), (1, 1));
}

#[test]
fn test_strict_failure_cascades_until_cleared() {
    let (driver, mut conn) = mock();
    conn.set_strict(true);
    driver.fail_sql("broken");

    assert!(!failing_group(&mut conn));
    assert!(!conn.transaction_status());
    assert!(!clean_group(&mut conn));

    conn.clear_transaction_status();
    assert!(clean_group(&mut conn));
}

#[test]
fn test_test_mode_always_rolls_back() {
    let (driver, mut conn) = mock();
    assert!(conn.transaction_begin_test());
    conn.simple_query("UPDATE fine SET a = 1").unwrap();
    assert!(!conn.transaction_complete());

    let state = driver.state();
    assert_eq!((state.commits, state.rollbacks), (0, 1));
}

#[test]
fn test_disabled_transactions_are_no_ops() {
    let (driver, mut conn) = mock();
    conn.transaction_disable();
    assert!(!conn.transaction_begin());
    assert!(!conn.transaction_complete());
    assert_eq!(driver.state().begins, 0);

    conn.transaction_enable();
    assert!(conn.transaction_begin());
}

#[test]
fn test_transaction_closure_runs_when_disabled() {
    let (driver, mut conn) = mock();
    conn.transaction_disable();
    let out = conn
        .transaction(|conn| {
            conn.table("users").insert(record! { "name" => "a" })?;
            Ok(1)
        })
        .unwrap();
    assert_eq!(out, 1);
    assert_eq!(conn.transaction_depth(), 0);

    let state = driver.state();
    assert_eq!(state.begins, 0);
    assert_eq!(state.commits, 0);
    assert!(state.statements.iter().any(|s| s.starts_with("INSERT INTO")));
}

#[test]
fn test_failure_outside_transaction_keeps_status() {
    let (driver, mut conn) = mock();
    driver.fail_sql("broken");
    conn.simple_query("UPDATE broken SET a = 1").unwrap();
    assert!(conn.transaction_status());
}

#[test]
fn test_transaction_closure_commits() {
    let (driver, mut conn) = mock();
    let id = conn
        .transaction(|conn| {
            conn.table("posts").insert([("name", "Jo")])?;
            Ok(conn.insert_id())
        })
        .unwrap();
    assert_eq!(id, Some(Value::Int(1)));
    assert_eq!(driver.state().commits, 1);
}

#[test]
fn test_transaction_closure_error_rolls_back() {
    let (driver, mut conn) = mock();
    let err = conn
        .transaction(|conn| -> DbResult<()> {
            conn.transaction(|_| Err(DbError::invalid("nope")))?;
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err, DbError::invalid("nope"));
    assert_eq!(conn.transaction_depth(), 0);

    let state = driver.state();
    assert_eq!((state.begins, state.commits, state.rollbacks), (1, 0, 1));
}

#[test]
fn test_transaction_closure_reports_failed_statement() {
    let (driver, mut conn) = mock();
    driver.fail_sql("broken");
    let err = conn
        .transaction(|conn| conn.simple_query("DELETE FROM broken WHERE id = 1"))
        .unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    assert_eq!(driver.state().rollbacks, 1);
}

// ==================== Metadata ====================

#[test]
fn test_tables_are_cached_and_filtered() {
    let driver = MockDriver::mysql();
    let mut conn = connect(&driver, Config::new("mock").table_prefix("wp_"));
    driver.respond(
        "SHOW TABLES",
        &["Tables_in_app"],
        vec![vec![Value::from("wp_posts")], vec![Value::from("audit")]],
    );

    assert_eq!(conn.get_tables(false).unwrap(), vec!["wp_posts", "audit"]);
    assert_eq!(conn.get_tables(true).unwrap(), vec!["wp_posts"]);
    assert!(conn.is_table_exists("posts").unwrap());
    assert!(!conn.is_table_exists("audit").unwrap());
    assert_eq!(driver.statements().len(), 1);
}

#[test]
fn test_fields_lookup_and_ddl_invalidation() {
    let (driver, mut conn) = mock();
    driver.respond(
        "SHOW COLUMNS",
        &["Field", "Type"],
        vec![
            vec![Value::from("id"), Value::from("int")],
            vec![Value::from("name"), Value::from("text")],
        ],
    );

    assert_eq!(conn.get_table_fields("users").unwrap(), vec!["id", "name"]);
    assert!(conn.is_table_field_exists("name", "users").unwrap());
    assert_eq!(driver.statements(), vec!["SHOW COLUMNS FROM `users`"]);

    conn.simple_query("ALTER TABLE users ADD email TEXT").unwrap();
    conn.get_table_fields("users").unwrap();
    assert_eq!(driver.statements().len(), 3);
}

#[test]
fn test_set_database_reconnects_and_clears_cache() {
    let (driver, mut conn) = mock();
    driver.respond("SHOW DATABASES", &["Database"], vec![vec![Value::from("app")]]);
    assert_eq!(conn.get_databases().unwrap(), vec!["app"]);

    conn.set_database("other").unwrap();
    assert_eq!(conn.config().database, "other");
    conn.get_databases().unwrap();
    let state = driver.state();
    assert_eq!(state.connects.len(), 2);
    assert_eq!(state.statements.len(), 2);
}
