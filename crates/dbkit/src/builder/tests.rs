use super::*;
use crate::config::Config;
use crate::driver::{DatePart, Platform};
use crate::error::DbError;
use crate::value::Value;

fn mysql(prefix: &str) -> QueryBuilder<'static> {
    let config = Config::new("mysql").table_prefix(prefix);
    QueryBuilder::new(Arc::new(Dialect::from_config(&config, Platform::mysql())))
}

fn postgres() -> QueryBuilder<'static> {
    let config = Config::new("postgres");
    QueryBuilder::new(Arc::new(Dialect::from_config(&config, Platform::postgres())))
}

fn select_sql(qb: &mut QueryBuilder<'_>) -> String {
    qb.compile_select(false).unwrap().sql
}

#[test]
fn test_simple_select() {
    let mut qb = mysql("");
    qb.from("users");
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `users`");
}

#[test]
fn test_select_where_limit() {
    let mut qb = mysql("");
    qb.select("id,name").from("users").where_("age >", 18).limit(10);
    let statement = qb.compile_select(true).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT `id`, `name` FROM `users` WHERE `age` > :age LIMIT 10"
    );
    assert_eq!(statement.binds.len(), 1);
    assert_eq!(statement.binds.get("age"), Some(&Value::Int(18)));
}

#[test]
fn test_compile_with_reset_starts_over() {
    let mut qb = mysql("");
    qb.select("id").from("users").where_("id", 1);
    qb.compile_select(true).unwrap();
    assert_eq!(select_sql(&mut qb), "SELECT *");
    assert!(qb.binds().is_empty());
}

#[test]
fn test_insert_with_prefix() {
    let mut qb = mysql("wp_");
    qb.from("posts").set("name", "Jo");
    let statement = qb.compile_insert(true).unwrap();
    assert_eq!(statement.sql, "INSERT INTO `wp_posts` (`name`) VALUES (:name)");
    assert_eq!(statement.binds.get("name"), Some(&Value::from("Jo")));

    // The write reset keeps the table for the next write.
    qb.set("name", "Al");
    let next = qb.compile_insert(true).unwrap();
    assert_eq!(next.sql, "INSERT INTO `wp_posts` (`name`) VALUES (:name)");
    assert_eq!(next.binds.get("name"), Some(&Value::from("Al")));
}

#[test]
fn test_join_with_aliases() {
    let mut qb = mysql("");
    qb.select("u.*, r.name as role_name")
        .from("users u")
        .left_join("roles r", "u.role_id = r.id");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT `u`.*, `r`.`name` as `role_name` FROM `users` `u` LEFT JOIN `roles` `r` ON `u`.`role_id` = `r`.`id`"
    );
}

#[test]
fn test_join_prefixes_tables_but_not_aliases() {
    let mut qb = mysql("wp_");
    qb.from("users u").join("posts p", "p.user_id = u.id");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `wp_users` `u` JOIN `wp_posts` `p` ON `p`.`user_id` = `u`.`id`"
    );
}

#[test]
fn test_join_without_operator_uses_using() {
    let mut qb = mysql("");
    qb.from("a")
        .join_with("b", "id", JoinType::Left, Escape::Default);
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `a` LEFT JOIN `b` USING (`id`)");
}

#[test]
fn test_unescaped_using_column_is_verbatim() {
    let mut qb = mysql("");
    qb.from("a")
        .join_with("b", "user_id", JoinType::Left, Escape::ForceOff);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `a` LEFT JOIN b USING (user_id)"
    );
}

#[test]
fn test_unescaped_join_condition_is_verbatim() {
    let mut qb = mysql("");
    qb.from("a")
        .join_with("b", "a.x = b.y AND b.z > 1", JoinType::Inner, false);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `a` INNER JOIN b ON a.x = b.y AND b.z > 1"
    );
}

#[test]
fn test_repeated_field_gets_distinct_binds() {
    let mut qb = mysql("");
    qb.from("people").where_("age >", 18).where_("age <", 30);
    let statement = qb.compile_select(false).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `people` WHERE `age` > :age AND `age` < :age_0"
    );
    assert_eq!(statement.binds.get("age"), Some(&Value::Int(18)));
    assert_eq!(statement.binds.get("age_0"), Some(&Value::Int(30)));
}

#[test]
fn test_or_where_and_nulls() {
    let mut qb = mysql("");
    qb.from("t")
        .where_("deleted_at", Value::Null)
        .or_where("archived_at !=", None::<i64>)
        .or_where("status", "x");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` WHERE `deleted_at` IS NULL OR `archived_at` IS NOT NULL OR `status` = :status"
    );
}

#[test]
fn test_where_raw_is_not_protected() {
    let mut qb = mysql("");
    qb.from("t").where_("a", 1).where_raw("b.c = LOWER(d)");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` WHERE `a` = :a AND b.c = LOWER(d)"
    );
}

#[test]
fn test_where_map() {
    let mut qb = mysql("");
    qb.from("t").where_map([("a", 1), ("b >=", 2)]);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` WHERE `a` = :a AND `b` >= :b"
    );
}

#[test]
fn test_grouped_conditions() {
    let mut qb = mysql("");
    qb.from("t")
        .where_("a", 1)
        .group_start()
        .where_("b", 2)
        .or_where("c", 3)
        .group_end();
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` WHERE `a` = :a AND (`b` = :b OR `c` = :c)"
    );
}

#[test]
fn test_group_first_and_nested_not_group() {
    let mut qb = mysql("");
    qb.from("t")
        .group_start()
        .where_("a", 1)
        .or_not_group_start()
        .where_("b", 2)
        .where_("c", 3)
        .group_end()
        .group_end()
        .where_("d", 4);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` WHERE (`a` = :a OR NOT (`b` = :b AND `c` = :c)) AND `d` = :d"
    );
}

#[test]
fn test_balanced_brackets_compile() {
    let mut qb = mysql("");
    qb.from("t").group_start().group_start().where_("a", 1).group_end().group_end();
    assert!(qb.compile_select(false).is_ok());
}

#[test]
fn test_extra_open_bracket_is_an_error() {
    let mut qb = mysql("");
    qb.from("t")
        .group_start()
        .where_("a", 1)
        .group_start()
        .where_("b", 2)
        .group_end();
    assert_eq!(
        qb.compile_select(false),
        Err(DbError::UnbalancedBracket { depth: 1 })
    );
}

#[test]
fn test_failed_compile_keeps_state_for_repair() {
    let mut qb = mysql("");
    qb.from("users").group_start().where_("age >", 1);
    assert_eq!(
        qb.compile_select(true),
        Err(DbError::UnbalancedBracket { depth: 1 })
    );

    qb.group_end();
    let statement = qb.compile_select(true).unwrap();
    assert_eq!(statement.sql, "SELECT * FROM `users` WHERE (`age` > :age)");
    assert_eq!(statement.binds.get("age"), Some(&Value::Int(1)));

    qb.from("users")
        .set("name", "x")
        .group_start()
        .where_("id", 1);
    assert!(qb.compile_update(true).is_err());
    qb.group_end();
    let update = qb.compile_update(true).unwrap();
    assert_eq!(update.sql, "UPDATE `users` SET `name` = :name WHERE (`id` = :id)");
    assert_eq!(update.binds.len(), 2);
}

#[test]
fn test_where_in_variants() {
    let mut qb = mysql("");
    qb.from("t")
        .where_in("id", [1, 2, 3])
        .or_where_not_in("kind", ["a"]);
    let statement = qb.compile_select(false).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `t` WHERE `id` IN (:id, :id_0, :id_1) OR `kind` NOT IN (:kind)"
    );
    assert_eq!(statement.binds.get("id_1"), Some(&Value::Int(3)));
}

#[test]
fn test_where_in_empty() {
    let mut qb = mysql("");
    qb.from("t")
        .where_in("id", Vec::<i64>::new())
        .or_where_not_in("id", Vec::<i64>::new());
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `t` WHERE 1=0 OR 1=1");
}

#[test]
fn test_between_stays_inside_group() {
    let mut qb = mysql("");
    qb.from("products")
        .where_("active", true)
        .group_start()
        .where_between("price", 10, 20)
        .or_where_not_between("price", 100, 200)
        .group_end();
    let statement = qb.compile_select(false).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `products` WHERE `active` = :active AND (`price` BETWEEN :price AND :price_0 OR `price` NOT BETWEEN :price_1 AND :price_2)"
    );
    assert_eq!(statement.binds.get("price_2"), Some(&Value::Int(200)));
}

#[test]
fn test_like_escapes_wildcards() {
    let mut qb = mysql("");
    qb.from("t")
        .like("title", "50%_off", LikeSide::Both)
        .or_not_like("slug", "draft", LikeSide::After);
    let statement = qb.compile_select(false).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT * FROM `t` WHERE `title` LIKE :title ESCAPE '!' OR `slug` NOT LIKE :slug ESCAPE '!'"
    );
    assert_eq!(statement.binds.get("title"), Some(&Value::from("%50!%!_off%")));
    assert_eq!(statement.binds.get("slug"), Some(&Value::from("draft%")));
}

#[test]
fn test_group_by_having_and_aggregates() {
    let mut qb = mysql("");
    qb.select("dept")
        .select_count("id", None)
        .from("emp")
        .group_by("dept")
        .having("count_id >", 2);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT `dept`, COUNT(`id`) AS `count_id` FROM `emp` GROUP BY `dept` HAVING `count_id` > :count_id"
    );
}

#[test]
fn test_scalar_helpers() {
    let mut qb = mysql("");
    qb.select_max("age", None)
        .select_ucase("name", Some("shout"))
        .select_mid("code", 2, Some(3), None)
        .select_round("price", 2, None)
        .select_count("*", Some("n"))
        .from("t");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT MAX(`age`) AS `max_age`, UPPER(`name`) AS `shout`, SUBSTR(`code`, 2, 3) AS `mid_code`, ROUND(`price`, 2) AS `round_price`, COUNT(*) AS `n` FROM `t`"
    );
}

#[test]
fn test_date_helpers_follow_platform() {
    let mut qb = postgres();
    qb.select_date_part(DatePart::Year, "created", None)
        .select_format("created", "YYYY", Some("y"))
        .from("t");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT EXTRACT(YEAR FROM \"created\") AS \"year_created\", TO_CHAR(\"created\", 'YYYY') AS \"y\" FROM \"t\""
    );
}

#[test]
fn test_order_by_directions() {
    let mut qb = mysql("");
    qb.from("t").order_by("title desc, id", OrderDirection::Asc);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT * FROM `t` ORDER BY `title` DESC, `id` ASC"
    );

    let mut qb = mysql("");
    qb.from("t").order_by("7", OrderDirection::Random);
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `t` ORDER BY RAND(7)");

    let mut qb = postgres();
    qb.from("t").order_by_random(Some(7));
    assert_eq!(select_sql(&mut qb), "SELECT * FROM \"t\" ORDER BY RANDOM()");
}

#[test]
fn test_limit_offset_ignore_none() {
    let mut qb = mysql("");
    qb.from("t").limit(10).offset(20).limit(None::<u64>).offset(None::<u64>);
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `t` LIMIT 20, 10");

    let mut qb = postgres();
    qb.from("t").limit(10).offset(5);
    assert_eq!(select_sql(&mut qb), "SELECT * FROM \"t\" LIMIT 10 OFFSET 5");
}

#[test]
fn test_distinct_and_escape_off() {
    let mut qb = mysql("");
    qb.distinct(true)
        .select_with("a.b", false)
        .from("t")
        .where_with("a.b", 1, false);
    assert_eq!(
        select_sql(&mut qb),
        "SELECT DISTINCT a.b FROM `t` WHERE a.b = :b"
    );
}

#[test]
fn test_select_into_requires_platform_support() {
    let mut qb = mysql("");
    qb.from("t").select_into("backup");
    assert!(matches!(
        qb.compile_select(false),
        Err(DbError::Unsupported(_))
    ));

    let mut qb = postgres();
    qb.select("id").select_into("backup").from("t");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT \"id\" INTO \"backup\" FROM \"t\""
    );
}

#[test]
fn test_subquery_binds_are_renamed() {
    let mut qb = mysql("");
    let mut sub = qb.subquery();
    sub.select("user_id").from("orders").where_("status", "paid");
    qb.select("name")
        .from("users")
        .where_("status", "active")
        .where_in_subquery("id", sub);
    let statement = qb.compile_select(false).unwrap();
    assert_eq!(
        statement.sql,
        "SELECT `name` FROM `users` WHERE `status` = :status AND `id` IN (SELECT `user_id` FROM `orders` WHERE `status` = :status_0)"
    );
    assert_eq!(statement.binds.get("status"), Some(&Value::from("active")));
    assert_eq!(statement.binds.get("status_0"), Some(&Value::from("paid")));
}

#[test]
fn test_from_subquery() {
    let mut qb = mysql("");
    let mut sub = qb.subquery();
    sub.select("id").from("t").where_("x", 1);
    qb.from_subquery(sub, "s").select("s.id");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT `s`.`id` FROM (SELECT `id` FROM `t` WHERE `x` = :x) `s`"
    );
}

#[test]
fn test_broken_subquery_surfaces_at_compile() {
    let mut qb = mysql("");
    let mut sub = qb.subquery();
    sub.from("t").group_start();
    qb.from("users").where_in_subquery("id", sub);
    assert_eq!(
        qb.compile_select(false),
        Err(DbError::UnbalancedBracket { depth: 1 })
    );
}

#[test]
fn test_update_and_write_limit() {
    let mut qb = mysql("");
    qb.from("users").set("name", "x").where_("id", 1).limit(1);
    assert_eq!(
        qb.compile_update(true).unwrap().sql,
        "UPDATE `users` SET `name` = :name WHERE `id` = :id LIMIT 1"
    );

    let mut qb = postgres();
    qb.from("users").set("name", "x").limit(1);
    assert!(matches!(
        qb.compile_update(false),
        Err(DbError::Unsupported(_))
    ));
}

#[test]
fn test_set_raw_and_override() {
    let mut qb = mysql("");
    qb.from("pages")
        .set_raw("hits", "hits + 1")
        .set("title", "a")
        .set("title", "b")
        .where_("id", 3);
    let statement = qb.compile_update(false).unwrap();
    assert_eq!(
        statement.sql,
        "UPDATE `pages` SET `hits` = hits + 1, `title` = :title_0 WHERE `id` = :id"
    );
    assert_eq!(statement.binds.get("title_0"), Some(&Value::from("b")));
}

#[test]
fn test_delete_requires_where() {
    let mut qb = mysql("");
    qb.from("users");
    assert!(matches!(
        qb.compile_delete(false),
        Err(DbError::InvalidQuery(_))
    ));
    qb.where_("id", 9);
    assert_eq!(
        qb.compile_delete(false).unwrap().sql,
        "DELETE FROM `users` WHERE `id` = :id"
    );
}

#[test]
fn test_write_without_table() {
    let mut qb = mysql("");
    qb.set("a", 1);
    assert!(matches!(
        qb.compile_insert(false),
        Err(DbError::InvalidQuery(_))
    ));
}

#[test]
fn test_replace_depends_on_platform() {
    let mut qb = mysql("");
    qb.from("kv").set("k", "a").set("v", 1);
    assert_eq!(
        qb.compile_replace(false).unwrap().sql,
        "REPLACE INTO `kv` (`k`, `v`) VALUES (:k, :v)"
    );

    let mut qb = postgres();
    qb.from("kv").set("k", "a");
    assert!(matches!(
        qb.compile_replace(false),
        Err(DbError::Unsupported(_))
    ));
}

#[test]
fn test_insert_batch_chunks() {
    let mut qb = mysql("");
    qb.from("users").batch_size(2);
    let rows = vec![
        crate::record! { "name" => "a", "age" => 1 },
        crate::record! { "age" => 2, "name" => "b" },
        crate::record! { "name" => "c", "age" => 3 },
    ];
    let statements = qb.compile_insert_batch(&rows).unwrap();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].sql,
        "INSERT INTO `users` (`name`, `age`) VALUES (:name, :age), (:name_0, :age_0)"
    );
    assert_eq!(statements[0].binds.get("name_0"), Some(&Value::from("b")));
    assert_eq!(
        statements[1].sql,
        "INSERT INTO `users` (`name`, `age`) VALUES (:name, :age)"
    );
}

#[test]
fn test_insert_batch_rejects_mismatched_rows() {
    let mut qb = mysql("");
    qb.from("users");
    let rows = vec![
        crate::record! { "name" => "a", "age" => 1 },
        crate::record! { "name" => "b" },
    ];
    assert!(matches!(
        qb.compile_insert_batch(&rows),
        Err(DbError::InvalidQuery(_))
    ));
}

#[test]
fn test_update_batch_case_when() {
    let mut qb = mysql("");
    qb.from("users");
    let rows = vec![
        crate::record! { "id" => 1, "name" => "a" },
        crate::record! { "id" => 2, "name" => "b" },
    ];
    let statements = qb.compile_update_batch(&rows, "id").unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].sql,
        "UPDATE `users` SET `name` = CASE WHEN `id` = :id THEN :name WHEN `id` = :id_0 THEN :name_0 ELSE `name` END WHERE `id` IN (:id, :id_0)"
    );
    assert_eq!(statements[0].binds.get("id_0"), Some(&Value::Int(2)));
}

#[test]
fn test_update_batch_keeps_existing_where() {
    let mut qb = mysql("");
    qb.from("users").where_("tenant", 7);
    let rows = vec![crate::record! { "id" => 1, "name" => "a" }];
    let statements = qb.compile_update_batch(&rows, "id").unwrap();
    assert_eq!(
        statements[0].sql,
        "UPDATE `users` SET `name` = CASE WHEN `id` = :id THEN :name ELSE `name` END WHERE (`tenant` = :tenant) AND `id` IN (:id)"
    );
}

#[test]
fn test_update_batch_missing_index() {
    let mut qb = mysql("");
    qb.from("users");
    let rows = vec![
        crate::record! { "id" => 1, "name" => "a" },
        crate::record! { "name" => "b" },
    ];
    assert_eq!(
        qb.compile_update_batch(&rows, "id"),
        Err(DbError::MissingBatchIndex {
            index: "id".into(),
            row: 1
        })
    );
}

#[test]
fn test_count_all_results_in_test_mode() {
    let mut qb = mysql("");
    qb.test_mode(true);
    qb.from("users").where_("age >", 1).order_by("id", OrderDirection::Desc);
    assert_eq!(qb.count_all_results(true).unwrap(), 0);
    assert_eq!(
        qb.last_statement().unwrap().sql,
        "SELECT COUNT(*) AS `numrows` FROM `users` WHERE `age` > :age"
    );

    let mut qb = mysql("");
    qb.test_mode(true);
    qb.distinct(true).select("city").from("users");
    qb.count_all_results(false).unwrap();
    assert_eq!(
        qb.last_statement().unwrap().sql,
        "SELECT COUNT(*) AS `numrows` FROM (SELECT DISTINCT `city` FROM `users`) `dbkit_count_all_results`"
    );
}

#[test]
fn test_mode_keeps_state_and_skips_execution() {
    let mut qb = mysql("");
    qb.test_mode(true);
    qb.from("users").where_("id", 1);
    let result = qb.get().unwrap();
    assert!(result.is_empty());
    assert_eq!(
        qb.last_statement().unwrap().sql,
        "SELECT * FROM `users` WHERE `id` = :id"
    );
    // Nothing was reset.
    assert_eq!(select_sql(&mut qb), "SELECT * FROM `users` WHERE `id` = :id");
}

#[test]
fn test_detached_builder_cannot_execute() {
    let mut qb = mysql("");
    qb.from("users");
    assert!(matches!(qb.get(), Err(DbError::InvalidQuery(_))));
    assert!(qb.is_detached());
}

#[test]
fn test_truncate_statements() {
    let mut qb = mysql("wp_");
    qb.test_mode(true);
    qb.truncate(Some("logs")).unwrap();
    assert_eq!(qb.last_statement().unwrap().sql, "TRUNCATE `wp_logs`");
    qb.empty_table(Some("logs")).unwrap();
    assert_eq!(qb.last_statement().unwrap().sql, "DELETE FROM `wp_logs`");
}

#[test]
fn test_postgres_quoting() {
    let mut qb = postgres();
    qb.select("id").from("users").where_("name", "x");
    assert_eq!(
        select_sql(&mut qb),
        "SELECT \"id\" FROM \"users\" WHERE \"name\" = :name"
    );
}
