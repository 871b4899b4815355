use quarry::prelude::*;

use crate::common::{Customer, compile_sqlite, customers, ids, setup_db, sorted_ids};

fn fetch(query: &QueryBuilder) -> Vec<Customer> {
    let store = setup_db();
    compile_sqlite(query)
        .fetch_all(&store, &Parameters::new())
        .unwrap()
}

#[test]
fn pushed_filter_matches_reference() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").ge(30).and(c.member("city").ne("Oslo")));
    let compiled = compile_sqlite(&query);
    assert!(!compiled.requires_client_eval());

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    let expected: Vec<Customer> = customers()
        .into_iter()
        .filter(|c| c.age >= 30 && c.city.as_deref() != Some("Oslo"))
        .collect();
    assert_eq!(sorted_ids(&rows), sorted_ids(&expected));
    assert_eq!(sorted_ids(&rows), [2, 5]);
}

#[test]
fn ordering_is_applied_on_the_server() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([Ordering::desc(c.member("age"))]);
    let rows = fetch(&query);

    let mut expected = customers();
    expected.sort_by(|a, b| b.age.cmp(&a.age));
    assert_eq!(ids(&rows), ids(&expected));
}

#[test]
fn later_ordering_keys_break_ties() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([
        Ordering::asc(c.member("city")),
        Ordering::desc(c.member("name")),
    ]);
    let rows = fetch(&query);
    // NULL cities sort first in SQLite
    assert_eq!(ids(&rows), [5, 2, 3, 4, 1]);
}

#[test]
fn null_comparisons_match_null_rows() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").is_null());
    assert_eq!(sorted_ids(&fetch(&query)), [2, 5]);

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").is_not_null());
    assert_eq!(sorted_ids(&fetch(&query)), [1, 3, 4]);
}

#[test]
fn equality_chain_runs_as_in_list() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(
        c.member("id")
            .eq(1)
            .or(c.member("id").eq(3))
            .or(c.member("id").eq(5)),
    );
    let compiled = compile_sqlite(&query);
    assert!(compiled.sql().contains(r#""c"."id" IN (?, ?, ?)"#));

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(sorted_ids(&rows), [1, 3, 5]);
}

#[test]
fn not_in_keeps_null_rows() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").not_in_list(["Oslo"]));
    let rows = fetch(&query);
    let expected: Vec<Customer> = customers()
        .into_iter()
        .filter(|c| c.city.as_deref() != Some("Oslo"))
        .collect();
    assert_eq!(sorted_ids(&rows), sorted_ids(&expected));
}

#[test]
fn string_methods_are_case_sensitive() {
    let cases: [(fn(Expr) -> Expr, Vec<i64>); 4] = [
        (|name| name.starts_with("A"), vec![1]),
        (|name| name.ends_with("a"), vec![1, 4]),
        (|name| name.contains("in"), vec![3]),
        (|name| name.to_upper().eq("KEN"), vec![5]),
    ];
    for (predicate, expected) in cases {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query.filter(predicate(c.member("name")));
        assert_eq!(sorted_ids(&fetch(&query)), expected);
    }
}

#[test]
fn arithmetic_and_conditionals_are_translated() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("age").add(10).gt(50))
        .order_by([Ordering::asc(c.member("id"))])
        .select(tuple([
            c.member("name"),
            condition(c.member("city").is_null(), "unknown", c.member("city")),
        ]));
    let compiled = compile_sqlite(&query);
    assert!(!compiled.requires_client_eval());

    let store = setup_db();
    let rows: Vec<(String, String)> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(
        rows,
        [
            ("Grace".to_string(), "unknown".to_string()),
            ("Barbara".to_string(), "Oslo".to_string()),
        ]
    );
}

#[test]
fn join_projects_both_sources() {
    let mut query = QueryBuilder::from("Order");
    let o = query.root();
    let c = query.join("Customer", o.member("customer_id"), |c| c.member("id"));
    query
        .order_by([Ordering::asc(o.member("id"))])
        .select(tuple([o.member("id"), c.member("name")]));
    let compiled = compile_sqlite(&query);
    assert!(compiled.sql().contains("INNER JOIN"));

    let store = setup_db();
    let rows: Vec<(i64, String)> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    let names: Vec<(i64, &str)> = rows.iter().map(|(id, n)| (*id, n.as_str())).collect();
    assert_eq!(
        names,
        [
            (10, "Ada"),
            (11, "Ada"),
            (30, "Linus"),
            (31, "Linus"),
            (32, "Linus"),
            (40, "Barbara")
        ]
    );
}

#[test]
fn additional_from_is_a_cross_join() {
    let mut query = QueryBuilder::from("Customer");
    query.add_from("Order");
    query.count();
    let compiled = compile_sqlite(&query);
    assert!(compiled.sql().contains("CROSS JOIN"));

    let store = setup_db();
    let count: i64 = compiled.fetch_scalar(&store, &Parameters::new()).unwrap();
    assert_eq!(count, 30);
}

#[test]
fn derived_entity_source_filters_by_discriminator() {
    let mut query = QueryBuilder::from("Cat");
    let a = query.root();
    query
        .order_by([Ordering::asc(a.member("id"))])
        .select(a.member("name"));
    let store = setup_db();
    let names: Vec<String> = compile_sqlite(&query)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    assert_eq!(names, ["Tom", "Kit"]);
}
