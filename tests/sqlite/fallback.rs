use quarry::prelude::*;

use crate::common::{
    Customer, compile_sqlite, customers, identity, ids, setup_db, shout, sorted_ids,
};

/// Runs `predicate` pushed to the server and again behind a client filter
/// that forces every later operator onto the client.
fn pushed_and_local(predicate: fn(SourceHandle) -> Expr) -> (Vec<i64>, Vec<i64>) {
    let pushed = {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query.filter(predicate(c));
        compile_sqlite(&query)
    };
    let local = {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query
            .filter(client(identity(), [c.member("age")]).gt(0))
            .filter(predicate(c));
        compile_sqlite(&query)
    };
    assert!(!pushed.requires_client_eval());
    assert!(local.requires_client_eval());

    let store = setup_db();
    let params = Parameters::new();
    let pushed: Vec<Customer> = pushed.fetch_all(&store, &params).unwrap();
    let local: Vec<Customer> = local.fetch_all(&store, &params).unwrap();
    (sorted_ids(&pushed), sorted_ids(&local))
}

#[test]
fn client_function_filter_runs_locally() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(client(shout(), [c.member("name")]).eq("ADA"));
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());
    assert!(!compiled.sql().contains("WHERE"));

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(ids(&rows), [1]);
}

#[test]
fn pushed_prefix_still_runs_on_the_server() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("age").gt(29))
        .filter(client(shout(), [c.member("name")]).ne("GRACE"));
    let compiled = compile_sqlite(&query);
    assert!(compiled.sql().contains(r#"WHERE "c"."age" > ?"#));

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(sorted_ids(&rows), [1, 4, 5]);
}

#[test]
fn operators_after_a_fallback_run_on_the_client() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(client(shout(), [c.member("name")]).ne("KEN"))
        .order_by([Ordering::desc(c.member("age"))])
        .take(2);
    let compiled = compile_sqlite(&query);
    assert!(!compiled.sql().contains("ORDER BY"));
    assert!(!compiled.sql().contains("LIMIT"));

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();

    let mut expected: Vec<Customer> = customers()
        .into_iter()
        .filter(|c| c.name.to_uppercase() != "KEN")
        .collect();
    expected.sort_by(|a, b| b.age.cmp(&a.age));
    expected.truncate(2);
    assert_eq!(ids(&rows), ids(&expected));
    assert_eq!(ids(&rows), [4, 2]);
}

#[test]
fn client_ordering_is_stable() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([
        Ordering::asc(client(shout(), [c.member("city")])),
        Ordering::asc(c.member("id")),
    ]);
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());

    let store = setup_db();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    // NULL cities first, then HELSINKI, then OSLO
    assert_eq!(ids(&rows), [2, 5, 3, 1, 4]);
}

#[test]
fn client_projection_shapes_rows() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::asc(c.member("id"))])
        .select(client(shout(), [c.member("name")]));
    let compiled = compile_sqlite(&query);
    assert!(compiled.sql().contains(r#"ORDER BY "c"."id""#));

    let store = setup_db();
    let names: Vec<String> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(names, ["ADA", "GRACE", "LINUS", "BARBARA", "KEN"]);
}

#[test]
fn client_aggregate_after_fallback() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(client(shout(), [c.member("city")]).eq("OSLO"))
        .count();
    let compiled = compile_sqlite(&query);
    assert!(!compiled.sql().contains("COUNT"));

    let store = setup_db();
    let count: i64 = compiled.fetch_scalar(&store, &Parameters::new()).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn untranslatable_join_key_matches_the_pushed_join() {
    let pushed = {
        let mut query = QueryBuilder::from("Order");
        let o = query.root();
        let c = query.join("Customer", o.member("customer_id"), |c| c.member("id"));
        query.select(tuple([o.member("id"), c.member("name")]));
        query
    };
    let local = {
        let mut query = QueryBuilder::from("Order");
        let o = query.root();
        let c = query.join(
            "Customer",
            client(identity(), [o.member("customer_id")]),
            |c| c.member("id"),
        );
        query.select(tuple([o.member("id"), c.member("name")]));
        query
    };
    let local = compile_sqlite(&local);
    assert!(local.requires_client_eval());
    assert!(local.sql().contains("CROSS JOIN"));

    let store = setup_db();
    let mut expected: Vec<(i64, String)> = compile_sqlite(&pushed)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    let mut actual: Vec<(i64, String)> = local.fetch_all(&store, &Parameters::new()).unwrap();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);
    assert_eq!(actual.len(), 6);
}

#[test]
fn negated_method_over_null_matches_the_server() {
    let (pushed, local) = pushed_and_local(|c| c.member("city").starts_with("O").not());
    assert_eq!(pushed, [2, 3, 5]);
    assert_eq!(local, pushed);
}

#[test]
fn null_compensated_predicates_agree_with_the_server() {
    let cases: [(&str, fn(SourceHandle) -> Expr, &[i64]); 13] = [
        ("ne", |c| c.member("city").ne("Oslo"), &[2, 3, 5]),
        ("not eq", |c| c.member("city").eq("Oslo").not(), &[2, 3, 5]),
        ("not gt", |c| c.member("city").gt("M").not(), &[2, 3, 5]),
        ("not starts_with", |c| c.member("city").starts_with("O").not(), &[2, 3, 5]),
        ("not ends_with", |c| c.member("city").ends_with("i").not(), &[1, 2, 4, 5]),
        ("contains", |c| c.member("city").contains("sl"), &[1, 4]),
        ("upper ne", |c| c.member("city").to_upper().ne("OSLO"), &[2, 3, 5]),
        ("length gt", |c| c.member("city").length().gt(4), &[3]),
        ("not in", |c| c.member("city").in_list(["Oslo"]).not(), &[2, 3, 5]),
        (
            "in with null",
            |c| c.member("city").in_list([Value::from("Oslo"), Value::Null]),
            &[1, 2, 4, 5],
        ),
        (
            "not in with null",
            |c| c.member("city").not_in_list([Value::from("Oslo"), Value::Null]),
            &[3],
        ),
        ("not is_null", |c| c.member("city").is_null().not(), &[1, 3, 4]),
        (
            "conditional",
            |c| condition(c.member("city").is_null(), "none", c.member("city")).eq("none"),
            &[2, 5],
        ),
    ];
    for (name, predicate, expected) in cases {
        let (pushed, local) = pushed_and_local(predicate);
        assert_eq!(pushed, expected, "{name}: server");
        assert_eq!(local, pushed, "{name}: client");
    }
}
