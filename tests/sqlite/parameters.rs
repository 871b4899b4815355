use quarry::error::QuarryError;
use quarry::prelude::*;

use crate::common::{Customer, compile_sqlite, setup_db, sorted_ids};

#[test]
fn parameters_rebind_without_recompiling() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(param("min_age")));
    let compiled = compile_sqlite(&query);
    let store = setup_db();

    let rows: Vec<Customer> = compiled
        .fetch_all(&store, &Parameters::new().with("min_age", 30))
        .unwrap();
    assert_eq!(sorted_ids(&rows), [1, 2, 4]);

    let rows: Vec<Customer> = compiled
        .fetch_all(&store, &Parameters::new().with("min_age", 40))
        .unwrap();
    assert_eq!(sorted_ids(&rows), [2, 4]);
}

#[test]
fn missing_parameter_fails_before_execution() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(param("min_age")));
    let compiled = compile_sqlite(&query);
    let store = setup_db();
    let params = Parameters::new();
    let result = compiled.run(&store, &params, RowMaterializer::<Customer>::new());
    assert!(matches!(result, Err(QuarryError::MissingParameter(name)) if name == "min_age"));
}

#[test]
fn take_and_skip_accept_parameters() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::asc(c.member("id"))])
        .skip(param("offset"))
        .take(param("n"));
    let compiled = compile_sqlite(&query);
    let store = setup_db();

    let params: Parameters = [("offset", 1), ("n", 2)].into_iter().collect();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &params).unwrap();
    assert_eq!(sorted_ids(&rows), [2, 3]);

    // negative counts clamp to zero
    let params: Parameters = [("offset", -4), ("n", -1)].into_iter().collect();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &params).unwrap();
    assert!(rows.is_empty());

    let params: Parameters = [("offset", -4), ("n", 10)].into_iter().collect();
    let rows: Vec<Customer> = compiled.fetch_all(&store, &params).unwrap();
    assert_eq!(rows.len(), 5);
}

#[test]
fn null_parameter_matches_null_columns() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").eq(param("city")));
    let compiled = compile_sqlite(&query);
    let store = setup_db();

    let rows: Vec<Customer> = compiled
        .fetch_all(&store, &Parameters::new().with("city", Value::Null))
        .unwrap();
    assert_eq!(sorted_ids(&rows), [2, 5]);

    let rows: Vec<Customer> = compiled
        .fetch_all(&store, &Parameters::new().with("city", "Oslo"))
        .unwrap();
    assert_eq!(sorted_ids(&rows), [1, 4]);
}

#[test]
fn parameters_in_client_predicates() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(client(crate::common::shout(), [c.member("name")]).eq(param("shouted")));
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());
    let store = setup_db();

    let rows: Vec<Customer> = compiled
        .fetch_all(&store, &Parameters::new().with("shouted", "LINUS"))
        .unwrap();
    assert_eq!(sorted_ids(&rows), [3]);
}

#[test]
fn command_lists_its_parameter_names() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("age").gt(param("min_age")))
        .take(param("n"));
    let compiled = compile_sqlite(&query);
    let names: Vec<&str> = compiled.command().parameter_names().collect();
    assert_eq!(names, ["min_age", "n"]);
}
