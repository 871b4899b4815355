use quarry::error::QuarryError;
use quarry::prelude::*;
use quarry::sqlite::SqliteStore;

use crate::common::{
    Customer, attach_orders, compile_sqlite, identity, model, setup_db, setup_file_db, shout,
};

fn customers_with_orders() -> CompiledQuery {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("id").le(3))
        .order_by([Ordering::asc(c.member("id"))])
        .include("orders");
    compile_sqlite(&query)
}

fn load(store: &SqliteStore, compiled: &CompiledQuery) -> Vec<Customer> {
    let params = Parameters::new();
    compiled
        .run(store, &params, RowMaterializer::<Customer>::new())
        .unwrap()
        .include("orders", attach_orders)
        .unwrap()
        .collect::<quarry::Result<_>>()
        .unwrap()
}

/// Binds the orders include twice: once attaching rows, once counting them.
fn load_twice(store: &SqliteStore, compiled: &CompiledQuery) -> Vec<(Customer, usize)> {
    let params = Parameters::new();
    compiled
        .run(store, &params, |row: ValueRow| -> quarry::Result<(Customer, usize)> {
            Ok((Customer::from_row(&row)?, 0))
        })
        .unwrap()
        .include(
            "orders",
            |parent: &mut (Customer, usize), rows: Vec<ValueRow>| -> quarry::Result<()> {
                attach_orders(&mut parent.0, rows)
            },
        )
        .unwrap()
        .include(
            "orders",
            |parent: &mut (Customer, usize), rows: Vec<ValueRow>| -> quarry::Result<()> {
                parent.1 = rows.len();
                Ok(())
            },
        )
        .unwrap()
        .collect::<quarry::Result<_>>()
        .unwrap()
}

fn assert_both_bound(loaded: &[(Customer, usize)]) {
    let customers: Vec<Customer> = loaded.iter().map(|(c, _)| c.clone()).collect();
    let counts: Vec<usize> = loaded.iter().map(|(_, n)| *n).collect();
    assert_eq!(
        order_ids(&customers),
        [vec![10, 11], vec![], vec![30, 31, 32]]
    );
    assert_eq!(counts, [2, 0, 3]);
}

fn order_ids(customers: &[Customer]) -> Vec<Vec<i64>> {
    customers
        .iter()
        .map(|c| c.orders.iter().map(|o| o.id).collect())
        .collect()
}

#[test]
fn buffered_include_on_a_single_slot_store() {
    let store = setup_db();
    let customers = load(&store, &customers_with_orders());
    assert_eq!(
        order_ids(&customers),
        [vec![10, 11], vec![], vec![30, 31, 32]]
    );
    assert_eq!(store.idle_connections(), 1);
}

#[test]
fn streaming_include_with_several_slots() {
    let store = setup_file_db(3);
    let customers = load(&store, &customers_with_orders());
    assert_eq!(
        order_ids(&customers),
        [vec![10, 11], vec![], vec![30, 31, 32]]
    );
    assert_eq!(customers[2].orders[2].total, 100.0);
}

#[test]
fn include_follows_a_page_of_parents() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::asc(c.member("id"))])
        .take(2)
        .include("orders");
    let customers = load(&setup_db(), &compile_sqlite(&query));
    assert_eq!(order_ids(&customers), [vec![10, 11], vec![]]);
}

#[test]
fn include_with_descending_parents() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::desc(c.member("age"))])
        .include("orders");
    let customers = load(&setup_file_db(2), &compile_sqlite(&query));
    let ids: Vec<i64> = customers.iter().map(|c| c.id).collect();
    assert_eq!(ids, [4, 2, 1, 5, 3]);
    assert_eq!(
        order_ids(&customers),
        [vec![40], vec![], vec![10, 11], vec![], vec![30, 31, 32]]
    );
}

#[test]
fn client_filtered_parents_use_a_lookup() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("id").le(3))
        .filter(client(shout(), [c.member("name")]).ne("GRACE"))
        .include("orders");
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());

    let mut customers = load(&setup_db(), &compiled);
    customers.sort_by_key(|c| c.id);
    let names: Vec<&str> = customers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ada", "Linus"]);
    assert_eq!(order_ids(&customers), [vec![10, 11], vec![30, 31, 32]]);
}

#[test]
fn unknown_navigation_fails_compilation() {
    let mut query = QueryBuilder::from("Customer");
    query.include("pets");
    let result = compile(
        &query.build().unwrap(),
        &model(),
        CompileOptions::default(),
    );
    assert!(matches!(result, Err(QuarryError::UnmappedMember { .. })));
}

#[test]
fn binding_an_include_the_query_lacks_is_rejected() {
    let query = QueryBuilder::from("Customer");
    let compiled = compile_sqlite(&query);
    let store = setup_db();
    let params = Parameters::new();
    let result = compiled
        .run(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap()
        .include("orders", attach_orders);
    assert!(matches!(result, Err(QuarryError::InvalidQuery(_))));
}

#[test]
fn include_rows_are_available_to_closures() {
    let compiled = customers_with_orders();
    let store = setup_db();
    let params = Parameters::new();
    let mut seen = Vec::new();
    let counts: Vec<usize> = compiled
        .run(&store, &params, |row: ValueRow| -> quarry::Result<(i64, usize)> {
            Ok((i64::from_row(&row)?, 0))
        })
        .unwrap()
        .include(
            "orders",
            |parent: &mut (i64, usize), rows: Vec<ValueRow>| -> quarry::Result<()> {
                parent.1 = rows.len();
                Ok(())
            },
        )
        .unwrap()
        .map(|r| {
            r.map(|(id, n)| {
                seen.push(id);
                n
            })
        })
        .collect::<quarry::Result<_>>()
        .unwrap();
    assert_eq!(seen, [1, 2, 3]);
    assert_eq!(counts, [2, 0, 3]);
}

#[test]
fn two_includes_stream_when_every_cursor_fits() {
    let store = setup_file_db(3);
    assert_both_bound(&load_twice(&store, &customers_with_orders()));
    assert_eq!(store.idle_connections(), 3);
}

#[test]
fn two_includes_buffer_when_slots_run_short() {
    let store = setup_file_db(2);
    assert_both_bound(&load_twice(&store, &customers_with_orders()));
    // each include drained on one connection before the primary cursor
    assert_eq!(store.idle_connections(), 1);
}

#[test]
fn two_includes_on_a_single_slot_store() {
    let store = setup_db();
    assert_both_bound(&load_twice(&store, &customers_with_orders()));
    assert_eq!(store.idle_connections(), 1);
}

#[test]
fn two_includes_through_a_lookup() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("id").le(3))
        .filter(client(identity(), [c.member("age")]).gt(0))
        .include("orders");
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());

    let store = setup_file_db(2);
    let mut loaded = load_twice(&store, &compiled);
    loaded.sort_by_key(|(c, _)| c.id);
    assert_both_bound(&loaded);
    assert_eq!(store.idle_connections(), 1);
}
