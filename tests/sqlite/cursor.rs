use quarry::error::QuarryError;
use quarry::prelude::*;

use crate::common::{Customer, CountingStore, compile_sqlite, setup_db, setup_file_db, shout};

fn all_customers() -> CompiledQuery {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([Ordering::asc(c.member("id"))]);
    compile_sqlite(&query)
}

#[test]
fn full_iteration_releases_the_slot_once() {
    let store = CountingStore::new(setup_db());
    let rows: Vec<Customer> = all_customers()
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn early_close_releases_the_slot() {
    let store = CountingStore::new(setup_db());
    let compiled = all_customers();
    let params = Parameters::new();
    let mut results = compiled
        .run(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap();
    assert_eq!(results.next().unwrap().unwrap().id, 1);
    results.close();
    results.close();
    assert_eq!(store.closed(), 1);
    drop(results);
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn dropping_mid_iteration_releases_the_slot() {
    let store = CountingStore::new(setup_db());
    let compiled = all_customers();
    let params = Parameters::new();
    {
        let mut results = compiled
            .run(&store, &params, RowMaterializer::<Customer>::new())
            .unwrap();
        results.next();
        results.next();
    }
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn unstarted_results_never_open() {
    let store = CountingStore::new(setup_db());
    let compiled = all_customers();
    let params = Parameters::new();
    drop(
        compiled
            .run(&store, &params, RowMaterializer::<Customer>::new())
            .unwrap(),
    );
    assert_eq!((store.opened(), store.closed()), (0, 0));
}

#[test]
fn read_failure_surfaces_and_releases() {
    let store = CountingStore::new(setup_db()).failing_after(2);
    let compiled = all_customers();
    let params = Parameters::new();
    let mut results = compiled
        .run(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap();
    assert!(results.next().unwrap().is_ok());
    assert!(results.next().unwrap().is_ok());
    assert!(matches!(
        results.next(),
        Some(Err(QuarryError::Execution(_)))
    ));
    assert!(results.next().is_none());
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn client_take_stops_reading_early() {
    let store = CountingStore::new(setup_db()).failing_after(2);
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::asc(c.member("id"))])
        .filter(client(shout(), [c.member("name")]).ne("NOBODY"))
        .take(2);
    let compiled = compile_sqlite(&query);
    assert!(compiled.requires_client_eval());

    // a third read would fail
    let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn cancellation_ends_the_sequence() {
    let store = CountingStore::new(setup_db());
    let compiled = all_customers();
    let params = Parameters::new();
    let token = CancellationToken::new();
    let mut results = compiled
        .run(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap()
        .with_cancellation(token.clone());

    assert!(results.next().unwrap().is_ok());
    token.cancel();
    assert!(matches!(results.next(), Some(Err(QuarryError::Cancelled))));
    assert!(results.next().is_none());
    assert_eq!((store.opened(), store.closed()), (1, 1));
}

#[test]
fn single_slot_store_is_busy_while_a_cursor_is_open() {
    let store = setup_db();
    let compiled = all_customers();
    let params = Parameters::new();
    let mut first = compiled
        .run(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap();
    assert!(first.next().unwrap().is_ok());

    let second: quarry::Result<Vec<Customer>> = compiled.fetch_all(&store, &params);
    assert!(matches!(second, Err(QuarryError::ConnectionBusy)));

    drop(first);
    let second: Vec<Customer> = compiled.fetch_all(&store, &params).unwrap();
    assert_eq!(second.len(), 5);
}

#[test]
fn compiled_queries_are_reusable() {
    let store = setup_db();
    let compiled = all_customers();
    for _ in 0..3 {
        let rows: Vec<Customer> = compiled.fetch_all(&store, &Parameters::new()).unwrap();
        assert_eq!(rows.len(), 5);
    }
    assert_eq!(store.idle_connections(), 1);
}

#[test]
fn file_store_is_removed_with_its_fixture() {
    let db = setup_file_db(2);
    let path = db.path().to_path_buf();
    let rows: Vec<Customer> = all_customers().fetch_all(&*db, &Parameters::new()).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(path.exists());

    drop(db);
    assert!(!path.exists());
}
