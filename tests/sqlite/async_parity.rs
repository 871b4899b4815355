use futures_util::TryStreamExt;
use quarry::error::QuarryError;
use quarry::prelude::*;
use quarry::sqlite::tokio::AsyncSqliteStore;

use crate::common::{Customer, attach_orders, compile_sqlite, setup_db, shout};

fn queries() -> Vec<QueryBuilder> {
    let mut pushed = QueryBuilder::from("Customer");
    let c = pushed.root();
    pushed
        .filter(c.member("city").ne("Oslo"))
        .order_by([Ordering::desc(c.member("age"))]);

    let mut fallback = QueryBuilder::from("Customer");
    let c = fallback.root();
    fallback
        .filter(client(shout(), [c.member("name")]).starts_with("G").not())
        .order_by([Ordering::asc(c.member("name"))])
        .skip(1);

    let mut paged = QueryBuilder::from("Customer");
    let c = paged.root();
    paged
        .order_by([Ordering::asc(c.member("id"))])
        .skip(1)
        .take(3);

    vec![pushed, fallback, paged]
}

#[tokio::test]
async fn async_results_match_sync_results() {
    let store = setup_db();
    let async_store = AsyncSqliteStore::new(store.clone());
    for query in queries() {
        let compiled = compile_sqlite(&query);
        let params = Parameters::new();
        let sync: Vec<Customer> = compiled.fetch_all(&store, &params).unwrap();
        let concurrent: Vec<Customer> = compiled
            .fetch_all_async(&async_store, &params)
            .await
            .unwrap();
        assert_eq!(concurrent, sync, "{}", compiled.sql());
    }
}

#[tokio::test]
async fn async_scalars_and_elements() {
    let store = AsyncSqliteStore::new(setup_db());

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.select(c.member("age")).sum();
    let sum: i64 = compile_sqlite(&query)
        .fetch_scalar_async(&store, &Parameters::new())
        .await
        .unwrap();
    assert_eq!(sum, 191);

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(100)).first();
    let result = compile_sqlite(&query)
        .fetch_element_async::<Customer, _>(&store, &Parameters::new())
        .await;
    assert!(matches!(result, Err(QuarryError::EmptySequence)));
}

#[tokio::test]
async fn stream_adapter_yields_every_row() {
    let store = AsyncSqliteStore::new(setup_db());
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .order_by([Ordering::asc(c.member("id"))])
        .select(c.member("name"));
    let compiled = compile_sqlite(&query);
    let params = Parameters::new();
    let names: Vec<String> = compiled
        .run_async(&store, &params, RowMaterializer::<String>::new())
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, ["Ada", "Grace", "Linus", "Barbara", "Ken"]);
}

#[tokio::test]
async fn async_include_attaches_children() {
    let store = AsyncSqliteStore::new(setup_db());
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("id").le(3))
        .order_by([Ordering::asc(c.member("id"))])
        .include("orders");
    let compiled = compile_sqlite(&query);
    let params = Parameters::new();
    let mut results = compiled
        .run_async(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap()
        .include("orders", attach_orders)
        .unwrap();
    let mut counts = Vec::new();
    while let Some(customer) = results.next().await {
        counts.push(customer.unwrap().orders.len());
    }
    assert_eq!(counts, [2, 0, 3]);
    assert_eq!(store.blocking().idle_connections(), 1);
}

#[tokio::test]
async fn async_cancellation_releases_the_slot() {
    let store = AsyncSqliteStore::new(setup_db());
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([Ordering::asc(c.member("id"))]);
    let compiled = compile_sqlite(&query);
    let params = Parameters::new();
    let token = CancellationToken::new();
    let mut results = compiled
        .run_async(&store, &params, RowMaterializer::<Customer>::new())
        .unwrap()
        .with_cancellation(token.clone());

    assert!(results.next().await.unwrap().is_ok());
    token.cancel();
    assert!(matches!(
        results.next().await,
        Some(Err(QuarryError::Cancelled))
    ));
    assert!(results.next().await.is_none());
    drop(results);
    assert_eq!(store.blocking().idle_connections(), 1);
}
