use quarry::error::QuarryError;
use quarry::prelude::*;

use crate::common::{AnimalRow, Customer, compile_sqlite, customers, ids, setup_db};

fn scalar<T: FromValue>(query: &QueryBuilder) -> quarry::Result<T> {
    let store = setup_db();
    compile_sqlite(query).fetch_scalar(&store, &Parameters::new())
}

fn element(query: &QueryBuilder) -> quarry::Result<Option<Customer>> {
    let store = setup_db();
    compile_sqlite(query).fetch_element(&store, &Parameters::new())
}

fn customers_by(member: &str) -> QueryBuilder {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.order_by([Ordering::asc(c.member(member))]);
    query
}

#[test]
fn count_with_and_without_filter() {
    let mut query = QueryBuilder::from("Customer");
    query.count();
    assert_eq!(scalar::<i64>(&query).unwrap(), 5);

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").eq("Oslo")).long_count();
    assert_eq!(scalar::<i64>(&query).unwrap(), 2);
}

#[test]
fn any_and_all() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.any(Some(c.member("city").eq("Oslo")));
    assert!(scalar::<bool>(&query).unwrap());

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(100)).any(None);
    assert!(!scalar::<bool>(&query).unwrap());

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.all(c.member("age").gt(20));
    assert!(scalar::<bool>(&query).unwrap());

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.all(c.member("age").gt(30));
    assert!(!scalar::<bool>(&query).unwrap());
}

#[test]
fn all_over_a_nullable_predicate_counts_null_as_false() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("age").gt(40))
        .all(c.member("city").eq("Oslo"));
    // Grace has no city
    assert!(!scalar::<bool>(&query).unwrap());
}

#[test]
fn distinct_projection() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.select(c.member("city")).distinct();
    let store = setup_db();
    let mut cities: Vec<Option<String>> = compile_sqlite(&query)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    cities.sort();
    assert_eq!(
        cities,
        [None, Some("Helsinki".to_string()), Some("Oslo".to_string())]
    );
}

#[test]
fn aggregates_over_a_column() {
    let aggregate = |apply: fn(&mut QueryBuilder) -> &mut QueryBuilder| {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query.select(c.member("age"));
        apply(&mut query);
        query
    };
    assert_eq!(scalar::<i64>(&aggregate(QueryBuilder::min)).unwrap(), 28);
    assert_eq!(scalar::<i64>(&aggregate(QueryBuilder::max)).unwrap(), 52);
    assert_eq!(scalar::<i64>(&aggregate(QueryBuilder::sum)).unwrap(), 191);
    let average = scalar::<f64>(&aggregate(QueryBuilder::average)).unwrap();
    assert!((average - 38.2).abs() < 1e-9);
}

#[test]
fn aggregates_over_no_rows() {
    let empty = |apply: fn(&mut QueryBuilder) -> &mut QueryBuilder| {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query.filter(c.member("age").gt(100)).select(c.member("age"));
        apply(&mut query);
        query
    };
    assert!(matches!(
        scalar::<i64>(&empty(QueryBuilder::min)),
        Err(QuarryError::EmptySequence)
    ));
    assert!(matches!(
        scalar::<f64>(&empty(QueryBuilder::average)),
        Err(QuarryError::EmptySequence)
    ));
    assert_eq!(scalar::<i64>(&empty(QueryBuilder::sum)).unwrap(), 0);

    // nullable selector: empty min is NULL
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(c.member("age").gt(100))
        .select(c.member("city"))
        .min();
    assert_eq!(scalar::<Option<String>>(&query).unwrap(), None);
}

#[test]
fn first_single_last() {
    let mut query = customers_by("name");
    query.first();
    assert_eq!(element(&query).unwrap().map(|c| c.name).as_deref(), Some("Ada"));

    let mut query = customers_by("name");
    query.last();
    assert_eq!(element(&query).unwrap().map(|c| c.name).as_deref(), Some("Linus"));

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("id").eq(3)).single();
    assert_eq!(element(&query).unwrap().map(|c| c.id), Some(3));
}

#[test]
fn element_operators_on_empty_and_ambiguous_input() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(100)).first();
    assert!(matches!(element(&query), Err(QuarryError::EmptySequence)));

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").gt(100)).first_or_default();
    assert_eq!(element(&query).unwrap(), None);

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").eq("Oslo")).single();
    assert!(matches!(element(&query), Err(QuarryError::MultipleElements)));

    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("city").eq("Oslo")).single_or_default();
    assert!(matches!(element(&query), Err(QuarryError::MultipleElements)));
}

#[test]
fn last_without_ordering_still_returns_the_final_row() {
    let mut query = QueryBuilder::from("Customer");
    query.last();
    let compiled = compile_sqlite(&query);
    assert!(!compiled.sql().contains("LIMIT"));
    let store = setup_db();
    let last: Option<Customer> = compiled.fetch_element(&store, &Parameters::new()).unwrap();
    assert!(last.is_some());
}

#[test]
fn skip_and_take_page_through_results() {
    let mut query = customers_by("id");
    query.skip(1).take(2);
    let store = setup_db();
    let rows: Vec<Customer> = compile_sqlite(&query)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    assert_eq!(ids(&rows), [2, 3]);

    let mut query = customers_by("id");
    query.take(3).skip(1);
    let rows: Vec<Customer> = compile_sqlite(&query)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    assert_eq!(ids(&rows), [2, 3]);

    let mut query = customers_by("id");
    query.skip(3);
    let rows: Vec<Customer> = compile_sqlite(&query)
        .fetch_all(&store, &Parameters::new())
        .unwrap();
    assert_eq!(ids(&rows), [4, 5]);
}

#[test]
fn count_over_a_page() {
    let mut query = customers_by("id");
    query.skip(2).take(10).count();
    assert_eq!(scalar::<i64>(&query).unwrap(), 3);
}

#[test]
fn of_type_narrows_the_hierarchy() {
    let animals = |entity: &str| -> Vec<AnimalRow> {
        let mut query = QueryBuilder::from("Animal");
        let a = query.root();
        query
            .order_by([Ordering::asc(a.member("id"))])
            .of_type(entity);
        let store = setup_db();
        compile_sqlite(&query)
            .fetch_all(&store, &Parameters::new())
            .unwrap()
    };
    let names = |rows: Vec<AnimalRow>| -> Vec<String> { rows.into_iter().map(|r| r.2).collect() };

    assert_eq!(names(animals("Dog")), ["Rex", "Fido"]);
    assert_eq!(names(animals("Cat")), ["Tom", "Kit"]);
    assert_eq!(names(animals("Kitten")), ["Kit"]);
    assert_eq!(names(animals("Animal")).len(), 4);

    let dogs = animals("Dog");
    assert_eq!(dogs[0].3.as_deref(), Some("beagle"));
    assert_eq!(dogs[1].3, None);
}

#[test]
fn contains_checks_membership() {
    let contains = |item: Expr| {
        let mut query = QueryBuilder::from("Customer");
        let c = query.root();
        query.select(c.member("name")).contains(item);
        query
    };
    assert!(scalar::<bool>(&contains(constant("Ada"))).unwrap());
    assert!(!scalar::<bool>(&contains(constant("Zed"))).unwrap());

    let store = setup_db();
    let compiled = compile_sqlite(&contains(param("name")));
    let hit: bool = compiled
        .fetch_scalar(&store, &Parameters::new().with("name", "Grace"))
        .unwrap();
    let miss: bool = compiled
        .fetch_scalar(&store, &Parameters::new().with("name", "grace"))
        .unwrap();
    assert!(hit);
    assert!(!miss);
}

#[test]
fn scalar_fetch_rejects_sequences() {
    let query = QueryBuilder::from("Customer");
    let store = setup_db();
    let result = compile_sqlite(&query).fetch_scalar::<i64, _>(&store, &Parameters::new());
    assert!(matches!(result, Err(QuarryError::InvalidQuery(_))));
}

#[test]
fn reference_counts_agree() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("age").lt(40)).count();
    let expected = customers().iter().filter(|c| c.age < 40).count();
    assert_eq!(scalar::<i64>(&query).unwrap(), expected as i64);
}
