use quarry::error::QuarryError;
use quarry::prelude::*;

use crate::common::model;

fn compile_result(query: &QueryBuilder) -> quarry::Result<CompiledQuery> {
    compile(&query.build()?, &model(), CompileOptions::default())
}

#[test]
fn unmapped_entity_fails_compilation() {
    let query = QueryBuilder::from("Invoice");
    assert!(matches!(
        compile_result(&query),
        Err(QuarryError::UnmappedEntity(name)) if name == "Invoice"
    ));
}

#[test]
fn unmapped_member_fails_compilation() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query.filter(c.member("email").eq("ada@example.com"));
    assert!(matches!(
        compile_result(&query),
        Err(QuarryError::UnmappedMember { .. })
    ));
}

#[test]
fn unmapped_member_in_a_client_fallback_still_fails() {
    let mut query = QueryBuilder::from("Customer");
    let c = query.root();
    query
        .filter(client(crate::common::shout(), [c.member("name")]).eq("ADA"))
        .order_by([Ordering::asc(c.member("nickname"))]);
    assert!(matches!(
        compile_result(&query),
        Err(QuarryError::UnmappedMember { .. })
    ));
}

#[test]
fn of_type_outside_the_hierarchy_is_invalid() {
    let mut query = QueryBuilder::from("Animal");
    query.of_type("Customer");
    assert!(matches!(
        compile_result(&query),
        Err(QuarryError::InvalidQuery(_))
    ));
}

#[test]
fn operators_after_a_terminal_are_invalid() {
    let mut query = QueryBuilder::from("Customer");
    query.first().skip(1);
    assert!(matches!(
        compile_result(&query),
        Err(QuarryError::InvalidQuery(_))
    ));
}

#[test]
fn derived_members_resolve_on_derived_sources() {
    let mut query = QueryBuilder::from("Dog");
    let d = query.root();
    query.filter(d.member("breed").is_not_null());
    let compiled = compile_result(&query).unwrap();
    assert!(compiled.sql().contains(r#""d"."breed" IS NOT NULL"#));
    assert!(compiled.sql().contains(r#""d"."kind" IN (?)"#));
}

#[test]
fn duplicate_entity_names_are_rejected() {
    let result = Model::builder()
        .entity(
            EntityBuilder::new("Customer")
                .table("a")
                .key("id")
                .property("id", ColumnType::Integer),
        )
        .entity(
            EntityBuilder::new("Customer")
                .table("b")
                .key("id")
                .property("id", ColumnType::Integer),
        )
        .build();
    assert!(result.is_err());
}
