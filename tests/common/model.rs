use quarry::prelude::*;

/// Customers with orders, plus an animal hierarchy stored in one table.
pub fn model() -> Model {
    Model::builder()
        .entity(
            EntityBuilder::new("Customer")
                .table("customers")
                .key("id")
                .property("id", ColumnType::Integer)
                .property("name", ColumnType::Text)
                .nullable_property("city", ColumnType::Text)
                .property("age", ColumnType::Integer)
                .has_many("orders", "Order", "customer_id"),
        )
        .entity(
            EntityBuilder::new("Order")
                .table("orders")
                .key("id")
                .property("id", ColumnType::Integer)
                .property("customer_id", ColumnType::Integer)
                .property("total", ColumnType::Real),
        )
        .entity(
            EntityBuilder::new("Animal")
                .table("animals")
                .key("id")
                .abstract_type()
                .discriminator("kind")
                .property("id", ColumnType::Integer)
                .property("kind", ColumnType::Text)
                .property("name", ColumnType::Text),
        )
        .entity(
            EntityBuilder::new("Dog")
                .base("Animal")
                .discriminator_value("dog")
                .nullable_property("breed", ColumnType::Text),
        )
        .entity(
            EntityBuilder::new("Cat")
                .base("Animal")
                .discriminator_value("cat")
                .nullable_property("lives", ColumnType::Integer),
        )
        .entity(
            EntityBuilder::new("Kitten")
                .base("Cat")
                .discriminator_value("kitten"),
        )
        .build()
        .expect("test model is valid")
}
