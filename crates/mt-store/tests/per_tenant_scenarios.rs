//! Scenario tests for the table-per-tenant façade (§4.H), exercised
//! against the same in-memory fakes `tests/scenarios.rs` uses.

mod support;

use mt_store::config::PerTenantConfig;
use mt_store::context::with_tenant;
use mt_store::metadata::{AttrType, KeyAttribute, KeySchema, VirtualTableDescription};
use mt_store::per_tenant::PerTenantFacade;
use mt_store::store::PutItemRequest;
use mt_store::value::{AttributeValue, Item};
use std::collections::HashMap;
use std::sync::Arc;
use support::{InMemoryMetadataStore, InMemoryStore};

fn hash_only_table(name: &str) -> VirtualTableDescription {
    VirtualTableDescription {
        name: name.to_string(),
        key_schema: KeySchema::hash_only(KeyAttribute::new("hk", AttrType::S)),
        indexes: vec![],
    }
}

fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
}

fn new_facade() -> (PerTenantFacade, Arc<InMemoryStore>) {
    let metadata = Arc::new(InMemoryMetadataStore::default());
    let store = Arc::new(InMemoryStore::default());
    let facade = PerTenantFacade::new(metadata, store.clone(), PerTenantConfig::default());
    (facade, store)
}

#[tokio::test]
async fn create_table_names_the_physical_table_tenant_dot_virtual_name() {
    let (facade, store) = new_facade();

    with_tenant("acme", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap();

    assert!(store.describe_table("acme.Orders").await.unwrap().is_some());
}

#[tokio::test]
async fn two_tenants_with_the_same_virtual_table_name_get_distinct_physical_tables() {
    let (facade, store) = new_facade();

    with_tenant("acme", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap();
    with_tenant("globex", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap();

    with_tenant(
        "acme",
        facade.put_item(&PutItemRequest {
            table_name: "Orders".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("acme-v".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let acme_row = store
        .get_item("acme.Orders", &item(&[("hk", AttributeValue::S("a".to_string()))]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acme_row.get("f"), Some(&AttributeValue::S("acme-v".to_string())));

    let globex_row = store
        .get_item("globex.Orders", &item(&[("hk", AttributeValue::S("a".to_string()))]))
        .await
        .unwrap();
    assert!(globex_row.is_none());
}

#[tokio::test]
async fn create_table_twice_for_the_same_tenant_is_rejected() {
    let (facade, _store) = new_facade();
    with_tenant("acme", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap();

    let err = with_tenant("acme", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap_err();
    assert!(matches!(err, mt_store::Error::TableAlreadyExists(_)));
}

#[tokio::test]
async fn get_item_for_unknown_table_surfaces_table_not_found() {
    let (facade, _store) = new_facade();
    let err = with_tenant(
        "acme",
        facade.get_item("Orders", &item(&[("hk", AttributeValue::S("a".to_string()))])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, mt_store::Error::TableNotFound(_)));
}

#[tokio::test]
async fn no_tenant_context_is_rejected() {
    let (facade, _store) = new_facade();
    let err = facade
        .get_item("Orders", &item(&[("hk", AttributeValue::S("a".to_string()))]))
        .await
        .unwrap_err();
    assert!(matches!(err, mt_store::Error::NoTenantContext));
}

#[tokio::test]
async fn delete_table_removes_both_metadata_and_the_physical_table() {
    let (facade, store) = new_facade();
    with_tenant("acme", facade.create_table(hash_only_table("Orders")))
        .await
        .unwrap();

    with_tenant("acme", facade.delete_table("Orders")).await.unwrap();

    assert!(store.describe_table("acme.Orders").await.unwrap().is_none());
    let err = with_tenant("acme", facade.describe_table("Orders")).await.unwrap_err();
    assert!(matches!(err, mt_store::Error::TableNotFound(_)));
}
