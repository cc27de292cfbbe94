//! End-to-end scenario tests (spec §8: S1-S7), exercised against the
//! in-memory fakes in `tests/support` rather than a real NSQL backend.

mod support;

use mt_store::config::SharedTableConfig;
use mt_store::context::with_tenant;
use mt_store::index::IndexMatchStrategy;
use mt_store::metadata::{
    AttrType, KeyAttribute, KeySchema, SharedTableFactory, VirtualTableDescription,
};
use mt_store::shared_table::SharedTableFacade;
use mt_store::store::{DeleteItemRequest, PutItemRequest};
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

async fn new_facade() -> (SharedTableFacade, Arc<InMemoryStore>) {
    let metadata = Arc::new(InMemoryMetadataStore::default());
    let store = Arc::new(InMemoryStore::default());
    let factory = Arc::new(SharedTableFactory {
        physical_table_name: "shared".to_string(),
    });
    let facade = SharedTableFacade::new(
        metadata,
        store.clone(),
        factory,
        SharedTableConfig::default(),
        IndexMatchStrategy::ByName,
    );
    (facade, store)
}

#[tokio::test]
async fn s1_basic_isolation() {
    let (facade, store) = new_facade().await;

    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();

    with_tenant(
        "o1",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("o1v".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    with_tenant(
        "o2",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("o2v".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let key = item(&[("hk", AttributeValue::S("a".to_string()))]);

    let o1_item = with_tenant("o1", facade.get_item("T1", &key)).await.unwrap().unwrap();
    assert_eq!(o1_item.get("f"), Some(&AttributeValue::S("o1v".to_string())));

    let o2_item = with_tenant("o2", facade.get_item("T1", &key)).await.unwrap().unwrap();
    assert_eq!(o2_item.get("f"), Some(&AttributeValue::S("o2v".to_string())));

    // The physical rows carry the composite hash keys named in the scenario.
    let physical_key_o1 = item(&[("hk", AttributeValue::S("o1.T1.a".to_string()))]);
    let physical_key_o2 = item(&[("hk", AttributeValue::S("o2.T1.a".to_string()))]);
    let physical_o1 = store.get_item("shared", &physical_key_o1).await.unwrap().unwrap();
    let physical_o2 = store.get_item("shared", &physical_key_o2).await.unwrap().unwrap();
    assert_eq!(physical_o1.get("f"), Some(&AttributeValue::S("o1v".to_string())));
    assert_eq!(physical_o2.get("f"), Some(&AttributeValue::S("o2v".to_string())));
}

#[tokio::test]
async fn s2_conditional_delete_success() {
    let (facade, _store) = new_facade().await;
    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();
    with_tenant(
        "o1",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("x".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let mut names = HashMap::new();
    names.insert("#f".to_string(), "f".to_string());
    with_tenant(
        "o1",
        facade.delete_item(&DeleteItemRequest {
            table_name: "T1".to_string(),
            key: item(&[("hk", AttributeValue::S("a".to_string()))]),
            condition_expression: Some("attribute_exists(#f)".to_string()),
            expression_attribute_names: names,
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let gone = with_tenant(
        "o1",
        facade.get_item("T1", &item(&[("hk", AttributeValue::S("a".to_string()))])),
    )
    .await
    .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn s3_conditional_delete_failure() {
    let (facade, _store) = new_facade().await;
    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();
    with_tenant(
        "o1",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("x".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let mut names = HashMap::new();
    names.insert("#f".to_string(), "does_not_exist".to_string());
    let err = with_tenant(
        "o1",
        facade.delete_item(&DeleteItemRequest {
            table_name: "T1".to_string(),
            key: item(&[("hk", AttributeValue::S("a".to_string()))]),
            condition_expression: Some("attribute_exists(#f)".to_string()),
            expression_attribute_names: names,
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, mt_store::Error::ConditionalCheckFailed));

    let still_there = with_tenant(
        "o1",
        facade.get_item("T1", &item(&[("hk", AttributeValue::S("a".to_string()))])),
    )
    .await
    .unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn s4_hash_key_condition_rewrites_to_constant_true() {
    let (facade, _store) = new_facade().await;
    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();
    with_tenant(
        "o1",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[("hk", AttributeValue::S("a".to_string()))]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let mut names = HashMap::new();
    names.insert("#h".to_string(), "hk".to_string());
    with_tenant(
        "o1",
        facade.delete_item(&DeleteItemRequest {
            table_name: "T1".to_string(),
            key: item(&[("hk", AttributeValue::S("a".to_string()))]),
            condition_expression: Some("attribute_exists(#h)".to_string()),
            expression_attribute_names: names,
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    let gone = with_tenant(
        "o1",
        facade.get_item("T1", &item(&[("hk", AttributeValue::S("a".to_string()))])),
    )
    .await
    .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn tenant_isolation_put_and_cross_tenant_delete_do_not_interfere() {
    let (facade, _store) = new_facade().await;
    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();

    with_tenant(
        "o1",
        facade.put_item(&PutItemRequest {
            table_name: "T1".to_string(),
            item: item(&[
                ("hk", AttributeValue::S("a".to_string())),
                ("f", AttributeValue::S("o1v".to_string())),
            ]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap();

    // o2 has never created T1, so deleting under o2 fails with TableNotFound
    // rather than touching o1's row - proving isolation by construction.
    let err = with_tenant(
        "o2",
        facade.delete_item(&DeleteItemRequest {
            table_name: "T1".to_string(),
            key: item(&[("hk", AttributeValue::S("a".to_string()))]),
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, mt_store::Error::TableNotFound(_)));

    let still_there = with_tenant(
        "o1",
        facade.get_item("T1", &item(&[("hk", AttributeValue::S("a".to_string()))])),
    )
    .await
    .unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn no_tenant_context_is_rejected() {
    let (facade, _store) = new_facade().await;
    let err = facade
        .get_item("T1", &item(&[("hk", AttributeValue::S("a".to_string()))]))
        .await
        .unwrap_err();
    assert!(matches!(err, mt_store::Error::NoTenantContext));
}

#[tokio::test]
async fn request_item_is_not_mutated_by_put() {
    let (facade, _store) = new_facade().await;
    with_tenant("o1", facade.create_table(hash_only_table("T1")))
        .await
        .unwrap();

    let request = PutItemRequest {
        table_name: "T1".to_string(),
        item: item(&[
            ("hk", AttributeValue::S("a".to_string())),
            ("f", AttributeValue::S("x".to_string())),
        ]),
        condition_expression: None,
        expression_attribute_names: HashMap::new(),
        expression_attribute_values: HashMap::new(),
    };
    let before = request.item.clone();
    with_tenant("o1", facade.put_item(&request)).await.unwrap();
    assert_eq!(request.item, before, "the caller's request must not be mutated");
}
