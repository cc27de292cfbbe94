//! The underlying store client: an external collaborator (§1). The core
//! never talks to the physical store directly except through this trait,
//! so façades are testable against an in-memory fake.

use crate::metadata::PhysicalTableDescription;
use crate::value::Item;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, crate::value::AttributeValue>,
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub table_name: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, crate::value::AttributeValue>,
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<u32>,
}

pub type ScanResponse = QueryResponse;

#[derive(Debug, Clone)]
pub struct PutItemRequest {
    pub table_name: String,
    pub item: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, crate::value::AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, crate::value::AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct DeleteItemRequest {
    pub table_name: String,
    pub key: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, crate::value::AttributeValue>,
}

/// The interface the core uses against the hosted store (§1: "out of
/// scope as an external collaborator — specify only the interface the
/// core uses"). A production implementation wraps the real wire client;
/// tests implement this directly over an in-memory map.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn create_table(&self, desc: &PhysicalTableDescription) -> anyhow::Result<()>;
    async fn describe_table(&self, table_name: &str) -> anyhow::Result<Option<PhysicalTableDescription>>;
    async fn delete_table(&self, table_name: &str) -> anyhow::Result<()>;

    async fn get_item(&self, table_name: &str, key: &Item) -> anyhow::Result<Option<Item>>;
    async fn put_item(&self, request: PutItemRequest) -> anyhow::Result<()>;
    async fn update_item(&self, request: UpdateItemRequest) -> anyhow::Result<Item>;
    async fn delete_item(&self, request: DeleteItemRequest) -> anyhow::Result<()>;

    async fn batch_get_item(
        &self,
        table_name: &str,
        keys: &[Item],
    ) -> anyhow::Result<(Vec<Item>, Vec<Item>)>;

    async fn query(&self, request: QueryRequest) -> anyhow::Result<QueryResponse>;
    async fn scan(&self, request: ScanRequest) -> anyhow::Result<ScanResponse>;

    /// Deletes every row whose hash key falls within `hash_key_prefix`
    /// (used for `truncateOnDeleteTable`). A prefix-scan-and-delete; not a
    /// single atomic physical operation.
    async fn delete_rows_with_hash_prefix(
        &self,
        table_name: &str,
        hash_key_prefix: &str,
    ) -> anyhow::Result<()>;
}
