//! Component G: the shared-table façade.
//!
//! Implements the store operation set against a smaller set of physical
//! tables shared across tenants, keyed by a tenant-prefixed composite
//! hash key (§4.G). Every operation follows the same shape: read the
//! tenant, resolve the virtual table description, materialize or fetch
//! the cached `TableMapping`, rewrite in, dispatch, rewrite out.

use crate::codec::{HashValue, KeyCodec};
use crate::config::SharedTableConfig;
use crate::context;
use crate::error::{classify_upstream, Error, Result};
use crate::expr::Role;
use crate::index::IndexMatchStrategy;
use crate::mapping::{ResolvedIndex, TableMapping};
use crate::metadata::{CreateTableRequestFactory, TableMetadataStore, VirtualTableDescription};
use crate::store::{
    DeleteItemRequest, PutItemRequest, QueryRequest, QueryResponse, ScanRequest, ScanResponse,
    StoreClient, UpdateItemRequest,
};
use crate::value::{AttributeValue, Item};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct BatchGetItemRequest {
    pub requests: HashMap<String, Vec<Item>>,
}

#[derive(Debug, Default)]
pub struct BatchGetItemResponse {
    pub items: HashMap<String, Vec<Item>>,
    pub unprocessed: HashMap<String, Vec<Item>>,
}

/// Key into the table-mapping cache: a tenant and a virtual table name.
/// `TableMapping` is rebuilt (and the old entry replaced) whenever the
/// underlying `VirtualTableDescription` changes, since the cache has no
/// independent notion of staleness beyond `DeleteTable` invalidation.
type CacheKey = (String, String);

pub struct SharedTableFacade {
    metadata: Arc<dyn TableMetadataStore>,
    store: Arc<dyn StoreClient>,
    factory: Arc<dyn CreateTableRequestFactory>,
    config: SharedTableConfig,
    index_strategy: IndexMatchStrategy,
    mappings: RwLock<HashMap<CacheKey, Arc<TableMapping>>>,
}

impl SharedTableFacade {
    pub fn new(
        metadata: Arc<dyn TableMetadataStore>,
        store: Arc<dyn StoreClient>,
        factory: Arc<dyn CreateTableRequestFactory>,
        config: SharedTableConfig,
        index_strategy: IndexMatchStrategy,
    ) -> Self {
        Self {
            metadata,
            store,
            factory,
            config,
            index_strategy,
            mappings: RwLock::new(HashMap::new()),
        }
    }

    fn require_tenant(&self) -> Result<String> {
        let tenant = context::current_tenant();
        if tenant.is_empty() {
            return Err(Error::NoTenantContext);
        }
        Ok(tenant)
    }

    fn codec(&self) -> KeyCodec {
        KeyCodec::new(self.config.delimiter, self.config.table_prefix.clone())
    }

    async fn get_or_build_mapping(&self, tenant: &str, table_name: &str) -> Result<Arc<TableMapping>> {
        let key = (tenant.to_string(), table_name.to_string());
        if let Some(existing) = self.mappings.read().unwrap().get(&key) {
            #[cfg(feature = "metrics")]
            metrics::counter!("mt_store_table_mapping_cache_hit", "table" => table_name.to_string())
                .increment(1);
            return Ok(existing.clone());
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("mt_store_table_mapping_cache_miss", "table" => table_name.to_string())
            .increment(1);

        let virtual_desc = self
            .metadata
            .get(tenant, table_name)
            .await
            .map_err(Error::Upstream)?
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        let physical_desc = self.factory.physical_table_for(&virtual_desc);
        let mapping = Arc::new(TableMapping::build(
            tenant,
            virtual_desc,
            physical_desc,
            self.codec(),
            self.index_strategy,
        )?);

        self.mappings.write().unwrap().insert(key, mapping.clone());
        Ok(mapping)
    }

    fn invalidate(&self, tenant: &str, table_name: &str) {
        self.mappings
            .write()
            .unwrap()
            .remove(&(tenant.to_string(), table_name.to_string()));
    }

    #[tracing::instrument(skip(self, virtual_desc), fields(table = %virtual_desc.name))]
    pub async fn create_table(&self, virtual_desc: VirtualTableDescription) -> Result<()> {
        let tenant = self.require_tenant()?;
        if self
            .metadata
            .get(&tenant, &virtual_desc.name)
            .await
            .map_err(Error::Upstream)?
            .is_some()
        {
            return Err(Error::TableAlreadyExists(virtual_desc.name));
        }

        let physical_desc = self.factory.physical_table_for(&virtual_desc);
        let mapping = TableMapping::build(
            tenant.clone(),
            virtual_desc.clone(),
            physical_desc.clone(),
            self.codec(),
            self.index_strategy,
        )?;

        if self.config.precreate_tables {
            self.store
                .create_table(&physical_desc)
                .await
                .map_err(classify_upstream)?;
        } else {
            let exists = self
                .store
                .describe_table(&physical_desc.name)
                .await
                .map_err(classify_upstream)?
                .is_some();
            if !exists {
                return Err(Error::IncompatibleSchema(format!(
                    "physical table '{}' does not exist and precreateTables is false",
                    physical_desc.name
                )));
            }
        }

        self.metadata
            .put(&tenant, virtual_desc.clone())
            .await
            .map_err(Error::Upstream)?;
        self.mappings
            .write()
            .unwrap()
            .insert((tenant, virtual_desc.name.clone()), Arc::new(mapping));
        tracing::debug!(table = %virtual_desc.name, "created virtual table");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn describe_table(&self, table_name: &str) -> Result<VirtualTableDescription> {
        let tenant = self.require_tenant()?;
        self.metadata
            .get(&tenant, table_name)
            .await
            .map_err(Error::Upstream)?
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_table(&self, table_name: &str) -> Result<()> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, table_name).await?;

        self.metadata
            .delete(&tenant, table_name)
            .await
            .map_err(Error::Upstream)?;
        self.invalidate(&tenant, table_name);

        if self.config.truncate_on_delete_table {
            let prefix = mapping.tenant_table_prefix();
            let physical_table = mapping.physical_desc().name.clone();
            let store = self.store.clone();
            if self.config.delete_table_async {
                tokio::spawn(async move {
                    if let Err(err) = store.delete_rows_with_hash_prefix(&physical_table, &prefix).await {
                        tracing::warn!(error = %err, table = %physical_table, "background truncate-on-delete failed");
                    }
                });
            } else {
                self.store
                    .delete_rows_with_hash_prefix(&physical_table, &prefix)
                    .await
                    .map_err(classify_upstream)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, virtual_key))]
    pub async fn get_item(&self, table_name: &str, virtual_key: &Item) -> Result<Option<Item>> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, table_name).await?;
        let physical_key = mapping.apply_for_key(virtual_key)?;
        let physical_item = self
            .store
            .get_item(&mapping.physical_desc().name, &physical_key)
            .await
            .map_err(classify_upstream)?;
        physical_item
            .map(|item| mapping.apply_for_item_inverse(&item))
            .transpose()
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn put_item(&self, request: &PutItemRequest) -> Result<()> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, &request.table_name).await?;
        let physical_item = mapping.apply_for_item(&request.item)?;
        let (condition_expression, names, values) = self.rewrite_condition(
            &mapping,
            request.condition_expression.as_deref(),
            request.expression_attribute_names.clone(),
            request.expression_attribute_values.clone(),
        )?;
        let condition_expression = match condition_expression {
            ConstantCondition::Literal(text) => Some(text),
            ConstantCondition::AlwaysTrue => None,
            ConstantCondition::AlwaysFalse => return Err(Error::ConditionalCheckFailed),
        };

        self.store
            .put_item(PutItemRequest {
                table_name: mapping.physical_desc().name.clone(),
                item: physical_item,
                condition_expression,
                expression_attribute_names: names,
                expression_attribute_values: values,
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update_item(&self, request: &UpdateItemRequest) -> Result<Item> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, &request.table_name).await?;
        let physical_key = mapping.apply_for_key(&request.key)?;

        let (update_text, names, values) = mapping.rewrite_expression(
            &request.update_expression,
            request.expression_attribute_names.clone(),
            request.expression_attribute_values.clone(),
            Role::Update,
        )?;

        let (condition_expression, names, values) =
            self.rewrite_condition(&mapping, request.condition_expression.as_deref(), names, values)?;
        let condition_expression = match condition_expression {
            ConstantCondition::Literal(text) => Some(text),
            ConstantCondition::AlwaysTrue => None,
            ConstantCondition::AlwaysFalse => return Err(Error::ConditionalCheckFailed),
        };

        let physical_item = self
            .store
            .update_item(UpdateItemRequest {
                table_name: mapping.physical_desc().name.clone(),
                key: physical_key,
                update_expression: update_text,
                condition_expression,
                expression_attribute_names: names,
                expression_attribute_values: values,
            })
            .await
            .map_err(classify_upstream)?;
        mapping.apply_for_item_inverse(&physical_item)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn delete_item(&self, request: &DeleteItemRequest) -> Result<()> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, &request.table_name).await?;
        let physical_key = mapping.apply_for_key(&request.key)?;
        let (condition_expression, names, values) = self.rewrite_condition(
            &mapping,
            request.condition_expression.as_deref(),
            request.expression_attribute_names.clone(),
            request.expression_attribute_values.clone(),
        )?;
        let condition_expression = match condition_expression {
            ConstantCondition::Literal(text) => Some(text),
            ConstantCondition::AlwaysTrue => None,
            ConstantCondition::AlwaysFalse => return Err(Error::ConditionalCheckFailed),
        };

        self.store
            .delete_item(DeleteItemRequest {
                table_name: mapping.physical_desc().name.clone(),
                key: physical_key,
                condition_expression,
                expression_attribute_names: names,
                expression_attribute_values: values,
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn batch_get_item(&self, request: &BatchGetItemRequest) -> Result<BatchGetItemResponse> {
        let tenant = self.require_tenant()?;
        let total: usize = request.requests.values().map(Vec::len).sum();
        if total > 100 {
            return Err(Error::Upstream(anyhow::anyhow!(
                "batch_get_item supports at most 100 keys across all tables, got {total}"
            )));
        }

        // Partition by physical table: several virtual tables may share
        // one physical table, so keys are grouped before dispatch.
        let mut physical_keys: HashMap<String, Vec<Item>> = HashMap::new();
        let mut mapping_by_table: HashMap<String, Arc<TableMapping>> = HashMap::new();
        let mut physical_table_of: HashMap<String, String> = HashMap::new();

        for (table_name, keys) in &request.requests {
            let mapping = self.get_or_build_mapping(&tenant, table_name).await?;
            let physical_name = mapping.physical_desc().name.clone();
            for key in keys {
                physical_keys
                    .entry(physical_name.clone())
                    .or_default()
                    .push(mapping.apply_for_key(key)?);
            }
            physical_table_of.insert(table_name.clone(), physical_name.clone());
            mapping_by_table.insert(table_name.clone(), mapping);
        }

        let mut items: HashMap<String, Vec<Item>> = HashMap::new();
        let mut unprocessed: HashMap<String, Vec<Item>> = HashMap::new();

        for (physical_name, keys) in physical_keys {
            let (found, missing) = self
                .store
                .batch_get_item(&physical_name, &keys)
                .await
                .map_err(classify_upstream)?;

            for (table_name, mapping) in &mapping_by_table {
                if physical_table_of.get(table_name) != Some(&physical_name) {
                    continue;
                }
                for item in &found {
                    if let Ok(virtual_item) = mapping.apply_for_item_inverse(item) {
                        items.entry(table_name.clone()).or_default().push(virtual_item);
                    }
                }
                for key in &missing {
                    if let Ok(virtual_key) = mapping.apply_for_item_inverse(key) {
                        unprocessed.entry(table_name.clone()).or_default().push(virtual_key);
                    }
                }
            }
        }

        Ok(BatchGetItemResponse { items, unprocessed })
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, &request.table_name).await?;

        let (key_condition, names, values) = mapping.rewrite_expression(
            &request.key_condition_expression,
            request.expression_attribute_names.clone(),
            request.expression_attribute_values.clone(),
            Role::KeyCondition,
        )?;

        let (filter, names, values) = match &request.filter_expression {
            Some(text) => {
                let (t, n, v) = mapping.rewrite_expression(text, names, values, Role::Filter)?;
                (Some(t), n, v)
            }
            None => (None, names, values),
        };

        let (projection, names, values) = match &request.projection_expression {
            Some(text) => {
                let (t, n, v) = mapping.rewrite_expression(text, names, values, Role::Projection)?;
                (Some(t), n, v)
            }
            None => (None, names, values),
        };

        let exclusive_start_key = request
            .exclusive_start_key
            .as_ref()
            .map(|k| mapping.apply_for_key(k))
            .transpose()?;

        let physical_index_name = match &request.index_name {
            Some(name) => match mapping.resolve_index(Some(name))? {
                ResolvedIndex::Secondary(idx) => Some(idx.name),
                ResolvedIndex::Primary => None,
            },
            None => None,
        };

        let response = self
            .store
            .query(QueryRequest {
                table_name: mapping.physical_desc().name.clone(),
                index_name: physical_index_name,
                key_condition_expression: key_condition,
                filter_expression: filter,
                projection_expression: projection,
                expression_attribute_names: names,
                expression_attribute_values: values,
                exclusive_start_key,
                limit: request.limit,
            })
            .await
            .map_err(classify_upstream)?;

        self.translate_query_response(&mapping, response)
    }

    /// A virtual `Scan` is served as a physical `Query` against the
    /// tenant-qualified prefix of this virtual table whenever the
    /// physical table carries a range key (§4.G Rationale); otherwise it
    /// falls back to a full physical scan, post-filtered by decoded
    /// prefix.
    #[tracing::instrument(skip(self, request))]
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let tenant = self.require_tenant()?;
        let mapping = self.get_or_build_mapping(&tenant, &request.table_name).await?;

        if mapping.physical_desc().supports_scan_as_prefix_query() {
            let hash_value = mapping.tenant_table_prefix();
            let mut values = request.expression_attribute_values.clone();
            values.insert(":__mtscan_hk".to_string(), AttributeValue::S(hash_value));
            let mut names = request.expression_attribute_names.clone();
            names.insert("#__mtscan_hkn".to_string(), mapping.physical_desc().key_schema.hash.name.clone());

            let (filter, names, values) = match &request.filter_expression {
                Some(text) => {
                    let (t, n, v) = mapping.rewrite_expression(text, names, values, Role::Filter)?;
                    (Some(t), n, v)
                }
                None => (None, names, values),
            };
            let (projection, names, values) = match &request.projection_expression {
                Some(text) => {
                    let (t, n, v) = mapping.rewrite_expression(text, names, values, Role::Projection)?;
                    (Some(t), n, v)
                }
                None => (None, names, values),
            };

            let response = self
                .store
                .query(QueryRequest {
                    table_name: mapping.physical_desc().name.clone(),
                    index_name: None,
                    key_condition_expression: "begins_with(#__mtscan_hkn, :__mtscan_hk)".to_string(),
                    filter_expression: filter,
                    projection_expression: projection,
                    expression_attribute_names: names,
                    expression_attribute_values: values,
                    exclusive_start_key: request
                        .exclusive_start_key
                        .as_ref()
                        .map(|k| mapping.apply_for_key(k))
                        .transpose()?,
                    limit: request.limit,
                })
                .await
                .map_err(classify_upstream)?;
            return self.translate_query_response(&mapping, response);
        }

        let response = self
            .store
            .scan(ScanRequest {
                table_name: mapping.physical_desc().name.clone(),
                filter_expression: request.filter_expression.clone(),
                projection_expression: request.projection_expression.clone(),
                expression_attribute_names: request.expression_attribute_names.clone(),
                expression_attribute_values: request.expression_attribute_values.clone(),
                exclusive_start_key: request
                    .exclusive_start_key
                    .as_ref()
                    .map(|k| mapping.apply_for_key(k))
                    .transpose()?,
                limit: request.limit,
            })
            .await
            .map_err(classify_upstream)?;

        let prefix = mapping.tenant_table_prefix();
        let mut items = Vec::new();
        for item in response.items {
            if item
                .get(&mapping.physical_desc().key_schema.hash.name)
                .and_then(|v| match v {
                    AttributeValue::S(s) => Some(s.starts_with(&prefix)),
                    _ => None,
                })
                .unwrap_or(false)
            {
                items.push(mapping.apply_for_item_inverse(&item)?);
            }
        }
        Ok(QueryResponse {
            items,
            last_evaluated_key: response
                .last_evaluated_key
                .map(|k| mapping.apply_for_item_inverse(&k))
                .transpose()?,
        })
    }

    fn translate_query_response(
        &self,
        mapping: &TableMapping,
        response: QueryResponse,
    ) -> Result<QueryResponse> {
        let items = response
            .items
            .iter()
            .map(|item| mapping.apply_for_item_inverse(item))
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = response
            .last_evaluated_key
            .map(|k| mapping.apply_for_item_inverse(&k))
            .transpose()?;
        Ok(QueryResponse {
            items,
            last_evaluated_key,
        })
    }

    /// Rewrites a condition expression, then classifies the rewritten
    /// text: the rewriter constant-folds `attribute_exists`/
    /// `attribute_not_exists` on the hash key to literal `true`/`false`
    /// (§4.E), which the façade must resolve locally rather than send to
    /// the store (§7: "raised locally").
    fn rewrite_condition(
        &self,
        mapping: &TableMapping,
        condition_expression: Option<&str>,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
    ) -> Result<(ConstantCondition, HashMap<String, String>, HashMap<String, AttributeValue>)> {
        match condition_expression {
            None => Ok((ConstantCondition::AlwaysTrue, names, values)),
            Some(text) => {
                let (rewritten, names, values) =
                    mapping.rewrite_expression(text, names, values, Role::Condition)?;
                let constant = match rewritten.as_str() {
                    "true" => ConstantCondition::AlwaysTrue,
                    "false" => ConstantCondition::AlwaysFalse,
                    _ => ConstantCondition::Literal(rewritten),
                };
                Ok((constant, names, values))
            }
        }
    }
}

enum ConstantCondition {
    Literal(String),
    AlwaysTrue,
    AlwaysFalse,
}
