//! Component H: the table-per-tenant façade.
//!
//! No key rewriting: the physical table name is `f(tenant, virtualTableName)`
//! (default: `tenant + delimiter + virtualTableName`). Index names and
//! schemas pass through unchanged (§4.H).

use crate::config::PerTenantConfig;
use crate::context;
use crate::error::{classify_upstream, Error, Result};
use crate::metadata::{TableMetadataStore, VirtualTableDescription};
use crate::store::{
    DeleteItemRequest, PutItemRequest, QueryRequest, QueryResponse, ScanRequest, ScanResponse,
    StoreClient, UpdateItemRequest,
};
use crate::value::Item;
use std::sync::Arc;

pub struct PerTenantFacade {
    metadata: Arc<dyn TableMetadataStore>,
    store: Arc<dyn StoreClient>,
    config: PerTenantConfig,
}

impl PerTenantFacade {
    pub fn new(metadata: Arc<dyn TableMetadataStore>, store: Arc<dyn StoreClient>, config: PerTenantConfig) -> Self {
        Self {
            metadata,
            store,
            config,
        }
    }

    fn require_tenant(&self) -> Result<String> {
        let tenant = context::current_tenant();
        if tenant.is_empty() {
            return Err(Error::NoTenantContext);
        }
        Ok(tenant)
    }

    fn physical_table_name(&self, tenant: &str, virtual_name: &str) -> String {
        format!("{tenant}{}{virtual_name}", self.config.delimiter)
    }

    async fn resolve(&self, table_name: &str) -> Result<(String, String, VirtualTableDescription)> {
        let tenant = self.require_tenant()?;
        let virtual_desc = self
            .metadata
            .get(&tenant, table_name)
            .await
            .map_err(Error::Upstream)?
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        let physical_name = self.physical_table_name(&tenant, table_name);
        Ok((tenant, physical_name, virtual_desc))
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

        let physical_name = self.physical_table_name(&tenant, &virtual_desc.name);
        let physical_desc = crate::metadata::PhysicalTableDescription {
            name: physical_name.clone(),
            key_schema: virtual_desc.key_schema.clone(),
            indexes: virtual_desc.indexes.clone(),
        };

        if self.config.precreate_tables {
            self.store
                .create_table(&physical_desc)
                .await
                .map_err(classify_upstream)?;
        } else if self
            .store
            .describe_table(&physical_name)
            .await
            .map_err(classify_upstream)?
            .is_none()
        {
            return Err(Error::IncompatibleSchema(format!(
                "physical table '{physical_name}' does not exist and precreateTables is false"
            )));
        }

        self.metadata
            .put(&tenant, virtual_desc)
            .await
            .map_err(Error::Upstream)
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
        let (tenant, physical_name, _) = self.resolve(table_name).await?;
        self.metadata
            .delete(&tenant, table_name)
            .await
            .map_err(Error::Upstream)?;
        self.store
            .delete_table(&physical_name)
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, key))]
    pub async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>> {
        let (_, physical_name, _) = self.resolve(table_name).await?;
        self.store
            .get_item(&physical_name, key)
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn put_item(&self, request: &PutItemRequest) -> Result<()> {
        let (_, physical_name, _) = self.resolve(&request.table_name).await?;
        self.store
            .put_item(PutItemRequest {
                table_name: physical_name,
                ..request.clone()
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update_item(&self, request: &UpdateItemRequest) -> Result<Item> {
        let (_, physical_name, _) = self.resolve(&request.table_name).await?;
        self.store
            .update_item(UpdateItemRequest {
                table_name: physical_name,
                ..request.clone()
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn delete_item(&self, request: &DeleteItemRequest) -> Result<()> {
        let (_, physical_name, _) = self.resolve(&request.table_name).await?;
        self.store
            .delete_item(DeleteItemRequest {
                table_name: physical_name,
                ..request.clone()
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let (_, physical_name, _) = self.resolve(&request.table_name).await?;
        self.store
            .query(QueryRequest {
                table_name: physical_name,
                ..request.clone()
            })
            .await
            .map_err(classify_upstream)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let (_, physical_name, _) = self.resolve(&request.table_name).await?;
        self.store
            .scan(ScanRequest {
                table_name: physical_name,
                ..request.clone()
            })
            .await
            .map_err(classify_upstream)
    }
}
