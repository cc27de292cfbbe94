//! Component J: streams façades. Each mode wraps a `SegmentCache` over
//! one underlying physical stream and translates raw `StreamRecord`s into
//! `VirtualStreamRecord`s tagged with the tenant/table they belong to.
//! Neither façade rewrites image attribute names back to virtual field
//! names (§4.J: only the key is decoded; consumers that need fully
//! translated images layer a `TableMapping` on top themselves).

use super::cache::SegmentCache;
use super::client::StreamsClient;
use super::iterator::{ExternalIterator, IteratorType};
use super::record::{StreamEventType, StreamRecord};
use crate::codec::KeyCodec;
use crate::error::{Error, Result};
use crate::value::{AttributeValue, Item};
use num_bigint::BigUint;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VirtualStreamRecord {
    pub tenant: String,
    pub virtual_table: String,
    pub sequence_number: BigUint,
    pub event_type: StreamEventType,
    pub keys: Item,
    pub new_image: Option<Item>,
    pub old_image: Option<Item>,
}

fn hash_text(keys: &Item, physical_hash_attr: &str) -> Result<String> {
    match keys.get(physical_hash_attr) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        Some(_) => Err(Error::MalformedPhysicalKey(format!(
            "physical hash attribute '{physical_hash_attr}' is not a string"
        ))),
        None => Err(Error::MalformedPhysicalKey(format!(
            "stream record is missing physical hash attribute '{physical_hash_attr}'"
        ))),
    }
}

/// Shared-table mode (§4.J): the physical stream spans every tenant and
/// virtual table sharing the physical table, so each record's composite
/// hash key is decoded to recover `(tenant, virtualTable)`. When
/// `tenant_filter` is set, records for other tenants are dropped rather
/// than surfaced (used when a caller asks for one virtual table's own
/// stream rather than the shared physical stream in aggregate).
pub struct SharedStreamsFacade {
    client: Arc<dyn StreamsClient>,
    cache: SegmentCache,
    codec: KeyCodec,
    physical_hash_attr: String,
    tenant_filter: Option<String>,
    virtual_table_filter: Option<String>,
}

impl SharedStreamsFacade {
    pub fn new(
        client: Arc<dyn StreamsClient>,
        cache: SegmentCache,
        codec: KeyCodec,
        physical_hash_attr: String,
    ) -> Self {
        Self {
            client,
            cache,
            codec,
            physical_hash_attr,
            tenant_filter: None,
            virtual_table_filter: None,
        }
    }

    /// Scopes this façade to one virtual table's own records, as seen by
    /// `describeStream`/`getRecords` on a single virtual table handle.
    pub fn scoped_to(mut self, tenant: String, virtual_table: String) -> Self {
        self.tenant_filter = Some(tenant);
        self.virtual_table_filter = Some(virtual_table);
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        iterator_type: IteratorType,
        sequence_number: Option<BigUint>,
    ) -> Result<ExternalIterator> {
        self.cache
            .get_shard_iterator(
                self.client.as_ref(),
                stream_arn,
                shard_id,
                iterator_type,
                sequence_number.as_ref(),
            )
            .await
    }

    #[tracing::instrument(skip(self, iterator))]
    pub async fn get_records(
        &self,
        iterator: &ExternalIterator,
        limit: Option<u32>,
    ) -> Result<(Vec<VirtualStreamRecord>, ExternalIterator)> {
        let (records, next) = self.cache.get_records(self.client.as_ref(), iterator, limit).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            if let Some(translated) = self.translate(record)? {
                out.push(translated);
            }
        }
        Ok((out, next))
    }

    fn translate(&self, record: StreamRecord) -> Result<Option<VirtualStreamRecord>> {
        let hash_text = hash_text(&record.keys, &self.physical_hash_attr)?;
        let (tenant, virtual_table, _value_text) = self.codec.decode(&hash_text)?;

        if let Some(filter) = &self.tenant_filter {
            if &tenant != filter {
                return Ok(None);
            }
        }
        if let Some(filter) = &self.virtual_table_filter {
            if &virtual_table != filter {
                return Ok(None);
            }
        }

        Ok(Some(VirtualStreamRecord {
            tenant,
            virtual_table,
            sequence_number: record.sequence_number,
            event_type: record.event_type,
            keys: record.keys,
            new_image: record.new_image,
            old_image: record.old_image,
        }))
    }
}

/// Table-per-tenant mode (§4.J): one physical stream per physical table,
/// and one physical table per `(tenant, virtualTable)`, so the pair is
/// fixed for the whole façade rather than decoded per record.
pub struct PerTenantStreamsFacade {
    client: Arc<dyn StreamsClient>,
    cache: SegmentCache,
    tenant: String,
    virtual_table: String,
}

impl PerTenantStreamsFacade {
    /// Builds a façade for the physical table named `physical_table_name`,
    /// recovering `(tenant, virtualTable)` by splitting on the first
    /// unescaped occurrence of `delimiter` (mirrors `PerTenantFacade`'s
    /// naming scheme: `tenant + delimiter + virtualTableName`).
    pub fn for_physical_table(
        client: Arc<dyn StreamsClient>,
        cache: SegmentCache,
        physical_table_name: &str,
        delimiter: char,
    ) -> Result<Self> {
        let mut parts = physical_table_name.splitn(2, delimiter);
        let tenant = parts.next().unwrap_or_default().to_string();
        let virtual_table = parts.next().ok_or_else(|| {
            Error::MalformedPhysicalKey(format!(
                "physical table name '{physical_table_name}' does not contain the tenant delimiter '{delimiter}'"
            ))
        })?;
        Ok(Self {
            client,
            cache,
            tenant,
            virtual_table: virtual_table.to_string(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        iterator_type: IteratorType,
        sequence_number: Option<BigUint>,
    ) -> Result<ExternalIterator> {
        self.cache
            .get_shard_iterator(
                self.client.as_ref(),
                stream_arn,
                shard_id,
                iterator_type,
                sequence_number.as_ref(),
            )
            .await
    }

    #[tracing::instrument(skip(self, iterator))]
    pub async fn get_records(
        &self,
        iterator: &ExternalIterator,
        limit: Option<u32>,
    ) -> Result<(Vec<VirtualStreamRecord>, ExternalIterator)> {
        let (records, next) = self.cache.get_records(self.client.as_ref(), iterator, limit).await?;
        let out = records
            .into_iter()
            .map(|record| VirtualStreamRecord {
                tenant: self.tenant.clone(),
                virtual_table: self.virtual_table.clone(),
                sequence_number: record.sequence_number,
                event_type: record.event_type,
                keys: record.keys,
                new_image: record.new_image,
                old_image: record.old_image,
            })
            .collect();
        Ok((out, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::client::RawGetRecordsResult;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeStreamsClient {
        batches: Mutex<Vec<RawGetRecordsResult>>,
    }

    #[async_trait]
    impl StreamsClient for FakeStreamsClient {
        async fn get_shard_iterator(
            &self,
            _stream_arn: &str,
            _shard_id: &str,
            _iterator_type: IteratorType,
            _sequence_number: Option<&BigUint>,
        ) -> anyhow::Result<String> {
            Ok("underlying-0".to_string())
        }

        async fn get_records(
            &self,
            _shard_iterator: &str,
            _limit: Option<u32>,
        ) -> anyhow::Result<RawGetRecordsResult> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                return Ok(RawGetRecordsResult {
                    records: Vec::new(),
                    next_shard_iterator: None,
                });
            }
            Ok(batches.remove(0))
        }
    }

    fn item_with_hash(codec: &KeyCodec, tenant: &str, table: &str) -> Item {
        let mut item = BTreeMap::new();
        let encoded = codec.encode(tenant, table, &crate::codec::HashValue::S("row-1".into()));
        item.insert("hk".to_string(), AttributeValue::S(encoded));
        item
    }

    #[tokio::test]
    async fn shared_facade_decodes_tenant_and_table_from_the_composite_key() {
        let codec = KeyCodec::default();
        let client = Arc::new(FakeStreamsClient {
            batches: Mutex::new(vec![RawGetRecordsResult {
                records: vec![StreamRecord {
                    sequence_number: BigUint::from(1u32),
                    keys: item_with_hash(&codec, "acme", "Orders"),
                    event_type: StreamEventType::Insert,
                    new_image: None,
                    old_image: None,
                }],
                next_shard_iterator: Some("underlying-1".to_string()),
            }]),
        });
        let facade = SharedStreamsFacade::new(
            client,
            SegmentCache::new(crate::config::StreamsCacheConfig::default()),
            codec,
            "hk".to_string(),
        );
        let iterator = facade
            .get_shard_iterator("arn", "shard-0", IteratorType::TrimHorizon, None)
            .await
            .unwrap();
        let (records, _) = facade.get_records(&iterator, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tenant, "acme");
        assert_eq!(records[0].virtual_table, "Orders");
    }

    #[tokio::test]
    async fn shared_facade_filters_out_other_tenants_when_scoped() {
        let codec = KeyCodec::default();
        let client = Arc::new(FakeStreamsClient {
            batches: Mutex::new(vec![RawGetRecordsResult {
                records: vec![StreamRecord {
                    sequence_number: BigUint::from(1u32),
                    keys: item_with_hash(&codec, "other-tenant", "Orders"),
                    event_type: StreamEventType::Insert,
                    new_image: None,
                    old_image: None,
                }],
                next_shard_iterator: None,
            }]),
        });
        let facade = SharedStreamsFacade::new(
            client,
            SegmentCache::new(crate::config::StreamsCacheConfig::default()),
            codec,
            "hk".to_string(),
        )
        .scoped_to("acme".to_string(), "Orders".to_string());
        let iterator = facade
            .get_shard_iterator("arn", "shard-0", IteratorType::TrimHorizon, None)
            .await
            .unwrap();
        let (records, _) = facade.get_records(&iterator, None).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn per_tenant_facade_splits_physical_table_name_on_delimiter() {
        let client = Arc::new(FakeStreamsClient {
            batches: Mutex::new(Vec::new()),
        });
        let facade = PerTenantStreamsFacade::for_physical_table(
            client,
            SegmentCache::new(crate::config::StreamsCacheConfig::default()),
            "acme.Orders",
            '.',
        )
        .unwrap();
        assert_eq!(facade.tenant, "acme");
        assert_eq!(facade.virtual_table, "Orders");
    }
}
