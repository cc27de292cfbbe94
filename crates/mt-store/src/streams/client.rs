//! The underlying streams/change-feed endpoint: an external collaborator
//! (§1), analogous to `StoreClient` for the item store. Implementations
//! raise `error::LimitExceededMarker` (wrapped in `anyhow::Error`) to
//! signal the one retryable condition on `GetRecords` (§7).

use super::record::StreamRecord;
use crate::streams::iterator::IteratorType;
use async_trait::async_trait;
use num_bigint::BigUint;

pub struct RawGetRecordsResult {
    pub records: Vec<StreamRecord>,
    pub next_shard_iterator: Option<String>,
}

#[async_trait]
pub trait StreamsClient: Send + Sync {
    /// Resolves a `(streamArn, shardId, iteratorType, sequenceNumber)`
    /// request into an opaque underlying iterator handle.
    async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        iterator_type: IteratorType,
        sequence_number: Option<&BigUint>,
    ) -> anyhow::Result<String>;

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: Option<u32>,
    ) -> anyhow::Result<RawGetRecordsResult>;
}
