//! Component I: the streams cache (§4.I, §5).
//!
//! State: a sorted map of non-overlapping `CacheSegment`s keyed by their
//! starting `IteratorPosition`, an insertion-order eviction queue, and one
//! coarse reader/writer lock (§5: "the streams cache ... is guarded by a
//! single coarse lock; the design deliberately trades fine-grained
//! concurrency for implementation simplicity"). No I/O is performed while
//! the lock is held.

use super::client::StreamsClient;
use super::iterator::{ExternalIterator, IteratorType};
use super::record::StreamRecord;
use crate::config::StreamsCacheConfig;
use crate::error::{classify_upstream, Error, Result};
use num_bigint::BigUint;
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

/// Total order is lexicographic on `(streamArn, shardId, seqNum)` (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IteratorPosition {
    pub stream_arn: String,
    pub shard_id: String,
    pub seq_num: BigUint,
}

impl IteratorPosition {
    pub fn same_shard(&self, other: &IteratorPosition) -> bool {
        self.stream_arn == other.stream_arn && self.shard_id == other.shard_id
    }
}

/// A contiguous, non-overlapping run of records for one shard (§3). `I1`:
/// `records` is sorted ascending by sequence number with `position.seq_num
/// == records[0].sequence_number`. `I2`: no two segments for the same
/// shard have overlapping `[first, last]` ranges.
#[derive(Debug, Clone)]
pub struct CacheSegment {
    pub position: IteratorPosition,
    pub records: Vec<StreamRecord>,
    pub next_iterator: Option<String>,
}

impl CacheSegment {
    fn first_seq(&self) -> &BigUint {
        &self.records.first().expect("segment is never empty").sequence_number
    }

    fn last_seq(&self) -> &BigUint {
        &self.records.last().expect("segment is never empty").sequence_number
    }
}

struct Inner {
    segments: BTreeMap<IteratorPosition, CacheSegment>,
    eviction_queue: VecDeque<IteratorPosition>,
}

pub struct SegmentCache {
    config: StreamsCacheConfig,
    inner: RwLock<Inner>,
}

impl SegmentCache {
    pub fn new(config: StreamsCacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                segments: BTreeMap::new(),
                eviction_queue: VecDeque::new(),
            }),
        }
    }

    /// `GetShardIterator` (§4.I): logical types resolve an underlying
    /// iterator eagerly; absolute types are deferred until the first
    /// `GetRecords` call so a position that's already cached never needs
    /// the underlying endpoint at all.
    pub async fn get_shard_iterator(
        &self,
        client: &dyn StreamsClient,
        stream_arn: &str,
        shard_id: &str,
        iterator_type: IteratorType,
        sequence_number: Option<&BigUint>,
    ) -> Result<ExternalIterator> {
        if iterator_type.is_logical() {
            let underlying = client
                .get_shard_iterator(stream_arn, shard_id, iterator_type, None)
                .await
                .map_err(classify_upstream)?;
            Ok(ExternalIterator {
                stream_arn: stream_arn.to_string(),
                shard_id: shard_id.to_string(),
                iterator_type,
                sequence_number: None,
                underlying_iterator: Some(underlying),
            })
        } else {
            let seq = sequence_number.cloned().ok_or_else(|| {
                Error::MalformedPhysicalKey(
                    "AT_SEQUENCE_NUMBER/AFTER_SEQUENCE_NUMBER requires a sequence number".into(),
                )
            })?;
            Ok(ExternalIterator {
                stream_arn: stream_arn.to_string(),
                shard_id: shard_id.to_string(),
                iterator_type,
                sequence_number: Some(seq),
                underlying_iterator: None,
            })
        }
    }

    /// `GetRecords(externalIterator, limit?)` (§4.I).
    pub async fn get_records(
        &self,
        client: &dyn StreamsClient,
        iterator: &ExternalIterator,
        limit: Option<u32>,
    ) -> Result<(Vec<StreamRecord>, ExternalIterator)> {
        if iterator.iterator_type.is_absolute() {
            let position = IteratorPosition {
                stream_arn: iterator.stream_arn.clone(),
                shard_id: iterator.shard_id.clone(),
                seq_num: first_wanted_seq(iterator),
            };
            if let Some(hit) = self.lookup(&position, limit)? {
                return Ok(hit);
            }
        }

        let mut underlying = iterator.underlying_iterator.clone();
        let mut attempt = 0u32;
        loop {
            if underlying.is_none() {
                let seq = match iterator.iterator_type {
                    IteratorType::AtSequenceNumber | IteratorType::AfterSequenceNumber => {
                        iterator.sequence_number.as_ref()
                    }
                    _ => None,
                };
                underlying = Some(
                    client
                        .get_shard_iterator(
                            &iterator.stream_arn,
                            &iterator.shard_id,
                            iterator.iterator_type,
                            seq,
                        )
                        .await
                        .map_err(classify_upstream)?,
                );
            }
            let handle = underlying.clone().expect("just populated above");

            match client.get_records(&handle, limit).await {
                Ok(result) if result.records.is_empty() => {
                    return Ok((
                        Vec::new(),
                        ExternalIterator {
                            stream_arn: iterator.stream_arn.clone(),
                            shard_id: iterator.shard_id.clone(),
                            iterator_type: iterator.iterator_type,
                            sequence_number: iterator.sequence_number.clone(),
                            underlying_iterator: result.next_shard_iterator.or(Some(handle)),
                        },
                    ));
                }
                Ok(result) if iterator.iterator_type == IteratorType::TrimHorizon => {
                    // Design note (c): a TRIM_HORIZON read has no absolute
                    // position to anchor on yet, so its records are handed
                    // back uncached rather than inserted as a segment.
                    let last_seq = result.records.last().map(|r| r.sequence_number.clone());
                    return Ok((
                        result.records,
                        ExternalIterator {
                            stream_arn: iterator.stream_arn.clone(),
                            shard_id: iterator.shard_id.clone(),
                            iterator_type: IteratorType::AfterSequenceNumber,
                            sequence_number: last_seq,
                            underlying_iterator: result.next_shard_iterator,
                        },
                    ));
                }
                Ok(result) => {
                    let position = IteratorPosition {
                        stream_arn: iterator.stream_arn.clone(),
                        shard_id: iterator.shard_id.clone(),
                        seq_num: result.records[0].sequence_number.clone(),
                    };
                    let new_segment = CacheSegment {
                        position: position.clone(),
                        records: result.records,
                        next_iterator: result.next_shard_iterator,
                    };
                    let resolved_key = self.insert_with_merge(new_segment);
                    return self.read_from(&resolved_key, &position, iterator, limit);
                }
                Err(err) => {
                    let classified = classify_upstream(err);
                    if matches!(classified, Error::LimitExceeded) && attempt < self.config.max_retries {
                        attempt += 1;
                        tokio::time::sleep(std::time::Duration::from_millis(
                            self.config.backoff_ms * attempt as u64,
                        ))
                        .await;
                        continue;
                    }
                    return Err(classified);
                }
            }
        }
    }

    /// Step 1 of `GetRecords` for absolute iterators: serve straight from
    /// the cache if a segment already covers `position`.
    fn lookup(
        &self,
        position: &IteratorPosition,
        limit: Option<u32>,
    ) -> Result<Option<(Vec<StreamRecord>, ExternalIterator)>> {
        let inner = self.inner.read().expect("streams cache lock poisoned");
        let Some((key, segment)) = find_at_or_before(&inner.segments, position) else {
            #[cfg(feature = "metrics")]
            metrics::counter!("mt_store_streams_cache_miss", "shard_id" => position.shard_id.clone())
                .increment(1);
            return Ok(None);
        };
        if !(segment.first_seq() <= &position.seq_num && &position.seq_num <= segment.last_seq()) {
            #[cfg(feature = "metrics")]
            metrics::counter!("mt_store_streams_cache_miss", "shard_id" => position.shard_id.clone())
                .increment(1);
            return Ok(None);
        }
        #[cfg(feature = "metrics")]
        metrics::counter!("mt_store_streams_cache_hit", "shard_id" => position.shard_id.clone())
            .increment(1);
        let key = key.clone();
        drop(inner);
        Ok(Some(self.read_from(&key, position, &caller_like(position), limit)?))
    }

    /// Reads forward from `from_position` within the segment indexed at
    /// `segment_key`, applying `limit` and building the continuation
    /// iterator (§4.I "Limit application").
    fn read_from(
        &self,
        segment_key: &IteratorPosition,
        from_position: &IteratorPosition,
        caller_iterator: &ExternalIterator,
        limit: Option<u32>,
    ) -> Result<(Vec<StreamRecord>, ExternalIterator)> {
        let inner = self.inner.read().expect("streams cache lock poisoned");
        let segment = inner.segments.get(segment_key).ok_or_else(|| {
            Error::Upstream(anyhow::anyhow!(
                "streams cache segment vanished between insert and read"
            ))
        })?;

        let mut records: Vec<StreamRecord> = segment
            .records
            .iter()
            .filter(|r| r.sequence_number >= from_position.seq_num)
            .cloned()
            .collect();

        let next = if let Some(limit) = limit.map(|l| l as usize) {
            if records.len() > limit {
                records.truncate(limit);
                ExternalIterator {
                    stream_arn: caller_iterator.stream_arn.clone(),
                    shard_id: caller_iterator.shard_id.clone(),
                    iterator_type: IteratorType::AfterSequenceNumber,
                    sequence_number: records.last().map(|r| r.sequence_number.clone()),
                    underlying_iterator: None,
                }
            } else {
                trailing_iterator(caller_iterator, segment, &records)
            }
        } else {
            trailing_iterator(caller_iterator, segment, &records)
        };

        Ok((records, next))
    }

    /// Insert-with-merge (§4.I): trims `new_segment` against overlapping
    /// neighbors on the same shard, then merges with adjacent neighbors
    /// where doing so stays within `max_records_per_result` and does not
    /// bury a neighbor's continuation handle. Returns the key the caller
    /// should read back from (may differ from `new_segment.position` if
    /// merged leftward, or be dropped entirely if fully absorbed).
    fn insert_with_merge(&self, mut new_segment: CacheSegment) -> IteratorPosition {
        let mut inner = self.inner.write().expect("streams cache lock poisoned");

        // Trim against the predecessor (greatest segment with key <= P, same shard).
        if let Some((_, pred)) = find_at_or_before(&inner.segments, &new_segment.position) {
            let pred_last = pred.last_seq().clone();
            if &pred_last >= new_segment.first_seq() {
                new_segment
                    .records
                    .retain(|r| r.sequence_number > pred_last);
                if new_segment.records.is_empty() {
                    let pred_key = pred.position.clone();
                    evict_if_needed(&mut inner, &self.config);
                    return pred_key;
                }
                new_segment.position = IteratorPosition {
                    seq_num: new_segment.first_seq().clone(),
                    ..new_segment.position.clone()
                };
            }
        }

        // Trim/absorb against the successor (least segment with key > P, same shard).
        if let Some(succ_key) = find_strictly_after(&inner.segments, &new_segment.position) {
            let succ = inner.segments.get(&succ_key).expect("key just looked up");
            if succ.first_seq() <= new_segment.last_seq() {
                let succ_first = succ.first_seq().clone();
                new_segment
                    .records
                    .retain(|r| r.sequence_number < succ_first);
                if new_segment.records.is_empty() {
                    // new_segment's range is entirely covered by succ; re-index
                    // succ's existing records under the earlier key so lookups
                    // at P find them.
                    let succ = inner.segments.remove(&succ_key).expect("key just looked up");
                    let reindexed = CacheSegment {
                        position: new_segment.position.clone(),
                        records: succ.records,
                        next_iterator: succ.next_iterator,
                    };
                    return self.finish_insert(&mut inner, reindexed);
                }
            }
        }

        self.finish_insert(&mut inner, new_segment)
    }

    /// Adjacency merges (not overlap trims) and final map/eviction bookkeeping.
    fn finish_insert(&self, inner: &mut Inner, mut segment: CacheSegment) -> IteratorPosition {
        // Merge with predecessor if contiguous and within the result-size
        // ceiling. Refused when the predecessor carries a continuation
        // handle that merging would bury in the middle of the combined
        // segment (Open Question (a)).
        if let Some((pred_key, _)) = find_at_or_before(&inner.segments, &segment.position) {
            let pred_key = pred_key.clone();
            let pred = inner.segments.get(&pred_key).expect("key just looked up");
            let contiguous = pred.last_seq().clone() + BigUint::from(1u8) == *segment.first_seq();
            let fits = pred.records.len() + segment.records.len() <= self.config.max_records_per_result;
            if contiguous && fits && pred.next_iterator.is_none() {
                let mut pred = inner.segments.remove(&pred_key).expect("key just looked up");
                pred.records.append(&mut segment.records);
                segment = CacheSegment {
                    position: pred_key,
                    records: pred.records,
                    next_iterator: segment.next_iterator,
                };
                #[cfg(feature = "metrics")]
                metrics::counter!("mt_store_streams_cache_merge", "shard_id" => segment.position.shard_id.clone())
                    .increment(1);
            }
        }

        // Merge with successor similarly. Refused when `segment` itself
        // carries a continuation handle that would otherwise be buried.
        if let Some(succ_key) = find_strictly_after(&inner.segments, &segment.position) {
            let succ = inner.segments.get(&succ_key).expect("key just looked up");
            let contiguous = segment.last_seq().clone() + BigUint::from(1u8) == *succ.first_seq();
            let fits = segment.records.len() + succ.records.len() <= self.config.max_records_per_result;
            if contiguous && fits && segment.next_iterator.is_none() {
                let mut succ = inner.segments.remove(&succ_key).expect("key just looked up");
                segment.records.append(&mut succ.records);
                segment.next_iterator = succ.next_iterator.take();
                #[cfg(feature = "metrics")]
                metrics::counter!("mt_store_streams_cache_merge", "shard_id" => segment.position.shard_id.clone())
                    .increment(1);
            }
        }

        let key = segment.position.clone();
        inner.segments.insert(key.clone(), segment);
        inner.eviction_queue.push_back(key.clone());
        evict_if_needed(inner, &self.config);
        key
    }
}

/// The sequence number of the first record an absolute iterator actually
/// wants: `AT_SEQUENCE_NUMBER` starts at the given value, while
/// `AFTER_SEQUENCE_NUMBER` starts strictly after it.
fn first_wanted_seq(iterator: &ExternalIterator) -> BigUint {
    let seq = iterator
        .sequence_number
        .clone()
        .expect("absolute iterator carries a sequence number");
    match iterator.iterator_type {
        IteratorType::AfterSequenceNumber => seq + BigUint::from(1u8),
        _ => seq,
    }
}

fn find_at_or_before<'a>(
    segments: &'a BTreeMap<IteratorPosition, CacheSegment>,
    p: &IteratorPosition,
) -> Option<(&'a IteratorPosition, &'a CacheSegment)> {
    segments
        .range(..=p.clone())
        .next_back()
        .filter(|(k, _)| k.same_shard(p))
}

fn find_strictly_after(
    segments: &BTreeMap<IteratorPosition, CacheSegment>,
    p: &IteratorPosition,
) -> Option<IteratorPosition> {
    segments
        .range((std::ops::Bound::Excluded(p.clone()), std::ops::Bound::Unbounded))
        .find(|(k, _)| k.same_shard(p))
        .map(|(k, _)| k.clone())
}

fn evict_if_needed(inner: &mut Inner, config: &StreamsCacheConfig) {
    while inner.segments.len() > config.max_segments {
        let Some(oldest) = inner.eviction_queue.pop_front() else {
            break;
        };
        inner.segments.remove(&oldest);
    }
}

fn trailing_iterator(
    caller_iterator: &ExternalIterator,
    segment: &CacheSegment,
    records: &[StreamRecord],
) -> ExternalIterator {
    let last_seq = records.last().map(|r| r.sequence_number.clone());
    ExternalIterator {
        stream_arn: caller_iterator.stream_arn.clone(),
        shard_id: caller_iterator.shard_id.clone(),
        iterator_type: IteratorType::AfterSequenceNumber,
        sequence_number: last_seq.or_else(|| caller_iterator.sequence_number.clone()),
        underlying_iterator: segment.next_iterator.clone(),
    }
}

/// Builds a minimal iterator carrying only `(streamArn, shardId)` for the
/// `lookup` fast path, which never needs the caller's original iterator
/// type or underlying handle to compute its continuation.
fn caller_like(position: &IteratorPosition) -> ExternalIterator {
    ExternalIterator {
        stream_arn: position.stream_arn.clone(),
        shard_id: position.shard_id.clone(),
        iterator_type: IteratorType::AfterSequenceNumber,
        sequence_number: Some(position.seq_num.clone()),
        underlying_iterator: None,
    }
}
