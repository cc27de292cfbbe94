//! Components I and J: the streams cache and its façades.
//!
//! The cache (`cache`) is façade-agnostic: it only knows about
//! `(streamArn, shardId, sequenceNumber)` positions and raw records.
//! `facade` layers the per-mode translation described in §4.J on top —
//! decoding the composite hash key for shared-table streams, or just
//! tagging every record with a fixed `(tenant, table)` for per-tenant
//! streams.

mod cache;
mod client;
mod facade;
mod iterator;
mod record;

pub use cache::{CacheSegment, IteratorPosition, SegmentCache};
pub use client::{RawGetRecordsResult, StreamsClient};
pub use facade::{PerTenantStreamsFacade, SharedStreamsFacade, VirtualStreamRecord};
pub use iterator::{ExternalIterator, IteratorType};
pub use record::{StreamEventType, StreamRecord};
