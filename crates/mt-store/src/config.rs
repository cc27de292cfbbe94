//! Configuration structs for the shared-table façade and the streams
//! cache (§6, SPEC_FULL §A3). Plain serde-derived structs with `Default`
//! matching the spec's documented defaults, so hosts can load them from
//! whatever configuration format they prefer.

use serde::{Deserialize, Serialize};

/// Recognized options for the shared-table façade (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedTableConfig {
    /// Separator used in composite keys and in prefixed table names.
    pub delimiter: char,
    /// String prepended to every physical table name, for environment
    /// isolation.
    pub table_prefix: Option<String>,
    /// If true, `DeleteTable` returns as soon as metadata is removed;
    /// data deletion proceeds in the background.
    pub delete_table_async: bool,
    /// If true, physical rows owned by the virtual table are deleted on
    /// `DeleteTable`.
    pub truncate_on_delete_table: bool,
    /// Create physical tables eagerly at startup.
    pub precreate_tables: bool,
    /// Interval used when waiting for physical-table creation to reach
    /// the active state.
    pub poll_interval_seconds: u32,
    /// Identifier used in logs/metrics.
    pub name: String,
}

impl Default for SharedTableConfig {
    fn default() -> Self {
        Self {
            delimiter: '.',
            table_prefix: None,
            delete_table_async: false,
            truncate_on_delete_table: false,
            precreate_tables: true,
            poll_interval_seconds: 0,
            name: "MtAmazonDynamoDbBySharedTable".to_string(),
        }
    }
}

/// Recognized options for the table-per-tenant façade (§4.H): the same
/// delimiter concept, applied to table names rather than composite keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerTenantConfig {
    pub delimiter: char,
    pub precreate_tables: bool,
    pub name: String,
}

impl Default for PerTenantConfig {
    fn default() -> Self {
        Self {
            delimiter: '.',
            precreate_tables: true,
            name: "MtAmazonDynamoDbByTable".to_string(),
        }
    }
}

/// Configuration for the streams cache (§4.I).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsCacheConfig {
    pub max_segments: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// Maximum records the underlying endpoint will return in one
    /// `GetRecords` call; also the ceiling on merged-segment size (§4.I).
    pub max_records_per_result: usize,
}

impl Default for StreamsCacheConfig {
    fn default() -> Self {
        Self {
            max_segments: 1000,
            max_retries: 3,
            backoff_ms: 100,
            max_records_per_result: 1000,
        }
    }
}
