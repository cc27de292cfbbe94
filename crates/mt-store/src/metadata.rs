//! Data model (spec §3) and component B: the table-metadata repository.
//!
//! `VirtualTableDescription` and `PhysicalTableDescription` are immutable
//! once persisted; everything downstream (the key codec, the index
//! mapper, the expression rewriter, table mapping) is derived from them.

use std::fmt;

/// An attribute's wire type, matching the three scalar key types the
/// underlying store supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AttrType {
    S,
    N,
    B,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::S => write!(f, "S"),
            AttrType::N => write!(f, "N"),
            AttrType::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub attr_type: AttrType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// A primary or secondary key schema: a hash key and an optional range key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeySchema {
    pub hash: KeyAttribute,
    pub range: Option<KeyAttribute>,
}

impl KeySchema {
    pub fn hash_only(hash: KeyAttribute) -> Self {
        Self { hash, range: None }
    }

    /// True when `self` and `other` have the same key-type *shape*: same
    /// hash type, and range either both absent or both present with the
    /// same type. Used by the by-type index-matching strategy (§4.D).
    pub fn shape_matches(&self, other: &KeySchema) -> bool {
        self.hash.attr_type == other.hash.attr_type
            && match (&self.range, &other.range) {
                (None, None) => true,
                (Some(a), Some(b)) => a.attr_type == b.attr_type,
                _ => false,
            }
    }
}

/// What a secondary index projects into its own storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProjectionKind {
    All,
    KeysOnly,
    Include(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecondaryIndex {
    pub name: String,
    pub schema: KeySchema,
    pub projection: ProjectionKind,
}

/// A table as seen by the client. Persisted by (B) and immutable once
/// persisted; a `CreateTable` that would redefine an existing virtual
/// table is rejected by the facade with `TableAlreadyExists`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VirtualTableDescription {
    pub name: String,
    pub key_schema: KeySchema,
    pub indexes: Vec<SecondaryIndex>,
}

/// A table actually created in the underlying store. In shared-table mode
/// the hash key type must be `S` (§3).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PhysicalTableDescription {
    pub name: String,
    pub key_schema: KeySchema,
    pub indexes: Vec<SecondaryIndex>,
}

impl PhysicalTableDescription {
    /// Whether this physical table's primary key can serve a virtual scan
    /// as a prefix query rather than a filtered full scan (§4.G
    /// Rationale): it must carry a range key, since the virtual hash key
    /// value is pushed into the range position once the physical hash key
    /// is the tenant+table composite.
    pub fn supports_scan_as_prefix_query(&self) -> bool {
        self.key_schema.range.is_some()
    }
}

/// Produces a physical table description compatible with a given virtual
/// table description, for `CreateTable` in shared-table mode (§4.G). The
/// default factory always targets string-typed composite keys so the key
/// codec's encoding is total.
pub trait CreateTableRequestFactory: Send + Sync {
    fn physical_table_for(&self, virtual_desc: &VirtualTableDescription) -> PhysicalTableDescription;
}

/// The shared physical table targeted by every virtual table, keyed by the
/// tenant+table composite hash key with a range key so that virtual scans
/// can be served as prefix queries.
pub struct SharedTableFactory {
    pub physical_table_name: String,
}

impl CreateTableRequestFactory for SharedTableFactory {
    fn physical_table_for(&self, virtual_desc: &VirtualTableDescription) -> PhysicalTableDescription {
        let indexes = virtual_desc
            .indexes
            .iter()
            .map(|idx| SecondaryIndex {
                name: idx.name.clone(),
                schema: KeySchema {
                    hash: KeyAttribute::new(format!("{}_hk", idx.name), AttrType::S),
                    range: idx.schema.range.as_ref().map(|_| {
                        KeyAttribute::new(format!("{}_rk", idx.name), AttrType::S)
                    }),
                },
                projection: idx.projection.clone(),
            })
            .collect();

        PhysicalTableDescription {
            name: self.physical_table_name.clone(),
            key_schema: KeySchema {
                hash: KeyAttribute::new("hk", AttrType::S),
                range: Some(KeyAttribute::new("rk", AttrType::S)),
            },
            indexes,
        }
    }
}

/// Component B: `(tenant, virtualName) -> VirtualTableDescription`,
/// persisted. Implemented by the host against whatever backing store it
/// likes; a key-value table named `_tablemetadata` by default (§6).
#[async_trait::async_trait]
pub trait TableMetadataStore: Send + Sync {
    async fn get(
        &self,
        tenant: &str,
        virtual_name: &str,
    ) -> anyhow::Result<Option<VirtualTableDescription>>;

    async fn put(&self, tenant: &str, desc: VirtualTableDescription) -> anyhow::Result<()>;

    async fn delete(&self, tenant: &str, virtual_name: &str) -> anyhow::Result<()>;
}

pub const DEFAULT_METADATA_TABLE_NAME: &str = "_tablemetadata";
