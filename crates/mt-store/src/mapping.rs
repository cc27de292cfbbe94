//! Component F: table mapping.
//!
//! The derived plan for one virtual table (§3, §4.F): built once per
//! `(tenant, virtualTableName)` from the key codec (C), the secondary-index
//! mapper (D), and the expression rewriter (E), then cached by the façade.

use crate::codec::{HashValue, KeyCodec};
use crate::error::{Error, Result};
use crate::expr::{self, KeyField, Role};
use crate::index::{self, IndexMatchStrategy};
use crate::metadata::{AttrType, PhysicalTableDescription, SecondaryIndex, VirtualTableDescription};
use crate::value::{AttributeValue, Item};
use std::collections::HashMap;

/// `(virtualField, physicalField, virtualType, physicalType, isHashKey)`.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub virtual_field: String,
    pub physical_field: String,
    pub virtual_type: AttrType,
    pub physical_type: AttrType,
    pub is_hash_key: bool,
}

struct KeyMapping {
    hash: FieldMapping,
    range: Option<FieldMapping>,
}

struct SecondaryMapping {
    fields: KeyMapping,
    physical: SecondaryIndex,
}

/// What `resolveIndex` returns: the primary key, or a named secondary
/// index's physical counterpart.
pub enum ResolvedIndex {
    Primary,
    Secondary(SecondaryIndex),
}

/// The derived plan for one virtual table. Immutable once built; a new
/// `TableMapping` is built if the underlying `VirtualTableDescription`
/// changes (the façade's cache keys on description identity/version).
pub struct TableMapping {
    virtual_desc: VirtualTableDescription,
    physical_desc: PhysicalTableDescription,
    primary: KeyMapping,
    secondary: HashMap<String, SecondaryMapping>,
    key_fields: Vec<KeyField>,
    codec: KeyCodec,
    tenant: String,
}

impl TableMapping {
    pub fn build(
        tenant: impl Into<String>,
        virtual_desc: VirtualTableDescription,
        physical_desc: PhysicalTableDescription,
        codec: KeyCodec,
        index_strategy: IndexMatchStrategy,
    ) -> Result<Self> {
        let tenant = tenant.into();

        if physical_desc.key_schema.hash.attr_type != AttrType::S {
            return Err(Error::IncompatibleSchema(format!(
                "physical table '{}' hash key must be type S for shared-table mode",
                physical_desc.name
            )));
        }

        let primary = KeyMapping {
            hash: FieldMapping {
                virtual_field: virtual_desc.key_schema.hash.name.clone(),
                physical_field: physical_desc.key_schema.hash.name.clone(),
                virtual_type: virtual_desc.key_schema.hash.attr_type,
                physical_type: physical_desc.key_schema.hash.attr_type,
                is_hash_key: true,
            },
            range: match (&virtual_desc.key_schema.range, &physical_desc.key_schema.range) {
                (None, _) => None,
                (Some(v), Some(p)) if v.attr_type == p.attr_type => Some(FieldMapping {
                    virtual_field: v.name.clone(),
                    physical_field: p.name.clone(),
                    virtual_type: v.attr_type,
                    physical_type: p.attr_type,
                    is_hash_key: false,
                }),
                (Some(v), _) => {
                    return Err(Error::IncompatibleSchema(format!(
                        "virtual table '{}' declares a range key '{}' with no compatible physical range key",
                        virtual_desc.name, v.name
                    )))
                }
            },
        };

        let mut secondary = HashMap::new();
        for idx in &virtual_desc.indexes {
            let physical_idx = index::resolve_index(index_strategy, idx, &physical_desc)?;
            let fields = KeyMapping {
                hash: FieldMapping {
                    virtual_field: idx.schema.hash.name.clone(),
                    physical_field: physical_idx.schema.hash.name.clone(),
                    virtual_type: idx.schema.hash.attr_type,
                    physical_type: physical_idx.schema.hash.attr_type,
                    is_hash_key: true,
                },
                range: match (&idx.schema.range, &physical_idx.schema.range) {
                    (Some(v), Some(p)) => Some(FieldMapping {
                        virtual_field: v.name.clone(),
                        physical_field: p.name.clone(),
                        virtual_type: v.attr_type,
                        physical_type: p.attr_type,
                        is_hash_key: false,
                    }),
                    _ => None,
                },
            };
            secondary.insert(
                idx.name.clone(),
                SecondaryMapping {
                    fields,
                    physical: physical_idx,
                },
            );
        }

        let mut key_fields = vec![to_key_field(&primary.hash, true)];
        if let Some(r) = &primary.range {
            key_fields.push(to_key_field(r, true));
        }
        for mapping in secondary.values() {
            key_fields.push(to_key_field(&mapping.fields.hash, false));
            if let Some(r) = &mapping.fields.range {
                key_fields.push(to_key_field(r, false));
            }
        }

        Ok(Self {
            virtual_desc,
            physical_desc,
            primary,
            secondary,
            key_fields,
            codec,
            tenant,
        })
    }

    pub fn virtual_desc(&self) -> &VirtualTableDescription {
        &self.virtual_desc
    }

    pub fn physical_desc(&self) -> &PhysicalTableDescription {
        &self.physical_desc
    }

    /// Rewrites a virtual item (or a virtual key, which is just an item
    /// restricted to key attributes) into its physical form: the hash key
    /// value becomes the tenant+table composite, the range key is renamed
    /// only, and every other attribute passes through unchanged.
    pub fn apply_for_item(&self, virtual_item: &Item) -> Result<Item> {
        let mut out = virtual_item.clone();

        let value = virtual_item.get(&self.primary.hash.virtual_field).ok_or_else(|| {
            Error::Upstream(anyhow::anyhow!(
                "item is missing hash key attribute '{}'",
                self.primary.hash.virtual_field
            ))
        })?;
        let hash_value = value.as_hash_value().ok_or_else(|| {
            Error::Upstream(anyhow::anyhow!(
                "hash key attribute '{}' is not a scalar S/N/B value",
                self.primary.hash.virtual_field
            ))
        })?;
        let encoded = self.codec.encode(&self.tenant, &self.virtual_desc.name, &hash_value);
        out.remove(&self.primary.hash.virtual_field);
        out.insert(self.primary.hash.physical_field.clone(), AttributeValue::S(encoded));

        if let Some(range) = &self.primary.range {
            if let Some(range_value) = virtual_item.get(&range.virtual_field).cloned() {
                out.remove(&range.virtual_field);
                out.insert(range.physical_field.clone(), range_value);
            }
        }

        Ok(out)
    }

    /// `applyForKey`: identical translation restricted to the key
    /// attributes; works unchanged on a partial item containing only the
    /// key.
    pub fn apply_for_key(&self, virtual_key: &Item) -> Result<Item> {
        self.apply_for_item(virtual_key)
    }

    /// Inverse of `apply_for_item`: recovers the virtual item from a
    /// physical item returned by the store.
    pub fn apply_for_item_inverse(&self, physical_item: &Item) -> Result<Item> {
        let mut out = physical_item.clone();

        let phys_value = physical_item.get(&self.primary.hash.physical_field).ok_or_else(|| {
            Error::Upstream(anyhow::anyhow!(
                "physical item is missing hash key attribute '{}'",
                self.primary.hash.physical_field
            ))
        })?;
        let phys_text = match phys_value {
            AttributeValue::S(s) => s.as_str(),
            _ => {
                return Err(Error::MalformedPhysicalKey(
                    "physical hash key attribute is not a string".to_string(),
                ))
            }
        };
        let (tenant, table, value_text) = self.codec.decode(phys_text)?;
        if tenant != self.tenant || table != self.virtual_desc.name {
            return Err(Error::MalformedPhysicalKey(format!(
                "decoded composite key ({tenant}, {table}) does not match this table mapping's (tenant, table)"
            )));
        }
        let virtual_hash_value =
            HashValue::from_canonical_text(self.primary.hash.virtual_type, &value_text)?;
        out.remove(&self.primary.hash.physical_field);
        out.insert(
            self.primary.hash.virtual_field.clone(),
            attribute_value_from_hash_value(virtual_hash_value),
        );

        if let Some(range) = &self.primary.range {
            if let Some(range_value) = physical_item.get(&range.physical_field).cloned() {
                out.remove(&range.physical_field);
                out.insert(range.virtual_field.clone(), range_value);
            }
        }

        Ok(out)
    }

    pub fn apply_for_key_inverse(&self, physical_key: &Item) -> Result<Item> {
        self.apply_for_item_inverse(physical_key)
    }

    /// Composes the physical hash-key value for `virtual_hash_value`
    /// directly, without a full item — used by `Query`/`GetItem` key
    /// construction and by the scan-as-prefix-query optimization.
    pub fn encode_hash_value(&self, virtual_hash_value: &HashValue) -> String {
        self.codec.encode(&self.tenant, &self.virtual_desc.name, virtual_hash_value)
    }

    pub fn tenant_table_prefix(&self) -> String {
        self.codec.encode(&self.tenant, &self.virtual_desc.name, &HashValue::S(String::new()))
    }

    /// `rewriteExpression(text, names, values, role) -> (text', names', values')`.
    pub fn rewrite_expression(
        &self,
        text: &str,
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
        role: Role,
    ) -> Result<(String, HashMap<String, String>, HashMap<String, AttributeValue>)> {
        let output = expr::rewrite_expression(expr::RewriteInput {
            role,
            text,
            names,
            values,
            fields: &self.key_fields,
            codec: &self.codec,
            tenant: &self.tenant,
            virtual_table: &self.virtual_desc.name,
        })?;
        Ok((output.text, output.names, output.values))
    }

    pub fn key_fields(&self) -> &[KeyField] {
        &self.key_fields
    }

    /// `resolveIndex(virtualIndexName) -> physicalIndex | primary`.
    pub fn resolve_index(&self, virtual_index_name: Option<&str>) -> Result<ResolvedIndex> {
        match virtual_index_name {
            None => Ok(ResolvedIndex::Primary),
            Some(name) => {
                let mapping = self
                    .secondary
                    .get(name)
                    .ok_or_else(|| Error::NoCompatibleIndex(name.to_string()))?;
                Ok(ResolvedIndex::Secondary(mapping.physical.clone()))
            }
        }
    }
}

fn to_key_field(field: &FieldMapping, is_primary_key: bool) -> KeyField {
    KeyField {
        virtual_name: field.virtual_field.clone(),
        physical_name: field.physical_field.clone(),
        virtual_type: field.virtual_type,
        is_hash_key: field.is_hash_key,
        is_primary_key,
    }
}

fn attribute_value_from_hash_value(value: HashValue) -> AttributeValue {
    match value {
        HashValue::S(s) => AttributeValue::S(s),
        HashValue::N(n) => AttributeValue::N(n),
        HashValue::B(b) => AttributeValue::B(b),
    }
}
