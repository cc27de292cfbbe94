//! Component D: the secondary-index mapper.
//!
//! Given a virtual secondary index and a physical table description,
//! picks the physical index that will carry it. Two pluggable strategies
//! are defined in §4.D: match by name (requiring compatible key shape) or
//! match by type shape alone.

use crate::error::{Error, Result};
use crate::metadata::{AttrType, PhysicalTableDescription, SecondaryIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMatchStrategy {
    ByName,
    ByType,
}

/// Resolve `virtual_index` against `physical` using `strategy`. Since the
/// index's hash key is always rewritten through the same codec as the
/// primary hash key, a physical index is only a candidate if its hash
/// attribute type is `S` (the type the codec always produces); range
/// types must match the virtual index's range type exactly, or both must
/// be absent.
pub fn resolve_index(
    strategy: IndexMatchStrategy,
    virtual_index: &SecondaryIndex,
    physical: &PhysicalTableDescription,
) -> Result<SecondaryIndex> {
    match strategy {
        IndexMatchStrategy::ByName => {
            let candidate = physical
                .indexes
                .iter()
                .find(|p| p.name == virtual_index.name)
                .ok_or_else(|| Error::NoCompatibleIndex(virtual_index.name.clone()))?;

            if compatible_after_rewrite(virtual_index, candidate) {
                Ok(candidate.clone())
            } else {
                Err(Error::NoCompatibleIndex(virtual_index.name.clone()))
            }
        }
        IndexMatchStrategy::ByType => {
            let mut candidates: Vec<&SecondaryIndex> = physical
                .indexes
                .iter()
                .filter(|p| compatible_after_rewrite(virtual_index, p))
                .collect();

            // Prefer hash-only physical indexes for hash-only virtual indexes.
            if virtual_index.schema.range.is_none() {
                candidates.sort_by_key(|p| p.schema.range.is_some());
            }

            candidates
                .into_iter()
                .next()
                .cloned()
                .ok_or_else(|| Error::NoCompatibleIndex(virtual_index.name.clone()))
        }
    }
}

fn compatible_after_rewrite(virtual_index: &SecondaryIndex, physical: &SecondaryIndex) -> bool {
    if physical.schema.hash.attr_type != AttrType::S {
        return false;
    }
    match (&virtual_index.schema.range, &physical.schema.range) {
        (None, None) => true,
        (Some(v), Some(p)) => v.attr_type == p.attr_type,
        _ => false,
    }
}
