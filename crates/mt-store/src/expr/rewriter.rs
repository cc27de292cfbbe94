//! The rewriting pass itself (§4.E): walks a parsed expression, finds
//! identifier uses in operand position that name a mapped key attribute,
//! and substitutes the physical field name and (for the hash key) the
//! composite key value. Everything else is left untouched.

use super::ast::*;
use crate::codec::KeyCodec;
use crate::error::{Error, Result};
use crate::metadata::AttrType;
use crate::value::AttributeValue;
use std::collections::HashMap;

/// One key attribute a table mapping cares about when rewriting
/// expressions: a virtual field name paired with its physical name and
/// whether it is a hash key (primary or secondary-index).
#[derive(Debug, Clone)]
pub struct KeyField {
    pub virtual_name: String,
    pub physical_name: String,
    pub virtual_type: AttrType,
    pub is_hash_key: bool,
    /// True only for the primary table's hash/range key fields; false for
    /// secondary-index key fields. Updates targeting a secondary index's
    /// hash key are unsupported (§1 Non-goals) and rejected.
    pub is_primary_key: bool,
}

pub struct RewriteCtx<'a> {
    pub fields: &'a [KeyField],
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
    pub codec: &'a KeyCodec,
    pub tenant: &'a str,
    pub virtual_table: &'a str,
    name_placeholder_cache: HashMap<String, String>,
    value_placeholder_cache: HashMap<String, String>,
    next_id: u64,
}

impl<'a> RewriteCtx<'a> {
    pub fn new(
        fields: &'a [KeyField],
        names: HashMap<String, String>,
        values: HashMap<String, AttributeValue>,
        codec: &'a KeyCodec,
        tenant: &'a str,
        virtual_table: &'a str,
    ) -> Self {
        Self {
            fields,
            names,
            values,
            codec,
            tenant,
            virtual_table,
            name_placeholder_cache: HashMap::new(),
            value_placeholder_cache: HashMap::new(),
            next_id: 0,
        }
    }

    fn resolve(&self, path: &Path) -> Option<String> {
        if path.root_is_placeholder {
            self.names.get(&format!("#{}", path.root_text)).cloned()
        } else {
            Some(path.root_text.clone())
        }
    }

    fn field_for(&self, resolved_name: &str) -> Option<&KeyField> {
        self.fields.iter().find(|f| f.virtual_name == resolved_name)
    }

    /// Mints a fresh `#name` placeholder bound to `physical_name` in the
    /// output names map. The map key carries the `#` sigil (matching the
    /// convention every caller's `expression_attribute_names` uses), while
    /// the returned string is the bare name the rendered path stores as
    /// `root_text` (rendering re-adds the sigil).
    fn fresh_name_placeholder(&mut self, physical_name: &str) -> String {
        if let Some(cached) = self.name_placeholder_cache.get(physical_name) {
            return cached.clone();
        }
        loop {
            let candidate = format!("__mtphys_n{}", self.next_id);
            self.next_id += 1;
            let key = format!("#{candidate}");
            if !self.names.contains_key(&key) {
                self.names.insert(key, physical_name.to_string());
                self.name_placeholder_cache
                    .insert(physical_name.to_string(), candidate.clone());
                return candidate;
            }
        }
    }

    /// Mints a fresh `:val` placeholder bound to `encoded` in the output
    /// values map, with the same `:`-sigil convention as above.
    fn fresh_value_placeholder(&mut self, original: &str, encoded: AttributeValue) -> String {
        if let Some(cached) = self.value_placeholder_cache.get(original) {
            return cached.clone();
        }
        loop {
            let candidate = format!("__mtphys_v{}", self.next_id);
            self.next_id += 1;
            let key = format!(":{candidate}");
            if !self.values.contains_key(&key) {
                self.values.insert(key, encoded);
                self.value_placeholder_cache
                    .insert(original.to_string(), candidate.clone());
                return candidate;
            }
        }
    }

    /// Rewrites a path's root if it names a mapped key field, returning
    /// the (possibly substituted) path and the matched field, if any.
    fn rewrite_path(&mut self, path: &Path) -> (Path, Option<KeyField>) {
        let Some(resolved) = self.resolve(path) else {
            return (path.clone(), None);
        };
        let Some(field) = self.field_for(&resolved).cloned() else {
            return (path.clone(), None);
        };
        let placeholder = self.fresh_name_placeholder(&field.physical_name);
        let mut rewritten = path.clone();
        rewritten.root_is_placeholder = true;
        rewritten.root_text = placeholder;
        (rewritten, Some(field))
    }

    fn rewrite_value_operand(&mut self, node: Node) -> Node {
        match node {
            Node::ValuePlaceholder(v) => {
                let Some(original) = self.values.get(&format!(":{v}")).cloned() else {
                    return Node::ValuePlaceholder(v);
                };
                let Some(hash_value) = original.as_hash_value() else {
                    return Node::ValuePlaceholder(v);
                };
                let encoded = self.codec.encode(self.tenant, self.virtual_table, &hash_value);
                let placeholder = self.fresh_value_placeholder(&v, AttributeValue::S(encoded));
                Node::ValuePlaceholder(placeholder)
            }
            Node::StrLiteral(s) => {
                let encoded = self.codec.encode(
                    self.tenant,
                    self.virtual_table,
                    &crate::codec::HashValue::S(s),
                );
                Node::StrLiteral(encoded)
            }
            Node::NumLiteral(n) => {
                let encoded = self.codec.encode(
                    self.tenant,
                    self.virtual_table,
                    &crate::codec::HashValue::N(n),
                );
                Node::StrLiteral(encoded)
            }
            other => other,
        }
    }

    fn rewrite_node(&mut self, node: &Node) -> Node {
        match node {
            Node::And(l, r) => Node::And(
                Box::new(self.rewrite_node(l)),
                Box::new(self.rewrite_node(r)),
            ),
            Node::Or(l, r) => Node::Or(
                Box::new(self.rewrite_node(l)),
                Box::new(self.rewrite_node(r)),
            ),
            Node::Not(inner) => Node::Not(Box::new(self.rewrite_node(inner))),
            Node::Compare(l, op, r) => self.rewrite_compare(l, *op, r),
            Node::Arith(l, op, r) => Node::Arith(
                Box::new(self.rewrite_node(l)),
                *op,
                Box::new(self.rewrite_node(r)),
            ),
            Node::FuncCall(func, args) => self.rewrite_func_call(*func, args),
            Node::Path(p) => {
                let (new_path, _) = self.rewrite_path(p);
                Node::Path(new_path)
            }
            leaf => leaf.clone(),
        }
    }

    fn rewrite_operand_side(&mut self, node: &Node) -> (Node, Option<KeyField>) {
        if let Node::Path(p) = node {
            let (new_path, field) = self.rewrite_path(p);
            (Node::Path(new_path), field)
        } else {
            (self.rewrite_node(node), None)
        }
    }

    fn rewrite_compare(&mut self, l: &Node, op: CompareOp, r: &Node) -> Node {
        let (new_l, field_l) = self.rewrite_operand_side(l);
        let (new_r, field_r) = self.rewrite_operand_side(r);

        let final_l = if field_r.as_ref().is_some_and(|f| f.is_hash_key) {
            self.rewrite_value_operand(new_l)
        } else {
            new_l
        };
        let final_r = if field_l.as_ref().is_some_and(|f| f.is_hash_key) {
            self.rewrite_value_operand(new_r)
        } else {
            new_r
        };

        Node::Compare(Box::new(final_l), op, Box::new(final_r))
    }

    fn rewrite_func_call(&mut self, func: Function, args: &[Node]) -> Node {
        match (func, args) {
            (Function::AttributeExists, [Node::Path(p)])
            | (Function::AttributeNotExists, [Node::Path(p)]) => {
                let (new_path, field) = self.rewrite_path(p);
                if field.as_ref().is_some_and(|f| f.is_hash_key) {
                    Node::BoolLiteral(func == Function::AttributeExists)
                } else {
                    Node::FuncCall(func, vec![Node::Path(new_path)])
                }
            }
            (Function::BeginsWith, [lhs, rhs]) | (Function::Contains, [lhs, rhs]) => {
                let (new_l, field_l) = self.rewrite_operand_side(lhs);
                let new_r = self.rewrite_node(rhs);
                let new_r = if field_l.as_ref().is_some_and(|f| f.is_hash_key) {
                    self.rewrite_value_operand(new_r)
                } else {
                    new_r
                };
                Node::FuncCall(func, vec![new_l, new_r])
            }
            _ => Node::FuncCall(func, args.iter().map(|a| self.rewrite_node(a)).collect()),
        }
    }

    pub fn rewrite_bool(&mut self, node: &Node) -> Node {
        self.rewrite_node(node)
    }

    pub fn rewrite_projection(&mut self, paths: &[Path]) -> Vec<Path> {
        paths.iter().map(|p| self.rewrite_path(p).0).collect()
    }

    pub fn rewrite_update(&mut self, update: &UpdateExpr) -> Result<UpdateExpr> {
        let mut out = UpdateExpr::default();
        for action in &update.actions {
            out.actions.push(match action {
                UpdateAction::Set(path, value) => {
                    let (new_path, field) = self.rewrite_path(path);
                    self.reject_secondary_index_hash_key(&field)?;
                    let new_value = self.rewrite_node(value);
                    let new_value = if field.as_ref().is_some_and(|f| f.is_hash_key) {
                        self.rewrite_value_operand(new_value)
                    } else {
                        new_value
                    };
                    UpdateAction::Set(new_path, new_value)
                }
                UpdateAction::Remove(path) => {
                    let (new_path, field) = self.rewrite_path(path);
                    self.reject_secondary_index_hash_key(&field)?;
                    UpdateAction::Remove(new_path)
                }
                UpdateAction::Add(path, value) => {
                    let (new_path, field) = self.rewrite_path(path);
                    self.reject_secondary_index_hash_key(&field)?;
                    let new_value = self.rewrite_node(value);
                    UpdateAction::Add(new_path, new_value)
                }
                UpdateAction::Delete(path, value) => {
                    let (new_path, field) = self.rewrite_path(path);
                    self.reject_secondary_index_hash_key(&field)?;
                    let new_value = self.rewrite_node(value);
                    UpdateAction::Delete(new_path, new_value)
                }
            });
        }
        Ok(out)
    }

    fn reject_secondary_index_hash_key(&self, field: &Option<KeyField>) -> Result<()> {
        if let Some(f) = field {
            if f.is_hash_key && !f.is_primary_key {
                return Err(Error::UnsupportedOperation(format!(
                    "cannot update secondary-index hash key '{}'",
                    f.virtual_name
                )));
            }
        }
        Ok(())
    }

    pub fn into_parts(self) -> (HashMap<String, String>, HashMap<String, AttributeValue>) {
        (self.names, self.values)
    }
}

/// Validates that a key-condition expression matches the restricted shape
/// allowed by §4.G's `Query` row: `EQ` on the hash key, optionally
/// conjoined with `GT`, `EQ`, or `BEGINS_WITH` on the range key.
pub fn validate_key_condition(
    node: &Node,
    fields: &[KeyField],
    names: &HashMap<String, String>,
) -> Result<()> {
    let resolve = |p: &Path| -> Option<String> {
        if p.root_is_placeholder {
            names.get(&format!("#{}", p.root_text)).cloned()
        } else {
            Some(p.root_text.clone())
        }
    };
    let find = |name: &str| fields.iter().find(|f| f.virtual_name == name);

    let is_hash_eq = |node: &Node| -> bool {
        matches!(node, Node::Compare(l, CompareOp::Eq, _)
            if matches!(l.as_ref(), Node::Path(p)
                if resolve(p).and_then(|n| find(&n)).is_some_and(|f| f.is_hash_key && f.is_primary_key)))
    };
    let is_range_clause = |node: &Node| -> bool {
        match node {
            Node::Compare(l, op, _) => {
                matches!(op, CompareOp::Eq | CompareOp::Gt)
                    && matches!(l.as_ref(), Node::Path(p)
                        if resolve(p).and_then(|n| find(&n)).is_some_and(|f| !f.is_hash_key && f.is_primary_key))
            }
            Node::FuncCall(Function::BeginsWith, args) => matches!(args.first(), Some(Node::Path(p))
                if resolve(p).and_then(|n| find(&n)).is_some_and(|f| !f.is_hash_key && f.is_primary_key)),
            _ => false,
        }
    };

    let ok = match node {
        Node::Compare(..) => is_hash_eq(node),
        Node::And(l, r) => {
            (is_hash_eq(l) && is_range_clause(r)) || (is_hash_eq(r) && is_range_clause(l))
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(Error::UnsupportedPredicate(
            "key conditions must be EQ on the hash key, optionally ANDed with GT, EQ, or begins_with on the range key".to_string(),
        ))
    }
}
