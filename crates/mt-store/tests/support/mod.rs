//! In-memory fakes for the external collaborators (§1), used by the
//! scenario tests instead of any real NSQL backend (SPEC_FULL §A4).

use async_trait::async_trait;
use mt_store::metadata::{PhysicalTableDescription, TableMetadataStore, VirtualTableDescription};
use mt_store::store::{
    DeleteItemRequest, PutItemRequest, QueryRequest, QueryResponse, ScanRequest, ScanResponse,
    StoreClient, UpdateItemRequest,
};
use mt_store::value::{AttributeValue, Item};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<HashMap<(String, String), VirtualTableDescription>>,
}

#[async_trait]
impl TableMetadataStore for InMemoryMetadataStore {
    async fn get(&self, tenant: &str, virtual_name: &str) -> anyhow::Result<Option<VirtualTableDescription>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&(tenant.to_string(), virtual_name.to_string()))
            .cloned())
    }

    async fn put(&self, tenant: &str, desc: VirtualTableDescription) -> anyhow::Result<()> {
        self.tables
            .lock()
            .unwrap()
            .insert((tenant.to_string(), desc.name.clone()), desc);
        Ok(())
    }

    async fn delete(&self, tenant: &str, virtual_name: &str) -> anyhow::Result<()> {
        self.tables
            .lock()
            .unwrap()
            .remove(&(tenant.to_string(), virtual_name.to_string()));
        Ok(())
    }
}

struct PhysicalTable {
    desc: PhysicalTableDescription,
    rows: HashMap<String, Item>,
}

/// A fake physical store keyed by `(tableName, hashKeyAttributeValue ++
/// rangeKeyAttributeValue)`. Conditions are evaluated with a tiny literal
/// interpreter: only `"true"`, `"false"`, and rendered
/// `#name = :value`/`attribute_exists(#name)` style expressions the
/// rewriter actually produces are supported, which is all the facades
/// ever send it.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, PhysicalTable>>,
}

fn row_key(desc: &PhysicalTableDescription, item: &Item) -> Option<String> {
    let hash = item.get(&desc.key_schema.hash.name)?;
    let mut key = format!("{hash:?}");
    if let Some(range) = &desc.key_schema.range {
        let range_value = item.get(&range.name)?;
        key.push('\u{0}');
        key.push_str(&format!("{range_value:?}"));
    }
    Some(key)
}

fn eval_condition(condition: &str, item: Option<&Item>, names: &HashMap<String, String>, values: &HashMap<String, AttributeValue>) -> bool {
    let condition = condition.trim();
    if condition == "true" {
        return true;
    }
    if condition == "false" {
        return false;
    }
    if let Some(inner) = condition.strip_prefix("attribute_exists(").and_then(|s| s.strip_suffix(')')) {
        let field = names.get(inner).map(String::as_str).unwrap_or(inner);
        return item.map(|i| i.contains_key(field)).unwrap_or(false);
    }
    if let Some(inner) = condition.strip_prefix("attribute_not_exists(").and_then(|s| s.strip_suffix(')')) {
        let field = names.get(inner).map(String::as_str).unwrap_or(inner);
        return !item.map(|i| i.contains_key(field)).unwrap_or(false);
    }
    if let Some((lhs, rhs)) = condition.split_once(" = ") {
        let field = names.get(lhs.trim()).map(String::as_str).unwrap_or(lhs.trim());
        let expected = values.get(rhs.trim());
        return item
            .and_then(|i| i.get(field))
            .zip(expected)
            .map(|(a, b)| a == b)
            .unwrap_or(false);
    }
    false
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn create_table(&self, desc: &PhysicalTableDescription) -> anyhow::Result<()> {
        self.tables.lock().unwrap().entry(desc.name.clone()).or_insert_with(|| PhysicalTable {
            desc: desc.clone(),
            rows: HashMap::new(),
        });
        Ok(())
    }

    async fn describe_table(&self, table_name: &str) -> anyhow::Result<Option<PhysicalTableDescription>> {
        Ok(self.tables.lock().unwrap().get(table_name).map(|t| t.desc.clone()))
    }

    async fn delete_table(&self, table_name: &str) -> anyhow::Result<()> {
        self.tables.lock().unwrap().remove(table_name);
        Ok(())
    }

    async fn get_item(&self, table_name: &str, key: &Item) -> anyhow::Result<Option<Item>> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(table_name).ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let row_key = row_key(&table.desc, key).ok_or_else(|| anyhow::anyhow!("key missing hash/range attribute"))?;
        Ok(table.rows.get(&row_key).cloned())
    }

    async fn put_item(&self, request: PutItemRequest) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let row_key = row_key(&table.desc, &request.item).ok_or_else(|| anyhow::anyhow!("item missing hash/range attribute"))?;
        if let Some(condition) = &request.condition_expression {
            let existing = table.rows.get(&row_key);
            if !eval_condition(condition, existing, &request.expression_attribute_names, &request.expression_attribute_values) {
                return Err(mt_store::error::ConditionalCheckFailedMarker.into());
            }
        }
        table.rows.insert(row_key, request.item);
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> anyhow::Result<Item> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let row_key = row_key(&table.desc, &request.key).ok_or_else(|| anyhow::anyhow!("key missing hash/range attribute"))?;
        let existing = table.rows.get(&row_key).cloned();
        if let Some(condition) = &request.condition_expression {
            if !eval_condition(condition, existing.as_ref(), &request.expression_attribute_names, &request.expression_attribute_values) {
                return Err(mt_store::error::ConditionalCheckFailedMarker.into());
            }
        }
        let mut item = existing.unwrap_or_else(|| request.key.clone());
        // A minimal SET-only interpreter: enough for the scenarios this
        // fake backs, not a general update-expression evaluator.
        if let Some(rest) = request.update_expression.strip_prefix("SET ") {
            for assignment in rest.split(',') {
                if let Some((lhs, rhs)) = assignment.split_once('=') {
                    let field = request
                        .expression_attribute_names
                        .get(lhs.trim())
                        .cloned()
                        .unwrap_or_else(|| lhs.trim().to_string());
                    if let Some(value) = request.expression_attribute_values.get(rhs.trim()) {
                        item.insert(field, value.clone());
                    }
                }
            }
        }
        table.rows.insert(row_key, item.clone());
        Ok(item)
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let row_key = row_key(&table.desc, &request.key).ok_or_else(|| anyhow::anyhow!("key missing hash/range attribute"))?;
        if let Some(condition) = &request.condition_expression {
            let existing = table.rows.get(&row_key);
            if !eval_condition(condition, existing, &request.expression_attribute_names, &request.expression_attribute_values) {
                return Err(mt_store::error::ConditionalCheckFailedMarker.into());
            }
        }
        table.rows.remove(&row_key);
        Ok(())
    }

    async fn batch_get_item(&self, table_name: &str, keys: &[Item]) -> anyhow::Result<(Vec<Item>, Vec<Item>)> {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys {
            match self.get_item(table_name, key).await? {
                Some(item) => found.push(item),
                None => missing.push(key.clone()),
            }
        }
        Ok((found, missing))
    }

    async fn query(&self, request: QueryRequest) -> anyhow::Result<QueryResponse> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&request.table_name).ok_or_else(|| anyhow::anyhow!("no such physical table"))?;

        let hash_name = &table.desc.key_schema.hash.name;
        let items: Vec<Item> = table
            .rows
            .values()
            .filter(|item| {
                evaluate_key_condition(
                    &request.key_condition_expression,
                    item,
                    hash_name,
                    &request.expression_attribute_names,
                    &request.expression_attribute_values,
                )
            })
            .filter(|item| match &request.filter_expression {
                Some(expr) => eval_condition(expr, Some(item), &request.expression_attribute_names, &request.expression_attribute_values),
                None => true,
            })
            .cloned()
            .collect();
        Ok(QueryResponse {
            items,
            last_evaluated_key: None,
        })
    }

    async fn scan(&self, request: ScanRequest) -> anyhow::Result<ScanResponse> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&request.table_name).ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let items: Vec<Item> = table
            .rows
            .values()
            .filter(|item| match &request.filter_expression {
                Some(expr) => eval_condition(expr, Some(item), &request.expression_attribute_names, &request.expression_attribute_values),
                None => true,
            })
            .cloned()
            .collect();
        Ok(ScanResponse {
            items,
            last_evaluated_key: None,
        })
    }

    async fn delete_rows_with_hash_prefix(&self, table_name: &str, hash_key_prefix: &str) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(table_name).ok_or_else(|| anyhow::anyhow!("no such physical table"))?;
        let hash_name = table.desc.key_schema.hash.name.clone();
        table.rows.retain(|_, item| {
            !matches!(item.get(&hash_name), Some(AttributeValue::S(s)) if s.starts_with(hash_key_prefix))
        });
        Ok(())
    }
}

/// Evaluates the narrow key-condition shapes the rewriter ever renders:
/// `begins_with(#hkn, :hk)` (the scan-as-prefix-query path) or
/// `#hash = :hash` optionally ANDed with a range comparison.
fn evaluate_key_condition(
    expr: &str,
    item: &Item,
    hash_name: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> bool {
    if let Some(inner) = expr.strip_prefix("begins_with(").and_then(|s| s.strip_suffix(')')) {
        let mut parts = inner.splitn(2, ", ");
        let field_placeholder = parts.next().unwrap_or_default();
        let value_placeholder = parts.next().unwrap_or_default();
        let field = names.get(field_placeholder).map(String::as_str).unwrap_or(hash_name);
        let prefix = match values.get(value_placeholder) {
            Some(AttributeValue::S(s)) => s.clone(),
            _ => return false,
        };
        return matches!(item.get(field), Some(AttributeValue::S(s)) if s.starts_with(&prefix));
    }

    expr.split(" AND ").all(|clause| {
        let clause = clause.trim();
        if let Some(inner) = clause.strip_prefix("begins_with(").and_then(|s| s.strip_suffix(')')) {
            let mut parts = inner.splitn(2, ", ");
            let field_placeholder = parts.next().unwrap_or_default();
            let value_placeholder = parts.next().unwrap_or_default();
            let field = names.get(field_placeholder).map(String::as_str).unwrap_or(field_placeholder);
            let prefix = match values.get(value_placeholder) {
                Some(AttributeValue::S(s)) => s.clone(),
                _ => return false,
            };
            return matches!(item.get(field), Some(AttributeValue::S(s)) if s.starts_with(&prefix));
        }
        if let Some((lhs, rhs)) = clause.split_once(" = ") {
            let field = names.get(lhs.trim()).map(String::as_str).unwrap_or(lhs.trim());
            let expected = values.get(rhs.trim());
            return item.get(field).zip(expected).map(|(a, b)| a == b).unwrap_or(false);
        }
        if let Some((lhs, rhs)) = clause.split_once(" > ") {
            let field = names.get(lhs.trim()).map(String::as_str).unwrap_or(lhs.trim());
            return match (item.get(field), values.get(rhs.trim())) {
                (Some(AttributeValue::S(a)), Some(AttributeValue::S(b))) => a > b,
                (Some(AttributeValue::N(a)), Some(AttributeValue::N(b))) => {
                    a.parse::<f64>().unwrap_or(0.0) > b.parse::<f64>().unwrap_or(0.0)
                }
                _ => false,
            };
        }
        false
    })
}
