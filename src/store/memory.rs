//! In-memory [`DocumentStore`] backend.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{DocumentStore, FilterOp, QueryFilter, WriteOp};

/// Process-local document store. Paths are flat strings; collection
/// membership is derived from path prefixes, mirroring how the remote
/// backend lays out `collection/id` pairs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<String, Value>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Deep-merge `patch` into `slot`. Objects combine key-wise; any other
/// pairing replaces the slot wholesale.
fn deep_merge(slot: &mut Value, patch: Value) {
    match patch {
        Value::Object(patch_map) if slot.is_object() => {
            let Some(slot_map) = slot.as_object_mut() else {
                return;
            };
            for (key, patch_value) in patch_map {
                match slot_map.get_mut(&key) {
                    Some(nested) => deep_merge(nested, patch_value),
                    None => {
                        slot_map.insert(key, patch_value);
                    }
                }
            }
        }
        other => *slot = other,
    }
}

fn matches_filters(doc: &Value, filters: &[QueryFilter]) -> bool {
    filters.iter().all(|filter| match filter.op {
        FilterOp::Eq => doc.get(&filter.field) == Some(&filter.value),
    })
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.documents.get(path).map(|doc| doc.clone()))
    }

    async fn set_document(&self, path: &str, data: Value, merge: bool) -> Result<()> {
        if merge {
            let mut entry = self
                .documents
                .entry(path.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            deep_merge(entry.value_mut(), data);
        } else {
            self.documents.insert(path.to_string(), data);
        }
        Ok(())
    }

    async fn update_document(
        &self,
        path: &str,
        data: Value,
        update_mask: Option<&[String]>,
    ) -> Result<()> {
        let Some(mut entry) = self.documents.get_mut(path) else {
            anyhow::bail!("document not found: {path}");
        };

        match update_mask {
            Some(mask) => {
                if let Value::Object(source_map) = data {
                    for field in mask {
                        if let Some(value) = source_map.get(field) {
                            if let Value::Object(target_map) = entry.value_mut() {
                                target_map.insert(field.clone(), value.clone());
                            }
                        }
                    }
                }
            }
            None => deep_merge(entry.value_mut(), data),
        }
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<()> {
        self.documents.remove(path);
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<Vec<(String, Value)>> {
        let prefix = format!("{collection}/");
        let mut results = Vec::new();
        for entry in &self.documents {
            let Some(id) = entry.key().strip_prefix(&prefix) else {
                continue;
            };
            // Direct children only; nested subcollections are not returned.
            if id.contains('/') {
                continue;
            }
            if matches_filters(entry.value(), filters) {
                results.push((id.to_string(), entry.value().clone()));
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        for op in ops {
            match op {
                WriteOp::Set { path, data, merge } => {
                    self.set_document(&path, data, merge).await?;
                }
                WriteOp::Delete { path } => {
                    self.delete_document(&path).await?;
                }
            }
        }
        Ok(())
    }
}
