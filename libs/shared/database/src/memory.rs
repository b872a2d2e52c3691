use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{compare_values, document_id, DocumentStore, Query, SortDirection, StoreError};

/// Process-local document store. Collections keep insertion order so that
/// sorted reads break ties the same way every time.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|documents| {
            documents
                .iter()
                .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        debug!("In-memory query on {}: {:?}", collection, query);

        let collections = self.collections.read().await;
        let mut results: Vec<Value> = collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|doc| query.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            // sort_by is stable, ties keep insertion order
            results.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let id = document_id(&document)?;
        if !document.is_object() {
            return Err(StoreError::InvalidDocument("document must be an object".to_string()));
        }

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents
            .iter()
            .any(|doc| doc.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }

        documents.push(document.clone());
        Ok(document)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> Result<Value, StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidDocument("patch must be an object".to_string()));
        };

        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| {
                documents
                    .iter_mut()
                    .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if let Some(expected) = expected_version {
            let current = document.get("version").and_then(Value::as_i64).unwrap_or(0);
            if current != expected {
                return Err(StoreError::version_conflict(collection, id));
            }
        }

        if let Value::Object(fields) = document {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }

        Ok(document.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let documents = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        let position = documents
            .iter()
            .position(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        documents.remove(position);
        Ok(())
    }
}
