use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("{collection}/{id} was modified concurrently")]
    VersionConflict { collection: String, id: String },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn version_conflict(collection: &str, id: &str) -> Self {
        StoreError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::VersionConflict { .. } | StoreError::AlreadyExists { .. } => {
                AppError::Conflict(err.to_string())
            }
            StoreError::InvalidDocument(msg) => AppError::BadRequest(msg),
            StoreError::Auth(msg) => AppError::ExternalService(format!("Storage rejected credentials: {}", msg)),
            StoreError::Backend(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Equality predicate, `where field == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.filters
            .iter()
            .all(|filter| document.get(&filter.field).unwrap_or(&Value::Null) == &filter.value)
    }
}

/// Collection-scoped CRUD over flat JSON documents. Every document carries a
/// string `id`; conditional updates compare against its integer `version`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    /// Merges `patch` into the stored document. With `expected_version` the
    /// write is applied only when the stored `version` still matches.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> Result<Value, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

pub(crate) fn document_id(document: &Value) -> Result<String, StoreError> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidDocument("document has no string id".to_string()))
}

/// Total order used for in-memory sorting: null < bool < number < string.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
