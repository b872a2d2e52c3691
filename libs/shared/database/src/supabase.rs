use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::store::{document_id, DocumentStore, Query, SortDirection, StoreError};

/// PostgREST client for a Supabase project. Collections map to tables under
/// `/rest/v1/`.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_token: None,
        }
    }

    /// Sends `token` as the bearer on every request instead of the anon key.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = Some(token.into());
        self
    }

    fn get_headers(&self, extra: Option<HeaderMap>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let api_key = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| StoreError::Auth("Supabase key is not a valid header value".to_string()))?;
        headers.insert("apikey", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = self.service_token.as_deref().unwrap_or(&self.anon_key);
        if !bearer.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|_| StoreError::Auth("Bearer token is not a valid header value".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(extra) = extra {
            headers.extend(extra);
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers(headers)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Auth(error_text),
                _ => StoreError::Backend(format!("API error ({}): {}", status, error_text)),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to decode response: {}", e)))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn collection_path(collection: &str) -> String {
        format!("/rest/v1/{}", collection)
    }
}

/// PostgREST operand for an equality filter.
fn eq_operand(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", urlencoding::encode(s)),
        other => format!("eq.{}", urlencoding::encode(&other.to_string())),
    }
}

pub(crate) fn query_string(query: &Query) -> String {
    let mut parts: Vec<String> = query
        .filters
        .iter()
        .map(|filter| format!("{}={}", filter.field, eq_operand(&filter.value)))
        .collect();

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        parts.push(format!("order={}.{}", field, direction));
    }

    if let Some(limit) = query.limit {
        parts.push(format!("limit={}", limit));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

#[async_trait]
impl DocumentStore for SupabaseClient {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let path = format!(
            "{}?id=eq.{}&limit=1",
            Self::collection_path(collection),
            urlencoding::encode(id)
        );
        let result: Vec<Value> = self.request(Method::GET, &path, None).await?;
        Ok(result.into_iter().next())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let path = format!("{}{}", Self::collection_path(collection), query_string(query));
        self.request(Method::GET, &path, None).await
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let id = document_id(&document)?;
        let result: Vec<Value> = self
            .request_with_headers(
                Method::POST,
                &Self::collection_path(collection),
                Some(document),
                Some(Self::representation_headers()),
            )
            .await?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend(format!("Insert of {}/{} returned no rows", collection, id)))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> Result<Value, StoreError> {
        let mut path = format!(
            "{}?id=eq.{}",
            Self::collection_path(collection),
            urlencoding::encode(id)
        );
        if let Some(version) = expected_version {
            path.push_str(&format!("&version=eq.{}", version));
        }

        let result: Vec<Value> = self
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(patch),
                Some(Self::representation_headers()),
            )
            .await?;

        if let Some(updated) = result.into_iter().next() {
            return Ok(updated);
        }

        // Zero rows: either the record is gone or the version moved on.
        match (expected_version, self.get(collection, id).await?) {
            (Some(_), Some(_)) => Err(StoreError::version_conflict(collection, id)),
            _ => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = format!(
            "{}?id=eq.{}",
            Self::collection_path(collection),
            urlencoding::encode(id)
        );
        let result: Vec<Value> = self
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                Some(Self::representation_headers()),
            )
            .await?;

        if result.is_empty() {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }
}
