//! Document Store clients
//!
//! The dashboard only reads the document table, appends to it after an
//! upload and deletes rows. Two implementations:
//! - [`RestDocumentStore`] for a PostgREST endpoint
//! - [`MemoryDocumentStore`] for offline use and tests

use crate::config::StoreConfig;
use crate::errors::{AppError, Result};
use crate::metrics::RequestMetrics;
use crate::models::{Document, NewDocument};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Trait for document metadata storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents, newest first
    async fn list(&self) -> Result<Vec<Document>>;

    /// Create a document record
    async fn insert(&self, document: NewDocument) -> Result<Document>;

    /// Remove a document record
    async fn delete(&self, id: &str) -> Result<()>;
}

/// PostgREST-backed document table
pub struct RestDocumentStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
    access_token: Option<String>,
}

impl RestDocumentStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            access_token: None,
        })
    }

    /// Create a client from configuration; `None` when no store URL is set
    pub fn from_config(config: &StoreConfig, timeout: Duration) -> Result<Option<Self>> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "store.api_key is required when store.url is set".to_string(),
        })?;

        Self::new(url, api_key, &config.table, timeout).map(Some)
    }

    /// Act on behalf of a signed-in user
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    async fn send(&self, operation: &'static str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let metrics = RequestMetrics::start("store", operation);
        let result = self.authorized(request).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics.finish(false);
                return Err(AppError::HttpClient(e));
            }
        };

        if response.status().is_success() {
            metrics.finish(true);
            return Ok(response);
        }

        metrics.finish(false);
        let status = response.status();
        let body: Option<Value> = response.json().await.ok();
        let message = body
            .as_ref()
            .and_then(|b| b.get("message").or_else(|| b.get("error")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} failed with status {}", operation, status.as_u16()));

        Err(AppError::Store { message })
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn list(&self) -> Result<Vec<Document>> {
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")]);

        let documents: Vec<Document> = self.send("list", request).await?.json().await?;
        debug!(count = documents.len(), "Listed documents");
        Ok(documents)
    }

    async fn insert(&self, document: NewDocument) -> Result<Document> {
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&document);

        let mut rows: Vec<Document> = self.send("insert", request).await?.json().await?;
        rows.pop().ok_or_else(|| AppError::Store {
            message: "insert returned no row".to_string(),
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let filter = format!("eq.{}", id);
        let request = self.client.delete(self.table_url()).query(&[("id", filter.as_str())]);

        self.send("delete", request).await?;
        info!(document_id = %id, "Deleted document record");
        Ok(())
    }
}

/// In-memory document table
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with existing rows
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    /// Overwrite a stored row, keyed by id
    pub async fn upsert(&self, document: Document) {
        let mut documents = self.documents.write().await;
        match documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self) -> Result<Vec<Document>> {
        let mut documents = self.documents.read().await.clone();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn insert(&self, document: NewDocument) -> Result<Document> {
        let record = Document {
            id: Uuid::new_v4().to_string(),
            file_name: document.file_name,
            file_size: document.file_size,
            file_extension: document.file_extension,
            created_at: Utc::now(),
            file_path: document.file_path,
            alpaca_path: None,
            trained_model_path: None,
            training_status: None,
        };

        self.documents.write().await.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);

        if documents.len() == before {
            return Err(AppError::NotFound {
                resource_type: "document".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(id: &str, day: u32) -> Document {
        Document {
            id: id.to_string(),
            file_name: format!("{}.pdf", id),
            file_size: 1024,
            file_extension: ".pdf".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
            file_path: format!("uploads/{}.pdf", id),
            alpaca_path: None,
            trained_model_path: None,
            training_status: None,
        }
    }

    #[tokio::test]
    async fn test_memory_list_newest_first() {
        let store = MemoryDocumentStore::with_documents(vec![row("old", 1), row("new", 3), row("mid", 2)]);
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_memory_insert_and_delete() {
        let store = MemoryDocumentStore::new();
        let created = store
            .insert(NewDocument::for_upload("notes.txt", 12, "uploads/notes.txt"))
            .await
            .unwrap();
        assert!(!created.has_dataset());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete(&created.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        let missing = store.delete(&created.id).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_memory_upsert() {
        let store = MemoryDocumentStore::with_documents(vec![row("a", 1)]);
        let mut updated = row("a", 1);
        updated.alpaca_path = Some("datasets/a.json".to_string());
        store.upsert(updated).await;

        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].has_dataset());
    }

    #[test]
    fn test_rest_store_disabled_without_url() {
        let config = StoreConfig::default();
        let store = RestDocumentStore::from_config(&config, Duration::from_secs(5)).unwrap();
        assert!(store.is_none());
    }

    #[test]
    fn test_rest_store_requires_key() {
        let config = StoreConfig {
            url: Some("https://project.supabase.co".to_string()),
            ..StoreConfig::default()
        };
        assert!(RestDocumentStore::from_config(&config, Duration::from_secs(5)).is_err());
    }
}
