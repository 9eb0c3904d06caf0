//! Training Backend client
//!
//! Provides a unified interface over the external service that generates
//! datasets, trains models and serves them:
//! - [`HttpTrainingBackend`] talks JSON over HTTP to the real service
//! - [`MockTrainingBackend`] replays scripted responses for tests
//!
//! Response bodies are decoded by the free functions in this module so both
//! implementations apply the same normalisation.

mod mock;

pub use mock::{MockReply, MockTrainingBackend};

use crate::config::BackendConfig;
use crate::errors::{AppError, Result};
use crate::metrics::RequestMetrics;
use crate::models::{AlpacaRecord, ModelStatus, StartTrainingResponse, TrainingStatus};
use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const UPLOAD: &str = "/upload";
pub const DELETE: &str = "/delete";
pub const CHECK_DATASET: &str = "/check-dataset";
pub const GENERATE_DATASET: &str = "/generate-gemini";
pub const SAVE_DATASET: &str = "/save-alpaca-json";
pub const START_TRAINING: &str = "/start-training";
pub const TRAINING_STATUS: &str = "/training-status";
pub const MODEL_STATUS: &str = "/check-model-status";
pub const TEST_MODEL: &str = "/test-model";
pub const DOWNLOAD_MODEL: &str = "/download-model";

/// A trained model as served by `/download-model`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Trait for the Training Backend
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Upload a document as multipart field `file`
    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<()>;

    /// Delete an uploaded document by storage path
    async fn delete(&self, file_path: &str) -> Result<()>;

    /// Check whether a dataset was already generated for a document
    async fn check_dataset(&self, file_path: &str) -> Result<bool>;

    /// Generate a dataset from a document
    async fn generate_dataset(&self, file_path: &str) -> Result<Vec<AlpacaRecord>>;

    /// Persist a generated dataset
    async fn save_dataset(&self, records: &[AlpacaRecord], file_name: &str) -> Result<()>;

    /// Ask the backend to train a model for a document
    async fn start_training(&self, file_id: &str) -> Result<StartTrainingResponse>;

    /// Fetch the training status of a document
    async fn training_status(&self, file_id: &str) -> Result<TrainingStatus>;

    /// Fetch the model status of a document
    async fn model_status(&self, file_id: &str) -> Result<ModelStatus>;

    /// Ask the trained model a question
    async fn test_model(&self, file_id: &str, question: &str) -> Result<String>;

    /// Download the trained model
    async fn download_model(&self, file_id: &str) -> Result<ModelArchive>;
}

/// HTTP client for the Training Backend
pub struct HttpTrainingBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrainingBackend {
    /// Create a new client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, recording metrics
    async fn send_json(&self, endpoint: &'static str, request: reqwest::RequestBuilder) -> Result<Value> {
        let metrics = RequestMetrics::start("backend", endpoint);
        let result = match request.send().await {
            Ok(response) => read_json(endpoint, response).await,
            Err(e) => Err(AppError::HttpClient(e)),
        };
        metrics.finish(result.is_ok());

        if let Err(e) = &result {
            debug!(endpoint, error = %e, "Backend request failed");
        }
        result
    }
}

#[async_trait]
impl TrainingBackend for HttpTrainingBackend {
    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<()> {
        let part = multipart::Part::bytes(contents).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        self.send_json(UPLOAD, self.client.post(self.url(UPLOAD)).multipart(form))
            .await
            .map(|_| ())
    }

    async fn delete(&self, file_path: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(DELETE))
            .json(&json!({ "file_path": file_path }));

        self.send_json(DELETE, request).await.map(|_| ())
    }

    async fn check_dataset(&self, file_path: &str) -> Result<bool> {
        let url = self.url(&format!("{}/{}", CHECK_DATASET, file_path));
        let value = self.send_json(CHECK_DATASET, self.client.get(url)).await?;
        Ok(parse_dataset_exists(&value))
    }

    async fn generate_dataset(&self, file_path: &str) -> Result<Vec<AlpacaRecord>> {
        let request = self
            .client
            .post(self.url(GENERATE_DATASET))
            .json(&json!({ "file_path": file_path }));

        let value = self.send_json(GENERATE_DATASET, request).await?;
        parse_generated_dataset(&value)
    }

    async fn save_dataset(&self, records: &[AlpacaRecord], file_name: &str) -> Result<()> {
        let request = self.client.post(self.url(SAVE_DATASET)).json(&json!({
            "alpaca_format": records,
            "file_name": file_name,
        }));

        let value = self.send_json(SAVE_DATASET, request).await?;
        reject_error_field(&value)
    }

    async fn start_training(&self, file_id: &str) -> Result<StartTrainingResponse> {
        let request = self
            .client
            .post(self.url(START_TRAINING))
            .json(&json!({ "file_id": file_id }));

        let value = self.send_json(START_TRAINING, request).await?;
        Ok(StartTrainingResponse::from_response(&value))
    }

    async fn training_status(&self, file_id: &str) -> Result<TrainingStatus> {
        let url = self.url(&format!("{}/{}", TRAINING_STATUS, file_id));
        let value = self.send_json(TRAINING_STATUS, self.client.get(url)).await?;
        Ok(TrainingStatus::from_response(&value))
    }

    async fn model_status(&self, file_id: &str) -> Result<ModelStatus> {
        let url = self.url(&format!("{}/{}", MODEL_STATUS, file_id));
        let value = self.send_json(MODEL_STATUS, self.client.get(url)).await?;
        parse_model_status(value)
    }

    async fn test_model(&self, file_id: &str, question: &str) -> Result<String> {
        let request = self.client.post(self.url(TEST_MODEL)).json(&json!({
            "file_id": file_id,
            "question": question,
        }));

        let value = self.send_json(TEST_MODEL, request).await?;
        parse_test_answer(&value)
    }

    async fn download_model(&self, file_id: &str) -> Result<ModelArchive> {
        let metrics = RequestMetrics::start("backend", DOWNLOAD_MODEL);
        let result = self.fetch_archive(file_id).await;
        metrics.finish(result.is_ok());
        result
    }
}

impl HttpTrainingBackend {
    async fn fetch_archive(&self, file_id: &str) -> Result<ModelArchive> {
        let url = self.url(&format!("{}/{}", DOWNLOAD_MODEL, file_id));
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body: Option<Value> = response.json().await.ok();
            let message = body
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| "Failed to download model".to_string());
            return Err(AppError::Backend { message });
        }

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| default_model_file_name(file_id));

        let bytes = response.bytes().await?.to_vec();
        Ok(ModelArchive { file_name, bytes })
    }
}

/// Decode a response body, turning non-2xx statuses into errors
async fn read_json(endpoint: &'static str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;
    let value: Option<Value> = serde_json::from_str(&body).ok();

    if !status.is_success() {
        if let Some(message) = value.as_ref().and_then(error_message) {
            return Err(AppError::Backend { message });
        }
        warn!(endpoint, status = status.as_u16(), "Backend returned an error without a message");
        return Err(AppError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    value.ok_or_else(|| AppError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: "Invalid JSON response".to_string(),
    })
}

/// Extract the backend's own description of a failure.
///
/// `detail` wins over `error`; structured details (validation errors) are
/// passed through as JSON text.
pub fn error_message(value: &Value) -> Option<String> {
    ["detail", "error"].iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Null) | Some(Value::String(_)) | Some(Value::Bool(false)) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

fn reject_error_field(value: &Value) -> Result<()> {
    match error_message(value) {
        Some(message) => Err(AppError::Backend { message }),
        None => Ok(()),
    }
}

pub fn parse_dataset_exists(value: &Value) -> bool {
    value.get("exists").and_then(Value::as_bool).unwrap_or(false)
}

/// `alpaca_format` must be a non-empty array
pub fn parse_generated_dataset(value: &Value) -> Result<Vec<AlpacaRecord>> {
    reject_error_field(value)?;

    let records: Vec<AlpacaRecord> = match value.get("alpaca_format") {
        Some(Value::Array(items)) => serde_json::from_value(Value::Array(items.clone()))?,
        _ => Vec::new(),
    };

    if records.is_empty() {
        return Err(AppError::InvalidResponse {
            endpoint: GENERATE_DATASET.to_string(),
            message: "response missing valid alpaca_format".to_string(),
        });
    }
    Ok(records)
}

pub fn parse_model_status(value: Value) -> Result<ModelStatus> {
    Ok(serde_json::from_value(value)?)
}

pub fn parse_test_answer(value: &Value) -> Result<String> {
    let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
    if success {
        let answer = value
            .get("answer")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Ok(answer.to_string());
    }

    let message = value
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("Test failed");
    Err(AppError::backend(message))
}

/// File name used when the backend sends no `content-disposition`
pub fn default_model_file_name(file_id: &str) -> String {
    format!("model_{}.zip", file_id)
}

/// Extract the file name from a `content-disposition` header value.
///
/// Quotes are stripped and only the final path component is kept.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let pattern = regex_lite::Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?("[^"]*"|'[^']*'|[^;\n]*)"#).ok()?;
    let raw = pattern.captures(header)?.get(1)?.as_str();
    let unquoted = raw.trim().trim_matches(|c| c == '"' || c == '\'');

    let name = Path::new(unquoted).file_name()?.to_string_lossy().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_precedence() {
        assert_eq!(
            error_message(&json!({"detail": "File not found", "error": "other"})).as_deref(),
            Some("File not found")
        );
        assert_eq!(error_message(&json!({"error": "quota"})).as_deref(), Some("quota"));
        assert_eq!(error_message(&json!({"detail": ""})), None);
        assert_eq!(error_message(&json!({"ok": true})), None);

        let structured = error_message(&json!({"detail": [{"loc": ["body", "file_id"]}]})).unwrap();
        assert!(structured.contains("file_id"));
    }

    #[test]
    fn test_generated_dataset_validation() {
        let records = parse_generated_dataset(&json!({
            "alpaca_format": [{"instruction": "Summarise", "input": "ch. 1", "output": "..."}]
        }))
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instruction, "Summarise");

        let empty = parse_generated_dataset(&json!({"alpaca_format": []})).unwrap_err();
        assert!(matches!(empty, AppError::InvalidResponse { .. }));

        let reported = parse_generated_dataset(&json!({"error": "Gemini quota exceeded"})).unwrap_err();
        assert_eq!(reported.to_string(), "Gemini quota exceeded");
    }

    #[test]
    fn test_test_answer() {
        assert_eq!(
            parse_test_answer(&json!({"success": true, "answer": "42"})).unwrap(),
            "42"
        );
        let err = parse_test_answer(&json!({"success": false, "error": "model not loaded"})).unwrap_err();
        assert_eq!(err.to_string(), "model not loaded");
        let err = parse_test_answer(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Test failed");
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="model_1.zip""#).as_deref(),
            Some("model_1.zip")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=weights.tar.gz; size=10").as_deref(),
            Some("weights.tar.gz")
        );
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(filename_from_disposition("inline"), None);
        assert_eq!(default_model_file_name("9"), "model_9.zip");
    }

    #[test]
    fn test_dataset_exists() {
        assert!(parse_dataset_exists(&json!({"exists": true})));
        assert!(!parse_dataset_exists(&json!({})));
    }
}
