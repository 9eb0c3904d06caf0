//! Scripted Training Backend for tests

use super::{
    default_model_file_name, parse_dataset_exists, parse_generated_dataset, parse_model_status,
    parse_test_answer, ModelArchive, TrainingBackend, CHECK_DATASET, DELETE, DOWNLOAD_MODEL,
    GENERATE_DATASET, MODEL_STATUS, SAVE_DATASET, START_TRAINING, TEST_MODEL, TRAINING_STATUS,
    UPLOAD,
};
use crate::errors::{AppError, Result};
use crate::models::{AlpacaRecord, ModelStatus, StartTrainingResponse, TrainingStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One scripted answer
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Successful body, decoded the same way the HTTP client decodes it
    Json(Value),
    /// Failure reported by the backend with this message
    Backend(String),
    /// Unreachable backend
    Transport,
    /// Answer after a delay
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn json(value: Value) -> Self {
        MockReply::Json(value)
    }

    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        MockReply::Delayed(delay, Box::new(reply))
    }
}

/// Mock backend replaying replies per `(endpoint, key)`.
///
/// Replies are consumed in order and the last one is repeated. Unscripted
/// calls get a neutral answer: untrained model, `not_started` training.
#[derive(Default)]
pub struct MockTrainingBackend {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTrainingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `endpoint` called with `key`
    pub fn script(&self, endpoint: &str, key: &str, reply: MockReply) -> &Self {
        lock(&self.replies)
            .entry(call_key(endpoint, key))
            .or_default()
            .push_back(reply);
        self
    }

    /// Drop queued replies for `endpoint` called with `key`
    pub fn clear(&self, endpoint: &str, key: &str) {
        lock(&self.replies).remove(&call_key(endpoint, key));
    }

    /// Every call made so far, as `endpoint:key`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of calls made to `endpoint`
    pub fn call_count(&self, endpoint: &str) -> usize {
        let prefix = format!("{}:", endpoint);
        lock(&self.calls)
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .count()
    }

    /// Number of calls made to `endpoint` with `key`
    pub fn calls_for(&self, endpoint: &str, key: &str) -> usize {
        let wanted = call_key(endpoint, key);
        lock(&self.calls).iter().filter(|call| **call == wanted).count()
    }

    /// Record the call and resolve its reply. `None` means unscripted.
    async fn answer(&self, endpoint: &str, key: &str) -> Result<Option<Value>> {
        let call = call_key(endpoint, key);
        lock(&self.calls).push(call.clone());

        let reply = {
            let mut replies = lock(&self.replies);
            match replies.get_mut(&call) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let mut reply = match reply {
            Some(reply) => reply,
            None => return Ok(None),
        };

        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Json(value) => return Ok(Some(value)),
                MockReply::Backend(message) => return Err(AppError::Backend { message }),
                MockReply::Transport => {
                    return Err(AppError::UnexpectedStatus {
                        endpoint: endpoint.to_string(),
                        status: 503,
                    })
                }
            }
        }
    }
}

fn call_key(endpoint: &str, key: &str) -> String {
    format!("{}:{}", endpoint, key)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TrainingBackend for MockTrainingBackend {
    async fn upload(&self, file_name: &str, _contents: Vec<u8>) -> Result<()> {
        self.answer(UPLOAD, file_name).await.map(|_| ())
    }

    async fn delete(&self, file_path: &str) -> Result<()> {
        self.answer(DELETE, file_path).await.map(|_| ())
    }

    async fn check_dataset(&self, file_path: &str) -> Result<bool> {
        Ok(self
            .answer(CHECK_DATASET, file_path)
            .await?
            .map(|value| parse_dataset_exists(&value))
            .unwrap_or(false))
    }

    async fn generate_dataset(&self, file_path: &str) -> Result<Vec<AlpacaRecord>> {
        let value = self.answer(GENERATE_DATASET, file_path).await?.unwrap_or_else(|| {
            json!({
                "alpaca_format": [{
                    "instruction": format!("Summarise {}", file_path),
                    "input": "",
                    "output": "A short summary."
                }]
            })
        });
        parse_generated_dataset(&value)
    }

    async fn save_dataset(&self, _records: &[AlpacaRecord], file_name: &str) -> Result<()> {
        self.answer(SAVE_DATASET, file_name).await.map(|_| ())
    }

    async fn start_training(&self, file_id: &str) -> Result<StartTrainingResponse> {
        Ok(self
            .answer(START_TRAINING, file_id)
            .await?
            .map(|value| StartTrainingResponse::from_response(&value))
            .unwrap_or_default())
    }

    async fn training_status(&self, file_id: &str) -> Result<TrainingStatus> {
        let value = self
            .answer(TRAINING_STATUS, file_id)
            .await?
            .unwrap_or_else(|| json!({ "status": "not_started" }));
        Ok(TrainingStatus::from_response(&value))
    }

    async fn model_status(&self, file_id: &str) -> Result<ModelStatus> {
        match self.answer(MODEL_STATUS, file_id).await? {
            Some(value) => parse_model_status(value),
            None => Ok(ModelStatus::degraded("Model not trained")),
        }
    }

    async fn test_model(&self, file_id: &str, question: &str) -> Result<String> {
        let value = self
            .answer(TEST_MODEL, file_id)
            .await?
            .unwrap_or_else(|| json!({ "success": true, "answer": format!("echo: {}", question) }));
        parse_test_answer(&value)
    }

    async fn download_model(&self, file_id: &str) -> Result<ModelArchive> {
        let value = self.answer(DOWNLOAD_MODEL, file_id).await?;
        let file_name = value
            .as_ref()
            .and_then(|v| v.get("file_name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_model_file_name(file_id));
        let bytes = value
            .as_ref()
            .and_then(|v| v.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("mock-model")
            .as_bytes()
            .to_vec();

        Ok(ModelArchive { file_name, bytes })
    }
}
