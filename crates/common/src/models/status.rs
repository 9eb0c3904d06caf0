//! Model and training status records reported by the Training Backend
//!
//! The two records describe overlapping truth and are polled from different
//! endpoints. Decoding here is lenient: the backend omits fields, sends
//! `null` for booleans and reports progress as numbers or numeric strings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message shown while training runs and the backend sends none
pub const TRAINING_IN_PROGRESS_MESSAGE: &str = "Training in progress...";

/// Clamp a progress value into `[0, 100]`; non-finite values become 0
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_finite() {
        progress.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Clamp a progress value, substituting `default` when it is zero or
/// unusable. A reported 0 reads the same as a missing value.
pub fn progress_or(progress: f64, default: f64) -> f64 {
    if progress.is_finite() && progress != 0.0 {
        clamp_progress(progress)
    } else {
        clamp_progress(default)
    }
}

/// Training lifecycle as reported by `/training-status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    NotStarted,
    Starting,
    Training,
    Completed,
    Failed,
}

impl From<&str> for TrainingState {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" => TrainingState::Starting,
            "training" => TrainingState::Training,
            "completed" => TrainingState::Completed,
            "failed" => TrainingState::Failed,
            _ => TrainingState::NotStarted,
        }
    }
}

impl From<TrainingState> for String {
    fn from(state: TrainingState) -> Self {
        state.as_str().to_string()
    }
}

impl TrainingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingState::NotStarted => "not_started",
            TrainingState::Starting => "starting",
            TrainingState::Training => "training",
            TrainingState::Completed => "completed",
            TrainingState::Failed => "failed",
        }
    }

    /// Starting or training
    pub fn is_active(&self) -> bool {
        matches!(self, TrainingState::Starting | TrainingState::Training)
    }

    /// Check if the attempt has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingState::Completed | TrainingState::Failed)
    }
}

impl std::fmt::Display for TrainingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical training status, normalised from the backend's response shapes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub status: TrainingState,
    pub message: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub training_completed: bool,
}

impl TrainingStatus {
    /// A running attempt at the given progress
    pub fn in_progress(message: impl Into<String>, progress: f64, model_path: Option<String>) -> Self {
        Self {
            status: TrainingState::Training,
            message: message.into(),
            progress: clamp_progress(progress),
            model_path,
            error: None,
            training_completed: false,
        }
    }

    /// A finished attempt
    pub fn completed(model_path: Option<String>) -> Self {
        Self {
            status: TrainingState::Completed,
            message: "Training completed successfully!".to_string(),
            progress: 100.0,
            model_path,
            error: None,
            training_completed: true,
        }
    }

    /// Normalise a `/training-status` body.
    ///
    /// Accepts a flat object or one whose `status` field is itself the
    /// status object. Progress is read from `progress`, then `percent`, and
    /// defaults to 0.
    pub fn from_response(value: &Value) -> Self {
        let body = match value.get("status") {
            Some(inner @ Value::Object(_)) => inner,
            _ => value,
        };

        let status = body
            .get("status")
            .and_then(Value::as_str)
            .map(TrainingState::from)
            .unwrap_or(TrainingState::NotStarted);

        let progress = ["progress", "percent"]
            .iter()
            .filter_map(|key| body.get(*key))
            .filter_map(progress_value)
            .find(|p| p.is_finite() && *p != 0.0)
            .unwrap_or(0.0);

        Self {
            status,
            message: non_empty_str(body, "message")
                .unwrap_or_else(|| TRAINING_IN_PROGRESS_MESSAGE.to_string()),
            progress: clamp_progress(progress),
            model_path: non_empty_str(body, "model_path"),
            error: non_empty_str(body, "error"),
            training_completed: status == TrainingState::Completed,
        }
    }
}

/// Model status as reported by `/check-model-status`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    #[serde(default, deserialize_with = "null_as_false")]
    pub trained: bool,

    #[serde(default)]
    pub message: String,

    #[serde(default, deserialize_with = "null_as_false")]
    pub training_in_progress: bool,

    /// `Some(NaN)` when the field was present but unusable
    #[serde(default, deserialize_with = "lenient_progress", skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub training_completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_train: Option<bool>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub needs_retraining: bool,
}

impl ModelStatus {
    /// Status stored when the backend could not be reached or understood
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Trained and the training run finished
    pub fn is_complete(&self) -> bool {
        self.trained && self.training_completed
    }
}

/// Body of a successful `/start-training` call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartTrainingResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub progress: Option<f64>,
    pub model_path: Option<String>,
}

impl StartTrainingResponse {
    /// `message` may sit on a nested `status` object or at the top level
    pub fn from_response(value: &Value) -> Self {
        let nested = value.get("status").filter(|v| v.is_object());

        let message = nested
            .and_then(|status| non_empty_str(status, "message"))
            .or_else(|| non_empty_str(value, "message"));

        Self {
            status: value.get("status").and_then(Value::as_str).map(str::to_string),
            message,
            progress: value.get("progress").and_then(Value::as_f64),
            model_path: non_empty_str(value, "model_path"),
        }
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn progress_value(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        _ => Some(f64::NAN),
    }
}

fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(progress_value(&value))
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-5.0), 0.0);
        assert_eq!(clamp_progress(42.0), 42.0);
        assert_eq!(clamp_progress(250.0), 100.0);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
        assert_eq!(progress_or(f64::NAN, 50.0), 50.0);
        assert_eq!(progress_or(120.0, 50.0), 100.0);
        assert_eq!(progress_or(0.0, 50.0), 50.0);
        assert_eq!(progress_or(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(TrainingState::from("training"), TrainingState::Training);
        assert_eq!(TrainingState::from("COMPLETED"), TrainingState::Completed);
        assert_eq!(TrainingState::from("queued"), TrainingState::NotStarted);
        assert!(TrainingState::Starting.is_active());
        assert!(TrainingState::Failed.is_terminal());
        assert_eq!(String::from(TrainingState::NotStarted), "not_started");
    }

    #[test]
    fn test_flat_training_status() {
        let status = TrainingStatus::from_response(&json!({
            "status": "training",
            "progress": 42,
            "message": "epoch 2/5"
        }));
        assert_eq!(status.status, TrainingState::Training);
        assert_eq!(status.progress, 42.0);
        assert_eq!(status.message, "epoch 2/5");
        assert!(!status.training_completed);
    }

    #[test]
    fn test_nested_training_status() {
        let status = TrainingStatus::from_response(&json!({
            "file_id": "1",
            "status": {
                "status": "completed",
                "percent": 100,
                "model_path": "models/1"
            }
        }));
        assert_eq!(status.status, TrainingState::Completed);
        assert_eq!(status.progress, 100.0);
        assert_eq!(status.model_path.as_deref(), Some("models/1"));
        assert!(status.training_completed);
        assert_eq!(status.message, TRAINING_IN_PROGRESS_MESSAGE);
    }

    #[test]
    fn test_training_progress_fallbacks() {
        let from_percent = TrainingStatus::from_response(&json!({"status": "training", "progress": 0, "percent": "37.5"}));
        assert_eq!(from_percent.progress, 37.5);

        let out_of_range = TrainingStatus::from_response(&json!({"status": "training", "progress": 180}));
        assert_eq!(out_of_range.progress, 100.0);

        let negative = TrainingStatus::from_response(&json!({"status": "training", "progress": -3}));
        assert_eq!(negative.progress, 0.0);

        let missing = TrainingStatus::from_response(&json!({"status": "failed", "error": "OOM"}));
        assert_eq!(missing.progress, 0.0);
        assert_eq!(missing.error.as_deref(), Some("OOM"));
    }

    #[test]
    fn test_model_status_lenient_decode() {
        let status: ModelStatus = serde_json::from_value(json!({
            "trained": true,
            "message": "ok",
            "training_in_progress": null,
            "training_completed": true,
            "progress": "88"
        }))
        .unwrap();
        assert!(status.is_complete());
        assert!(!status.training_in_progress);
        assert_eq!(status.progress, Some(88.0));
        assert!(!status.needs_retraining);

        let garbage: ModelStatus =
            serde_json::from_value(json!({"trained": false, "training_in_progress": true, "progress": "soon"})).unwrap();
        assert!(garbage.progress.unwrap().is_nan());

        let absent: ModelStatus = serde_json::from_value(json!({"trained": false})).unwrap();
        assert_eq!(absent.progress, None);
    }

    #[test]
    fn test_start_training_response() {
        let nested = StartTrainingResponse::from_response(&json!({
            "status": {"message": "queued on gpu-1"},
            "message": "ignored",
            "progress": 10
        }));
        assert_eq!(nested.message.as_deref(), Some("queued on gpu-1"));
        assert_eq!(nested.progress, Some(10.0));

        let flat = StartTrainingResponse::from_response(&json!({"status": "started", "message": "go"}));
        assert_eq!(flat.status.as_deref(), Some("started"));
        assert_eq!(flat.message.as_deref(), Some("go"));
        assert_eq!(flat.progress, None);
    }
}
