//! Derived per-file view: phase, labels and which actions are available

use crate::state::FileStatus;
use serde::Serialize;
use tuneboard_common::models::{Document, TrainingState};

/// Where a file is in its dataset/training lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePhase {
    NoDataset,
    DatasetReady,
    TrainingStarting,
    Training,
    Trained,
    TrainingFailed,
}

/// Which dashboard actions a file currently allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actions {
    pub create_dataset: bool,
    pub train: bool,
    pub test: bool,
    pub download: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledView {
    pub has_dataset: bool,
    pub is_training: bool,
    pub is_trained: bool,
    pub needs_retraining: bool,
    /// Training progress, 0 when none is known
    pub progress: f64,
    pub message: Option<String>,
    pub phase: FilePhase,
    pub actions: Actions,
}

impl ReconciledView {
    pub fn derive(document: &Document, status: Option<&FileStatus>) -> Self {
        let empty = FileStatus::default();
        let status = status.unwrap_or(&empty);

        let has_dataset = document.has_dataset();
        let is_training = status.is_training();
        let is_trained = status.is_trained();
        let needs_retraining = status.model.as_ref().map_or(false, |m| m.needs_retraining);
        let progress = status.training.as_ref().map_or(0.0, |t| t.progress);

        let message = status
            .training
            .as_ref()
            .map(|t| t.message.clone())
            .or_else(|| status.model.as_ref().map(|m| m.message.clone()))
            .filter(|m| !m.is_empty());

        let phase = if is_trained {
            FilePhase::Trained
        } else if is_training {
            match status.training_state() {
                Some(TrainingState::Starting) => FilePhase::TrainingStarting,
                _ => FilePhase::Training,
            }
        } else if status.training_state() == Some(TrainingState::Failed) {
            FilePhase::TrainingFailed
        } else if has_dataset {
            FilePhase::DatasetReady
        } else {
            FilePhase::NoDataset
        };

        let actions = Actions {
            create_dataset: !has_dataset,
            train: has_dataset && !is_trained,
            test: is_trained,
            download: is_trained,
            delete: true,
        };

        Self {
            has_dataset,
            is_training,
            is_trained,
            needs_retraining,
            progress,
            message,
            phase,
            actions,
        }
    }

    /// Model column text
    pub fn status_label(&self) -> String {
        if self.is_trained {
            "Trained".to_string()
        } else if self.is_training {
            format!("Training ({:.0}%)", self.progress)
        } else if self.needs_retraining {
            "Needs retraining".to_string()
        } else if self.phase == FilePhase::TrainingFailed {
            "Training failed".to_string()
        } else {
            "Not trained".to_string()
        }
    }

    /// Dataset column text
    pub fn dataset_label(&self) -> &'static str {
        if self.has_dataset {
            "Ready"
        } else {
            "Not generated"
        }
    }

    /// Caption of the train action
    pub fn train_label(&self) -> &'static str {
        if self.is_training {
            "Progress"
        } else if self.is_trained {
            "Trained"
        } else {
            "Train"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tuneboard_common::models::{ModelStatus, TrainingStatus};

    fn document(alpaca_path: &str) -> Document {
        Document {
            id: "1".to_string(),
            file_name: "a.txt".to_string(),
            file_size: 10,
            file_extension: ".txt".to_string(),
            created_at: Utc::now(),
            file_path: "uploads/a.txt".to_string(),
            alpaca_path: Some(alpaca_path.to_string()),
            trained_model_path: None,
            training_status: None,
        }
    }

    #[test]
    fn test_no_dataset_allows_only_create() {
        let view = ReconciledView::derive(&document(""), None);
        assert_eq!(view.phase, FilePhase::NoDataset);
        assert!(view.actions.create_dataset);
        assert!(!view.actions.train);
        assert!(!view.actions.test);
        assert!(!view.actions.download);
        assert!(view.actions.delete);
        assert_eq!(view.status_label(), "Not trained");
        assert_eq!(view.dataset_label(), "Not generated");
    }

    #[test]
    fn test_training_label_rounds_progress() {
        let status = FileStatus {
            model: None,
            training: Some(TrainingStatus::in_progress("epoch 1", 42.4, None)),
        };
        let view = ReconciledView::derive(&document("d/a.json"), Some(&status));
        assert_eq!(view.phase, FilePhase::Training);
        assert_eq!(view.status_label(), "Training (42%)");
        assert_eq!(view.train_label(), "Progress");
        assert!(view.actions.train);
        assert!(!view.actions.create_dataset);
    }

    #[test]
    fn test_trained_view() {
        let status = FileStatus {
            model: Some(ModelStatus {
                trained: true,
                training_completed: true,
                ..ModelStatus::default()
            }),
            training: Some(TrainingStatus::completed(None)),
        };
        let view = ReconciledView::derive(&document("d/a.json"), Some(&status));
        assert_eq!(view.phase, FilePhase::Trained);
        assert_eq!(view.status_label(), "Trained");
        assert_eq!(view.train_label(), "Trained");
        assert!(!view.actions.train);
        assert!(view.actions.test);
        assert!(view.actions.download);
        assert_eq!(view.progress, 100.0);
    }

    #[test]
    fn test_needs_retraining_and_failed_labels() {
        let retrain = FileStatus {
            model: Some(ModelStatus {
                needs_retraining: true,
                ..ModelStatus::default()
            }),
            training: None,
        };
        let view = ReconciledView::derive(&document("d/a.json"), Some(&retrain));
        assert_eq!(view.status_label(), "Needs retraining");
        assert_eq!(view.phase, FilePhase::DatasetReady);

        let failed = FileStatus {
            model: None,
            training: Some(TrainingStatus::from_response(&serde_json::json!({"status": "failed"}))),
        };
        let view = ReconciledView::derive(&document("d/a.json"), Some(&failed));
        assert_eq!(view.phase, FilePhase::TrainingFailed);
        assert_eq!(view.status_label(), "Training failed");
        assert!(view.actions.train);
    }
}
