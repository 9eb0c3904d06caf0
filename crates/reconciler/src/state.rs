//! Per-file status table
//!
//! [`StatusStore`] keeps the latest ModelStatus and TrainingStatus for each
//! document. Whichever source is written is treated as authoritative and the
//! other is adjusted in the same call, so the table never holds a file that
//! is both trained and training.
//!
//! Writes report a [`Transition`] the first time a training attempt reaches a
//! terminal state; callers fire side effects only on those.

use std::collections::HashMap;
use tuneboard_common::models::{
    clamp_progress, progress_or, ModelStatus, StartTrainingResponse, TrainingState, TrainingStatus,
    TRAINING_IN_PROGRESS_MESSAGE,
};

/// Progress assumed when the model status says training runs but reports an
/// unusable progress value
pub const BRIDGED_PROGRESS: f64 = 50.0;

/// Message shown right after the backend accepts a training request
pub const TRAINING_STARTED_MESSAGE: &str = "Training started...";

/// Both status views of one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStatus {
    pub model: Option<ModelStatus>,
    pub training: Option<TrainingStatus>,
}

impl FileStatus {
    pub fn training_state(&self) -> Option<TrainingState> {
        self.training.as_ref().map(|t| t.status)
    }

    pub fn is_training(&self) -> bool {
        let model = self.model.as_ref().map_or(false, |m| m.training_in_progress);
        model || self.training_state().map_or(false, |s| s.is_active())
    }

    pub fn is_trained(&self) -> bool {
        self.model.as_ref().map_or(false, ModelStatus::is_complete)
    }
}

/// First observation of a terminal training state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Completed { file_id: String },
    Failed { file_id: String, reason: String },
}

#[derive(Debug, Default)]
pub struct StatusStore {
    entries: HashMap<String, FileStatus>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_id: &str) -> Option<&FileStatus> {
        self.entries.get(file_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a model status fetched from the backend.
    ///
    /// In-progress reports with a progress value drive the training view;
    /// completion reports synthesise a completed training status and count
    /// as a transition only when they end an attempt this store saw running.
    ///
    /// Once the training view is terminal, in-progress reports are stale and
    /// ignored. Only [`mark_training_started`](Self::mark_training_started)
    /// leaves a terminal state.
    pub fn apply_model_status(&mut self, file_id: &str, mut status: ModelStatus) -> Option<Transition> {
        let entry = self.entries.entry(file_id.to_string()).or_default();
        let previous = entry.training_state();

        if status.training_in_progress {
            if previous.map_or(false, |state| state.is_terminal()) {
                return None;
            }
            status.training_completed = false;

            if let Some(progress) = status.progress {
                let message = if status.message.trim().is_empty() {
                    TRAINING_IN_PROGRESS_MESSAGE.to_string()
                } else {
                    status.message.clone()
                };
                entry.training = Some(TrainingStatus::in_progress(
                    message,
                    progress_or(progress, BRIDGED_PROGRESS),
                    status.model_path.clone(),
                ));
            }
            entry.model = Some(status);
            return None;
        }

        let completed = status.is_complete();
        let model_path = status.model_path.clone();
        entry.model = Some(status);

        if !completed {
            return None;
        }

        entry.training = Some(TrainingStatus::completed(model_path));
        match previous {
            Some(state) if state.is_active() => Some(Transition::Completed {
                file_id: file_id.to_string(),
            }),
            _ => None,
        }
    }

    /// Record that the model status could not be fetched
    pub fn apply_model_error(&mut self, file_id: &str) {
        let entry = self.entries.entry(file_id.to_string()).or_default();
        entry.model = Some(ModelStatus::degraded("Error checking status"));
    }

    /// Store a training status fetched from the backend
    pub fn apply_training_status(&mut self, file_id: &str, status: TrainingStatus) -> Option<Transition> {
        let entry = self.entries.entry(file_id.to_string()).or_default();
        let previous = entry.training_state();

        match status.status {
            TrainingState::Completed => {
                let model = entry.model.get_or_insert_with(ModelStatus::default);
                model.trained = true;
                model.training_completed = true;
                model.training_in_progress = false;
                model.message = "Training completed successfully".to_string();
                if status.model_path.is_some() {
                    model.model_path = status.model_path.clone();
                }
            }
            TrainingState::Failed => {
                let model = entry.model.get_or_insert_with(ModelStatus::default);
                model.trained = false;
                model.training_completed = false;
                model.training_in_progress = false;
                model.message = "Training failed".to_string();
            }
            TrainingState::Starting | TrainingState::Training => {
                if let Some(model) = entry.model.as_mut() {
                    model.training_completed = false;
                }
            }
            TrainingState::NotStarted => {}
        }

        let state = status.status;
        let reason = failure_reason(&status);
        entry.training = Some(status);

        if !state.is_terminal() || previous == Some(state) {
            return None;
        }

        let file_id = file_id.to_string();
        Some(match state {
            TrainingState::Completed => Transition::Completed { file_id },
            _ => Transition::Failed { file_id, reason },
        })
    }

    /// Reflect a training request the backend accepted
    pub fn mark_training_started(
        &mut self,
        file_id: &str,
        response: &StartTrainingResponse,
        start_progress: f64,
    ) -> &FileStatus {
        let entry = self.entries.entry(file_id.to_string()).or_default();

        let message = response
            .message
            .clone()
            .unwrap_or_else(|| TRAINING_STARTED_MESSAGE.to_string());
        let progress = response.progress.map_or(start_progress, |p| progress_or(p, start_progress));

        entry.training = Some(TrainingStatus::in_progress(
            message,
            clamp_progress(progress),
            response.model_path.clone(),
        ));

        let model = entry.model.get_or_insert_with(ModelStatus::default);
        model.training_in_progress = true;
        model.trained = false;
        model.training_completed = false;

        entry
    }

    /// Files whose training view is starting or training
    pub fn active_training(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.training_state().map_or(false, |s| s.is_active()))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Files whose model status reports training in progress
    pub fn model_in_progress(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.model.as_ref().map_or(false, |m| m.training_in_progress))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop entries for files that are no longer listed
    pub fn retain_files<'a>(&mut self, file_ids: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = file_ids.into_iter().collect();
        self.entries.retain(|id, _| keep.contains(id.as_str()));
    }
}

fn failure_reason(status: &TrainingStatus) -> String {
    let message = Some(status.message.as_str()).filter(|m| !m.is_empty() && *m != TRAINING_IN_PROGRESS_MESSAGE);
    status
        .error
        .as_deref()
        .or(message)
        .unwrap_or("Unknown error")
        .to_string()
}
