//! User-initiated dashboard actions
//!
//! Each action validates before touching the network and ends with exactly
//! one success or failure notification. Actions that change the document
//! table ask the reconciler to reload it.

use crate::notify::{emit, Notification, NotificationSink};
use crate::reconciler::{ReconcilerHandle, StartOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tuneboard_common::errors::{AppError, Result};
use tuneboard_common::models::{Document, NewDocument};
use tuneboard_common::{DocumentStore, TrainingBackend};

/// Per-file result of an upload batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    /// File name and the reason it failed
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOutcome {
    /// A dataset existed already; nothing was generated
    AlreadyExists,
    /// Generated and saved
    Created { records: usize },
    /// Generated but the save call failed
    GeneratedNotSaved,
}

/// Entry point for everything a user can do from the dashboard
pub struct Dashboard {
    backend: Arc<dyn TrainingBackend>,
    store: Arc<dyn DocumentStore>,
    reconciler: ReconcilerHandle,
    sink: Arc<dyn NotificationSink>,
    manage_records: bool,
}

impl Dashboard {
    pub fn new(
        backend: Arc<dyn TrainingBackend>,
        store: Arc<dyn DocumentStore>,
        reconciler: ReconcilerHandle,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            backend,
            store,
            reconciler,
            sink,
            manage_records: false,
        }
    }

    /// Keep document rows in the store ourselves.
    ///
    /// The hosted backend writes rows on upload and removes them on delete;
    /// a local store has nobody else doing that.
    pub fn managing_records(mut self, manage: bool) -> Self {
        self.manage_records = manage;
        self
    }

    pub fn reconciler(&self) -> &ReconcilerHandle {
        &self.reconciler
    }

    fn notify(&self, notification: Notification) {
        emit(self.sink.as_ref(), notification);
    }

    /// Upload every file in `paths`, one request each
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<UploadSummary> {
        if paths.is_empty() {
            self.notify(Notification::warning("Upload", "Please select file(s)"));
            return Err(AppError::Validation {
                message: "Please select file(s)".to_string(),
            });
        }

        let mut summary = UploadSummary::default();
        for path in paths {
            let file_name = display_name(path);
            match self.upload_one(path, &file_name).await {
                Ok(()) => {
                    info!(file_name = %file_name, "Uploaded file");
                    summary.uploaded.push(file_name);
                }
                Err(e) => {
                    let reason = upload_failure(&e);
                    warn!(file_name = %file_name, error = %e, code = e.code().as_code(), "Upload failed");
                    self.notify(Notification::error(
                        "Upload Failed",
                        format!("\"{}\": {}", file_name, reason),
                    ));
                    summary.failed.push((file_name, reason));
                }
            }
        }

        let total = paths.len();
        if summary.failed.is_empty() {
            self.notify(Notification::success("Upload", "All files uploaded successfully!"));
        } else {
            self.notify(Notification::warning(
                "Upload",
                format!("{} of {} files uploaded", summary.uploaded.len(), total),
            ));
        }

        self.reconciler.fetch_documents();
        Ok(summary)
    }

    async fn upload_one(&self, path: &Path, file_name: &str) -> Result<()> {
        let contents = tokio::fs::read(path).await?;
        let size = contents.len() as i64;
        self.backend.upload(file_name, contents).await?;

        if self.manage_records {
            let file_path = format!("uploads/{}", file_name);
            self.store
                .insert(NewDocument::for_upload(file_name, size, &file_path))
                .await?;
        }
        Ok(())
    }

    /// Delete a document and its stored file
    pub async fn delete_document(&self, document: &Document) -> Result<()> {
        let result = async {
            self.backend.delete(&document.file_path).await?;
            if self.manage_records {
                self.store.delete(&document.id).await?;
            }
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.notify(Notification::success(
                    "Delete",
                    format!("Deleted \"{}\"", document.file_name),
                ));
                self.reconciler.fetch_documents();
                Ok(())
            }
            Err(e) => {
                error!(file_id = %document.id, error = %e, code = e.code().as_code(), "Delete failed");
                let message = match &e {
                    AppError::Backend { message } => format!("Failed to delete: {}", message),
                    e if e.is_transport() => "Network error while deleting".to_string(),
                    e => format!("Failed to delete: {}", e),
                };
                self.notify(Notification::error("Delete", message));
                Err(e)
            }
        }
    }

    /// Generate and save a dataset for a document
    pub async fn create_dataset(&self, document: &Document) -> Result<DatasetOutcome> {
        match self.backend.check_dataset(&document.file_path).await {
            Ok(true) => {
                self.notify(Notification::info(
                    "Dataset Already Exists",
                    format!(
                        "A dataset has already been generated for \"{}\". Use the training button to train with the existing dataset.",
                        document.file_name
                    ),
                ));
                self.reconciler.fetch_documents();
                return Ok(DatasetOutcome::AlreadyExists);
            }
            Ok(false) => {}
            Err(e) => {
                // Not knowing is treated as "does not exist"
                warn!(file_id = %document.id, error = %e, code = e.code().as_code(), "Dataset check failed");
                self.notify(Notification::error(
                    "Error",
                    "Failed to check if dataset exists. Please try again.",
                ));
            }
        }

        let records = match self.backend.generate_dataset(&document.file_path).await {
            Ok(records) => records,
            Err(e) => {
                error!(file_id = %document.id, error = %e, code = e.code().as_code(), "Dataset generation failed");
                let notification = match &e {
                    AppError::Backend { message } => Notification::error(
                        "Generation Failed",
                        format!("Failed to generate dataset: {}", message),
                    ),
                    AppError::InvalidResponse { .. } => Notification::error(
                        "Generation Failed",
                        "Invalid response from AI model. Please try again.",
                    ),
                    _ => Notification::error(
                        "Network Error",
                        "Failed to connect to the AI service. Please check your connection and try again.",
                    ),
                };
                self.notify(notification);
                return Err(e);
            }
        };

        if document.file_name.trim().is_empty() {
            self.notify(Notification::error(
                "Save Failed",
                "Missing file information. Cannot save dataset.",
            ));
            return Err(AppError::Validation {
                message: "Missing file_name, cannot save dataset".to_string(),
            });
        }

        info!(file_id = %document.id, records = records.len(), "Dataset generated");

        if let Err(e) = self.backend.save_dataset(&records, &document.file_name).await {
            warn!(file_id = %document.id, error = %e, code = e.code().as_code(), "Dataset generated but not saved");
            self.notify(Notification::warning(
                "Save Warning",
                "Dataset was generated but could not be saved. Please try again.",
            ));
            return Ok(DatasetOutcome::GeneratedNotSaved);
        }

        self.notify(Notification::success(
            "Dataset Created Successfully!",
            format!(
                "Dataset has been generated and saved for \"{}\". You can now use the training button to train your model.",
                document.file_name
            ),
        ));
        self.reconciler.fetch_documents();
        Ok(DatasetOutcome::Created {
            records: records.len(),
        })
    }

    /// Start training; see [`ReconcilerHandle::start_training`]
    pub async fn start_training(&self, document: Document) -> Result<StartOutcome> {
        self.reconciler.start_training(document).await
    }

    /// Ask a trained model a question
    pub async fn test_model(&self, file_id: &str, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::EmptyQuestion);
        }

        self.require_trained(file_id, "Model Not Ready", "Please complete model training first before testing. The model must be fully trained to respond to questions.")
            .await?;

        let answer = self.backend.test_model(file_id, question).await?;
        info!(file_id = %file_id, "Model answered");
        Ok(answer)
    }

    /// Download a trained model into `dir`; returns the written path
    pub async fn download_model(&self, file_id: &str, dir: &Path) -> Result<PathBuf> {
        self.require_trained(file_id, "Download Error", "Model is not trained yet. Please complete training first.")
            .await?;

        let result = async {
            let archive = self.backend.download_model(file_id).await?;
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(&archive.file_name);
            tokio::fs::write(&path, &archive.bytes).await?;
            Ok::<_, AppError>((archive.file_name, path))
        }
        .await;

        match result {
            Ok((file_name, path)) => {
                info!(file_id = %file_id, path = %path.display(), "Model downloaded");
                self.notify(Notification::success(
                    "Download Started",
                    format!("Model download started: {}", file_name),
                ));
                Ok(path)
            }
            Err(e) => {
                error!(file_id = %file_id, error = %e, code = e.code().as_code(), "Download failed");
                let message = match &e {
                    AppError::Backend { message } => message.clone(),
                    _ => "Failed to download model. Please try again.".to_string(),
                };
                self.notify(Notification::error("Download Error", message));
                Err(e)
            }
        }
    }

    async fn require_trained(&self, file_id: &str, title: &str, message: &str) -> Result<()> {
        let trained = self
            .reconciler
            .view(file_id)
            .await?
            .map_or(false, |view| view.is_trained);

        if !trained {
            self.notify(Notification::warning(title, message));
            return Err(AppError::ModelNotTrained {
                file_id: file_id.to_string(),
            });
        }
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn upload_failure(e: &AppError) -> String {
    match e {
        AppError::Backend { message } => format!("Upload failed: {}", message),
        AppError::InvalidResponse { .. } => "Upload failed: Invalid JSON response".to_string(),
        e if e.is_transport() => "Upload failed: Network error".to_string(),
        e => format!("Upload failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelSink, NotificationLevel};
    use crate::reconciler::Reconciler;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tuneboard_common::backend::{
        MockReply, MockTrainingBackend, CHECK_DATASET, DOWNLOAD_MODEL, GENERATE_DATASET, MODEL_STATUS,
        SAVE_DATASET, TEST_MODEL, UPLOAD,
    };
    use tuneboard_common::config::PollingConfig;
    use tuneboard_common::store::MemoryDocumentStore;

    fn document(id: &str, alpaca_path: &str) -> Document {
        Document {
            id: id.to_string(),
            file_name: format!("{}.pdf", id),
            file_size: 100,
            file_extension: ".pdf".to_string(),
            created_at: Utc::now(),
            file_path: format!("uploads/{}.pdf", id),
            alpaca_path: Some(alpaca_path.to_string()),
            trained_model_path: None,
            training_status: None,
        }
    }

    fn setup(documents: Vec<Document>) -> (Dashboard, Arc<MockTrainingBackend>, Arc<MemoryDocumentStore>, UnboundedReceiver<Notification>) {
        let backend = Arc::new(MockTrainingBackend::new());
        let store = Arc::new(MemoryDocumentStore::with_documents(documents));
        let (sink, rx) = ChannelSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        let (handle, _task) = Reconciler::spawn(backend.clone(), store.clone(), sink.clone(), PollingConfig::default());
        let dashboard = Dashboard::new(backend.clone(), store.clone(), handle, sink);
        (dashboard, backend, store, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    async fn load(dashboard: &Dashboard) {
        dashboard.reconciler().fetch_documents();
        dashboard.reconciler().quiesce().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_requires_files() {
        let (dashboard, backend, _, mut rx) = setup(Vec::new());
        let err = dashboard.upload_files(&[]).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(backend.call_count(UPLOAD), 0);
        assert_eq!(drain(&mut rx)[0].message, "Please select file(s)");
    }

    #[tokio::test]
    async fn test_upload_reports_each_failure() {
        let dir = std::env::temp_dir().join(format!("tuneboard-upload-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let good = dir.join("good.txt");
        let bad = dir.join("bad.txt");
        tokio::fs::write(&good, b"hello").await.unwrap();
        tokio::fs::write(&bad, b"world").await.unwrap();

        let (dashboard, backend, store, mut rx) = setup(Vec::new());
        let dashboard = dashboard.managing_records(true);
        backend.script(UPLOAD, "bad.txt", MockReply::Backend("Unsupported file type".into()));

        let summary = dashboard
            .upload_files(&[good.clone(), bad.clone(), dir.join("missing.txt")])
            .await
            .unwrap();
        assert_eq!(summary.uploaded, vec!["good.txt".to_string()]);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0].1, "Upload failed: Unsupported file type");

        let notes = drain(&mut rx);
        assert_eq!(notes.iter().filter(|n| n.level == NotificationLevel::Error).count(), 2);
        assert_eq!(notes.last().unwrap().message, "1 of 3 files uploaded");

        let rows = store.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_size, 5);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_create_dataset_skips_existing() {
        let (dashboard, backend, _, mut rx) = setup(Vec::new());
        backend.script(CHECK_DATASET, "uploads/1.pdf", MockReply::json(json!({"exists": true})));

        let outcome = dashboard.create_dataset(&document("1", "")).await.unwrap();
        assert_eq!(outcome, DatasetOutcome::AlreadyExists);
        assert_eq!(backend.call_count(GENERATE_DATASET), 0);
        assert_eq!(drain(&mut rx)[0].title, "Dataset Already Exists");
    }

    #[tokio::test]
    async fn test_create_dataset_generates_and_saves() {
        let (dashboard, backend, _, mut rx) = setup(Vec::new());
        let outcome = dashboard.create_dataset(&document("1", "")).await.unwrap();
        assert_eq!(outcome, DatasetOutcome::Created { records: 1 });
        assert_eq!(backend.calls_for(SAVE_DATASET, "1.pdf"), 1);
        assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn test_create_dataset_failures() {
        let (dashboard, backend, _, mut rx) = setup(Vec::new());

        backend.script(GENERATE_DATASET, "uploads/1.pdf", MockReply::json(json!({"alpaca_format": []})));
        dashboard.create_dataset(&document("1", "")).await.unwrap_err();
        assert_eq!(drain(&mut rx)[0].message, "Invalid response from AI model. Please try again.");

        backend.script(GENERATE_DATASET, "uploads/2.pdf", MockReply::Backend("quota".into()));
        dashboard.create_dataset(&document("2", "")).await.unwrap_err();
        assert_eq!(drain(&mut rx)[0].message, "Failed to generate dataset: quota");

        backend.script(SAVE_DATASET, "3.pdf", MockReply::Transport);
        let outcome = dashboard.create_dataset(&document("3", "")).await.unwrap();
        assert_eq!(outcome, DatasetOutcome::GeneratedNotSaved);
        assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Warning);

        let mut nameless = document("4", "");
        nameless.file_name = String::new();
        let err = dashboard.create_dataset(&nameless).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(backend.calls_for(SAVE_DATASET, ""), 0);
    }

    #[tokio::test]
    async fn test_create_dataset_proceeds_when_check_fails() {
        let (dashboard, backend, _, mut rx) = setup(Vec::new());
        backend.script(CHECK_DATASET, "uploads/1.pdf", MockReply::Transport);

        let outcome = dashboard.create_dataset(&document("1", "")).await.unwrap();
        assert_eq!(outcome, DatasetOutcome::Created { records: 1 });
        let notes = drain(&mut rx);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[1].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn test_test_model_validation() {
        let (dashboard, backend, _, _rx) = setup(vec![document("1", "d/1.json")]);
        load(&dashboard).await;

        let err = dashboard.test_model("1", "   ").await.unwrap_err();
        assert!(matches!(err, AppError::EmptyQuestion));

        let err = dashboard.test_model("1", "What is it about?").await.unwrap_err();
        assert!(matches!(err, AppError::ModelNotTrained { .. }));
        assert_eq!(backend.call_count(TEST_MODEL), 0);
    }

    #[tokio::test]
    async fn test_trained_model_answers_and_downloads() {
        let (dashboard, backend, _, _rx) = setup(vec![document("1", "d/1.json")]);
        backend.script(MODEL_STATUS, "1", MockReply::json(json!({"trained": true, "training_completed": true})));
        backend.script(
            DOWNLOAD_MODEL,
            "1",
            MockReply::json(json!({"file_name": "adapter.zip", "content": "PK"})),
        );
        load(&dashboard).await;

        let answer = dashboard.test_model("1", "  hi  ").await.unwrap();
        assert_eq!(answer, "echo: hi");

        let dir = std::env::temp_dir().join(format!("tuneboard-download-{}", std::process::id()));
        let path = dashboard.download_model("1", &dir).await.unwrap();
        assert_eq!(path, dir.join("adapter.zip"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"PK".to_vec());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (dashboard, _, store, mut rx) = setup(vec![document("1", "")]);
        let dashboard = dashboard.managing_records(true);

        dashboard.delete_document(&document("1", "")).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(drain(&mut rx)[0].message, "Deleted \"1.pdf\"");
    }
}
