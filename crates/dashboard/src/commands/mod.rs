//! Command implementations
//!
//! Every dashboard command runs against a [`Workspace`]: the configured
//! clients, a running reconciler and a notification printer.

pub mod account;
pub mod documents;
pub mod training;

use crate::render;
use crate::session::SessionFile;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tuneboard_common::auth::GoTrueAuth;
use tuneboard_common::backend::HttpTrainingBackend;
use tuneboard_common::config::AppConfig;
use tuneboard_common::models::Document;
use tuneboard_common::store::{MemoryDocumentStore, RestDocumentStore};
use tuneboard_common::{DocumentStore, TrainingBackend};
use tuneboard_reconciler::{ChannelSink, Dashboard, NotificationSink, Reconciler};

/// Clients and background tasks shared by the dashboard commands
pub struct Workspace {
    pub config: Arc<AppConfig>,
    pub dashboard: Dashboard,
    reconciler_task: JoinHandle<()>,
    printer: JoinHandle<()>,
}

impl Workspace {
    /// Connect to the configured services.
    ///
    /// When an Auth Provider is configured a live session is required and
    /// its token is used for the Document Store.
    pub async fn open(config: Arc<AppConfig>) -> Result<Self> {
        let access_token = if config.auth_url().is_some() {
            let session = SessionFile::new(&config.auth.session_file).require().await?;
            Some(session.access_token)
        } else {
            None
        };

        let backend: Arc<dyn TrainingBackend> = Arc::new(HttpTrainingBackend::from_config(&config.backend)?);

        let (store, manage_records): (Arc<dyn DocumentStore>, bool) =
            match RestDocumentStore::from_config(&config.store, config.request_timeout())? {
                Some(store) => {
                    let store = match access_token {
                        Some(token) => store.with_access_token(token),
                        None => store,
                    };
                    (Arc::new(store), false)
                }
                None => {
                    warn!("No document store configured, using an in-memory table");
                    (Arc::new(MemoryDocumentStore::new()), true)
                }
            };

        info!(backend = %config.backend.base_url, "Workspace ready");
        Ok(Self::with_clients(config, backend, store, manage_records))
    }

    /// Start the reconciler and printer over already built clients
    pub fn with_clients(
        config: Arc<AppConfig>,
        backend: Arc<dyn TrainingBackend>,
        store: Arc<dyn DocumentStore>,
        manage_records: bool,
    ) -> Self {
        let (sink, notifications) = ChannelSink::new();
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        let printer = render::spawn_printer(notifications);

        let (handle, reconciler_task) =
            Reconciler::spawn(backend.clone(), store.clone(), sink.clone(), config.polling.clone());
        let dashboard = Dashboard::new(backend, store, handle, sink).managing_records(manage_records);

        Self {
            config,
            dashboard,
            reconciler_task,
            printer,
        }
    }

    /// Load the document list and every model status
    pub async fn load(&self) -> Result<()> {
        let reconciler = self.dashboard.reconciler();
        reconciler.fetch_documents();
        reconciler.quiesce().await?;
        Ok(())
    }

    /// Find a document by id or file name
    pub async fn find(&self, selector: &str) -> Result<Document> {
        let rows = self.dashboard.reconciler().snapshot().await?;
        rows.into_iter()
            .map(|row| row.document)
            .find(|d| d.id == selector || d.file_name == selector)
            .ok_or_else(|| anyhow!("No document matches \"{}\"", selector))
    }

    /// Stop background work and flush pending notifications
    pub async fn close(self) -> Result<()> {
        let Self {
            dashboard,
            reconciler_task,
            printer,
            ..
        } = self;

        dashboard.reconciler().shutdown();
        drop(dashboard);
        reconciler_task.await?;
        printer.await?;
        Ok(())
    }
}

/// Build the Auth Provider client
pub fn auth_client(config: &AppConfig) -> Result<GoTrueAuth> {
    Ok(GoTrueAuth::from_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tuneboard_common::backend::{MockReply, MockTrainingBackend, MODEL_STATUS};

    fn document(id: &str, name: &str) -> Document {
        Document {
            id: id.to_string(),
            file_name: name.to_string(),
            file_size: 1024,
            file_extension: ".pdf".to_string(),
            created_at: Utc::now(),
            file_path: format!("uploads/{}", name),
            alpaca_path: Some(format!("datasets/{}.json", id)),
            trained_model_path: None,
            training_status: None,
        }
    }

    fn workspace(backend: Arc<MockTrainingBackend>) -> Workspace {
        let store = MemoryDocumentStore::with_documents(vec![
            document("1", "notes.pdf"),
            document("2", "manual.pdf"),
        ]);
        Workspace::with_clients(Arc::new(AppConfig::default()), backend, Arc::new(store), true)
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_by_id_or_name() {
        let workspace = workspace(Arc::new(MockTrainingBackend::default()));
        workspace.load().await.unwrap();

        assert_eq!(workspace.find("2").await.unwrap().file_name, "manual.pdf");
        assert_eq!(workspace.find("notes.pdf").await.unwrap().id, "1");
        assert!(workspace.find("missing.pdf").await.is_err());

        workspace.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_refreshes_model_status() {
        let backend = Arc::new(MockTrainingBackend::default());
        backend.script(
            MODEL_STATUS,
            "1",
            MockReply::json(json!({"trained": true, "training_completed": true, "model_path": "models/1"})),
        );

        let workspace = workspace(backend.clone());
        workspace.load().await.unwrap();

        let view = workspace.dashboard.reconciler().view("1").await.unwrap().unwrap();
        assert!(view.is_trained);
        assert_eq!(backend.call_count(MODEL_STATUS), 2);

        workspace.close().await.unwrap();
    }
}
