//! Status reconciler actor
//!
//! One task owns the [`StatusStore`] and the cached document list. It is
//! driven by:
//! 1. Commands from any number of [`ReconcilerHandle`]s
//! 2. Completions of the network requests it spawned
//! 3. A single repeating poll timer
//!
//! Requests run concurrently; their results are applied one at a time in
//! arrival order, so the latest response wins. Results arriving after
//! shutdown are dropped with the event channel.

use crate::notify::{emit, Notification, NotificationSink};
use crate::state::{StatusStore, Transition};
use crate::view::ReconciledView;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tuneboard_common::config::PollingConfig;
use tuneboard_common::errors::{AppError, Result};
use tuneboard_common::metrics;
use tuneboard_common::models::{Document, ModelStatus, StartTrainingResponse, TrainingStatus};
use tuneboard_common::{DocumentStore, TrainingBackend};

/// A document together with its reconciled view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    pub document: Document,
    pub view: ReconciledView,
}

/// Result of asking for training to start
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The backend accepted the request
    Started(ReconciledView),
    /// Nothing to do, the model is trained
    AlreadyTrained,
    /// An attempt is already running or being requested
    InProgress(ReconciledView),
}

enum Command {
    RefreshModelStatus {
        file_id: String,
    },
    PollTrainingStatus {
        file_id: String,
    },
    FetchDocuments,
    StartTraining {
        document: Document,
        reply: oneshot::Sender<Result<StartOutcome>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<DashboardRow>>,
    },
    View {
        file_id: String,
        reply: oneshot::Sender<Option<ReconciledView>>,
    },
    Quiesce {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
enum Request {
    ModelStatus(String),
    TrainingStatus(String),
    Documents,
}

enum Event {
    Due(Request),
    ModelStatus {
        file_id: String,
        result: Result<ModelStatus>,
    },
    TrainingStatus {
        file_id: String,
        result: Result<TrainingStatus>,
    },
    Documents(Result<Vec<Document>>),
    TrainingStarted {
        document: Document,
        result: Result<StartTrainingResponse>,
        reply: oneshot::Sender<Result<StartOutcome>>,
    },
}

/// Cloneable handle to a running reconciler.
///
/// The reconciler stops when [`shutdown`](Self::shutdown) is called or the
/// last handle is dropped.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ReconcilerHandle {
    /// Re-fetch the model status of a file
    pub fn refresh_model_status(&self, file_id: impl Into<String>) {
        self.send(Command::RefreshModelStatus {
            file_id: file_id.into(),
        });
    }

    /// Re-fetch the training status of a file
    pub fn poll_training_status(&self, file_id: impl Into<String>) {
        self.send(Command::PollTrainingStatus {
            file_id: file_id.into(),
        });
    }

    /// Reload the document list, then refresh each file's model status
    pub fn fetch_documents(&self) {
        self.send(Command::FetchDocuments);
    }

    /// Ask the backend to train a model for `document`
    pub async fn start_training(&self, document: Document) -> Result<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartTraining { document, reply });
        rx.await.map_err(|_| stopped())?
    }

    /// Every cached document with its view, newest first
    pub async fn snapshot(&self) -> Result<Vec<DashboardRow>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply });
        rx.await.map_err(|_| stopped())
    }

    /// View of one cached document
    pub async fn view(&self, file_id: impl Into<String>) -> Result<Option<ReconciledView>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::View {
            file_id: file_id.into(),
            reply,
        });
        rx.await.map_err(|_| stopped())
    }

    /// Wait until no request is scheduled or in flight
    pub async fn quiesce(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Quiesce { reply });
        rx.await.map_err(|_| stopped())
    }

    /// Stop the reconciler; results still in flight are discarded
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Reconciler already stopped");
        }
    }
}

fn stopped() -> AppError {
    AppError::Internal {
        message: "reconciler stopped".to_string(),
    }
}

/// The actor owning all per-file status
pub struct Reconciler {
    backend: Arc<dyn TrainingBackend>,
    store: Arc<dyn DocumentStore>,
    sink: Arc<dyn NotificationSink>,
    config: PollingConfig,
    statuses: StatusStore,
    documents: Vec<Document>,
    starting: HashSet<String>,
    pending: usize,
    idle_waiters: Vec<oneshot::Sender<()>>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Reconciler {
    /// Start the reconciler on the current runtime
    pub fn spawn(
        backend: Arc<dyn TrainingBackend>,
        store: Arc<dyn DocumentStore>,
        sink: Arc<dyn NotificationSink>,
        config: PollingConfig,
    ) -> (ReconcilerHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let reconciler = Self {
            backend,
            store,
            sink,
            config,
            statuses: StatusStore::new(),
            documents: Vec::new(),
            starting: HashSet::new(),
            pending: 0,
            idle_waiters: Vec::new(),
            commands,
            events_tx,
            events,
        };

        let task = tokio::spawn(reconciler.run());
        (ReconcilerHandle { commands: commands_tx }, task)
    }

    async fn run(mut self) {
        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.config.interval_ms, "Reconciler started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = ticker.tick() => self.poll_active(),
            }
        }

        info!(pending = self.pending, "Reconciler stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RefreshModelStatus { file_id } => self.dispatch(Request::ModelStatus(file_id)),
            Command::PollTrainingStatus { file_id } => self.dispatch(Request::TrainingStatus(file_id)),
            Command::FetchDocuments => self.dispatch(Request::Documents),
            Command::StartTraining { document, reply } => self.start_training(document, reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.rows());
            }
            Command::View { file_id, reply } => {
                let view = self
                    .documents
                    .iter()
                    .find(|d| d.id == file_id)
                    .map(|d| ReconciledView::derive(d, self.statuses.get(&d.id)));
                let _ = reply.send(view);
            }
            Command::Quiesce { reply } => {
                if self.pending == 0 {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Due(request) => {
                self.dispatch(request);
            }
            Event::ModelStatus { file_id, result } => match result {
                Ok(status) => {
                    metrics::record_poll("model", true);
                    let transition = self.statuses.apply_model_status(&file_id, status);
                    self.on_transition(transition);
                }
                Err(e) => {
                    metrics::record_poll("model", false);
                    warn!(file_id = %file_id, error = %e, code = e.code().as_code(), "Failed to check model status");
                    self.statuses.apply_model_error(&file_id);
                }
            },
            Event::TrainingStatus { file_id, result } => match result {
                Ok(status) => {
                    metrics::record_poll("training", true);
                    debug!(
                        file_id = %file_id,
                        status = %status.status,
                        progress = status.progress,
                        "Training status"
                    );
                    let transition = self.statuses.apply_training_status(&file_id, status);
                    self.on_transition(transition);
                }
                Err(e) => {
                    metrics::record_poll("training", false);
                    warn!(file_id = %file_id, error = %e, code = e.code().as_code(), "Failed to poll training status");
                }
            },
            Event::Documents(result) => match result {
                Ok(mut documents) => {
                    documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    self.statuses
                        .retain_files(documents.iter().map(|d| d.id.as_str()));
                    info!(count = documents.len(), "Documents loaded");

                    let stagger = self.config.stagger();
                    let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
                    self.documents = documents;
                    for (index, file_id) in ids.into_iter().enumerate() {
                        self.schedule(stagger * index as u32, Request::ModelStatus(file_id));
                    }
                }
                Err(e) => error!(error = %e, code = e.code().as_code(), "Failed to fetch documents"),
            },
            Event::TrainingStarted {
                document,
                result,
                reply,
            } => {
                self.starting.remove(&document.id);
                let _ = reply.send(self.training_started(&document, result));
            }
        }

        self.settle();
    }

    fn start_training(&mut self, document: Document, reply: oneshot::Sender<Result<StartOutcome>>) {
        if !document.has_dataset() {
            emit(
                self.sink.as_ref(),
                Notification::warning(
                    "No Dataset Available",
                    format!(
                        "No dataset found for \"{}\". Please generate a dataset first using the Create button.",
                        document.file_name
                    ),
                ),
            );
            let _ = reply.send(Err(AppError::NoDataset {
                file_name: document.file_name,
            }));
            return;
        }

        let view = ReconciledView::derive(&document, self.statuses.get(&document.id));
        if view.is_trained {
            emit(
                self.sink.as_ref(),
                Notification::info(
                    "Model Already Trained",
                    "This model has already been trained successfully. You can test it now!",
                ),
            );
            let _ = reply.send(Ok(StartOutcome::AlreadyTrained));
            return;
        }
        if view.is_training || self.starting.contains(&document.id) {
            let _ = reply.send(Ok(StartOutcome::InProgress(view)));
            return;
        }

        info!(file_id = %document.id, file_name = %document.file_name, "Starting training");
        self.starting.insert(document.id.clone());
        self.pending += 1;

        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = backend.start_training(&document.id).await;
            let _ = events.send(Event::TrainingStarted {
                document,
                result,
                reply,
            });
        });
    }

    fn training_started(
        &mut self,
        document: &Document,
        result: Result<StartTrainingResponse>,
    ) -> Result<StartOutcome> {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!(file_id = %document.id, error = %e, code = e.code().as_code(), "Failed to start training");
                let message = match &e {
                    AppError::Backend { message } => message.clone(),
                    _ => "Failed to start training. Please try again.".to_string(),
                };
                emit(self.sink.as_ref(), Notification::error("Training Failed", message));
                return Err(e);
            }
        };

        self.statuses
            .mark_training_started(&document.id, &response, self.config.start_progress);
        self.schedule(
            self.config.first_poll_delay(),
            Request::TrainingStatus(document.id.clone()),
        );

        emit(
            self.sink.as_ref(),
            Notification::info(
                "Training Started",
                format!(
                    "Training has started for \"{}\". This may take several minutes.",
                    document.file_name
                ),
            ),
        );

        Ok(StartOutcome::Started(ReconciledView::derive(
            document,
            self.statuses.get(&document.id),
        )))
    }

    fn on_transition(&mut self, transition: Option<Transition>) {
        match transition {
            Some(Transition::Completed { file_id }) => {
                metrics::record_transition("completed");
                info!(file_id = %file_id, "Training completed");

                if let Some(document) = self.documents.iter().find(|d| d.id == file_id) {
                    let message = format!(
                        "Training for \"{}\" completed successfully. You can now test the model or download it.",
                        document.file_name
                    );
                    emit(self.sink.as_ref(), Notification::success("Training Completed!", message));
                }
                self.dispatch(Request::Documents);
            }
            Some(Transition::Failed { file_id, reason }) => {
                metrics::record_transition("failed");
                warn!(file_id = %file_id, reason = %reason, "Training failed");

                let name = self
                    .documents
                    .iter()
                    .find(|d| d.id == file_id)
                    .map(|d| d.file_name.clone())
                    .unwrap_or_else(|| file_id.clone());
                emit(
                    self.sink.as_ref(),
                    Notification::error("Training Failed", format!("Training for \"{}\" failed: {}", name, reason)),
                );
            }
            None => {}
        }
    }

    /// Timer tick: follow every file that is training
    fn poll_active(&mut self) {
        for file_id in self.statuses.active_training() {
            self.dispatch(Request::TrainingStatus(file_id));
        }
        for file_id in self.statuses.model_in_progress() {
            self.dispatch(Request::ModelStatus(file_id));
        }
    }

    /// Issue `request` after `delay`
    fn schedule(&mut self, delay: Duration, request: Request) {
        if delay.is_zero() {
            self.dispatch(request);
            return;
        }

        self.pending += 1;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Due(request));
        });
    }

    /// Issue `request` now
    fn dispatch(&mut self, request: Request) {
        self.pending += 1;
        metrics::record_in_flight(self.pending);

        let events = self.events_tx.clone();
        match request {
            Request::ModelStatus(file_id) => {
                let backend = self.backend.clone();
                tokio::spawn(async move {
                    let result = backend.model_status(&file_id).await;
                    let _ = events.send(Event::ModelStatus { file_id, result });
                });
            }
            Request::TrainingStatus(file_id) => {
                let backend = self.backend.clone();
                tokio::spawn(async move {
                    let result = backend.training_status(&file_id).await;
                    let _ = events.send(Event::TrainingStatus { file_id, result });
                });
            }
            Request::Documents => {
                let store = self.store.clone();
                tokio::spawn(async move {
                    let result = store.list().await;
                    let _ = events.send(Event::Documents(result));
                });
            }
        }
    }

    /// One event was applied: release its pending slot
    fn settle(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        metrics::record_in_flight(self.pending);

        if self.pending == 0 {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn rows(&self) -> Vec<DashboardRow> {
        self.documents
            .iter()
            .map(|document| DashboardRow {
                document: document.clone(),
                view: ReconciledView::derive(document, self.statuses.get(&document.id)),
            })
            .collect()
    }
}
