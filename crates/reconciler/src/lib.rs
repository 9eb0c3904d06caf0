//! Tuneboard Status Reconciler
//!
//! Keeps, per uploaded document, one consistent view of "dataset present",
//! "model trained" and "training in progress" built from two independently
//! polled backend endpoints, and fires notifications exactly once per
//! terminal training transition.
//!
//! - [`state`]: the single-writer status table and its merge rules
//! - [`view`]: phase, labels and action availability derived from it
//! - [`reconciler`]: the actor owning the table, its handle and poll loop
//! - [`actions`]: user-initiated dashboard actions
//! - [`notify`]: notification records and sinks

pub mod actions;
pub mod notify;
pub mod reconciler;
pub mod state;
pub mod view;

pub use actions::{Dashboard, DatasetOutcome, UploadSummary};
pub use notify::{ChannelSink, Notification, NotificationLevel, NotificationSink, TracingSink};
pub use reconciler::{DashboardRow, Reconciler, ReconcilerHandle, StartOutcome};
pub use state::{FileStatus, StatusStore, Transition};
pub use view::{Actions, FilePhase, ReconciledView};
