//! Data model shared by the clients and the reconciler
//!
//! Documents are owned by the Document Store; status records are owned by
//! the Training Backend. The client only ever holds cached copies.

mod dataset;
mod document;
mod status;

pub use dataset::AlpacaRecord;
pub use document::{Document, NewDocument};
pub use status::{
    clamp_progress, progress_or, ModelStatus, StartTrainingResponse, TrainingState,
    TrainingStatus, TRAINING_IN_PROGRESS_MESSAGE,
};
