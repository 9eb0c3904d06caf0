//! Tuneboard Common Library
//!
//! Shared code for the Tuneboard crates including:
//! - Document, dataset and status records
//! - Training Backend client abstraction
//! - Document Store and Auth Provider clients
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use backend::TrainingBackend;
pub use store::DocumentStore;
pub use auth::AuthProvider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
