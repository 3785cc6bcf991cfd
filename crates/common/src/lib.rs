//! AidBoard Common Library
//!
//! Shared code for the AidBoard gateway and import tool:
//! - Database models, schema bootstrap and repository
//! - Reference-entity resolution and project writes
//! - Dashboard aggregation and AI summary boundary
//! - Error types and handling
//! - Configuration management
//! - Metrics, tracing and observability

pub mod aggregation;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod summary;
pub mod telemetry;

// Re-export commonly used types
pub use aggregation::AggregationService;
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use summary::{SummaryOutcome, SummaryService};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
