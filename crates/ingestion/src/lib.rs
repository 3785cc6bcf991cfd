//! AidBoard bulk import
//!
//! Loads project rows from CSV or spreadsheet exports into the dashboard
//! database. The flow is:
//! 1. [`source`] opens the file and validates the header row
//! 2. [`normalizer`] turns each raw row into typed project fields
//! 3. [`pipeline`] writes every row in its own transaction
//! 4. [`report`] collects counts and per-row problems

pub mod cli;
pub mod columns;
pub mod errors;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod source;

pub use errors::IngestionError;
pub use pipeline::{ImportOptions, ImportPipeline};
pub use report::{ImportReport, RowError, Severity};
pub use source::{SourceFormat, TabularSource};
