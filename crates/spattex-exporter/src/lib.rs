//! Spattex - span attribute rows exporter.
//!
//! Flattens OTLP trace requests into one row per span and inserts them into a
//! schema-constrained table store. When a batch carries fields the table does
//! not know yet, the exporter can extend the schema and resubmit the batch
//! once.
//!
//! ## Pipeline
//!
//! ```text
//! ExportTraceServiceRequest → RowBuilder → rows → BatchInserter → TableStore
//!                                                      │ unknown field
//!                                                      ▼
//!                                         SchemaSynchronizer → settle → resubmit
//! ```
//!
//! The exporter keeps no state between batches. Retrying a failed batch is up
//! to the caller; [`ExportError::is_retryable`] classifies failures and
//! [`config::RetrySettings`] carries the recommended policy.

pub mod config;
pub mod error;
pub mod export;
pub mod exporter;
pub mod normalize;
mod remote;
pub mod rows;
pub mod schema;

pub use config::ExporterConfig;
pub use error::{ConfigError, ExportError, SyncError};
pub use export::{BatchInserter, ExportReport};
pub use exporter::TracesExporter;
pub use normalize::{normalize_value, sanitize_field_name};
pub use rows::RowBuilder;
pub use schema::{SchemaSynchronizer, SyncOutcome};
