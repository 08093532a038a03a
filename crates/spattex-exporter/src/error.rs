//! Error types for the exporter crate.

use figment::Error as FigmentError;
use spattex_store::{ProviderError, StoreError, TableRef};
use thiserror::Error;

/// Errors raised while loading or validating exporter configuration.
///
/// These are fatal to constructing an exporter and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error from the Figment configuration library (boxed - large type).
    #[error("configuration error: {0}")]
    Figment(Box<FigmentError>),

    /// The specified configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// A required table identifier is empty.
    #[error("{0} required for the table store")]
    MissingTableIdentity(&'static str),

    /// The configuration is invalid or malformed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<FigmentError> for ConfigError {
    fn from(err: FigmentError) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Errors from reconciling the remote schema with a batch of rows.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetching the current schema failed.
    #[error("table metadata for {table}: {source}")]
    Describe {
        /// Table whose schema could not be read.
        table: TableRef,
        /// Underlying store failure.
        source: StoreError,
    },

    /// A new field carries a value kind no column type can hold.
    #[error("field {field} has unsupported value type {kind} for table {table}")]
    UnrepresentableField {
        /// Table being synchronised.
        table: TableRef,
        /// Sanitised field name.
        field: String,
        /// Observed value kind.
        kind: spattex_store::ValueKind,
    },

    /// The store rejected the additive schema change.
    #[error("unable to update schema of {table}: {source}")]
    Alter {
        /// Table whose schema could not be altered.
        table: TableRef,
        /// Underlying store failure.
        source: StoreError,
    },

    /// The caller cancelled while a schema call was in flight.
    #[error("schema synchronisation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the outer batch-retry layer may reasonably re-drive the export.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Describe { source, .. } => source.is_transient(),
            Self::UnrepresentableField { .. } | Self::Alter { .. } | Self::Cancelled => false,
        }
    }
}

/// Errors returned from a batch export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Configuration rejected when constructing the exporter.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store backend could not be created.
    #[error("store provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The insert failed and no schema-driven retry applies.
    #[error("insert into {table} failed: {source}")]
    Insert {
        /// Target table.
        table: TableRef,
        /// Underlying store failure.
        source: StoreError,
    },

    /// The schema could not be brought up to date after an unknown-field error.
    #[error("schema update for {table} failed: {source}")]
    SchemaSync {
        /// Target table.
        table: TableRef,
        /// Synchroniser failure.
        source: SyncError,
    },

    /// The single resubmission after a schema update failed again on an unknown field.
    #[error("insert into {table} still failed after schema update: {source}")]
    SchemaRetryExhausted {
        /// Target table.
        table: TableRef,
        /// Failure of the resubmission.
        source: StoreError,
    },

    /// The caller cancelled the export.
    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Whether the outer batch-retry layer may reasonably re-drive the batch.
    ///
    /// Schema conflicts, unrepresentable fields, configuration problems and a
    /// repeated unknown-field failure are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Insert { source, .. } => source.is_transient(),
            Self::SchemaSync { source, .. } => source.is_retryable(),
            Self::Config(_)
            | Self::Provider(_)
            | Self::SchemaRetryExhausted { .. }
            | Self::Cancelled => false,
        }
    }
}
