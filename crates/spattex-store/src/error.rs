use thiserror::Error;

/// Substring the store uses in free-form insert errors for missing columns.
const UNKNOWN_FIELD_MARKER: &str = "no such field";

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row carried a field the table schema does not (yet) define.
    #[error("no such field: {field}")]
    UnknownField { field: String },

    /// The schema changed since the version token was read.
    #[error("schema version conflict: expected {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    /// The store refused a schema change or a value it cannot represent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A row value does not fit its column, or a required column is absent.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means a row referenced a field missing from the schema.
    ///
    /// [`StoreError::UnknownField`] is the structured signal. Backends that can
    /// only surface free-form text are matched on the store's message as a
    /// fallback; everything else is not an unknown-field condition.
    pub fn is_unknown_field(&self) -> bool {
        match self {
            Self::UnknownField { .. } => true,
            Self::Backend(message) => message.to_lowercase().contains(UNKNOWN_FIELD_MARKER),
            _ => false,
        }
    }

    /// Whether the outer batch-retry layer may reasonably re-drive the call.
    ///
    /// Unknown-field errors are never transient, whichever way the store
    /// reports them.
    pub fn is_transient(&self) -> bool {
        if self.is_unknown_field() {
            return false;
        }
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::RateLimited(_) | Self::Backend(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
