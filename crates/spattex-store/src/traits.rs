use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{FieldSchema, Row, SchemaVersion, TableRef, TableSchema};

/// Backend trait for a schema-constrained tabular store.
///
/// Implementations must be safe to share between concurrent exports; the
/// exporter holds one long-lived handle behind an `Arc`.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetches the current schema and its change token.
    async fn describe_schema(&self, table: &TableRef) -> Result<TableSchema, StoreError>;

    /// Replaces the schema with `fields`, provided the table is still at `version`.
    ///
    /// `fields` is the full field set: every existing field followed by the
    /// additions. A stale `version` must fail with [`StoreError::Conflict`]
    /// rather than overwrite a concurrent change.
    async fn alter_schema(
        &self,
        table: &TableRef,
        fields: Vec<FieldSchema>,
        version: &SchemaVersion,
    ) -> Result<TableSchema, StoreError>;

    /// Inserts a batch of rows.
    ///
    /// If any row is rejected the whole batch must be rejected, with nothing
    /// applied.
    async fn insert_rows(&self, table: &TableRef, rows: &[Row]) -> Result<(), StoreError>;

    /// Whether a failed insert may have applied some rows.
    ///
    /// Backends that cannot guarantee all-or-nothing inserts return `true`,
    /// which disables the schema-triggered resubmission.
    fn partial_failure_possible(&self) -> bool {
        false
    }
}
