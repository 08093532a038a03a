//! Batch insertion with a single schema-driven resubmission.
//!
//! ```text
//! Inserting(First) ──ok──────────────────────────────► Succeeded
//!        │ unknown field, flexible schema
//!        ▼
//! SchemaRetryPending ──sync, settle──► Inserting(SchemaRetry) ──ok──► Succeeded
//!                                             │ any error
//!                                             ▼
//!                                           Failed
//! ```
//!
//! Every other failure of the first attempt goes straight to `Failed`.

use std::sync::Arc;
use std::time::Duration;

use spattex_store::{Row, StoreError, TableRef, TableStore};
use tokio_util::sync::CancellationToken;

use crate::config::{ExporterConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCHEMA_SETTLE_DELAY};
use crate::error::{ExportError, SyncError};
use crate::remote::{bounded, settle, CallError};
use crate::schema::{SchemaSynchronizer, SyncOutcome};

/// Summary of a successful batch export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    /// Rows written.
    pub rows: usize,
    /// Insert calls made (0 for an empty batch, at most 2).
    pub attempts: u32,
    /// Whether the table schema was altered along the way.
    pub schema_updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    SchemaRetry,
}

#[derive(Debug)]
enum Phase {
    Inserting(Attempt),
    SchemaRetryPending,
}

/// Submits row batches to one table.
#[derive(Clone)]
pub struct BatchInserter {
    store: Arc<dyn TableStore>,
    table: TableRef,
    schema_flexible: bool,
    settle_delay: Duration,
    request_timeout: Duration,
    synchronizer: SchemaSynchronizer,
}

impl BatchInserter {
    pub fn new(store: Arc<dyn TableStore>, table: TableRef) -> Self {
        Self {
            store,
            table,
            schema_flexible: false,
            settle_delay: DEFAULT_SCHEMA_SETTLE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            synchronizer: SchemaSynchronizer::default(),
        }
    }

    pub fn from_config(store: Arc<dyn TableStore>, config: &ExporterConfig) -> Self {
        Self {
            store,
            table: config.table_ref(),
            schema_flexible: config.schema_flexible,
            settle_delay: config.schema_settle_delay,
            request_timeout: config.request_timeout,
            synchronizer: SchemaSynchronizer::from_config(config),
        }
    }

    pub fn with_schema_flexible(mut self, flexible: bool) -> Self {
        self.schema_flexible = flexible;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Insert `rows`, evolving the schema and resubmitting once if the store
    /// rejects an unknown field and the schema is flexible.
    pub async fn export(
        &self,
        rows: &[Row],
        cancel: &CancellationToken,
    ) -> Result<ExportReport, ExportError> {
        let mut report = ExportReport {
            rows: rows.len(),
            attempts: 0,
            schema_updated: false,
        };
        if rows.is_empty() {
            return Ok(report);
        }

        let mut phase = Phase::Inserting(Attempt::First);
        loop {
            phase = match phase {
                Phase::Inserting(attempt) => {
                    report.attempts += 1;
                    let result = bounded(
                        self.request_timeout,
                        cancel,
                        self.store.insert_rows(&self.table, rows),
                    )
                    .await;

                    match result {
                        Ok(()) => {
                            tracing::debug!(
                                table = %self.table,
                                rows = report.rows,
                                attempts = report.attempts,
                                "Batch inserted"
                            );
                            return Ok(report);
                        }
                        Err(CallError::Cancelled) => return Err(ExportError::Cancelled),
                        Err(CallError::Store(err)) => match attempt {
                            Attempt::First => self.after_first_failure(err)?,
                            Attempt::SchemaRetry => return Err(self.after_retry_failure(err)),
                        },
                    }
                }
                Phase::SchemaRetryPending => {
                    let outcome = self
                        .synchronizer
                        .synchronize(self.store.as_ref(), &self.table, rows, cancel)
                        .await
                        .map_err(|e| self.sync_failed(e))?;
                    report.schema_updated = matches!(outcome, SyncOutcome::Updated { .. });

                    tracing::info!(
                        table = %self.table,
                        delay = ?self.settle_delay,
                        schema_updated = report.schema_updated,
                        "Waiting for schema change to propagate before retrying insert"
                    );
                    if !settle(self.settle_delay, cancel).await {
                        return Err(ExportError::Cancelled);
                    }
                    Phase::Inserting(Attempt::SchemaRetry)
                }
            };
        }
    }

    fn after_first_failure(&self, err: StoreError) -> Result<Phase, ExportError> {
        if !err.is_unknown_field() {
            tracing::error!(table = %self.table, error = %err, "Insert failed");
            return Err(self.insert_failed(err));
        }
        if !self.schema_flexible {
            tracing::error!(
                table = %self.table,
                error = %err,
                "Insert rejected an unknown field and schema updates are disabled"
            );
            return Err(self.insert_failed(err));
        }
        if self.store.partial_failure_possible() {
            tracing::error!(
                table = %self.table,
                error = %err,
                "Store may have accepted part of the batch; not resubmitting"
            );
            return Err(self.insert_failed(err));
        }

        tracing::warn!(
            table = %self.table,
            error = %err,
            "Insert rejected an unknown field; updating table schema"
        );
        Ok(Phase::SchemaRetryPending)
    }

    fn after_retry_failure(&self, err: StoreError) -> ExportError {
        tracing::error!(
            table = %self.table,
            error = %err,
            "Insert failed after schema update"
        );
        if err.is_unknown_field() {
            ExportError::SchemaRetryExhausted {
                table: self.table.clone(),
                source: err,
            }
        } else {
            self.insert_failed(err)
        }
    }

    fn sync_failed(&self, err: SyncError) -> ExportError {
        if matches!(err, SyncError::Cancelled) {
            return ExportError::Cancelled;
        }
        tracing::error!(table = %self.table, error = %err, "Schema update failed");
        ExportError::SchemaSync {
            table: self.table.clone(),
            source: err,
        }
    }

    fn insert_failed(&self, err: StoreError) -> ExportError {
        ExportError::Insert {
            table: self.table.clone(),
            source: err,
        }
    }
}

impl std::fmt::Debug for BatchInserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchInserter")
            .field("table", &self.table)
            .field("schema_flexible", &self.schema_flexible)
            .field("settle_delay", &self.settle_delay)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
