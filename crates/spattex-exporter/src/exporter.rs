//! Trace export entry point.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use spattex_store::{StoreProvider, TableRef, TableStore};
use tokio_util::sync::CancellationToken;

use crate::config::ExporterConfig;
use crate::error::ExportError;
use crate::export::{BatchInserter, ExportReport};
use crate::rows::RowBuilder;

/// Exports OTLP trace requests as rows of one table.
///
/// Holds no per-batch state; a single instance may serve concurrent exports.
#[derive(Debug, Clone)]
pub struct TracesExporter {
    rows: RowBuilder,
    inserter: BatchInserter,
}

impl TracesExporter {
    /// Creates an exporter over `store`, rejecting incomplete configuration.
    pub fn new(config: &ExporterConfig, store: Arc<dyn TableStore>) -> Result<Self, ExportError> {
        config.validate()?;

        tracing::info!(
            table = %config.table_ref(),
            schema_flexible = config.schema_flexible,
            settle_delay = ?config.schema_settle_delay,
            "Traces exporter created"
        );

        Ok(Self {
            rows: RowBuilder::from_config(config),
            inserter: BatchInserter::from_config(store, config),
        })
    }

    /// Creates an exporter with the store backend named in the configuration.
    pub async fn from_config(config: &ExporterConfig) -> Result<Self, ExportError> {
        config.validate()?;
        let provider = StoreProvider::from_config(&config.store).await?;
        Self::new(config, provider.store()?)
    }

    pub fn table(&self) -> &TableRef {
        self.inserter.table()
    }

    /// Flattens `request` into rows and inserts them as one batch.
    ///
    /// A request without spans succeeds without contacting the store.
    pub async fn export_traces(
        &self,
        request: &ExportTraceServiceRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportReport, ExportError> {
        let rows = self.rows.build(request);
        if rows.is_empty() {
            tracing::debug!(table = %self.table(), "No spans to export");
        }
        self.inserter.export(&rows, cancel).await
    }
}
