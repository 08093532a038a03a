//! Spattex binary entry point.
//!
//! Reads one OTLP/JSON trace request from stdin and exports it to the
//! configured table store:
//!
//! ```text
//! spattex [config.toml] < traces.json
//! ```

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use spattex_exporter::{ExporterConfig, TracesExporter};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spattex_exporter=info,spattex_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ExporterConfig::load_from(path)?,
        None => ExporterConfig::load()?,
    };
    tracing::info!(
        table = %config.table_ref(),
        schema_flexible = config.schema_flexible,
        "Configuration loaded"
    );

    let exporter = TracesExporter::from_config(&config).await?;

    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;
    let request: ExportTraceServiceRequest = serde_json::from_slice(&input)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match exporter.export_traces(&request, &cancel).await {
        Ok(report) => {
            tracing::info!(
                rows = report.rows,
                attempts = report.attempts,
                schema_updated = report.schema_updated,
                "Export complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "Export failed");
            Err(e.into())
        }
    }
}

/// Cancel the in-flight export on Ctrl+C.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Received Ctrl+C, cancelling export");
    cancel.cancel();
}
