//! Reconciliation of a row batch with the remote table schema.
//!
//! The synchroniser reads a fresh schema snapshot for every call, stages a
//! nullable field for each name the table does not know yet, and submits a
//! single append-only alteration guarded by the snapshot's version token.
//! Existing fields are never retyped; a value whose kind disagrees with its
//! column is only logged.

use std::collections::HashMap;
use std::time::Duration;

use spattex_store::{
    FieldSchema, FieldType, Row, SchemaVersion, TableRef, TableStore, ValueKind,
};
use tokio_util::sync::CancellationToken;

use crate::config::{ExporterConfig, DEFAULT_PARTITION_FIELD, DEFAULT_REQUEST_TIMEOUT};
use crate::error::SyncError;
use crate::remote::{bounded, CallError};

/// Result of a successful synchronisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every field in the batch already exists; the store was not touched.
    UpToDate,
    /// The schema was extended.
    Updated {
        /// Fields appended by this call, in first-seen order.
        added: Vec<FieldSchema>,
        /// Version token of the altered schema.
        version: SchemaVersion,
    },
}

#[derive(Debug, Clone)]
pub struct SchemaSynchronizer {
    partition_field: String,
    request_timeout: Duration,
}

impl Default for SchemaSynchronizer {
    fn default() -> Self {
        Self {
            partition_field: DEFAULT_PARTITION_FIELD.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SchemaSynchronizer {
    pub fn new(partition_field: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            partition_field: partition_field.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &ExporterConfig) -> Self {
        Self::new(&config.partition_field, config.request_timeout)
    }

    /// Column type for a field first seen with a value of `kind`.
    ///
    /// The partition field is always a timestamp. Lists, maps and nulls have
    /// no column type.
    pub fn infer_field_type(&self, name: &str, kind: ValueKind) -> Option<FieldType> {
        if name == self.partition_field {
            return Some(FieldType::Timestamp);
        }
        match kind {
            ValueKind::Bool => Some(FieldType::Boolean),
            ValueKind::Int => Some(FieldType::Integer),
            ValueKind::Float => Some(FieldType::Float),
            ValueKind::String => Some(FieldType::String),
            ValueKind::Bytes => Some(FieldType::Bytes),
            ValueKind::Null | ValueKind::List | ValueKind::Map => None,
        }
    }

    /// Bring the table schema up to date with the fields used by `rows`.
    pub async fn synchronize(
        &self,
        store: &dyn TableStore,
        table: &TableRef,
        rows: &[Row],
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let schema = bounded(self.request_timeout, cancel, store.describe_schema(table))
            .await
            .map_err(|e| match e {
                CallError::Cancelled => SyncError::Cancelled,
                CallError::Store(source) => SyncError::Describe {
                    table: table.clone(),
                    source,
                },
            })?;

        let mut known: HashMap<&str, ValueKind> = schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.field_type.value_kind()))
            .collect();
        let mut staged: Vec<FieldSchema> = Vec::new();

        for row in rows {
            for (name, value) in row.iter() {
                let kind = value.kind();
                if let Some(expected) = known.get(name) {
                    if *expected != kind {
                        tracing::warn!(
                            table = %table,
                            field = %name,
                            expected = %expected,
                            actual = %kind,
                            "Field type conflicts with table schema"
                        );
                    }
                    continue;
                }

                let field_type = self.infer_field_type(name, kind).ok_or_else(|| {
                    SyncError::UnrepresentableField {
                        table: table.clone(),
                        field: name.to_owned(),
                        kind,
                    }
                })?;
                staged.push(FieldSchema::nullable(name, field_type));
                known.insert(name, kind);
            }
        }

        if staged.is_empty() {
            tracing::debug!(table = %table, "Table schema already up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        for field in &staged {
            tracing::info!(
                table = %table,
                field = %field.name,
                field_type = %field.field_type,
                "Adding field to table schema"
            );
        }

        let mut fields = schema.fields.clone();
        fields.extend(staged.iter().cloned());

        let altered = bounded(
            self.request_timeout,
            cancel,
            store.alter_schema(table, fields, &schema.version),
        )
        .await
        .map_err(|e| match e {
            CallError::Cancelled => SyncError::Cancelled,
            CallError::Store(source) => SyncError::Alter {
                table: table.clone(),
                source,
            },
        })?;

        tracing::info!(
            table = %table,
            added = staged.len(),
            version = %altered.version,
            "Table schema updated"
        );

        Ok(SyncOutcome::Updated {
            added: staged,
            version: altered.version,
        })
    }
}
