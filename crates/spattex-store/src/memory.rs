//! In-memory table store for development and tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::TableStore;
use crate::types::{FieldMode, FieldSchema, Row, SchemaVersion, TableRef, TableSchema};

/// A store capability, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Describe,
    Alter,
    Insert,
}

/// One recorded call against a [`MemoryStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Describe { table: TableRef },
    Alter { table: TableRef, added: Vec<String> },
    Insert { table: TableRef, rows: usize },
}

#[derive(Debug, Clone)]
struct PendingField {
    field: FieldSchema,
    visible_at: Instant,
}

#[derive(Debug, Clone)]
struct TableState {
    fields: Vec<FieldSchema>,
    version: SchemaVersion,
    /// Fields already described by the schema but not yet accepted by inserts.
    pending: Vec<PendingField>,
    rows: Vec<Row>,
}

impl TableState {
    fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            version: fresh_version(),
            pending: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn snapshot(&self) -> TableSchema {
        TableSchema {
            fields: self.fields.clone(),
            version: self.version.clone(),
        }
    }

    fn promote_visible(&mut self, now: Instant) {
        self.pending.retain(|p| p.visible_at > now);
    }

    fn insertable_field(&self, name: &str) -> Option<&FieldSchema> {
        if self.pending.iter().any(|p| p.field.name == name) {
            return None;
        }
        self.fields.iter().find(|f| f.name == name)
    }
}

fn fresh_version() -> SchemaVersion {
    SchemaVersion::new(Uuid::new_v4().to_string())
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableRef, TableState>,
    faults: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: Vec<StoreCall>,
}

impl Inner {
    fn take_fault(&mut self, op: StoreOp) -> Option<StoreError> {
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn table_mut(&mut self, table: &TableRef) -> Result<&mut TableState, StoreError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// In-memory table store.
///
/// Behaves like a remote store with:
/// - Version-guarded, append-only schema alterations
/// - All-or-nothing batch inserts validated against the schema
/// - Optional propagation delay before altered fields accept inserts
/// - Scripted faults per capability and a log of every call
///
/// Clones share the same underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    propagation_delay: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays the point at which newly added fields accept inserts.
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    /// Creates (or replaces) a table with the given schema.
    pub async fn create_table(&self, table: &TableRef, fields: Vec<FieldSchema>) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table.clone(), TableState::new(fields));
    }

    /// Appends fields as another writer would, bumping the version immediately.
    pub async fn add_fields_externally(
        &self,
        table: &TableRef,
        fields: Vec<FieldSchema>,
    ) -> Result<SchemaVersion, StoreError> {
        let mut inner = self.inner.lock().await;
        let state = inner.table_mut(table)?;
        state.fields.extend(fields);
        state.version = fresh_version();
        Ok(state.version.clone())
    }

    /// Makes the next call to `op` fail with `error`. Faults queue up per capability.
    pub async fn fail_next(&self, op: StoreOp, error: StoreError) {
        let mut inner = self.inner.lock().await;
        inner.faults.entry(op).or_default().push_back(error);
    }

    pub async fn schema(&self, table: &TableRef) -> Option<TableSchema> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(TableState::snapshot)
    }

    pub async fn rows(&self, table: &TableRef) -> Vec<Row> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn count(&self, op: StoreOp) -> usize {
        let inner = self.inner.lock().await;
        inner
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    (op, call),
                    (StoreOp::Describe, StoreCall::Describe { .. })
                        | (StoreOp::Alter, StoreCall::Alter { .. })
                        | (StoreOp::Insert, StoreCall::Insert { .. })
                )
            })
            .count()
    }
}

/// Checks that `proposed` keeps every existing field unchanged and only adds nullable ones.
fn validate_alteration(
    existing: &[FieldSchema],
    proposed: &[FieldSchema],
) -> Result<Vec<FieldSchema>, StoreError> {
    let mut seen = HashSet::with_capacity(proposed.len());
    for field in proposed {
        if field.name.is_empty() {
            return Err(StoreError::InvalidSchema("empty field name".to_owned()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(StoreError::InvalidSchema(format!(
                "duplicate field: {}",
                field.name
            )));
        }
    }

    for current in existing {
        match proposed.iter().find(|f| f.name == current.name) {
            Some(f) if f == current => {}
            Some(f) => {
                return Err(StoreError::InvalidSchema(format!(
                    "field {} cannot change from {} to {}",
                    current.name, current.field_type, f.field_type
                )))
            }
            None => {
                return Err(StoreError::InvalidSchema(format!(
                    "field {} cannot be removed",
                    current.name
                )))
            }
        }
    }

    let added: Vec<FieldSchema> = proposed
        .iter()
        .filter(|f| !existing.iter().any(|e| e.name == f.name))
        .cloned()
        .collect();

    if let Some(required) = added.iter().find(|f| f.mode == FieldMode::Required) {
        return Err(StoreError::InvalidSchema(format!(
            "new field {} must be nullable",
            required.name
        )));
    }

    Ok(added)
}

fn validate_row(state: &TableState, row: &Row) -> Result<(), StoreError> {
    for (name, value) in row.iter() {
        let field = state
            .insertable_field(name)
            .ok_or_else(|| StoreError::UnknownField {
                field: name.to_owned(),
            })?;
        if field.field_type.value_kind() != value.kind() {
            return Err(StoreError::InvalidRow(format!(
                "field {} of type {} cannot hold a {} value",
                name,
                field.field_type,
                value.kind()
            )));
        }
    }

    if let Some(missing) = state
        .fields
        .iter()
        .find(|f| f.mode == FieldMode::Required && !row.contains_field(&f.name))
    {
        return Err(StoreError::InvalidRow(format!(
            "required field {} is missing",
            missing.name
        )));
    }

    Ok(())
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn describe_schema(&self, table: &TableRef) -> Result<TableSchema, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Describe {
            table: table.clone(),
        });
        if let Some(err) = inner.take_fault(StoreOp::Describe) {
            return Err(err);
        }

        Ok(inner.table_mut(table)?.snapshot())
    }

    async fn alter_schema(
        &self,
        table: &TableRef,
        fields: Vec<FieldSchema>,
        version: &SchemaVersion,
    ) -> Result<TableSchema, StoreError> {
        let mut inner = self.inner.lock().await;
        let names: Vec<String> = {
            let existing = inner.tables.get(table).map(|t| t.fields.as_slice());
            fields
                .iter()
                .filter(|f| existing.map_or(true, |e| !e.iter().any(|x| x.name == f.name)))
                .map(|f| f.name.clone())
                .collect()
        };
        inner.calls.push(StoreCall::Alter {
            table: table.clone(),
            added: names,
        });
        if let Some(err) = inner.take_fault(StoreOp::Alter) {
            return Err(err);
        }

        let propagation_delay = self.propagation_delay;
        let state = inner.table_mut(table)?;

        if state.version != *version {
            return Err(StoreError::Conflict {
                expected: version.to_string(),
                actual: state.version.to_string(),
            });
        }

        let added = validate_alteration(&state.fields, &fields)?;
        let visible_at = Instant::now() + propagation_delay;
        if !propagation_delay.is_zero() {
            state
                .pending
                .extend(added.iter().cloned().map(|field| PendingField { field, visible_at }));
        }
        state.fields = fields;
        state.version = fresh_version();

        tracing::debug!(
            table = %table,
            added = added.len(),
            version = %state.version,
            "Memory table schema altered"
        );

        Ok(state.snapshot())
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Row]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(StoreCall::Insert {
            table: table.clone(),
            rows: rows.len(),
        });
        if let Some(err) = inner.take_fault(StoreOp::Insert) {
            return Err(err);
        }

        let state = inner.table_mut(table)?;
        state.promote_visible(Instant::now());

        for row in rows {
            validate_row(state, row)?;
        }
        state.rows.extend(rows.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldType, Value};

    fn table() -> TableRef {
        TableRef::new("proj", "otel", "spans")
    }

    async fn store_with_name_field() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table(&table(), vec![FieldSchema::nullable("name", FieldType::String)])
            .await;
        store
    }

    fn row(fields: &[(&str, Value)]) -> Row {
        fields.iter().cloned().collect()
    }

    #[tokio::test]
    async fn insert_known_fields() {
        let store = store_with_name_field().await;
        store
            .insert_rows(&table(), &[row(&[("name", Value::from("span1"))])])
            .await
            .unwrap();

        assert_eq!(store.rows(&table()).await.len(), 1);
    }

    #[tokio::test]
    async fn insert_is_all_or_nothing() {
        let store = store_with_name_field().await;
        let rows = vec![
            row(&[("name", Value::from("span1"))]),
            row(&[("name", Value::from("span2")), ("http_route", Value::from("/"))]),
        ];

        let err = store.insert_rows(&table(), &rows).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { ref field } if field == "http_route"));
        assert!(store.rows(&table()).await.is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_mismatched_kind() {
        let store = store_with_name_field().await;
        let err = store
            .insert_rows(&table(), &[row(&[("name", Value::Int(7))])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow(_)));
    }

    #[tokio::test]
    async fn alter_requires_current_version() {
        let store = store_with_name_field().await;
        let stale = store.describe_schema(&table()).await.unwrap();

        store
            .add_fields_externally(&table(), vec![FieldSchema::nullable("a", FieldType::Integer)])
            .await
            .unwrap();

        let mut fields = stale.fields.clone();
        fields.push(FieldSchema::nullable("b", FieldType::Integer));
        let err = store
            .alter_schema(&table(), fields, &stale.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let schema = store.schema(&table()).await.unwrap();
        assert!(schema.field("a").is_some());
        assert!(schema.field("b").is_none());
    }

    #[tokio::test]
    async fn alter_is_append_only() {
        let store = store_with_name_field().await;
        let current = store.describe_schema(&table()).await.unwrap();

        let retyped = vec![FieldSchema::nullable("name", FieldType::Bytes)];
        let err = store
            .alter_schema(&table(), retyped, &current.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));

        let err = store
            .alter_schema(&table(), Vec::new(), &current.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));
    }

    #[tokio::test]
    async fn alter_rejects_required_additions() {
        let store = store_with_name_field().await;
        let current = store.describe_schema(&table()).await.unwrap();

        let mut fields = current.fields.clone();
        fields.push(FieldSchema::required("status", FieldType::Integer));
        let err = store
            .alter_schema(&table(), fields, &current.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn added_fields_become_insertable_after_propagation() {
        let store = MemoryStore::new().with_propagation_delay(Duration::from_secs(30));
        store
            .create_table(&table(), vec![FieldSchema::nullable("name", FieldType::String)])
            .await;
        let current = store.describe_schema(&table()).await.unwrap();

        let mut fields = current.fields.clone();
        fields.push(FieldSchema::nullable("int_key", FieldType::Integer));
        let altered = store
            .alter_schema(&table(), fields, &current.version)
            .await
            .unwrap();
        assert_ne!(altered.version, current.version);
        assert!(altered.field("int_key").is_some());

        let rows = vec![row(&[("int_key", Value::Int(41))])];
        let err = store.insert_rows(&table(), &rows).await.unwrap_err();
        assert!(err.is_unknown_field());

        tokio::time::sleep(Duration::from_secs(31)).await;
        store.insert_rows(&table(), &rows).await.unwrap();
    }

    #[tokio::test]
    async fn injected_faults_fire_once_in_order() {
        let store = store_with_name_field().await;
        store.fail_next(StoreOp::Describe, StoreError::Timeout).await;
        store
            .fail_next(StoreOp::Describe, StoreError::Connection("reset".to_owned()))
            .await;

        assert!(matches!(
            store.describe_schema(&table()).await,
            Err(StoreError::Timeout)
        ));
        assert!(matches!(
            store.describe_schema(&table()).await,
            Err(StoreError::Connection(_))
        ));
        assert!(store.describe_schema(&table()).await.is_ok());
        assert_eq!(store.count(StoreOp::Describe).await, 3);
    }

    #[tokio::test]
    async fn unknown_table() {
        let store = MemoryStore::new();
        let err = store.describe_schema(&table()).await.unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
    }
}
