//! Table store boundary for the spattex exporter.
//!
//! The exporter treats the remote tabular store as an opaque API offering
//! three capabilities, each of which may fail independently:
//!
//! - **describe** the current schema together with its change token
//! - **alter** the schema by appending nullable fields, guarded by that token
//! - **insert** a batch of rows, atomically
//!
//! This crate defines the row and schema types shared across that boundary,
//! the [`TableStore`] trait, and the error taxonomy the exporter classifies.
//!
//! # Backends
//!
//! - **Memory** (`memory` feature): In-memory table for development and tests,
//!   with call recording, fault injection and simulated schema propagation

mod error;
mod traits;
mod types;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "config")]
mod config;

#[cfg(feature = "config")]
mod provider;

pub use error::{ProviderError, StoreError};
pub use traits::TableStore;
pub use types::{
    FieldMode, FieldSchema, FieldType, Row, SchemaVersion, TableRef, TableSchema, Value, ValueKind,
};

#[cfg(feature = "memory")]
pub use memory::{MemoryStore, StoreCall, StoreOp};

#[cfg(feature = "config")]
pub use config::{MemoryTableConfig, SeedField, StoreConfig};

#[cfg(feature = "config")]
pub use provider::StoreProvider;
