use serde::Deserialize;

use crate::types::{FieldSchema, FieldType};

/// Which table store backend to use.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-memory store. Tables named in `tables` are created on startup.
    #[cfg(feature = "memory")]
    Memory {
        #[serde(default)]
        tables: Vec<MemoryTableConfig>,
        /// Milliseconds before added fields accept inserts.
        #[serde(default)]
        propagation_delay_ms: u64,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            tables: Vec::new(),
            propagation_delay_ms: 0,
        }
    }
}

/// A table to create in the memory backend.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryTableConfig {
    pub project: String,
    pub dataset: String,
    pub table: String,
    #[serde(default)]
    pub fields: Vec<SeedField>,
}

/// An initial column of a memory table. Seeded columns are nullable.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl From<&SeedField> for FieldSchema {
    fn from(seed: &SeedField) -> Self {
        Self::nullable(seed.name.clone(), seed.field_type)
    }
}
