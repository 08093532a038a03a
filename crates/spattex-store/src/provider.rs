use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::ProviderError;
use crate::traits::TableStore;
use crate::types::{FieldSchema, TableRef};

#[cfg(feature = "memory")]
use crate::memory::MemoryStore;

#[derive(Clone, Default)]
pub struct StoreProvider {
    store: Option<Arc<dyn TableStore>>,
}

impl StoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_config(config: &StoreConfig) -> Result<Self, ProviderError> {
        let store = Self::create_store(config).await?;
        Ok(Self { store: Some(store) })
    }

    pub fn with_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Result<Arc<dyn TableStore>, ProviderError> {
        self.store
            .clone()
            .ok_or(ProviderError::Configuration("store".to_string()))
    }

    async fn create_store(config: &StoreConfig) -> Result<Arc<dyn TableStore>, ProviderError> {
        match config {
            #[cfg(feature = "memory")]
            StoreConfig::Memory {
                tables,
                propagation_delay_ms,
            } => {
                let store = MemoryStore::new()
                    .with_propagation_delay(Duration::from_millis(*propagation_delay_ms));
                for seed in tables {
                    let table = TableRef::new(&seed.project, &seed.dataset, &seed.table);
                    let fields = seed.fields.iter().map(FieldSchema::from).collect();
                    store.create_table(&table, fields).await;
                }
                Ok(Arc::new(store))
            }

            #[allow(unreachable_patterns)]
            _ => Err(ProviderError::UnsupportedBackend(
                "No suitable table store backend enabled".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for StoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreProvider")
            .field("store", &self.store.is_some())
            .finish()
    }
}
