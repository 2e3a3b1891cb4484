use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use progress_core::model::LegacyRowId;

use crate::repository::StorageError;

/// Durable "last migrated source id" per migration kind.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    /// The stored cursor, or `LegacyRowId::START` if nothing was migrated yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Schema` if the checkpoint storage is not installed.
    async fn load(&self, name: &str) -> Result<LegacyRowId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the cursor cannot be persisted.
    async fn store(&self, name: &str, last_id: LegacyRowId) -> Result<(), StorageError>;

    /// Forget the cursor so the next run starts from the first legacy row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cursor cannot be persisted.
    async fn reset(&self, name: &str) -> Result<(), StorageError> {
        self.store(name, LegacyRowId::START).await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCheckpoint {
    values: Arc<Mutex<HashMap<String, LegacyRowId>>>,
}

impl InMemoryCheckpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpoint for InMemoryCheckpoint {
    async fn load(&self, name: &str) -> Result<LegacyRowId, StorageError> {
        let guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(name).copied().unwrap_or(LegacyRowId::START))
    }

    async fn store(&self, name: &str, last_id: LegacyRowId) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(name.to_owned(), last_id);
        Ok(())
    }
}
