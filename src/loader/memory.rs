use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::StargazerStore;
use crate::error::{Result, StargazerError};
use crate::models::{SourceTarget, StargazerRecord};

/// Process-local store, keyed by source. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, Vec<StargazerRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<StargazerRecord>>>> {
        self.rows
            .lock()
            .map_err(|_| StargazerError::Internal("memory store mutex poisoned".to_string()))
    }

    /// Snapshot of the rows currently stored for `target`.
    pub fn rows(&self, target: &SourceTarget) -> Vec<StargazerRecord> {
        self.lock()
            .ok()
            .and_then(|rows| rows.get(&target.full_name).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StargazerStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn replace_source(&self, target: &SourceTarget, records: &[StargazerRecord]) -> Result<()> {
        self.lock()?.insert(target.full_name.clone(), records.to_vec());
        Ok(())
    }

    async fn count_source(&self, target: &SourceTarget) -> Result<u64> {
        Ok(self
            .lock()?
            .get(&target.full_name)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }
}
