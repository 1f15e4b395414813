//! Destination stores and the retrying loader in front of them.
//!
//! A [`StargazerStore`] knows how to replace every stored row for one source
//! with a fresh snapshot. [`Loader`] adds the lock-contention retry and the
//! post-write row count check on top of whichever backend is configured.

pub mod duckdb_store;
pub mod memory;
pub mod surreal_store;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{LoadConfig, StoreConfig};
use crate::error::{Result, StargazerError};
use crate::models::{SourceTarget, StargazerRecord};
use crate::pool::create_pool;

pub use self::duckdb_store::DuckDbStore;
pub use self::memory::MemoryStore;
pub use self::surreal_store::SurrealStore;

/// Backend capable of a full-refresh write for one source.
#[async_trait]
pub trait StargazerStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Atomically replace all rows stored for `target` with `records`.
    /// Rows of other sources are untouched.
    async fn replace_source(&self, target: &SourceTarget, records: &[StargazerRecord]) -> Result<()>;

    async fn count_source(&self, target: &SourceTarget) -> Result<u64>;
}

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn StargazerStore>> {
    let store: Arc<dyn StargazerStore> = match config {
        StoreConfig::DuckDb { path } => Arc::new(DuckDbStore::open(path)?),
        StoreConfig::Surreal { connection, pool } => {
            let pool = create_pool(connection.clone(), pool.clone())?;
            Arc::new(SurrealStore::new(Arc::new(pool)))
        }
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = store.name(), "Destination store ready");
    Ok(store)
}

/// Writes a source's snapshot, retrying with linear back-off while the
/// store is locked by another writer.
#[derive(Clone)]
pub struct Loader {
    store: Arc<dyn StargazerStore>,
    policy: LoadConfig,
}

impl Loader {
    pub fn new(store: Arc<dyn StargazerStore>, policy: LoadConfig) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn StargazerStore> {
        &self.store
    }

    /// Replace the stored rows of `target` with `records` and return the
    /// row count read back afterwards.
    pub async fn load(&self, records: &[StargazerRecord], target: &SourceTarget) -> Result<u64> {
        let attempts = self.policy.lock_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.store.replace_source(target, records).await {
                Ok(()) => break,
                Err(e) if e.is_lock_contention() && attempt < attempts => {
                    let wait = self.policy.lock_backoff * attempt;
                    warn!(
                        source = %target.full_name,
                        attempt,
                        "{}. Retrying in {}ms...",
                        e,
                        wait.as_millis()
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
                Err(StargazerError::LockContention(msg)) => {
                    return Err(StargazerError::LockContention(format!(
                        "gave up after {} attempts: {}",
                        attempt, msg
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        let count = match self.store.count_source(target).await {
            Ok(count) => count,
            Err(e) => {
                warn!(source = %target.full_name, "Could not verify row count: {}", e);
                records.len() as u64
            }
        };

        if count != records.len() as u64 {
            warn!(
                source = %target.full_name,
                expected = records.len(),
                found = count,
                "Row count after load differs from fetched records"
            );
        }

        info!(
            source = %target.full_name,
            table = %target.table,
            backend = self.store.name(),
            "Loaded {} rows",
            count
        );

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Reports a locked store for the first `failures` writes.
    struct FlakyStore {
        inner: MemoryStore,
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl StargazerStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn replace_source(&self, target: &SourceTarget, records: &[StargazerRecord]) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(StargazerError::LockContention("database is locked".to_string()));
            }
            self.inner.replace_source(target, records).await
        }

        async fn count_source(&self, target: &SourceTarget) -> Result<u64> {
            self.inner.count_source(target).await
        }
    }

    fn records(source: &str, n: i64) -> Vec<StargazerRecord> {
        let now = Utc::now();
        (1..=n)
            .map(|id| StargazerRecord {
                user_login: format!("user{}", id),
                user_id: id,
                source: source.to_string(),
                starred_at: None,
                avatar_url: String::new(),
                profile_url: String::new(),
                extracted_at: now,
            })
            .collect()
    }

    fn policy(lock_retries: u32) -> LoadConfig {
        LoadConfig {
            lock_retries,
            lock_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn retries_through_lock_contention() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: 2,
            attempts: AtomicU32::new(0),
        });
        let loader = Loader::new(store.clone(), policy(5));
        let target = SourceTarget::new("o/r", "raw_r");
        let rows = records("o/r", 7);

        let loaded = loader.load(&rows, &target).await.unwrap();

        assert_eq!(loaded, 7);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.rows(&target), rows);
    }

    #[tokio::test]
    async fn gives_up_after_attempt_ceiling() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: 10,
            attempts: AtomicU32::new(0),
        });
        let loader = Loader::new(store.clone(), policy(3));
        let target = SourceTarget::new("o/r", "raw_r");

        let result = loader.load(&records("o/r", 1), &target).await;

        let err = result.unwrap_err();
        assert!(err.is_lock_contention());
        assert!(err.to_string().contains("gave up after 3 attempts"));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        assert!(store.inner.rows(&target).is_empty());
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        struct Broken;

        #[async_trait]
        impl StargazerStore for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            async fn replace_source(&self, _: &SourceTarget, _: &[StargazerRecord]) -> Result<()> {
                Err(StargazerError::StorageError("disk full".to_string()))
            }
            async fn count_source(&self, _: &SourceTarget) -> Result<u64> {
                Ok(0)
            }
        }

        let loader = Loader::new(Arc::new(Broken), policy(5));
        let result = loader.load(&[], &SourceTarget::new("o/r", "raw_r")).await;
        assert!(matches!(result, Err(StargazerError::StorageError(_))));
    }
}
