use deadpool::{managed, Runtime};
use std::fmt;
use std::time::Duration;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StargazerError;

#[derive(Clone)]
pub struct SurrealConnectionConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl fmt::Debug for SurrealConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrealConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct SurrealConnectionManager {
    config: SurrealConnectionConfig,
}

impl SurrealConnectionManager {
    pub fn new(config: SurrealConnectionConfig) -> Self {
        Self { config }
    }
}

impl managed::Manager for SurrealConnectionManager {
    type Type = Surreal<Any>;
    type Error = StargazerError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        debug!(url = %self.config.url, "Opening SurrealDB connection");

        let db = connect(&self.config.url)
            .await
            .map_err(|e| StargazerError::StorageError(format!("Failed to connect: {}", e)))?;

        db.signin(Root {
            username: &self.config.username,
            password: &self.config.password,
        })
        .await
        .map_err(|e| StargazerError::StorageError(format!("Failed to signin: {}", e)))?;

        db.use_ns(&self.config.namespace)
            .use_db(&self.config.database)
            .await
            .map_err(|e| {
                StargazerError::StorageError(format!("Failed to select namespace/database: {}", e))
            })?;

        Ok(db)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        match conn.query("RETURN 1").await {
            Ok(_) => Ok(()),
            Err(e) => Err(managed::RecycleError::Backend(StargazerError::StorageError(
                format!("Failed to recycle connection: {}", e),
            ))),
        }
    }
}

pub type SurrealPool = managed::Pool<SurrealConnectionManager>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub connection_timeout: Duration,
    pub recycle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(30),
            recycle_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub fn create_pool(
    connection_config: SurrealConnectionConfig,
    pool_config: PoolConfig,
) -> Result<SurrealPool, StargazerError> {
    let manager = SurrealConnectionManager::new(connection_config);

    managed::Pool::builder(manager)
        .max_size(pool_config.max_size)
        .runtime(Runtime::Tokio1)
        .create_timeout(Some(pool_config.connection_timeout))
        .recycle_timeout(pool_config.recycle_timeout)
        .build()
        .map_err(|e| StargazerError::StorageError(format!("Failed to create connection pool: {}", e)))
}
