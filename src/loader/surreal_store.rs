use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surrealdb::sql::Datetime;
use tracing::debug;

use super::StargazerStore;
use crate::error::{Result, StargazerError};
use crate::models::{SourceTarget, StargazerRecord};
use crate::pool::SurrealPool;

/// SurrealDB store with all sources in one `stargazer` table.
///
/// A load deletes the source's rows and inserts the new snapshot in one
/// transaction; the target's table name is not used here.
pub struct SurrealStore {
    pool: Arc<SurrealPool>,
}

#[derive(Debug, Serialize)]
struct StargazerRow {
    user_login: String,
    user_id: i64,
    source: String,
    starred_at: Option<Datetime>,
    avatar_url: String,
    profile_url: String,
    extracted_at: Datetime,
}

impl From<&StargazerRecord> for StargazerRow {
    fn from(record: &StargazerRecord) -> Self {
        Self {
            user_login: record.user_login.clone(),
            user_id: record.user_id,
            source: record.source.clone(),
            starred_at: record.starred_at.map(Datetime::from),
            avatar_url: record.avatar_url.clone(),
            profile_url: record.profile_url.clone(),
            extracted_at: Datetime::from(record.extracted_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

const REPLACE_QUERY: &str = r#"
    BEGIN TRANSACTION;
    DELETE stargazer WHERE source = $source;
    INSERT INTO stargazer $rows;
    COMMIT TRANSACTION;
"#;

const CLEAR_QUERY: &str = r#"
    DELETE stargazer WHERE source = $source;
"#;

const COUNT_QUERY: &str = r#"
    SELECT count() AS total FROM stargazer WHERE source = $source GROUP ALL
"#;

/// Concurrent transactions touching the same rows fail with a conflict
/// and can be retried.
fn classify(e: surrealdb::Error) -> StargazerError {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("conflict") || lowered.contains("lock") {
        StargazerError::LockContention(message)
    } else {
        StargazerError::StorageError(message)
    }
}

impl SurrealStore {
    pub fn new(pool: Arc<SurrealPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StargazerStore for SurrealStore {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    async fn replace_source(&self, target: &SourceTarget, records: &[StargazerRecord]) -> Result<()> {
        let db = self
            .pool
            .get()
            .await
            .map_err(|e| StargazerError::StorageError(format!("Failed to get DB connection: {}", e)))?;

        let started = Utc::now();
        let rows: Vec<StargazerRow> = records.iter().map(StargazerRow::from).collect();

        let query = if rows.is_empty() { CLEAR_QUERY } else { REPLACE_QUERY };
        db.query(query)
            .bind(("source", target.full_name.clone()))
            .bind(("rows", rows))
            .await
            .map_err(classify)?
            .check()
            .map_err(classify)?;

        debug!(
            source = %target.full_name,
            rows = records.len(),
            took_ms = (Utc::now() - started).num_milliseconds(),
            "SurrealDB transaction committed"
        );
        Ok(())
    }

    async fn count_source(&self, target: &SourceTarget) -> Result<u64> {
        let db = self
            .pool
            .get()
            .await
            .map_err(|e| StargazerError::StorageError(format!("Failed to get DB connection: {}", e)))?;

        let mut result = db
            .query(COUNT_QUERY)
            .bind(("source", target.full_name.clone()))
            .await
            .map_err(classify)?;

        let count: Option<CountRow> = result.take(0).map_err(classify)?;
        Ok(count.map(|c| c.total).unwrap_or(0))
    }
}
