use async_trait::async_trait;
use duckdb::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::StargazerStore;
use crate::config::validate_table_name;
use crate::error::{Result, StargazerError};
use crate::models::{SourceTarget, StargazerRecord};

/// DuckDB file with one table per source.
///
/// Every load drops and recreates the source's table inside a single
/// transaction, so a failed load leaves the previous snapshot in place.
/// A connection is opened per call and closed afterwards, which keeps the
/// file lock short for other processes sharing the database.
#[derive(Debug, Clone)]
pub struct DuckDbStore {
    path: PathBuf,
}

impl DuckDbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(path: &Path) -> Result<Connection> {
        Connection::open(path).map_err(classify)
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        r#"
        DROP TABLE IF EXISTS {table};
        CREATE TABLE {table} (
            user_login   VARCHAR,
            user_id      BIGINT,
            source       VARCHAR,
            starred_at   TIMESTAMPTZ,
            avatar_url   VARCHAR,
            profile_url  VARCHAR,
            extracted_at TIMESTAMPTZ
        );
        "#
    )
}

/// DuckDB allows one writing process per file; a held lock or a write-write
/// conflict surfaces as an error message rather than a distinct code.
fn is_lock_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["lock on file", "conflicting lock", "conflict"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn classify(e: duckdb::Error) -> StargazerError {
    let message = e.to_string();
    if is_lock_message(&message) {
        StargazerError::LockContention(message)
    } else {
        StargazerError::StorageError(message)
    }
}

fn replace_blocking(path: &Path, table: &str, source: &str, records: &[StargazerRecord]) -> Result<()> {
    let mut conn = DuckDbStore::connect(path)?;
    let tx = conn.transaction().map_err(classify)?;

    tx.execute_batch(&create_table_sql(table)).map_err(classify)?;
    {
        let mut appender = tx.appender(table).map_err(classify)?;
        for record in records {
            appender
                .append_row(params![
                    record.user_login,
                    record.user_id,
                    source,
                    record.starred_at.map(|t| t.to_rfc3339()),
                    record.avatar_url,
                    record.profile_url,
                    record.extracted_at.to_rfc3339(),
                ])
                .map_err(classify)?;
        }
        appender.flush().map_err(classify)?;
    }

    tx.commit().map_err(classify)?;
    debug!(table, rows = records.len(), "DuckDB transaction committed");
    Ok(())
}

fn count_blocking(path: &Path, table: &str, source: &str) -> Result<u64> {
    let conn = DuckDbStore::connect(path)?;
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE source = ?"),
            params![source],
            |row| row.get(0),
        )
        .map_err(classify)?;
    Ok(count as u64)
}

#[async_trait]
impl StargazerStore for DuckDbStore {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    async fn replace_source(&self, target: &SourceTarget, records: &[StargazerRecord]) -> Result<()> {
        validate_table_name(&target.table)?;

        let path = self.path.clone();
        let table = target.table.clone();
        let source = target.full_name.clone();
        let records = records.to_vec();

        tokio::task::spawn_blocking(move || replace_blocking(&path, &table, &source, &records))
            .await
            .map_err(|e| StargazerError::Internal(format!("DuckDB load task failed: {}", e)))?
    }

    async fn count_source(&self, target: &SourceTarget) -> Result<u64> {
        validate_table_name(&target.table)?;

        let path = self.path.clone();
        let table = target.table.clone();
        let source = target.full_name.clone();

        tokio::task::spawn_blocking(move || count_blocking(&path, &table, &source))
            .await
            .map_err(|e| StargazerError::Internal(format!("DuckDB count task failed: {}", e)))?
    }
}
