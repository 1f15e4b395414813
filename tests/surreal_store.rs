mod common;

use common::*;
use stargazer_loader::config::LoadConfig;
use stargazer_loader::loader::{Loader, StargazerStore, SurrealStore};
use stargazer_loader::models::SourceTarget;
use stargazer_loader::pool::{create_pool, PoolConfig, SurrealConnectionConfig};
use std::sync::Arc;

fn connection_config() -> SurrealConnectionConfig {
    // Use environment variables or defaults for dev database
    SurrealConnectionConfig {
        url: std::env::var("DB_URL").unwrap_or_else(|_| "ws://localhost:8000".to_string()),
        username: std::env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
        password: std::env::var("DB_PASS").unwrap_or_else(|_| "root".to_string()),
        namespace: std::env::var("DB_NAMESPACE").unwrap_or_else(|_| "gitstars_test".to_string()),
        database: std::env::var("DB_DATABASE").unwrap_or_else(|_| "stargazers".to_string()),
    }
}

fn loader() -> Loader {
    let pool = create_pool(connection_config(), PoolConfig::default()).expect("Failed to create pool");
    Loader::new(Arc::new(SurrealStore::new(Arc::new(pool))), LoadConfig::default())
}

#[test]
fn test_pool_creation_is_lazy() {
    // deadpool only connects on first checkout
    assert!(create_pool(connection_config(), PoolConfig::default()).is_ok());
}

#[test]
fn test_connection_config_hides_password() {
    let rendered = format!("{:?}", connection_config());
    assert!(rendered.contains("url"));
    assert!(!rendered.contains("password"));
}

#[tokio::test]
#[ignore = "Requires running SurrealDB"]
async fn test_surreal_load_is_idempotent_and_scoped() {
    let loader = loader();
    let a = SourceTarget::new("surreal/a", "raw_a");
    let b = SourceTarget::new("surreal/b", "raw_b");

    loader.load(&records("surreal/b", 1..=4), &b).await.expect("load b");
    let first = loader.load(&records("surreal/a", 1..=25), &a).await.expect("load a");
    let second = loader.load(&records("surreal/a", 1..=25), &a).await.expect("reload a");

    assert_eq!(first, 25);
    assert_eq!(second, 25);
    assert_eq!(loader.store().count_source(&b).await.unwrap(), 4);
}

#[tokio::test]
#[ignore = "Requires running SurrealDB"]
async fn test_surreal_empty_snapshot_clears_source() {
    let loader = loader();
    let target = SourceTarget::new("surreal/empty", "raw_empty");

    loader.load(&records("surreal/empty", 1..=3), &target).await.expect("load");
    let count = loader.load(&[], &target).await.expect("clear");

    assert_eq!(count, 0);
}
