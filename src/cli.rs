use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One DuckDB table per source, dropped and recreated every run
    Duckdb,
    /// Shared SurrealDB `stargazer` table, rows replaced per source
    Surreal,
    /// Keep rows in process memory only (dry run)
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "stargazer-loader")]
#[command(about = "Stargazer Loader - Extracts repository stargazers from GitHub and loads them into an analytical store")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Default GitHub token, used for every source without its own token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Per-source token override as OWNER/REPO=TOKEN
    #[arg(long = "source-token", env = "STARGAZER_SOURCE_TOKENS", value_delimiter = ',', hide_env_values = true)]
    pub source_tokens: Vec<String>,

    /// Tracked sources as OWNER/REPO or OWNER/REPO=TABLE (defaults to the built-in list)
    #[arg(long, env = "STARGAZER_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Run only this configured source
    #[arg(long, env = "STARGAZER_SOURCE")]
    pub source: Option<String>,

    /// Destination store
    #[arg(long, env = "STARGAZER_BACKEND", value_enum, default_value_t = Backend::Duckdb)]
    pub backend: Backend,

    /// DuckDB database file
    #[arg(long, env = "DUCKDB_PATH", default_value = "data/stargazers.duckdb")]
    pub duckdb_path: PathBuf,

    /// SurrealDB connection URL
    #[arg(long, env = "DB_URL", default_value = "ws://localhost:8000")]
    pub db_url: String,

    /// SurrealDB username
    #[arg(long, env = "DB_USER", default_value = "root")]
    pub db_user: String,

    /// SurrealDB password
    #[arg(long, env = "DB_PASS", default_value = "root", hide_env_values = true)]
    pub db_pass: String,

    /// SurrealDB namespace
    #[arg(long, env = "DB_NAMESPACE", default_value = "gitstars")]
    pub db_namespace: String,

    /// SurrealDB database
    #[arg(long, env = "DB_DATABASE", default_value = "stars")]
    pub db_database: String,

    /// SurrealDB connection pool size
    #[arg(long, env = "DB_POOL_MAX_SIZE", default_value_t = 4)]
    pub db_pool_max_size: usize,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_base_url: String,

    /// Concurrent page requests per source
    #[arg(long, env = "STARGAZER_WORKERS", default_value_t = 10)]
    pub workers: usize,

    /// Sources fetched at the same time
    #[arg(long, env = "STARGAZER_SOURCE_CONCURRENCY", default_value_t = 2)]
    pub source_concurrency: usize,

    /// Highest page fetched per source (never above 400)
    #[arg(long, env = "STARGAZER_MAX_PAGES", default_value_t = 400)]
    pub max_pages: u32,

    /// Rate-limit waits allowed per page before giving up
    #[arg(long, env = "STARGAZER_MAX_RATE_LIMIT_RETRIES", default_value_t = 10)]
    pub max_rate_limit_retries: u32,

    /// Seconds added to the rate-limit reset time before retrying
    #[arg(long, env = "STARGAZER_RATE_LIMIT_BUFFER_SECS", default_value_t = 5)]
    pub rate_limit_buffer_secs: u64,

    /// Upper bound on one source's extract phase, in seconds
    #[arg(long, env = "STARGAZER_SOURCE_DEADLINE_SECS", default_value_t = 7200)]
    pub source_deadline_secs: u64,

    /// Load attempts while the store is locked by another writer
    #[arg(long, env = "STARGAZER_LOCK_RETRIES", default_value_t = 5)]
    pub lock_retries: u32,

    /// Linear back-off step between load attempts, in milliseconds
    #[arg(long, env = "STARGAZER_LOCK_BACKOFF_MS", default_value_t = 2000)]
    pub lock_backoff_ms: u64,
}
