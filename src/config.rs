use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::cli::{Backend, Cli};
use crate::error::{Result, StargazerError};
use crate::models::{split_full_name, Credential, SourceTarget};
use crate::pool::{PoolConfig, SurrealConnectionConfig};

/// Items requested per page.
pub const PER_PAGE: u32 = 100;
/// GitHub stops listing stargazers after 400 pages of 100.
pub const HARD_PAGE_CAP: u32 = 400;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Repositories tracked when no source list is configured.
pub const DEFAULT_SOURCES: &[(&str, &str)] = &[
    ("dbt-labs/dbt-core", "raw_dbt_core"),
    ("apache/airflow", "raw_airflow"),
    ("dagster-io/dagster", "raw_dagster"),
    ("duckdb/duckdb", "raw_duckdb"),
    ("dlt-hub/dlt", "raw_dlt"),
];

/// Page fetching and rate-limit policy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub workers: usize,
    pub max_pages: u32,
    pub max_rate_limit_retries: u32,
    pub rate_limit_buffer: Duration,
    pub source_deadline: Duration,
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            max_pages: HARD_PAGE_CAP,
            max_rate_limit_retries: 10,
            rate_limit_buffer: Duration::from_secs(5),
            source_deadline: Duration::from_secs(2 * 60 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl FetchConfig {
    /// Configured page limit, never above the API's own ceiling.
    pub fn page_cap(&self) -> u32 {
        self.max_pages.min(HARD_PAGE_CAP)
    }
}

/// Retry policy for writes that hit a locked store.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub lock_retries: u32,
    pub lock_backoff: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            lock_retries: 5,
            lock_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    DuckDb {
        path: PathBuf,
    },
    Surreal {
        connection: SurrealConnectionConfig,
        pool: PoolConfig,
    },
    Memory,
}

/// Immutable configuration for one run, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub sources: Vec<SourceTarget>,
    pub default_credential: Option<Credential>,
    pub api_base_url: Url,
    pub source_concurrency: usize,
    pub fetch: FetchConfig,
    pub load: LoadConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Configuration with default policies for the given sources.
    pub fn new(sources: Vec<SourceTarget>, store: StoreConfig) -> Result<Self> {
        Ok(Self {
            sources,
            default_credential: None,
            api_base_url: parse_api_base_url(DEFAULT_API_BASE_URL)?,
            source_concurrency: 2,
            fetch: FetchConfig::default(),
            load: LoadConfig::default(),
            store,
        })
    }

    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut sources = if cli.sources.is_empty() {
            DEFAULT_SOURCES
                .iter()
                .map(|(name, table)| SourceTarget::new(*name, *table))
                .collect()
        } else {
            cli.sources
                .iter()
                .map(|spec| parse_source_spec(spec))
                .collect::<Result<Vec<_>>>()?
        };

        for spec in &cli.source_tokens {
            let (name, token) = spec.split_once('=').ok_or_else(|| {
                StargazerError::ConfigError(
                    "source token must look like OWNER/REPO=TOKEN".to_string(),
                )
            })?;
            let target = sources
                .iter_mut()
                .find(|s| s.full_name == name.trim())
                .ok_or_else(|| StargazerError::UnknownSource(name.trim().to_string()))?;
            target.credential = non_empty(token).map(Credential::new);
        }

        let api_base_url = parse_api_base_url(&cli.api_base_url)?;

        let store = match cli.backend {
            Backend::Duckdb => StoreConfig::DuckDb {
                path: cli.duckdb_path.clone(),
            },
            Backend::Surreal => StoreConfig::Surreal {
                connection: SurrealConnectionConfig {
                    url: cli.db_url.clone(),
                    username: cli.db_user.clone(),
                    password: cli.db_pass.clone(),
                    namespace: cli.db_namespace.clone(),
                    database: cli.db_database.clone(),
                },
                pool: PoolConfig {
                    max_size: cli.db_pool_max_size,
                    ..Default::default()
                },
            },
            Backend::Memory => StoreConfig::Memory,
        };

        if cli.max_pages > HARD_PAGE_CAP {
            warn!(
                "max pages {} is above the API ceiling, clamping to {}",
                cli.max_pages, HARD_PAGE_CAP
            );
        }

        let config = Self {
            sources,
            default_credential: cli.github_token.as_deref().and_then(non_empty).map(Credential::new),
            api_base_url,
            source_concurrency: cli.source_concurrency,
            fetch: FetchConfig {
                workers: cli.workers,
                max_pages: cli.max_pages.min(HARD_PAGE_CAP),
                max_rate_limit_retries: cli.max_rate_limit_retries,
                rate_limit_buffer: Duration::from_secs(cli.rate_limit_buffer_secs),
                source_deadline: Duration::from_secs(cli.source_deadline_secs),
                ..Default::default()
            },
            load: LoadConfig {
                lock_retries: cli.lock_retries,
                lock_backoff: Duration::from_millis(cli.lock_backoff_ms),
            },
            store,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(StargazerError::ConfigError("no sources configured".to_string()));
        }
        if self.fetch.workers == 0 {
            return Err(StargazerError::ConfigError("workers must be at least 1".to_string()));
        }
        if self.source_concurrency == 0 {
            return Err(StargazerError::ConfigError(
                "source concurrency must be at least 1".to_string(),
            ));
        }
        if self.load.lock_retries == 0 {
            return Err(StargazerError::ConfigError("lock retries must be at least 1".to_string()));
        }

        let mut names = HashSet::new();
        let mut tables = HashSet::new();
        for source in &self.sources {
            source.owner_and_repo()?;
            validate_table_name(&source.table)?;
            if !names.insert(source.full_name.as_str()) {
                return Err(StargazerError::ConfigError(format!(
                    "source {} is configured twice",
                    source.full_name
                )));
            }
            if !tables.insert(source.table.as_str()) {
                return Err(StargazerError::ConfigError(format!(
                    "table {} is assigned to more than one source",
                    source.table
                )));
            }
        }
        Ok(())
    }

    /// Token used for a source: its own, else the shared default.
    pub fn credential_for<'a>(&'a self, target: &'a SourceTarget) -> Option<&'a Credential> {
        target.credential.as_ref().or(self.default_credential.as_ref())
    }

    /// All sources, or just the named one.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<SourceTarget>> {
        match name {
            None => Ok(self.sources.clone()),
            Some(name) => self
                .sources
                .iter()
                .find(|s| s.full_name == name)
                .cloned()
                .map(|s| vec![s])
                .ok_or_else(|| StargazerError::UnknownSource(name.to_string())),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Parses `owner/repo` or `owner/repo=table`.
fn parse_api_base_url(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| StargazerError::ConfigError(format!("invalid API base URL '{}': {}", raw, e)))
}

pub fn parse_source_spec(spec: &str) -> Result<SourceTarget> {
    let (name, table) = match spec.split_once('=') {
        Some((name, table)) => (name.trim(), table.trim().to_string()),
        None => {
            let name = spec.trim();
            let (_, repo) = split_full_name(name)?;
            (name, default_table_name(repo))
        }
    };
    split_full_name(name)?;
    validate_table_name(&table)?;
    Ok(SourceTarget::new(name, table))
}

/// `raw_` followed by the repository name with anything outside `[a-z0-9]` as `_`.
pub fn default_table_name(repo: &str) -> String {
    let body: String = repo
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("raw_{}", body)
}

pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StargazerError::ConfigError(format!("invalid table name '{}'", table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["stargazer-loader"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn sources_get_derived_table_names() {
        let config = Config::from_cli(&cli(&["--sources", "dbt-labs/dbt-core,apache/airflow"])).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].table, "raw_dbt_core");
        assert_eq!(config.sources[1].table, "raw_airflow");
    }

    #[test]
    fn default_config_targets_public_api() {
        let config = Config::new(Vec::new(), StoreConfig::Memory).unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://api.github.com/");
        assert!(config.default_credential.is_none());
    }

    #[test]
    fn malformed_api_url_is_a_config_error() {
        let result = Config::from_cli(&cli(&["--api-base-url", "not a url"]));
        assert!(matches!(result, Err(StargazerError::ConfigError(_))));
    }

    #[test]
    fn explicit_table_names_are_kept() {
        let target = parse_source_spec("rust-lang/rust=rust_stars").unwrap();
        assert_eq!(target.full_name, "rust-lang/rust");
        assert_eq!(target.table, "rust_stars");
    }

    #[test]
    fn rejects_bad_table_and_source_names() {
        assert!(parse_source_spec("rust-lang/rust=drop table").is_err());
        assert!(parse_source_spec("not-a-repo").is_err());
        assert!(parse_source_spec("a/b/c").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("_ok_2").is_ok());
    }

    #[test]
    fn per_source_token_overrides_default() {
        let config = Config::from_cli(&cli(&[
            "--github-token",
            "shared",
            "--sources",
            "a/one,b/two",
            "--source-token",
            "b/two=special",
        ]))
        .unwrap();

        let one = &config.sources[0];
        let two = &config.sources[1];
        assert_eq!(config.credential_for(one).map(|c| c.expose()), Some("shared"));
        assert_eq!(config.credential_for(two).map(|c| c.expose()), Some("special"));
    }

    #[test]
    fn token_for_unknown_source_is_rejected() {
        let result = Config::from_cli(&cli(&["--sources", "a/one", "--source-token", "z/zz=t"]));
        assert!(matches!(result, Err(StargazerError::UnknownSource(_))));
    }

    #[test]
    fn max_pages_is_clamped_to_api_ceiling() {
        let config = Config::from_cli(&cli(&["--max-pages", "1000"])).unwrap();
        assert_eq!(config.fetch.max_pages, HARD_PAGE_CAP);
        assert_eq!(config.fetch.page_cap(), HARD_PAGE_CAP);
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let result = Config::from_cli(&cli(&["--sources", "a/x=t1,b/y=t1"]));
        assert!(matches!(result, Err(StargazerError::ConfigError(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = Config::from_cli(&cli(&["--workers", "0"]));
        assert!(result.is_err());
    }

    #[test]
    fn select_named_source() {
        let config = Config::from_cli(&cli(&[])).unwrap();
        let selected = config.select(Some("duckdb/duckdb")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].table, "raw_duckdb");
        assert!(matches!(
            config.select(Some("nope/nope")),
            Err(StargazerError::UnknownSource(_))
        ));
        assert_eq!(config.select(None).unwrap().len(), DEFAULT_SOURCES.len());
    }
}
