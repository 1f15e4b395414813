use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, Result, StargazerError};
use crate::types::StargazerItem;

/// One user starring one source, as stored in the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StargazerRecord {
    pub user_login: String,
    pub user_id: i64,
    pub source: String,
    pub starred_at: Option<DateTime<Utc>>,
    pub avatar_url: String,
    pub profile_url: String,
    pub extracted_at: DateTime<Utc>,
}

impl StargazerRecord {
    pub fn from_item(item: StargazerItem, source: &str, extracted_at: DateTime<Utc>) -> Self {
        Self {
            user_login: item.user.login,
            user_id: item.user.id,
            source: source.to_string(),
            starred_at: item.starred_at,
            avatar_url: item.user.avatar_url.unwrap_or_default(),
            profile_url: item.user.html_url,
            extracted_at,
        }
    }
}

/// API token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A tracked repository and where its stargazers are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTarget {
    /// `owner/repo`
    pub full_name: String,
    pub credential: Option<Credential>,
    pub table: String,
}

impl SourceTarget {
    pub fn new(full_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            credential: None,
            table: table.into(),
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn owner_and_repo(&self) -> Result<(&str, &str)> {
        split_full_name(&self.full_name)
    }
}

pub fn split_full_name(full_name: &str) -> Result<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(StargazerError::InvalidRepoUrl(format!(
            "Invalid repository name format: {}",
            full_name
        ))),
    }
}

/// Outcome of fetching one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    Records {
        page: u32,
        records: Vec<StargazerRecord>,
    },
    /// The API refused to page further (result-count ceiling reached).
    Capped { page: u32 },
}

impl PageResult {
    pub fn page(&self) -> u32 {
        match self {
            PageResult::Records { page, .. } | PageResult::Capped { page } => *page,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PageResult::Records { records, .. } => records.len(),
            PageResult::Capped { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A page together with the response metadata that came with it.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub result: PageResult,
    /// Page number named by the `rel="last"` link, if the response carried one.
    pub last_page: Option<u32>,
    pub rate_limit: RateLimitState,
}

/// Rate limit state reported by the last response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    pub remaining: u32,
    pub limit: u32,
    pub reset_time: DateTime<Utc>,
    pub is_limited: bool,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            remaining: 5000,
            limit: 5000,
            reset_time: Utc::now() + chrono::Duration::hours(1),
            is_limited: false,
        }
    }
}

/// Result of discovering how many pages a source has.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub first_page: Vec<StargazerRecord>,
    /// 0 when the source has no stargazers at all.
    pub last_page: u32,
    /// Quota reported by the page 1 response.
    pub rate_limit: RateLimitState,
}

/// Successful extract and load of one source.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub table: String,
    pub pages: u32,
    pub records: usize,
    pub rows_loaded: u64,
    pub elapsed: Duration,
}

/// Per-source outcomes of one run, in completion order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<SourceReport>,
    pub failed: Vec<PipelineError>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_rows(&self) -> u64 {
        self.succeeded.iter().map(|r| r.rows_loaded).sum()
    }
}
