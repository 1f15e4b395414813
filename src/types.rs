use chrono::{DateTime, Utc};
use serde::Deserialize;

// GitHub API response structures

/// One element of the `application/vnd.github.star+json` stargazers listing.
#[derive(Debug, Deserialize)]
pub struct StargazerItem {
    pub starred_at: Option<DateTime<Utc>>,
    pub user: GitHubUser,
}

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: i64,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub html_url: String,
}
