use crate::config::{Config, FetchConfig, PER_PAGE};
use crate::error::{Result, StargazerError};
use crate::models::{
    split_full_name, Credential, FetchedPage, PageResult, RateLimitState, SourceTarget,
    StargazerRecord,
};
use crate::types::StargazerItem;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

const STAR_MEDIA_TYPE: &str = "application/vnd.github.star+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
/// Reset hint assumed when a rate-limited response carries none.
const DEFAULT_RESET_SECS: i64 = 60;
const LOW_QUOTA_WARNING: u32 = 10;

/// HTTP session for one source: pinned API version, star media type and,
/// when one resolves, a bearer token.
pub struct GitHubClient {
    client: Client,
    base_url: Url,
    authenticated: bool,
    max_rate_limit_retries: u32,
    rate_limit_buffer: Duration,
}

impl GitHubClient {
    pub fn new(base_url: Url, credential: Option<&Credential>, fetch: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(STAR_MEDIA_TYPE));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
                .map_err(|_| {
                    StargazerError::ConfigError(
                        "GitHub token contains characters not allowed in a header".to_string(),
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(concat!("stargazer-loader/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(fetch.request_timeout)
            .build()?;

        Ok(GitHubClient {
            client,
            base_url,
            authenticated: credential.is_some(),
            max_rate_limit_retries: fetch.max_rate_limit_retries,
            rate_limit_buffer: fetch.rate_limit_buffer,
        })
    }

    /// Session for a source, using its own token or the shared default.
    /// Without any token the session still works, at a much lower quota.
    pub fn for_source(config: &Config, target: &SourceTarget) -> Result<Self> {
        let credential = config.credential_for(target);
        if credential.is_none() {
            warn!(
                source = %target.full_name,
                "No GitHub token configured, unauthenticated requests are limited to 60/hr"
            );
        }
        Self::new(config.api_base_url.clone(), credential, &config.fetch)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn stargazers_url(&self, full_name: &str, page: u32) -> Result<Url> {
        let (owner, repo) = split_full_name(full_name)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StargazerError::ConfigError(format!("API base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["repos", owner, repo, "stargazers"]);
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }

    /// Fetch one page of stargazers.
    ///
    /// 403 and 429 responses wait for the advertised reset (plus a buffer) and
    /// retry the same page, at most `max_rate_limit_retries` times. A 422 means
    /// the API will not list past this point and yields [`PageResult::Capped`].
    pub async fn fetch_page(&self, source: &str, page: u32) -> Result<FetchedPage> {
        let url = self.stargazers_url(source, page)?;
        let mut rate_limit_waits = 0;

        loop {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            let rate_limit = rate_limit_state(response.headers());

            debug!(
                source,
                page,
                %status,
                remaining = rate_limit.remaining,
                limit = rate_limit.limit,
                "GitHub response"
            );

            match status {
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limit_waits >= self.max_rate_limit_retries {
                        return Err(StargazerError::RateLimitExceeded(format!(
                            "{} page {} still limited after {} waits (reset at {})",
                            source, page, rate_limit_waits, rate_limit.reset_time
                        )));
                    }
                    rate_limit_waits += 1;

                    let wait = rate_limit_wait(response.headers(), Utc::now(), self.rate_limit_buffer);
                    warn!(
                        source,
                        page,
                        attempt = rate_limit_waits,
                        "Rate limited. Waiting {}s...",
                        wait.as_secs()
                    );
                    sleep(wait).await;
                    continue;
                }
                StatusCode::UNPROCESSABLE_ENTITY => {
                    debug!(source, page, "Result ceiling reached, no more pages");
                    return Ok(FetchedPage {
                        result: PageResult::Capped { page },
                        last_page: None,
                        rate_limit,
                    });
                }
                status if status.is_success() => {
                    if rate_limit.remaining < LOW_QUOTA_WARNING {
                        warn!(source, remaining = rate_limit.remaining, "GitHub quota running low");
                    }

                    let last_page = response
                        .headers()
                        .get(LINK)
                        .and_then(|h| h.to_str().ok())
                        .and_then(parse_last_page);

                    let body = response.bytes().await?;
                    let items: Vec<StargazerItem> = serde_json::from_slice(&body)?;
                    let extracted_at = Utc::now();
                    let records = items
                        .into_iter()
                        .map(|item| StargazerRecord::from_item(item, source, extracted_at))
                        .collect();

                    return Ok(FetchedPage {
                        result: PageResult::Records { page, records },
                        last_page,
                        rate_limit,
                    });
                }
                status => {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(StargazerError::ApiError(format!(
                        "{} page {} failed with status {}: {}",
                        source, page, status, error_text
                    )));
                }
            }
        }
    }
}

/// Page number of the `rel="last"` entry of a `Link` header.
pub fn parse_last_page(link_header: &str) -> Option<u32> {
    link_header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_last = parts.any(|p| {
            let p = p.trim();
            p == "rel=\"last\"" || p == "rel=last"
        });
        if !is_last {
            return None;
        }
        let url = Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

/// How long to wait after a rate-limited response:
/// `max(reset - now, 0) + buffer`, honouring `Retry-After` when it is longer.
pub fn rate_limit_wait(headers: &HeaderMap, now: DateTime<Utc>, buffer: Duration) -> Duration {
    let reset = headers
        .get("X-RateLimit-Reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(now.timestamp() + DEFAULT_RESET_SECS);
    let until_reset = Duration::from_secs((reset - now.timestamp()).max(0) as u64);

    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_default();

    until_reset.max(retry_after) + buffer
}

/// Rate limit headers of a response. Missing headers read as an untouched quota.
pub fn rate_limit_state(headers: &HeaderMap) -> RateLimitState {
    let limit = headers
        .get("X-RateLimit-Limit")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(5000);

    let remaining = headers
        .get("X-RateLimit-Remaining")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(limit);

    let reset = headers
        .get("X-RateLimit-Reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    RateLimitState {
        remaining,
        limit,
        reset_time: reset,
        is_limited: remaining == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_last_page_from_link_header() {
        let link = r#"<https://api.github.com/repositories/1/stargazers?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/stargazers?per_page=100&page=57>; rel="last""#;
        assert_eq!(parse_last_page(link), Some(57));
    }

    #[test]
    fn link_without_last_is_none() {
        let link = r#"<https://api.github.com/repositories/1/stargazers?per_page=100&page=1>; rel="prev", <https://api.github.com/repositories/1/stargazers?per_page=100&page=1>; rel="first""#;
        assert_eq!(parse_last_page(link), None);
        assert_eq!(parse_last_page(""), None);
    }

    #[test]
    fn page_param_order_does_not_matter() {
        let link = r#"<https://api.github.com/repos/a/b/stargazers?page=12&per_page=100>; rel="last""#;
        assert_eq!(parse_last_page(link), Some(12));
    }

    #[test]
    fn wait_is_reset_delta_plus_buffer() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from_str(&(now.timestamp() + 30).to_string()).unwrap(),
        );
        let wait = rate_limit_wait(&headers, now, Duration::from_secs(5));
        assert!(wait >= Duration::from_secs(35), "waited only {:?}", wait);
        assert!(wait < Duration::from_secs(37));
    }

    #[test]
    fn reset_in_the_past_waits_only_the_buffer() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from_str(&(now.timestamp() - 100).to_string()).unwrap(),
        );
        assert_eq!(rate_limit_wait(&headers, now, Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn missing_reset_assumes_a_minute() {
        let wait = rate_limit_wait(&HeaderMap::new(), Utc::now(), Duration::from_secs(5));
        assert_eq!(wait, Duration::from_secs(65));
    }

    #[test]
    fn retry_after_extends_the_wait() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Reset", HeaderValue::from_str(&now.timestamp().to_string()).unwrap());
        headers.insert(RETRY_AFTER, HeaderValue::from_static("90"));
        assert_eq!(rate_limit_wait(&headers, now, Duration::from_secs(5)), Duration::from_secs(95));
    }

    #[test]
    fn rate_limit_state_reads_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("5000"));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        headers.insert("X-RateLimit-Reset", HeaderValue::from_static("1700000000"));
        let state = rate_limit_state(&headers);
        assert_eq!(state.limit, 5000);
        assert_eq!(state.remaining, 0);
        assert!(state.is_limited);
        assert_eq!(state.reset_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn builds_stargazers_url_under_base_path() {
        let fetch = FetchConfig::default();
        let client = GitHubClient::new(Url::parse("http://localhost:9000/api/v3/").unwrap(), None, &fetch).unwrap();
        let url = client.stargazers_url("rust-lang/rust", 7).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/api/v3/repos/rust-lang/rust/stargazers?per_page=100&page=7"
        );
        assert!(!client.is_authenticated());
    }
}
