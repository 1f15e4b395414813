#![allow(dead_code)]

use chrono::Utc;
use serde_json::{json, Value};
use stargazer_loader::config::{Config, StoreConfig};
use stargazer_loader::models::{Credential, SourceTarget, StargazerRecord};
use std::ops::RangeInclusive;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_TOKEN: &str = "test-token";

/// Config pointing at a mock GitHub, with no rate-limit buffer and short back-offs.
pub fn test_config(server: &MockServer, sources: Vec<SourceTarget>) -> Config {
    let mut config = Config::new(sources, StoreConfig::Memory).expect("default config");
    config.api_base_url = Url::parse(&server.uri()).expect("mock server URI");
    config.default_credential = Some(Credential::new(TEST_TOKEN));
    config.fetch.workers = 4;
    config.fetch.rate_limit_buffer = Duration::ZERO;
    config.fetch.max_rate_limit_retries = 3;
    config.load.lock_backoff = Duration::from_millis(5);
    config
}

pub fn stargazer_json(id: i64) -> Value {
    json!({
        "starred_at": "2024-01-02T03:04:05Z",
        "user": {
            "login": format!("user{}", id),
            "id": id,
            "avatar_url": format!("https://avatars.githubusercontent.com/u/{}", id),
            "html_url": format!("https://github.com/user{}", id),
            "type": "User",
            "site_admin": false
        }
    })
}

pub fn page_body(ids: RangeInclusive<i64>) -> Value {
    Value::Array(ids.map(stargazer_json).collect())
}

pub fn link_header(server: &MockServer, source: &str, last: u32) -> String {
    let base = format!("{}/repos/{}/stargazers", server.uri(), source);
    format!(
        r#"<{base}?per_page=100&page=2>; rel="next", <{base}?per_page=100&page={last}>; rel="last""#,
        base = base,
        last = last
    )
}

pub fn stargazers_path(source: &str) -> String {
    format!("/repos/{}/stargazers", source)
}

/// Serve `ids` for `page` of `source`, optionally advertising a last page
/// and delaying the response.
pub async fn mount_page(
    server: &MockServer,
    source: &str,
    page: u32,
    ids: RangeInclusive<i64>,
    last: Option<u32>,
    delay: Option<Duration>,
) {
    let mut template = ResponseTemplate::new(200).set_body_json(page_body(ids));
    if let Some(last) = last {
        template = template.insert_header("link", link_header(server, source, last).as_str());
    }
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }

    Mock::given(method("GET"))
        .and(path(stargazers_path(source)))
        .and(query_param("page", page.to_string()))
        .respond_with(template)
        .mount(server)
        .await;
}

pub async fn mount_empty(server: &MockServer, source: &str, page: u32) {
    Mock::given(method("GET"))
        .and(path(stargazers_path(source)))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

pub fn records(source: &str, ids: RangeInclusive<i64>) -> Vec<StargazerRecord> {
    let now = Utc::now();
    ids.map(|id| StargazerRecord {
        user_login: format!("user{}", id),
        user_id: id,
        source: source.to_string(),
        starred_at: Some(now),
        avatar_url: format!("https://avatars.githubusercontent.com/u/{}", id),
        profile_url: format!("https://github.com/user{}", id),
        extracted_at: now,
    })
    .collect()
}

pub fn ids(records: &[StargazerRecord]) -> Vec<i64> {
    records.iter().map(|r| r.user_id).collect()
}
