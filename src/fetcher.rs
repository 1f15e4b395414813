use futures::stream::{self, StreamExt};
use std::ops::RangeInclusive;
use tracing::info;

use crate::error::Result;
use crate::github::GitHubClient;
use crate::models::PageResult;

const PROGRESS_EVERY: usize = 50;

/// Fetch a range of pages with at most `workers` requests in flight.
///
/// Results come back in completion order. The first failing page aborts the
/// remaining requests and fails the whole call.
pub async fn fetch_pages(
    client: &GitHubClient,
    source: &str,
    pages: RangeInclusive<u32>,
    workers: usize,
) -> Result<Vec<PageResult>> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let total = pages.clone().count();
    let mut results = Vec::with_capacity(total);

    let mut in_flight = stream::iter(pages)
        .map(|page| client.fetch_page(source, page))
        .buffer_unordered(workers.max(1));

    while let Some(fetched) = in_flight.next().await {
        let fetched = fetched?;
        results.push(fetched.result);

        if results.len() % PROGRESS_EVERY == 0 {
            info!(source, "...{}/{} pages done", results.len(), total);
        }
    }

    Ok(results)
}
