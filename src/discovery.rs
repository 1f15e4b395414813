use tracing::info;

use crate::config::PER_PAGE;
use crate::error::Result;
use crate::github::GitHubClient;
use crate::models::{Discovery, PageResult};

/// Fetch page 1 and work out how many pages the source has.
///
/// An empty first page means the source has no stargazers and yields
/// `last_page == 0`. Otherwise the `rel="last"` link of the same response
/// names the last page (1 when absent), clamped to `page_cap`.
pub async fn discover(client: &GitHubClient, source: &str, page_cap: u32) -> Result<Discovery> {
    let first = client.fetch_page(source, 1).await?;

    let first_page = match first.result {
        PageResult::Records { records, .. } if !records.is_empty() => records,
        _ => {
            info!(source, "No stargazers found");
            return Ok(Discovery {
                first_page: Vec::new(),
                last_page: 0,
                rate_limit: first.rate_limit,
            });
        }
    };

    let reported = first.last_page.unwrap_or(1);
    let last_page = clamp_last_page(reported, page_cap);

    info!(
        source,
        last_page,
        reported,
        quota_remaining = first.rate_limit.remaining,
        quota_limit = first.rate_limit.limit,
        "{} pages to fetch (~{} records)",
        last_page,
        last_page * PER_PAGE
    );

    Ok(Discovery {
        first_page,
        last_page,
        rate_limit: first.rate_limit,
    })
}

/// Never below 1 for a non-empty source, never above the cap.
pub fn clamp_last_page(reported: u32, page_cap: u32) -> u32 {
    reported.clamp(1, page_cap.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HARD_PAGE_CAP;

    #[test]
    fn clamps_to_hard_cap() {
        assert_eq!(clamp_last_page(401, HARD_PAGE_CAP), 400);
        assert_eq!(clamp_last_page(100_000, HARD_PAGE_CAP), 400);
        assert_eq!(clamp_last_page(400, HARD_PAGE_CAP), 400);
        assert_eq!(clamp_last_page(3, HARD_PAGE_CAP), 3);
    }

    #[test]
    fn never_below_one() {
        assert_eq!(clamp_last_page(0, HARD_PAGE_CAP), 1);
        assert_eq!(clamp_last_page(5, 0), 1);
    }
}
