use std::collections::BTreeMap;

use crate::models::{PageResult, StargazerRecord};

/// Merge page results, in whatever order they completed, into one
/// page-ascending record sequence.
///
/// A capped page contributes no records at its position; pages on either
/// side of it are kept.
pub fn assemble(pages: impl IntoIterator<Item = PageResult>) -> Vec<StargazerRecord> {
    let by_page: BTreeMap<u32, PageResult> = pages.into_iter().map(|p| (p.page(), p)).collect();

    let mut records = Vec::with_capacity(by_page.values().map(PageResult::len).sum());
    for (_, page) in by_page {
        match page {
            PageResult::Records { records: page_records, .. } => records.extend(page_records),
            PageResult::Capped { .. } => {}
        }
    }
    records
}
