use log::{debug, info, warn};
use serde_json::Value;
use std::time::Instant;

use super::sync_traits::FormApiTrait;
use crate::errors::Result;
use crate::submissions::PageCursor;

/// Lazily walks the submissions endpoint from a watermark, one page per call,
/// following the server's continuation links until there are none.
pub struct SubmissionPager<'a> {
    api: &'a dyn FormApiTrait,
    api_token: &'a str,
    label: &'a str,
    cursor: Option<PageCursor>,
    pages: usize,
    fetched: usize,
    started_at: Instant,
}

impl<'a> SubmissionPager<'a> {
    pub fn new(
        api: &'a dyn FormApiTrait,
        api_token: &'a str,
        label: &'a str,
        data_url: String,
        watermark: i64,
    ) -> Self {
        Self {
            api,
            api_token,
            label,
            cursor: Some(PageCursor::First {
                data_url,
                watermark,
            }),
            pages: 0,
            fetched: 0,
            started_at: Instant::now(),
        }
    }

    /// Next page of raw submissions, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };
        let page = self.api.fetch_page(self.api_token, &cursor).await?;
        self.pages += 1;
        self.fetched += page.results.len();
        info!(
            "[api][{}] page={} fetched={}",
            self.label,
            self.pages,
            page.results.len()
        );

        self.cursor = match page.next.filter(|next| !next.is_empty()) {
            Some(next) if matches!(&cursor, PageCursor::Next(current) if *current == next) => {
                warn!(
                    "[api][{}] server returned the same continuation link twice; stopping",
                    self.label
                );
                None
            }
            Some(next) => {
                debug!("[api][{}] next={}", self.label, next);
                Some(PageCursor::Next(next))
            }
            None => {
                info!(
                    "[api][{}] total fetched={} in {:.1}s",
                    self.label,
                    self.fetched,
                    self.started_at.elapsed().as_secs_f64()
                );
                None
            }
        };
        Ok(Some(page.results))
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::InMemoryFormApi;
    use serde_json::json;

    #[tokio::test]
    async fn follows_continuation_links_until_exhausted() {
        let subs: Vec<Value> = (1..=5).map(|id| json!({"_id": id})).collect();
        let api = InMemoryFormApi::new(json!({}), subs).with_page_size(2);
        let mut pager = SubmissionPager::new(&api, "tok", "t/uid", "mem://data/".into(), 0);

        let mut sizes = Vec::new();
        while let Some(page) = pager.next_page().await.unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(pager.fetched(), 5);
        assert!(pager.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_request_carries_the_watermark() {
        let subs: Vec<Value> = (1..=4).map(|id| json!({"_id": id})).collect();
        let api = InMemoryFormApi::new(json!({}), subs);
        let mut pager = SubmissionPager::new(&api, "tok", "t/uid", "mem://data/".into(), 2);

        let page = pager.next_page().await.unwrap().unwrap();
        let ids: Vec<i64> = page.iter().filter_map(|s| s["_id"].as_i64()).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(api.watermarks(), vec![2]);
    }
}
