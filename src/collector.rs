//! Collector: paginate the search API and publish one dated JSONL snapshot.
use std::time::Duration;

use anyhow::Result;
use object_store::path::Path as ObjectPath;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::datekey::ExecutionDate;
use crate::search::{SearchApi, SearchQuery};
use crate::storage::{self, DynStore};

#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub max_pages: u32,
    /// Inter-page delay, skipped after the final permitted page.
    pub page_delay: Duration,
}

#[derive(Debug)]
pub struct CollectOutcome {
    pub items: Vec<Value>,
    pub pages_fetched: u32,
    /// Pagination stopped early on a request failure. The pages gathered up
    /// to that point are still published; callers relying on completeness
    /// must verify counts.
    pub truncated: bool,
}

/// Walk pages `1..=max_pages`, stopping at the first empty page.
///
/// A request failure ends pagination early but keeps everything already
/// gathered (partial results are preferred over no results).
pub async fn collect_pages<A>(api: &A, query: &SearchQuery, opts: CollectOptions) -> CollectOutcome
where
    A: SearchApi + ?Sized,
{
    let mut items: Vec<Value> = Vec::new();
    let mut pages_fetched = 0;
    let mut truncated = false;

    for page in 1..=opts.max_pages {
        match api.fetch_page(query, page).await {
            Ok(batch) if batch.is_empty() => {
                info!(page, "no more items");
                break;
            }
            Ok(batch) => {
                info!(page, count = batch.len(), "retrieved page");
                items.extend(batch);
                pages_fetched = page;
                if page < opts.max_pages {
                    sleep(opts.page_delay).await;
                }
            }
            Err(err) => {
                warn!(page, error = ?err, "page request failed; keeping partial results");
                truncated = true;
                break;
            }
        }
    }

    CollectOutcome {
        items,
        pages_fetched,
        truncated,
    }
}

/// One compact JSON document per line, newline-separated, no trailing
/// newline. serde_json leaves non-ASCII unescaped, so Japanese item text
/// survives verbatim.
pub fn encode_jsonl(items: &[Value]) -> Result<String> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        lines.push(serde_json::to_string(item)?);
    }
    Ok(lines.join("\n"))
}

#[derive(Debug)]
pub struct PublishReport {
    pub location: ObjectPath,
    pub items: usize,
    pub pages_fetched: u32,
    pub truncated: bool,
}

/// Full collector run: paginate, then publish the snapshot keyed by `date`,
/// overwriting any artifact already at that path.
///
/// Returns `None` when nothing was collected; an empty artifact is never
/// written.
pub async fn run(
    api: &dyn SearchApi,
    store: &DynStore,
    query: &SearchQuery,
    opts: CollectOptions,
    prefix: &str,
    date: &ExecutionDate,
) -> Result<Option<PublishReport>> {
    let outcome = collect_pages(api, query, opts).await;
    if outcome.items.is_empty() {
        warn!("no items collected; skipping publish");
        return Ok(None);
    }

    let location = date.artifact_path(prefix);
    let body = encode_jsonl(&outcome.items)?;
    storage::put_jsonl(store, &location, body).await?;
    info!(
        items = outcome.items.len(),
        pages = outcome.pages_fetched,
        truncated = outcome.truncated,
        location = %location,
        "snapshot published"
    );

    Ok(Some(PublishReport {
        location,
        items: outcome.items.len(),
        pages_fetched: outcome.pages_fetched,
        truncated: outcome.truncated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Returns scripted pages in order; `Err(())` entries become request
    /// failures, exhaustion yields empty pages.
    struct ScriptedApi {
        pages: Mutex<Vec<Result<Vec<Value>, ()>>>,
        calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(pages: Vec<Result<Vec<Value>, ()>>) -> Self {
            let mut pages = pages;
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchApi for ScriptedApi {
        async fn fetch_page(&self, _query: &SearchQuery, _page: u32) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.lock().unwrap().pop() {
                Some(Ok(batch)) => Ok(batch),
                Some(Err(())) => Err(anyhow!("upstream unavailable")),
                None => Ok(Vec::new()),
            }
        }
    }

    fn page_of(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "itemCode": i })).collect()
    }

    fn query() -> SearchQuery {
        SearchQuery {
            keyword: "laptop".into(),
            shop_code: None,
            hits: 2,
        }
    }

    fn opts(max_pages: u32) -> CollectOptions {
        CollectOptions {
            max_pages,
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn stops_after_first_empty_page() {
        let api = ScriptedApi::new(vec![Ok(page_of(2)), Ok(page_of(1)), Ok(vec![])]);

        let outcome = collect_pages(&api, &query(), opts(10)).await;
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.pages_fetched, 2);
        assert!(!outcome.truncated);
        // The empty page is the last request; nothing beyond it.
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn never_exceeds_max_pages() {
        let api = ScriptedApi::new(vec![
            Ok(page_of(2)),
            Ok(page_of(2)),
            Ok(page_of(2)),
            Ok(page_of(2)),
            Ok(page_of(2)),
        ]);

        let outcome = collect_pages(&api, &query(), opts(3)).await;
        assert_eq!(api.calls(), 3);
        assert_eq!(outcome.items.len(), 6);
        assert_eq!(outcome.pages_fetched, 3);
    }

    #[tokio::test]
    async fn request_failure_keeps_partial_results() {
        let api = ScriptedApi::new(vec![Ok(page_of(2)), Err(()), Ok(page_of(2))]);

        let outcome = collect_pages(&api, &query(), opts(10)).await;
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.truncated);
        // Pagination stops at the failure; the third page is never requested.
        assert_eq!(api.calls(), 2);
    }

    #[test]
    fn encode_jsonl_preserves_non_ascii() {
        let items = vec![
            json!({ "itemName": "ノートパソコン" }),
            json!({ "itemName": "plain" }),
        ];
        let body = encode_jsonl(&items).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.contains("ノートパソコン"));
        assert!(!body.contains("\\u"));
        assert!(!body.ends_with('\n'));
    }

    #[tokio::test]
    async fn run_publishes_one_line_per_item() {
        let api = ScriptedApi::new(vec![Ok(page_of(2)), Ok(page_of(1)), Ok(vec![])]);
        let store: DynStore = Arc::new(InMemory::new());
        let date = ExecutionDate::from_ymd_str("20240131").unwrap();

        let report = run(&api, &store, &query(), opts(3), "raw/search", &date)
            .await
            .unwrap()
            .expect("items were collected");

        assert_eq!(report.items, 3);
        assert_eq!(
            report.location.as_ref(),
            "raw/search/202401/search_items_20240131.jsonl"
        );
        let text = storage::fetch_text(&store, &report.location).await.unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn run_skips_publish_when_nothing_collected() {
        let api = ScriptedApi::new(vec![Ok(vec![])]);
        let store: DynStore = Arc::new(InMemory::new());
        let date = ExecutionDate::from_ymd_str("20240131").unwrap();

        let report = run(&api, &store, &query(), opts(3), "raw/search", &date)
            .await
            .unwrap();
        assert!(report.is_none());
        assert!(!storage::exists(&store, &date.artifact_path("raw/search"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn rerun_overwrites_same_day_artifact() {
        let store: DynStore = Arc::new(InMemory::new());
        let date = ExecutionDate::from_ymd_str("20240131").unwrap();

        let first = ScriptedApi::new(vec![Ok(page_of(2)), Ok(vec![])]);
        run(&first, &store, &query(), opts(3), "raw/search", &date)
            .await
            .unwrap();

        let second = ScriptedApi::new(vec![Ok(page_of(1)), Ok(vec![])]);
        let report = run(&second, &store, &query(), opts(3), "raw/search", &date)
            .await
            .unwrap()
            .expect("items were collected");

        let text = storage::fetch_text(&store, &report.location).await.unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
