//! End-to-end pipeline runs against a fixture results page served by a
//! scripted page driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use market_scout::application::{PipelineError, ScrapePipeline};
use market_scout::domain::{Condition, ProductRecord, ProductSink, QueryInput};
use market_scout::infrastructure::ScoutConfig;
use market_scout::infrastructure::page_fetcher::http_driver::count_in_document;
use market_scout::infrastructure::page_fetcher::{FetchError, PageDriver};

const SEARCH_PAGE: &str = include_str!("fixtures/search_page.html");
const EMPTY_PAGE: &str = "<html><body><main><p>該当する商品が見つかりません</p></main></body></html>";

/// Listings without any known container markup, only `/item/` links.
const LINK_ONLY_PAGE: &str = r#"<html><body><div class="grid">
    <div class="cell"><a href="/item/m70000000007">Canon EOS Kiss X10</a><span>¥45,000</span></div>
    <div class="cell"><a href="/item/m80000000008">Sony α6400 ボディ</a><span>¥78,500</span></div>
</div></body></html>"#;

/// Listings recognisable only by their yen amounts.
const PRICE_ONLY_PAGE: &str = r#"<html><body><div class="grid">
    <div class="tile"><h3>Canon EOS Kiss X10</h3>¥45,000</div>
    <div class="tile"><h3>Sony α6400 ボディ</h3>￥78,500</div>
</div></body></html>"#;

const ITEM_PAGE: &str = r#"<html><body><main>
    <div data-testid="item-detail">
      <h1 data-testid="item-name">出品中の商品</h1>
      <div data-testid="price">¥18,000</div>
      <span data-testid="condition">未使用に近い</span>
      <span data-testid="brand">Nintendo</span>
      <span data-testid="seller-rating">4.6</span>
      <pre data-testid="description">付属品完備。動作確認済み。</pre>
    </div>
</main></body></html>"#;

/// Serves the same results document for every search navigation, like a
/// static HTTP session, and `item_html` for item pages.
struct FixtureDriver {
    html: String,
    item_html: Option<String>,
    item_status: Option<u16>,
    loaded: Option<String>,
    navigations: Arc<Mutex<Vec<String>>>,
    fail_navigation: bool,
}

impl FixtureDriver {
    fn serving(html: &str) -> Self {
        Self {
            html: html.to_string(),
            item_html: None,
            item_status: None,
            loaded: None,
            navigations: Arc::new(Mutex::new(Vec::new())),
            fail_navigation: false,
        }
    }
}

#[async_trait]
impl PageDriver for FixtureDriver {
    fn is_static(&self) -> bool {
        true
    }

    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.fail_navigation {
            return Err(FetchError::navigation(url, "connection reset by peer"));
        }
        if url.contains("/item/") {
            if let Some(status) = self.item_status {
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status,
                });
            }
            self.loaded = self.item_html.clone();
        } else {
            self.loaded = Some(self.html.clone());
        }
        Ok(())
    }

    async fn count_matches(&mut self, selector: &str) -> Result<usize, FetchError> {
        Ok(self
            .loaded
            .as_deref()
            .map_or(0, |html| count_in_document(html, selector)))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.loaded
            .clone()
            .ok_or_else(|| FetchError::navigation("-", "no document loaded"))
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<ProductRecord>>>,
}

#[async_trait]
impl ProductSink for RecordingSink {
    async fn store(&self, records: &[ProductRecord]) -> anyhow::Result<usize> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(records.len())
    }
}

struct FailingSink;

#[async_trait]
impl ProductSink for FailingSink {
    async fn store(&self, _records: &[ProductRecord]) -> anyhow::Result<usize> {
        Err(anyhow!("database connection refused"))
    }
}

fn config_with(update: impl FnOnce(&mut ScoutConfig)) -> ScoutConfig {
    let mut config = ScoutConfig::default();
    update(&mut config);
    config
}

fn ids(records: &[ProductRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_fixture_page_is_ranked_deduplicated_and_tagged() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_empty, 0);
    assert_eq!(report.nodes_seen, 6);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.node_failures, 0);
    assert_eq!(report.duplicates_removed, 1);

    let ranked = ids(&report.records);
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0], "m10000000001");
    assert_eq!(ranked[3], "m60000000006");
    assert!(!ranked.contains(&"m30000000003"));

    let scores: Vec<f64> = report.records.iter().map(|r| r.score.unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    for record in &report.records {
        assert!(!record.tags.is_empty() && record.tags.len() <= 10);
        assert_eq!(record.tags[0], "electronics");
    }

    let switch = &report.records[3];
    assert_eq!(switch.seller_rating, None);
    assert_eq!(switch.image_url, ScoutConfig::default().extraction.placeholder_image);

    let url = driver.navigations.lock().unwrap()[0].clone();
    assert!(url.starts_with("https://jp.mercari.com/search?keyword=iPhone"));
    assert!(!url.contains("page="));
}

#[tokio::test(start_paused = true)]
async fn test_listings_repeated_across_pages_are_merged() {
    let config = config_with(|c| c.pipeline.pages_per_query = 2);
    let pipeline = ScrapePipeline::from_config(&config).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.nodes_seen, 12);
    assert_eq!(report.malformed, 2);
    assert_eq!(report.records.len(), 4);
    // five repeated ids on page 2 plus one near-duplicate title
    assert_eq!(report.duplicates_removed, 6);

    let navigations = driver.navigations.lock().unwrap();
    assert_eq!(navigations.len(), 2);
    assert!(navigations[1].contains("page=2"));
}

#[tokio::test(start_paused = true)]
async fn test_page_without_items_is_no_matches() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(EMPTY_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["存在しない商品"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_no_matches());
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.pages_empty, 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_degrades_to_empty_page() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);
    driver.fail_navigation = true;

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_no_matches());
    assert_eq!(report.pages_empty, 1);
    let attempts = ScoutConfig::default().fetcher.retry.max_attempts as usize;
    assert_eq!(driver.navigations.lock().unwrap().len(), attempts);
}

#[tokio::test(start_paused = true)]
async fn test_page_with_only_item_links_is_extracted() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(LINK_ONLY_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["camera"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.pages_empty, 0);
    assert_eq!(report.records.len(), 2);
    let mut found = ids(&report.records);
    found.sort_unstable();
    assert_eq!(found, vec!["m70000000007", "m80000000008"]);
    let mut prices: Vec<u64> = report.records.iter().map(|r| r.price).collect();
    prices.sort_unstable();
    assert_eq!(prices, vec![45_000, 78_500]);
}

#[tokio::test(start_paused = true)]
async fn test_page_with_only_price_texts_is_extracted() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(PRICE_ONLY_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["camera"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.nodes_seen, 2);
    let mut titles: Vec<&str> = report.records.iter().map(|r| r.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["Canon EOS Kiss X10", "Sony α6400 ボディ"]);
}

#[tokio::test(start_paused = true)]
async fn test_item_pages_fill_missing_fields_of_top_listings() {
    let config = config_with(|c| c.pipeline.detail_pages = 4);
    let pipeline = ScrapePipeline::from_config(&config).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);
    driver.item_html = Some(ITEM_PAGE.to_string());

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.details_fetched, 4);
    assert_eq!(report.details_failed, 0);
    assert_eq!(ids(&report.records)[3], "m60000000006");

    let iphone = &report.records[0];
    assert_eq!(iphone.brand.as_deref(), Some("Apple"));
    assert_eq!(iphone.condition, Condition::VeryGood);
    assert_eq!(iphone.seller_rating, Some(4.8));
    assert_eq!(iphone.description.as_deref(), Some("付属品完備。動作確認済み。"));

    let switch = &report.records[3];
    assert_eq!(switch.brand.as_deref(), Some("Nintendo"));
    assert_eq!(switch.condition, Condition::LikeNew);
    assert_eq!(switch.seller_rating, Some(4.6));
    assert!(switch.tags.iter().any(|t| t == "nintendo"));

    let navigations = driver.navigations.lock().unwrap();
    assert_eq!(navigations.len(), 5);
    assert_eq!(navigations[1], "https://jp.mercari.com/item/m10000000001");
}

#[tokio::test(start_paused = true)]
async fn test_missing_item_pages_leave_records_untouched() {
    let config = config_with(|c| c.pipeline.detail_pages = 2);
    let pipeline = ScrapePipeline::from_config(&config).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);
    driver.item_status = Some(404);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.details_fetched, 0);
    assert_eq!(report.details_failed, 2);
    assert_eq!(report.records.len(), 4);
    assert!(report.records.iter().all(|r| r.description.is_none()));
    // one search page, then one attempt per item page
    assert_eq!(driver.navigations.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_max_results_keeps_best_records() {
    let config = config_with(|c| c.pipeline.max_results = 2);
    let pipeline = ScrapePipeline::from_config(&config).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].id, "m10000000001");
}

#[tokio::test(start_paused = true)]
async fn test_sink_receives_final_records() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default())
        .unwrap()
        .with_sink(sink.clone());
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stored, Some(4));
    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], report.records);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_reported_not_fatal() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default())
        .unwrap()
        .with_sink(Arc::new(FailingSink));
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);

    let report = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.records.len(), 4);
    assert_eq!(report.stored, None);
    assert!(report.sink_error.unwrap().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_stops() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let mut driver = FixtureDriver::serving(SEARCH_PAGE);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .run(&QueryInput::new(["iPhone"]), &mut driver, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(driver.navigations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_many_uses_one_session_per_query() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let sessions = AtomicUsize::new(0);
    let queries = vec![
        QueryInput::new(["iPhone"]),
        QueryInput::new(["AirPods"]),
        QueryInput::new(["Nintendo Switch"]),
    ];

    let reports: Vec<_> = pipeline
        .run_many(
            &queries,
            || {
                sessions.fetch_add(1, Ordering::SeqCst);
                Ok(FixtureDriver::serving(SEARCH_PAGE))
            },
            &CancellationToken::new(),
        )
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(sessions.load(Ordering::SeqCst), 3);
    let order: Vec<&str> = reports.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(order, vec!["iPhone", "AirPods", "Nintendo Switch"]);
    assert!(reports.iter().all(|r| r.records.len() == 4));
}

#[tokio::test(start_paused = true)]
async fn test_run_many_reports_session_failure() {
    let pipeline = ScrapePipeline::from_config(&ScoutConfig::default()).unwrap();
    let queries = vec![QueryInput::new(["iPhone"])];

    let mut outcomes = pipeline
        .run_many(
            &queries,
            || -> Result<FixtureDriver, FetchError> {
                Err(FetchError::SessionUnavailable("browser binary not found".to_string()))
            },
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcomes.len(), 1);
    let err = outcomes.remove(0).unwrap_err();
    assert!(matches!(err, PipelineError::Session(FetchError::SessionUnavailable(_))));
}

/// Cancels the run as soon as the first query hands over its records.
struct CancellingSink {
    cancel: CancellationToken,
}

#[async_trait]
impl ProductSink for CancellingSink {
    async fn store(&self, records: &[ProductRecord]) -> anyhow::Result<usize> {
        self.cancel.cancel();
        Ok(records.len())
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_many_keeps_reports_finished_before_cancellation() {
    let cancel = CancellationToken::new();
    let config = config_with(|c| c.pipeline.max_concurrent_sessions = 1);
    let pipeline = ScrapePipeline::from_config(&config)
        .unwrap()
        .with_sink(Arc::new(CancellingSink {
            cancel: cancel.clone(),
        }));
    let queries = vec![QueryInput::new(["iPhone"]), QueryInput::new(["AirPods"])];

    let outcomes = pipeline
        .run_many(&queries, || Ok(FixtureDriver::serving(SEARCH_PAGE)), &cancel)
        .await;

    assert_eq!(outcomes.len(), 2);
    let first = outcomes[0].as_ref().unwrap();
    assert_eq!(first.query, "iPhone");
    assert_eq!(first.stored, Some(4));
    assert!(matches!(outcomes[1], Err(PipelineError::Cancelled)));
}
