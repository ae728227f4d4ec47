//! End-to-end tests for the vetting pipeline, running the full stage
//! sequence against the trait mocks — no network, no disk.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::watch;

use ollama_client::Reasoner;
use sift_common::{Config, RunStage, SourceStatus, Stage};
use sift_engine::pipeline::Pipeline;
use sift_engine::routing::Route;
use sift_engine::testing::{
    authored_page, page, FailingReasoner, KeyedReasoner, MockScraper, MockSearcher, MockStore,
    SnapshotRenderer,
};

// Ten sentences, six with numeric facts: density 60, so a .gov source with
// a fresh date and an author lands at the 44-point heuristic composite.
const GOV_BODY: &str = "Fact 1. Fact 2. Fact 3. Fact 4. Fact 5. Fact 6. \
                        Context follows. More context. Closing remarks. The end.";

fn test_config() -> Config {
    Config {
        threshold: 85.0,
        max_sources: 10,
        concurrency_limit: 5,
        ..Config::default()
    }
}

fn pipeline_with(
    searcher: MockSearcher,
    scraper: MockScraper,
    reasoner: Arc<dyn Reasoner>,
    store: Arc<MockStore>,
    config: Config,
) -> (Pipeline, Arc<SnapshotRenderer>) {
    let renderer = Arc::new(SnapshotRenderer::new());
    let pipeline = Pipeline::new(
        Arc::new(searcher),
        Arc::new(scraper),
        reasoner,
        store,
        renderer.clone(),
        config,
    );
    (pipeline, renderer)
}

// ---------------------------------------------------------------------------
// Scenario A: trustworthy .gov source routes to storage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trustworthy_source_routes_to_storage() {
    let url = "https://agency.gov/report";
    let searcher = MockSearcher::new().on_query("energy policy", &[url]);
    let scraper = MockScraper::new().on_page(
        url,
        authored_page("Report", GOV_BODY, "Agency Staff", Utc::now() - Duration::days(10)),
    );
    // quality 90, bias 10: judgment side contributes 45
    let reasoner = Arc::new(KeyedReasoner::new("90", "10"));
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(searcher, scraper, reasoner, store.clone(), test_config());
    let outcome = pipeline
        .run("energy policy", vec!["energy policy".to_string()])
        .await;

    assert_eq!(outcome.state.stage, RunStage::Done);
    assert_eq!(outcome.route, Some(Route::Storage));
    assert!(outcome.fatal.is_none());

    let scored = &outcome.state.scored[url];
    let trust = scored.trust_score.unwrap();
    assert!((trust - 89.0).abs() < 0.1, "expected ~89, got {trust}");

    assert_eq!(store.stored_urls(), vec![url.to_string()]);
    assert_eq!(outcome.state.stored[url].status, SourceStatus::Stored);
    assert!(outcome.report.is_some());
}

// ---------------------------------------------------------------------------
// Threshold boundary: exactly at threshold does not qualify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_exactly_at_threshold_routes_to_report() {
    let url = "https://agency.gov/report";
    let searcher = MockSearcher::new().on_query("q", &[url]);
    let scraper = MockScraper::new().on_page(
        url,
        authored_page("Report", GOV_BODY, "Agency Staff", Utc::now() - Duration::days(10)),
    );
    // heuristic 44 + (70*0.30 + 100*0.20) = 44 + 41 = exactly 85
    let reasoner = Arc::new(KeyedReasoner::new("70", "0"));
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(searcher, scraper, reasoner, store.clone(), test_config());
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    let trust = outcome.state.scored[url].trust_score.unwrap();
    assert!((trust - 85.0).abs() < 1e-9, "expected exactly 85, got {trust}");
    assert_eq!(outcome.route, Some(Route::Report));
    assert!(store.stored_urls().is_empty());
    // Report branch skips storage entirely; nothing is marked rejected
    assert!(outcome.state.rejected.is_empty());
    assert!(outcome.report.is_some());
}

// ---------------------------------------------------------------------------
// Scenario B: every scrape fails, run still reports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_scrapes_failed_reports_zero_sources_with_errors() {
    let urls = ["https://a.example/1", "https://b.example/2", "https://c.example/3"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    // One hard failure, two empty pages; all three count as failed scrapes
    let scraper = MockScraper::new()
        .failing(urls[0])
        .on_page(urls[1], page("", ""))
        .on_page(urls[2], page("", ""));
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(
        searcher,
        scraper,
        Arc::new(KeyedReasoner::new("90", "10")),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.state.stage, RunStage::Done);
    assert_eq!(outcome.route, Some(Route::Report));
    assert!(outcome.state.scored.is_empty());
    assert_eq!(outcome.stats.urls_failed, 3);
    assert_eq!(outcome.state.failed.len(), 3);
    for url in urls {
        assert_eq!(outcome.state.failed[url].status, SourceStatus::ScrapeFailed);
    }

    // No trust score was ever computed for a failed scrape
    assert!(outcome.state.scraped.is_empty());
    assert!(store.stored_urls().is_empty());

    // The report still renders and carries the scrape errors
    let report = outcome.report.expect("report should render");
    assert!(report.contains("scrape"));
    assert_eq!(
        outcome
            .state
            .errors
            .iter()
            .filter(|e| e.stage == Stage::Scrape && e.message.starts_with("Scrape error"))
            .count(),
        3
    );
}

// ---------------------------------------------------------------------------
// Scenario C: reasoning service down for every source is fatal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reasoner_down_for_all_sources_is_fatal() {
    let urls = ["https://a.example/1", "https://b.example/2"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    let scraper = MockScraper::new()
        .on_page(urls[0], page("One", "Fact 1. Fact 2. Fact 3. And more."))
        .on_page(urls[1], page("Two", "Fact 4. Fact 5. Fact 6. And more."));
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(
        searcher,
        scraper,
        Arc::new(FailingReasoner),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.state.stage, RunStage::Failed);
    assert!(outcome.fatal.is_some());
    assert!(outcome.report.is_none());
    assert_eq!(outcome.route, None);
    assert!(store.stored_urls().is_empty());
    // The error log survives the fatal outcome for the caller
    assert!(outcome
        .state
        .errors
        .iter()
        .any(|e| e.stage == Stage::Analyze));
}

// ---------------------------------------------------------------------------
// Partial judgment failure recovers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_judgment_failures_exclude_only_those_sources() {
    let urls = ["https://a.example/alpha", "https://b.example/beta"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    let scraper = MockScraper::new()
        .on_page(urls[0], page("Alpha", "alpha-token fact 1. More. And more."))
        .on_page(urls[1], page("Beta", "beta-token fact 2. More. And more."));
    let reasoner = Arc::new(
        KeyedReasoner::new("80", "20").failing_on("beta-token"),
    );
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(searcher, scraper, reasoner, store, test_config());
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.state.stage, RunStage::Done);
    assert!(outcome.fatal.is_none());
    assert!(outcome.state.scored.contains_key(urls[0]));
    assert!(!outcome.state.scored.contains_key(urls[1]));
    assert!(outcome
        .state
        .errors
        .iter()
        .any(|e| e.stage == Stage::Analyze && e.url.as_deref() == Some(urls[1])));
}

// ---------------------------------------------------------------------------
// Concurrency attribution: 50 sources under a limit of 5
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_scoring_attributes_results_to_the_right_source() {
    let mut searcher = MockSearcher::new();
    let mut scraper = MockScraper::new();
    let mut reasoner = KeyedReasoner::new("0", "50");

    let urls: Vec<String> = (0..50).map(|i| format!("https://example.com/doc-{i:02}")).collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    searcher = searcher.on_query("q", &url_refs);

    for (i, url) in urls.iter().enumerate() {
        let token = format!("token-{i:02}");
        let body = format!("{token} appears here. Fact 1. Fact 2. Fact 3.");
        scraper = scraper.on_page(url, page(&format!("Doc {i}"), &body));
        // Each source gets a distinct quality score equal to its index
        reasoner = reasoner.on_needle(&token, &i.to_string(), "50");
    }

    let config = Config {
        max_sources: 50,
        concurrency_limit: 5,
        ..test_config()
    };
    let store = Arc::new(MockStore::new());
    let (pipeline, _) = pipeline_with(searcher, scraper, Arc::new(reasoner), store, config);
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.state.scored.len(), 50);
    for (i, url) in urls.iter().enumerate() {
        let judgment = outcome.state.scored[url].judgment.unwrap();
        assert_eq!(
            judgment.quality, i as f64,
            "judgment for {url} was cross-assigned"
        );
    }
}

// ---------------------------------------------------------------------------
// Storage failure does not block reporting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_failure_is_logged_and_reporting_proceeds() {
    let urls = ["https://a.gov/good", "https://b.gov/flaky"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    let fresh = Utc::now() - Duration::days(5);
    let scraper = MockScraper::new()
        .on_page(urls[0], authored_page("Good", GOV_BODY, "Staff", fresh))
        .on_page(urls[1], authored_page("Flaky", GOV_BODY, "Staff", fresh));
    let store = Arc::new(MockStore::new().failing(urls[1]));

    let (pipeline, _) = pipeline_with(
        searcher,
        scraper,
        Arc::new(KeyedReasoner::new("90", "10")),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.route, Some(Route::Storage));
    assert_eq!(store.stored_urls(), vec![urls[0].to_string()]);
    assert_eq!(outcome.stats.storage_failures, 1);
    // The flaky source stays in the scored set, unmarked
    assert!(outcome.state.scored.contains_key(urls[1]));
    assert!(!outcome.state.stored.contains_key(urls[1]));
    assert!(outcome.report.is_some());
    assert!(outcome
        .state
        .errors
        .iter()
        .any(|e| e.stage == Stage::Storage
            && e.url.as_deref() == Some(urls[1])
            && e.message.starts_with("Storage error")));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Flips the cancel flag the first time it's asked anything, then hangs.
struct CancellingReasoner {
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl Reasoner for CancellingReasoner {
    async fn query(&self, _prompt: &str) -> Result<String> {
        let _ = self.cancel.send(true);
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancellation_during_analysis_preserves_earlier_state() {
    let urls = ["https://a.example/1", "https://b.example/2"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    let scraper = MockScraper::new()
        .on_page(urls[0], page("One", "Fact 1. Fact 2. Fact 3."))
        .on_page(urls[1], page("Two", "Fact 4. Fact 5. Fact 6."));
    let store = Arc::new(MockStore::new());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (pipeline, _) = pipeline_with(
        searcher,
        scraper,
        Arc::new(CancellingReasoner { cancel: cancel_tx }),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline
        .run_with_cancel("q", vec!["q".to_string()], cancel_rx)
        .await;

    assert_eq!(outcome.state.stage, RunStage::Cancelled);
    assert!(outcome.report.is_none());
    assert!(outcome.fatal.is_none());
    // Work folded in before the cancelled stage survives
    assert_eq!(outcome.state.scraped.len(), 2);
    assert!(store.stored_urls().is_empty());
}

#[tokio::test]
async fn pre_cancelled_run_terminates_immediately() {
    let searcher = MockSearcher::new().on_query("q", &["https://a.example/1"]);
    let store = Arc::new(MockStore::new());
    let (cancel_tx, cancel_rx) = watch::channel(true);

    let (pipeline, _) = pipeline_with(
        searcher,
        MockScraper::new(),
        Arc::new(KeyedReasoner::new("90", "10")),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline
        .run_with_cancel("q", vec!["q".to_string()], cancel_rx)
        .await;
    drop(cancel_tx);

    assert_eq!(outcome.state.stage, RunStage::Cancelled);
    assert!(outcome.state.scored.is_empty());
    assert!(store.stored_urls().is_empty());
}

// ---------------------------------------------------------------------------
// Rejected sources in the storage branch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn below_threshold_sources_are_rejected_when_storage_runs() {
    let urls = ["https://a.gov/strong", "https://b.example.xyz/weak"];
    let searcher = MockSearcher::new().on_query("q", &urls);
    let fresh = Utc::now() - Duration::days(5);
    let scraper = MockScraper::new()
        .on_page(urls[0], authored_page("Strong", GOV_BODY, "Staff", fresh))
        .on_page(urls[1], page("Weak", "No facts here. Just opinion. Really."));
    let store = Arc::new(MockStore::new());

    let (pipeline, _) = pipeline_with(
        searcher,
        scraper,
        Arc::new(KeyedReasoner::new("90", "10")),
        store.clone(),
        test_config(),
    );
    let outcome = pipeline.run("q", vec!["q".to_string()]).await;

    assert_eq!(outcome.route, Some(Route::Storage));
    assert!(outcome.state.stored.contains_key(urls[0]));
    assert!(outcome.state.rejected.contains_key(urls[1]));
    assert_eq!(outcome.state.rejected[urls[1]].status, SourceStatus::Rejected);
    assert_eq!(store.stored_urls(), vec![urls[0].to_string()]);
}
