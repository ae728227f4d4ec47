// Test mocks for the vetting pipeline.
//
// One mock per trait boundary:
// - MockSearcher (SearchProvider) — HashMap query→urls
// - MockScraper (PageScraper) — HashMap url→ScrapedPage, with failure urls
// - KeyedReasoner / CountingReasoner / FailingReasoner (Reasoner)
// - MockStore (SourceStore) — stateful in-memory store with failure urls
// - SnapshotRenderer (ReportRenderer) — JSON snapshot, recorded for asserts
//
// No network, no disk. `cargo test` in seconds.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ollama_client::Reasoner;
use sift_common::{RunState, ScrapedPage, Source};

use crate::pipeline::RunStats;
use crate::traits::{PageScraper, ReportRenderer, SearchProvider, SourceStore};

// ---------------------------------------------------------------------------
// Page helpers
// ---------------------------------------------------------------------------

/// A page with enough sentences for a stable density signal.
pub fn page(title: &str, content: &str) -> ScrapedPage {
    ScrapedPage {
        title: title.to_string(),
        content: content.to_string(),
        published_at: None,
        author: None,
    }
}

pub fn authored_page(
    title: &str,
    content: &str,
    author: &str,
    published_at: DateTime<Utc>,
) -> ScrapedPage {
    ScrapedPage {
        title: title.to_string(),
        content: content.to_string(),
        published_at: Some(published_at),
        author: Some(author.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// HashMap-based search provider. Unregistered queries return no results.
#[derive(Default)]
pub struct MockSearcher {
    results: HashMap<String, Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, urls: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }
}

#[async_trait]
impl SearchProvider for MockSearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .results
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

/// HashMap-based scraper. `failing` urls return `Err`; unregistered urls
/// return an empty page (which downstream treats as a failed scrape).
#[derive(Default)]
pub struct MockScraper {
    pages: HashMap<String, ScrapedPage>,
    failing: HashSet<String>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, page: ScrapedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl PageScraper for MockScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        if self.failing.contains(url) {
            return Err(anyhow!("MockScraper: simulated failure for {url}"));
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| page("", "")))
    }
}

// ---------------------------------------------------------------------------
// Reasoners
// ---------------------------------------------------------------------------

/// Routes prompts by substring. Each rule pairs a needle (typically a token
/// planted in the source content) with separate quality and bias replies;
/// the prompt kind is told apart by its instruction text. Falls back to the
/// default replies when no needle matches.
pub struct KeyedReasoner {
    rules: Vec<(String, String, String)>,
    failing_needles: HashSet<String>,
    default_quality: String,
    default_bias: String,
}

impl KeyedReasoner {
    pub fn new(default_quality: &str, default_bias: &str) -> Self {
        Self {
            rules: Vec::new(),
            failing_needles: HashSet::new(),
            default_quality: default_quality.to_string(),
            default_bias: default_bias.to_string(),
        }
    }

    pub fn on_needle(mut self, needle: &str, quality: &str, bias: &str) -> Self {
        self.rules
            .push((needle.to_string(), quality.to_string(), bias.to_string()));
        self
    }

    /// Simulate a transport failure for prompts mentioning this needle.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing_needles.insert(needle.to_string());
        self
    }
}

#[async_trait]
impl Reasoner for KeyedReasoner {
    async fn query(&self, prompt: &str) -> Result<String> {
        for needle in &self.failing_needles {
            if prompt.contains(needle.as_str()) {
                return Err(anyhow!("connection reset"));
            }
        }
        let is_bias = prompt.contains("BIAS");
        for (needle, quality, bias) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(if is_bias { bias.clone() } else { quality.clone() });
            }
        }
        Ok(if is_bias {
            self.default_bias.clone()
        } else {
            self.default_quality.clone()
        })
    }
}

/// Always returns the same reply and counts calls.
pub struct CountingReasoner {
    reply: String,
    calls: AtomicUsize,
}

impl CountingReasoner {
    pub fn always(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reasoner for CountingReasoner {
    async fn query(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Simulates a reasoning service that is down: every call errors.
pub struct FailingReasoner;

#[async_trait]
impl Reasoner for FailingReasoner {
    async fn query(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("connection refused"))
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory source store. `failing` urls return `Err` on store.
#[derive(Default)]
pub struct MockStore {
    stored: Mutex<Vec<Source>>,
    failing: HashSet<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn stored_urls(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.url.clone())
            .collect()
    }
}

#[async_trait]
impl SourceStore for MockStore {
    async fn store(&self, source: &Source) -> Result<()> {
        if self.failing.contains(&source.url) {
            return Err(anyhow!("MockStore: simulated failure for {}", source.url));
        }
        self.stored.lock().unwrap().push(source.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SnapshotRenderer
// ---------------------------------------------------------------------------

/// Renders the snapshot as JSON and remembers it for assertions.
#[derive(Default)]
pub struct SnapshotRenderer {
    last: Mutex<Option<String>>,
}

impl SnapshotRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_report(&self) -> Option<String> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportRenderer for SnapshotRenderer {
    async fn render(&self, state: &RunState, stats: &RunStats) -> Result<String> {
        let doc = serde_json::to_string_pretty(&serde_json::json!({
            "state": state,
            "stats": stats,
        }))?;
        *self.last.lock().unwrap() = Some(doc.clone());
        Ok(doc)
    }
}
