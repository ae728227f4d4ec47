use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Source ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Discovered,
    Scraped,
    ScrapeFailed,
    Scored,
    Stored,
    Rejected,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Discovered => write!(f, "discovered"),
            SourceStatus::Scraped => write!(f, "scraped"),
            SourceStatus::ScrapeFailed => write!(f, "scrape_failed"),
            SourceStatus::Scored => write!(f, "scored"),
            SourceStatus::Stored => write!(f, "stored"),
            SourceStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One discovered document moving through the run. Keyed by `url` within a
/// run; each instance moves through stages sequentially, so per-source tasks
/// never share a mutable Source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub heuristic: Option<HeuristicResult>,
    pub judgment: Option<JudgmentResult>,
    /// 0-100 composite credibility. Set exactly once by the aggregator;
    /// present iff status is Scored, Stored or Rejected.
    pub trust_score: Option<f64>,
    pub status: SourceStatus,
}

impl Source {
    /// A bare stub as it comes out of search: url only, no content yet.
    pub fn discovered(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            content: String::new(),
            published_at: None,
            author: None,
            heuristic: None,
            judgment: None,
            trust_score: None,
            status: SourceStatus::Discovered,
        }
    }

    /// Host portion of the url, lowercased. None if the url doesn't parse.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    /// Strict comparison: a source scoring exactly at the threshold does
    /// not qualify.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.trust_score.map(|s| s > threshold).unwrap_or(false)
    }
}

// --- Scoring results ---

/// Cheap deterministic signals derived from url and raw text.
/// Sub-scores are each 0-100; `composite` is the weighted 0-50 budget that
/// the aggregator adds to the judgment side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub domain: f64,
    pub recency: f64,
    pub density: f64,
    pub transparency: f64,
    pub composite: f64,
}

impl HeuristicResult {
    /// Sentinel for sources whose scrape produced no content. Excluded from
    /// scoring entirely.
    pub fn empty_content() -> Self {
        Self {
            domain: 0.0,
            recency: 0.0,
            density: 0.0,
            transparency: 0.0,
            composite: 0.0,
        }
    }

    /// The heuristic side re-normalized to 0-100 for display. Aggregation
    /// uses `composite` directly.
    pub fn subtotal(&self) -> f64 {
        self.composite / 0.5
    }
}

/// Scores parsed out of the reasoning service's qualitative assessment.
/// `bias` is a penalty: higher means more biased.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub quality: f64,
    pub bias: f64,
    /// True when the service response was unparseable after the retry and
    /// the neutral default was used instead.
    pub fallback: bool,
}

impl JudgmentResult {
    pub fn neutral() -> Self {
        Self {
            quality: 50.0,
            bias: 50.0,
            fallback: true,
        }
    }

    /// Quality and inverted bias, a 0-50 budget mirroring the heuristic side.
    pub fn score(&self) -> f64 {
        self.quality * 0.30 + (100.0 - self.bias) * 0.20
    }
}

// --- Run state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QueryGeneration,
    Search,
    Scrape,
    Analyze,
    Storage,
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::QueryGeneration => write!(f, "query_generation"),
            Stage::Search => write!(f, "search"),
            Stage::Scrape => write!(f, "scrape"),
            Stage::Analyze => write!(f, "analyze"),
            Stage::Storage => write!(f, "storage"),
            Stage::Report => write!(f, "report"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub stage: Stage,
    pub url: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Initialized,
    QueriesGenerated,
    Searched,
    Scraped,
    Analyzed,
    Stored,
    Skipped,
    Reported,
    Done,
    Cancelled,
    Failed,
}

impl RunStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Cancelled | RunStage::Failed)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStage::Initialized => write!(f, "initialized"),
            RunStage::QueriesGenerated => write!(f, "queries_generated"),
            RunStage::Searched => write!(f, "searched"),
            RunStage::Scraped => write!(f, "scraped"),
            RunStage::Analyzed => write!(f, "analyzed"),
            RunStage::Stored => write!(f, "stored"),
            RunStage::Skipped => write!(f, "skipped"),
            RunStage::Reported => write!(f, "reported"),
            RunStage::Done => write!(f, "done"),
            RunStage::Cancelled => write!(f, "cancelled"),
            RunStage::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable state for one research run. Owned exclusively by the pipeline;
/// worker tasks return values which the pipeline folds in after each stage's
/// join barrier, so nothing here needs a lock.
///
/// The per-stage maps are append-only and keyed by url. A url appears in at
/// most one of `stored`/`rejected` but stays in `scored` either way; urls
/// whose scrape failed or came back empty live in `failed` as ScrapeFailed
/// stubs and never reach scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub topic: String,
    pub stage: RunStage,
    pub queries: Vec<String>,
    pub discovered: Vec<String>,
    pub scraped: BTreeMap<String, Source>,
    pub failed: BTreeMap<String, Source>,
    pub scored: BTreeMap<String, Source>,
    pub stored: BTreeMap<String, Source>,
    pub rejected: BTreeMap<String, Source>,
    pub errors: Vec<ErrorEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            stage: RunStage::Initialized,
            queries: Vec::new(),
            discovered: Vec::new(),
            scraped: BTreeMap::new(),
            failed: BTreeMap::new(),
            scored: BTreeMap::new(),
            stored: BTreeMap::new(),
            rejected: BTreeMap::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn push_error(
        &mut self,
        stage: Stage,
        url: Option<&str>,
        message: impl Into<String>,
    ) {
        self.errors.push(ErrorEntry {
            stage,
            url: url.map(|u| u.to_string()),
            message: message.into(),
        });
    }

    /// Append a discovered url, preserving first-seen order and uniqueness.
    pub fn discover(&mut self, url: String) {
        if !self.discovered.iter().any(|u| u == &url) {
            self.discovered.push(url);
        }
    }

    /// Record a scrape failure: the url keeps a ScrapeFailed stub in
    /// `failed` and never reaches scoring.
    pub fn fail_scrape(&mut self, url: String) {
        let mut source = Source::discovered(url.clone());
        source.status = SourceStatus::ScrapeFailed;
        self.failed.insert(url, source);
    }
}

// --- Collaborator payloads ---

/// What the scrape collaborator returns for one url.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub title: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
}
