//! Pipeline orchestrator — sequences the stages of a vetting run, owns all
//! mutable run-level state, and evaluates the routing decision at the batch
//! join barrier.
//!
//! Per-source work (scraping, judgment) runs as independent concurrent tasks
//! under a bounded `buffer_unordered`; results come back as values and are
//! folded into `RunState` sequentially, so nothing here needs a lock.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::Future;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use ollama_client::Reasoner;
use sift_common::{
    Config, RunStage, RunState, SiftError, Source, SourceStatus, Stage,
};

use crate::heuristics;
use crate::judge::Judge;
use crate::routing::{self, Route};
use crate::run_log::{EventKind, RunLog};
use crate::score;
use crate::traits::{PageScraper, ReportRenderer, SearchProvider, SourceStore};

// ---------------------------------------------------------------------------
// RunStats
// ---------------------------------------------------------------------------

/// Stats from a vetting run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub queries_run: u32,
    pub urls_discovered: u32,
    pub urls_scraped: u32,
    pub urls_failed: u32,
    pub sources_scored: u32,
    pub judgment_fallbacks: u32,
    pub sources_stored: u32,
    pub storage_failures: u32,
    pub sources_rejected: u32,
    pub avg_trust: f64,
    pub max_trust: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Vetting Run Complete ===")?;
        writeln!(f, "Queries run:        {}", self.queries_run)?;
        writeln!(f, "URLs discovered:    {}", self.urls_discovered)?;
        writeln!(f, "URLs scraped:       {}", self.urls_scraped)?;
        writeln!(f, "URLs failed:        {}", self.urls_failed)?;
        writeln!(f, "Sources scored:     {}", self.sources_scored)?;
        writeln!(f, "Judgment fallbacks: {}", self.judgment_fallbacks)?;
        writeln!(f, "Sources stored:     {}", self.sources_stored)?;
        writeln!(f, "Storage failures:   {}", self.storage_failures)?;
        writeln!(f, "Sources rejected:   {}", self.sources_rejected)?;
        writeln!(f, "Average trust:      {:.1}", self.avg_trust)?;
        writeln!(f, "Max trust:          {:.1}", self.max_trust)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

pub struct RunOutcome {
    /// Final run state, including the append-only error log. Present in all
    /// outcomes, fatal and cancelled included, for partial reporting.
    pub state: RunState,
    pub stats: RunStats,
    /// The routing decision, if the run got that far.
    pub route: Option<Route>,
    /// The rendered report document. None for fatal and cancelled runs.
    pub report: Option<String>,
    /// Set when the run aborted on a systemic failure.
    pub fatal: Option<String>,
    pub run_log: RunLog,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    searcher: Arc<dyn SearchProvider>,
    scraper: Arc<dyn PageScraper>,
    judge: Judge,
    store: Arc<dyn SourceStore>,
    renderer: Arc<dyn ReportRenderer>,
    config: Config,
}

enum AnalyzeOutcome {
    Scored(Box<Source>),
    Unavailable { url: String, message: String },
}

impl Pipeline {
    pub fn new(
        searcher: Arc<dyn SearchProvider>,
        scraper: Arc<dyn PageScraper>,
        reasoner: Arc<dyn Reasoner>,
        store: Arc<dyn SourceStore>,
        renderer: Arc<dyn ReportRenderer>,
        config: Config,
    ) -> Self {
        let judge = Judge::new(reasoner, config.prompt_char_budget());
        Self {
            searcher,
            scraper,
            judge,
            store,
            renderer,
            config,
        }
    }

    /// Run the full pipeline for one topic. `queries` come from the caller
    /// (query generation is an external concern); an empty list falls back
    /// to the topic itself.
    pub async fn run(&self, topic: &str, queries: Vec<String>) -> RunOutcome {
        // Keep the sender alive so the receiver never observes a close.
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_with_cancel(topic, queries, cancel_rx).await
    }

    /// Like `run`, but aborts when `cancel` flips to true. In-flight
    /// per-source tasks are dropped; already-scored sources and the error
    /// log survive into the outcome.
    pub async fn run_with_cancel(
        &self,
        topic: &str,
        queries: Vec<String>,
        cancel: watch::Receiver<bool>,
    ) -> RunOutcome {
        let run_id = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut run_log = RunLog::new(run_id, topic.to_string());
        let mut state = RunState::new(topic);
        let mut stats = RunStats::default();

        info!(topic, "Vetting run starting");

        let (route, report, fatal) = match self
            .run_inner(&mut state, &mut stats, &mut run_log, queries, cancel)
            .await
        {
            Ok((route, report)) => {
                state.stage = RunStage::Done;
                (route, report, None)
            }
            Err(SiftError::Cancelled) => {
                warn!(topic, "Run cancelled");
                run_log.log(EventKind::RunCancelled);
                state.stage = RunStage::Cancelled;
                (None, None, None)
            }
            Err(e) => {
                error!(topic, error = %e, "Run failed");
                run_log.log(EventKind::RunFatal {
                    message: e.to_string(),
                });
                state.stage = RunStage::Failed;
                (None, None, Some(e.to_string()))
            }
        };

        state.finished_at = Some(Utc::now());
        info!("{stats}");

        RunOutcome {
            state,
            stats,
            route,
            report,
            fatal,
            run_log,
        }
    }

    async fn run_inner(
        &self,
        state: &mut RunState,
        stats: &mut RunStats,
        run_log: &mut RunLog,
        queries: Vec<String>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(Option<Route>, Option<String>), SiftError> {
        let limit = self.config.concurrency_limit.max(1);

        // --- Queries ---
        state.queries = if queries.is_empty() {
            vec![state.topic.clone()]
        } else {
            queries
        };
        state.stage = RunStage::QueriesGenerated;

        // --- Search stage ---
        let query_list = state.queries.clone();
        let max_sources = self.config.max_sources;
        let search_results = cancellable(&mut cancel, async {
            stream::iter(query_list.into_iter().map(|query| async move {
                let result = self.searcher.search(&query, max_sources).await;
                (query, result)
            }))
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await
        })
        .await?;

        for (query, result) in search_results {
            match result {
                Ok(urls) => {
                    run_log.log(EventKind::SearchQuery {
                        query: query.clone(),
                        result_count: urls.len() as u32,
                    });
                    stats.queries_run += 1;
                    for url in urls {
                        state.discover(url);
                    }
                }
                Err(e) => {
                    warn!(query, error = %e, "Search failed");
                    state.push_error(Stage::Search, None, format!("{query}: {e}"));
                }
            }
        }
        state.discovered.truncate(self.config.max_sources);
        stats.urls_discovered = state.discovered.len() as u32;
        state.stage = RunStage::Searched;
        info!(urls = state.discovered.len(), "Search complete");

        // --- Scrape stage ---
        let urls = state.discovered.clone();
        let scrape_results = cancellable(&mut cancel, async {
            stream::iter(urls.into_iter().map(|url| async move {
                let result = self.scraper.scrape(&url).await;
                (url, result)
            }))
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await
        })
        .await?;

        for (url, result) in scrape_results {
            match result {
                Ok(page) if !page.content.trim().is_empty() => {
                    run_log.log(EventKind::ScrapeUrl {
                        url: url.clone(),
                        success: true,
                        content_bytes: page.content.len(),
                    });
                    let mut source = Source::discovered(&url);
                    source.title = page.title;
                    source.content = page.content;
                    source.published_at = page.published_at;
                    source.author = page.author;
                    source.status = SourceStatus::Scraped;
                    stats.urls_scraped += 1;
                    state.scraped.insert(url, source);
                }
                Ok(_) => {
                    run_log.log(EventKind::ScrapeUrl {
                        url: url.clone(),
                        success: false,
                        content_bytes: 0,
                    });
                    warn!(url, "Scrape returned empty content");
                    let err = SiftError::Scrape("empty content".to_string());
                    state.push_error(Stage::Scrape, Some(&url), err.to_string());
                    state.fail_scrape(url);
                    stats.urls_failed += 1;
                }
                Err(e) => {
                    run_log.log(EventKind::ScrapeUrl {
                        url: url.clone(),
                        success: false,
                        content_bytes: 0,
                    });
                    warn!(url, error = %e, "Scrape failed");
                    let err = SiftError::Scrape(e.to_string());
                    state.push_error(Stage::Scrape, Some(&url), err.to_string());
                    state.fail_scrape(url);
                    stats.urls_failed += 1;
                }
            }
        }
        state.stage = RunStage::Scraped;
        info!(
            scraped = state.scraped.len(),
            failed = state.failed.len(),
            "Scrape complete"
        );

        // --- Analyze stage ---
        // Heuristics never suspend; the judgment request is the only
        // suspension point per source. The collect below is the join
        // barrier: routing never sees a partially scored batch.
        let now = Utc::now();
        let batch: Vec<Source> = state.scraped.values().cloned().collect();
        let attempted = batch.len();
        let analyze_results = cancellable(&mut cancel, async {
            stream::iter(batch.into_iter().map(|mut source| async move {
                let heuristic = heuristics::extract(&source, now);
                match self.judge.assess(&source).await {
                    Ok(judgment) => {
                        let trust = score::aggregate(&heuristic, &judgment);
                        source.heuristic = Some(heuristic);
                        source.judgment = Some(judgment);
                        source.trust_score = Some(trust);
                        source.status = SourceStatus::Scored;
                        AnalyzeOutcome::Scored(Box::new(source))
                    }
                    Err(e) => AnalyzeOutcome::Unavailable {
                        url: source.url,
                        message: e.to_string(),
                    },
                }
            }))
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await
        })
        .await?;

        let mut unavailable = 0usize;
        for outcome in analyze_results {
            match outcome {
                AnalyzeOutcome::Scored(source) => {
                    if let (Some(judgment), Some(trust)) = (source.judgment, source.trust_score) {
                        run_log.log(EventKind::JudgmentScored {
                            url: source.url.clone(),
                            quality: judgment.quality,
                            bias: judgment.bias,
                            fallback: judgment.fallback,
                        });
                        run_log.log(EventKind::SourceScored {
                            url: source.url.clone(),
                            trust,
                        });
                        if judgment.fallback {
                            stats.judgment_fallbacks += 1;
                            let err = SiftError::JudgmentParse(
                                "unparseable after retry, neutral default used".to_string(),
                            );
                            state.push_error(Stage::Analyze, Some(&source.url), err.to_string());
                        }
                    }
                    stats.sources_scored += 1;
                    state.scored.insert(source.url.clone(), *source);
                }
                AnalyzeOutcome::Unavailable { url, message } => {
                    unavailable += 1;
                    warn!(url, message, "Judgment request failed");
                    state.push_error(Stage::Analyze, Some(&url), message);
                }
            }
        }

        // Stage-wide unavailability is the one fatal condition: every
        // attempted request failed at the transport level and nothing got
        // scored.
        if attempted > 0 && state.scored.is_empty() && unavailable == attempted {
            return Err(SiftError::JudgmentUnavailable(format!(
                "all {attempted} judgment requests failed"
            )));
        }

        if stats.sources_scored > 0 {
            let scores: Vec<f64> = state.scored.values().filter_map(|s| s.trust_score).collect();
            stats.avg_trust = scores.iter().sum::<f64>() / scores.len() as f64;
            stats.max_trust = scores.iter().cloned().fold(0.0, f64::max);
        }
        state.stage = RunStage::Analyzed;
        info!(
            scored = state.scored.len(),
            avg_trust = stats.avg_trust,
            "Analysis complete"
        );

        // --- Routing decision ---
        let route = routing::decide(state.scored.values(), self.config.threshold);
        let qualifying = state
            .scored
            .values()
            .filter(|s| s.exceeds(self.config.threshold))
            .count() as u32;
        run_log.log(EventKind::RoutingDecided {
            route: route.to_string(),
            threshold: self.config.threshold,
            qualifying,
        });
        info!(%route, qualifying, threshold = self.config.threshold, "Routing decided");

        // --- Storage stage (storage branch only) ---
        if route == Route::Storage {
            cancelled_check(&cancel)?;
            let scored: Vec<Source> = state.scored.values().cloned().collect();
            for source in scored {
                if !source.exceeds(self.config.threshold) {
                    let mut rejected = source;
                    rejected.status = SourceStatus::Rejected;
                    stats.sources_rejected += 1;
                    state.rejected.insert(rejected.url.clone(), rejected);
                    continue;
                }
                match self.store.store(&source).await {
                    Ok(()) => {
                        run_log.log(EventKind::SourceStored {
                            url: source.url.clone(),
                        });
                        let mut stored = source;
                        stored.status = SourceStatus::Stored;
                        stats.sources_stored += 1;
                        state.stored.insert(stored.url.clone(), stored);
                    }
                    Err(e) => {
                        // Not retried here; the source stays Scored and
                        // reporting proceeds.
                        run_log.log(EventKind::StorageFailed {
                            url: source.url.clone(),
                            message: e.to_string(),
                        });
                        warn!(url = source.url.as_str(), error = %e, "Storage failed");
                        let err = SiftError::Storage(e.to_string());
                        state.push_error(Stage::Storage, Some(&source.url), err.to_string());
                        stats.storage_failures += 1;
                    }
                }
            }
            state.stage = RunStage::Stored;
        } else {
            state.stage = RunStage::Skipped;
        }

        // --- Report stage (both branches) ---
        let snapshot = state.clone();
        let report = match self.renderer.render(&snapshot, stats).await {
            Ok(doc) => {
                run_log.log(EventKind::ReportRendered { bytes: doc.len() });
                state.stage = RunStage::Reported;
                Some(doc)
            }
            Err(e) => {
                warn!(error = %e, "Report rendering failed");
                state.push_error(Stage::Report, None, e.to_string());
                None
            }
        };

        Ok((Some(route), report))
    }
}

// ---------------------------------------------------------------------------
// Cancellation plumbing
// ---------------------------------------------------------------------------

fn cancelled_check(cancel: &watch::Receiver<bool>) -> Result<(), SiftError> {
    if *cancel.borrow() {
        return Err(SiftError::Cancelled);
    }
    Ok(())
}

/// Race a stage future against the cancel signal. Dropping the stage future
/// cancels all of its in-flight per-source tasks.
async fn cancellable<F, T>(cancel: &mut watch::Receiver<bool>, stage: F) -> Result<T, SiftError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = wait_cancelled(cancel) => Err(SiftError::Cancelled),
        out = stage => Ok(out),
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender dropped without cancelling: park so the stage future wins.
        std::future::pending::<()>().await;
    }
}
