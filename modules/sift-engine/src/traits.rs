// Trait abstractions for the pipeline's external collaborators.
//
// Search, scrape, persistence and report rendering are not implemented by
// the core; the pipeline consumes them through these seams. The mocks in
// testing.rs implement all four, so the full run is testable with no
// network and no disk.

use anyhow::Result;
use async_trait::async_trait;

use sift_common::{RunState, ScrapedPage, Source};

use crate::pipeline::RunStats;

/// Search collaborator: a query in, candidate urls out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Scrape collaborator: fetch one url and return its extracted page.
/// An `Ok` with empty content counts as a failed scrape downstream.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage>;
}

/// Persistence collaborator: invoked only for sources routed to storage.
/// Failures are logged by the pipeline, never retried at this layer.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn store(&self, source: &Source) -> Result<()>;
}

/// Report collaborator: consumes the final run snapshot, including the
/// error log, and produces a document.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, state: &RunState, stats: &RunStats) -> Result<String>;
}
