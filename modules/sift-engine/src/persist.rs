//! File-backed collaborator implementations for the reference binary.
//!
//! Live search and scraping are out of scope for this core; `FileFetcher`
//! feeds the pipeline from a pre-fetched sources file instead, and accepted
//! sources land as JSON documents under the data dir.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use sift_common::{RunState, ScrapedPage, Source};

use crate::pipeline::RunStats;
use crate::run_log::data_dir;
use crate::traits::{PageScraper, ReportRenderer, SearchProvider, SourceStore};

// ---------------------------------------------------------------------------
// FileFetcher — SearchProvider + PageScraper over a sources JSON file
// ---------------------------------------------------------------------------

/// One entry in the pre-fetched sources file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Serves search results and page content from a JSON file of pre-fetched
/// sources. Every query returns the file's urls in file order; scraping a
/// url not present in the file fails.
pub struct FileFetcher {
    order: Vec<String>,
    pages: HashMap<String, ScrapedPage>,
}

impl FileFetcher {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sources file {}", path.display()))?;
        let records: Vec<SourceRecord> =
            serde_json::from_str(&raw).context("Sources file is not valid JSON")?;

        let order: Vec<String> = records.iter().map(|r| r.url.clone()).collect();
        let pages = records
            .into_iter()
            .map(|r| {
                (
                    r.url,
                    ScrapedPage {
                        title: r.title,
                        content: r.content,
                        published_at: r.published_at,
                        author: r.author,
                    },
                )
            })
            .collect();

        info!(path = %path.display(), sources = order.len(), "Loaded pre-fetched sources");
        Ok(Self { order, pages })
    }
}

#[async_trait]
impl SearchProvider for FileFetcher {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.order.iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl PageScraper for FileFetcher {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No pre-fetched content for {url}"))
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore — SourceStore writing accepted sources to disk
// ---------------------------------------------------------------------------

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new() -> Self {
        Self {
            dir: data_dir().join("accepted"),
        }
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceStore for JsonFileStore {
    async fn store(&self, source: &Source) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", filename_for(&source.url)));
        std::fs::write(&path, serde_json::to_string_pretty(source)?)?;
        info!(url = source.url.as_str(), path = %path.display(), "Source stored");
        Ok(())
    }
}

/// Filesystem-safe name derived from a url, bounded in length.
fn filename_for(url: &str) -> String {
    let mut name: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    name.truncate(120);
    name
}

// ---------------------------------------------------------------------------
// JsonReportRenderer — ReportRenderer producing a JSON document
// ---------------------------------------------------------------------------

/// Serializes the final run snapshot, stats and error log. Rendering to a
/// presentation format is a downstream concern.
pub struct JsonReportRenderer;

#[async_trait]
impl ReportRenderer for JsonReportRenderer {
    async fn render(&self, state: &RunState, stats: &RunStats) -> Result<String> {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "topic": state.topic,
            "stage": state.stage,
            "stats": stats,
            "sources": state.scored.values().collect::<Vec<_>>(),
            "stored": state.stored.keys().collect::<Vec<_>>(),
            "rejected": state.rejected.keys().collect::<Vec<_>>(),
            "failed": state.failed.keys().collect::<Vec<_>>(),
            "errors": state.errors,
        }))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_safe_and_bounded() {
        let name = filename_for("https://example.com/a/b?q=1");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

        let long = filename_for(&format!("https://example.com/{}", "x".repeat(500)));
        assert!(long.len() <= 120);
    }
}
