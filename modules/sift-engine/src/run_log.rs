//! Run log — persisted JSON timeline of every action taken during a run.
//!
//! Each run produces a single `{DATA_DIR}/runs/{run_id}.json` file
//! containing an ordered list of events with timestamps, the final stats,
//! and the accumulated error log.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sift_common::ErrorEntry;
use tracing::info;

use crate::pipeline::RunStats;

// ---------------------------------------------------------------------------
// data_dir helper
// ---------------------------------------------------------------------------

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub topic: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SearchQuery {
        query: String,
        result_count: u32,
    },
    ScrapeUrl {
        url: String,
        success: bool,
        content_bytes: usize,
    },
    JudgmentScored {
        url: String,
        quality: f64,
        bias: f64,
        fallback: bool,
    },
    SourceScored {
        url: String,
        trust: f64,
    },
    RoutingDecided {
        route: String,
        threshold: f64,
        qualifying: u32,
    },
    SourceStored {
        url: String,
    },
    StorageFailed {
        url: String,
        message: String,
    },
    ReportRendered {
        bytes: usize,
    },
    RunCancelled,
    RunFatal {
        message: String,
    },
}

impl RunLog {
    pub fn new(run_id: String, topic: String) -> Self {
        Self {
            run_id,
            topic,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, stats: &RunStats, errors: &[ErrorEntry]) -> Result<PathBuf> {
        let dir = data_dir().join("runs");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            topic: &self.topic,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            errors,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    topic: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a RunStats,
    errors: &'a [ErrorEntry],
    events: &'a [RunEvent],
}
