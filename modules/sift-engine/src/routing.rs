//! Routing decision: the one branch in the pipeline. Evaluated exactly once
//! per run, after every source in the batch has been scored or has recorded
//! a terminal failure.

use serde::{Deserialize, Serialize};
use sift_common::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Storage,
    Report,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Storage => write!(f, "storage"),
            Route::Report => write!(f, "report"),
        }
    }
}

/// Storage iff at least one source scores strictly above the threshold.
/// Scoring exactly at the threshold does not qualify. Pure, no side effects.
pub fn decide<'a, I>(scored: I, threshold: f64) -> Route
where
    I: IntoIterator<Item = &'a Source>,
{
    if scored.into_iter().any(|s| s.exceeds(threshold)) {
        Route::Storage
    } else {
        Route::Report
    }
}
