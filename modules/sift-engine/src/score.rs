//! Score aggregation: heuristic and judgment budgets combine into the final
//! 0-100 trustworthiness score.

use sift_common::{HeuristicResult, JudgmentResult, SiftError};
use tracing::warn;

/// Combine the two 50-point budgets into a final score clamped to [0, 100].
/// Deterministic and idempotent; invalid inputs (NaN, negative) clamp to 0.
pub fn aggregate(heuristic: &HeuristicResult, judgment: &JudgmentResult) -> f64 {
    let h = sanitize(heuristic.composite, "heuristic composite");
    let j = sanitize(judgment.score(), "judgment score");
    (h + j).clamp(0.0, 100.0)
}

fn sanitize(value: f64, label: &str) -> f64 {
    if value.is_nan() || value < 0.0 {
        let err = SiftError::AggregationInput(format!("{label} is {value}"));
        warn!(error = %err, "Clamping to 0");
        return 0.0;
    }
    value
}
