pub mod heuristics;
pub mod judge;
pub mod persist;
pub mod pipeline;
pub mod routing;
pub mod run_log;
pub mod score;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
