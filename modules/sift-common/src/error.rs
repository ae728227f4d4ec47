use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Judgment parse error: {0}")]
    JudgmentParse(String),

    #[error("Judgment service unavailable: {0}")]
    JudgmentUnavailable(String),

    #[error("Invalid aggregation input: {0}")]
    AggregationInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
