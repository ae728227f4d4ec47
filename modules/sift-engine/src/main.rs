use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ollama_client::Ollama;
use sift_common::{Config, SiftError};
use sift_engine::persist::{FileFetcher, JsonFileStore, JsonReportRenderer};
use sift_engine::pipeline::Pipeline;
use sift_engine::run_log::data_dir;

#[derive(Parser)]
#[command(
    name = "sift",
    about = "Score research sources for trustworthiness and route them to storage or report"
)]
struct Args {
    /// Research topic
    #[arg(long)]
    topic: String,

    /// Search query (repeatable); defaults to the topic itself
    #[arg(long = "query")]
    queries: Vec<String>,

    /// Pre-fetched sources JSON file, serving as the search and scrape
    /// collaborators (live search/scraping is out of scope)
    #[arg(long)]
    sources: PathBuf,

    /// Override the acceptance threshold
    #[arg(long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sift_engine=info".parse()?),
        )
        .init();

    info!("Sift starting...");

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(threshold) = args.threshold {
        if !(0.0..=100.0).contains(&threshold) {
            return Err(SiftError::Config(format!(
                "threshold must be within 0-100, got {threshold}"
            ))
            .into());
        }
        config.threshold = threshold;
    }

    let fetcher = Arc::new(FileFetcher::load(&args.sources)?);
    let reasoner = Arc::new(
        Ollama::new(config.ollama_model.clone()).with_base_url(config.ollama_base_url.clone()),
    );

    let pipeline = Pipeline::new(
        fetcher.clone(),
        fetcher,
        reasoner,
        Arc::new(JsonFileStore::new()),
        Arc::new(JsonReportRenderer),
        config,
    );

    let outcome = pipeline.run(&args.topic, args.queries).await;
    outcome.run_log.save(&outcome.stats, &outcome.state.errors)?;

    if let Some(report) = &outcome.report {
        let dir = data_dir().join("reports");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", outcome.run_log.run_id));
        std::fs::write(&path, report)?;
        info!(path = %path.display(), "Report written");
    }

    if let Some(fatal) = outcome.fatal {
        anyhow::bail!("Run failed: {fatal}");
    }

    Ok(())
}
