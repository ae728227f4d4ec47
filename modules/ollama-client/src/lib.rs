mod client;

pub use client::Ollama;

use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Reasoner Trait
// =============================================================================

/// The reasoning-service seam. Anything that can answer a free-form prompt
/// with free-form text qualifies; callers own prompt construction and
/// response parsing. Swapping local for remote models happens here without
/// touching scoring logic.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<String>;
}
