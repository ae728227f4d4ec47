//! Judgment requester — packages source text into two evaluation prompts
//! (content quality, bias) for the reasoning service and parses numeric
//! scores out of the free-form responses.

use std::sync::Arc;

use ollama_client::Reasoner;
use sift_common::{JudgmentResult, SiftError, Source};
use tracing::warn;

const QUALITY_PROMPT: &str = r#"You are an expert fact-checker evaluating a web source.

Rate the CONTENT QUALITY of the source below on a scale of 0-100:
- Coherence and depth of the writing
- Presence of citations, evidence, and verifiable claims
- 100 means rigorous, well-sourced writing; 0 means incoherent or empty

Respond with the score first, then at most one sentence of reasoning."#;

const BIAS_PROMPT: &str = r#"You are an expert fact-checker evaluating a web source.

Rate the BIAS of the source below on a scale of 0-100:
- Propaganda techniques, loaded language, one-sided framing
- 0 means balanced and objective; 100 means heavy propaganda

Respond with the score first, then at most one sentence of reasoning."#;

const STRICT_INSTRUCTION: &str =
    "Respond with a single number between 0 and 100. No other text.";

pub struct Judge {
    reasoner: Arc<dyn Reasoner>,
    char_budget: usize,
}

impl Judge {
    pub fn new(reasoner: Arc<dyn Reasoner>, char_budget: usize) -> Self {
        Self {
            reasoner,
            char_budget,
        }
    }

    /// Assess one source: two independent prompts, at most one reparse retry
    /// each. An unparseable response after the retry degrades to the neutral
    /// default — a recovered failure. Transport errors propagate as
    /// `JudgmentUnavailable` so the orchestrator can tell a down service
    /// from a rambling model.
    pub async fn assess(&self, source: &Source) -> Result<JudgmentResult, SiftError> {
        let full = format!("{}\n\n{}", source.title, source.content);
        let excerpt = truncate(&full, self.char_budget);

        let quality = self
            .scored_prompt(&format!("{QUALITY_PROMPT}\n\n---\n\n{excerpt}"))
            .await?;
        let bias = self
            .scored_prompt(&format!("{BIAS_PROMPT}\n\n---\n\n{excerpt}"))
            .await?;

        match (quality, bias) {
            (Some(quality), Some(bias)) => Ok(JudgmentResult {
                quality,
                bias,
                fallback: false,
            }),
            _ => {
                warn!(
                    url = source.url.as_str(),
                    "Judgment response unparseable after retry, using neutral default"
                );
                Ok(JudgmentResult::neutral())
            }
        }
    }

    /// One prompt, one stricter retry on parse failure. `None` means both
    /// responses were unparseable.
    async fn scored_prompt(&self, prompt: &str) -> Result<Option<f64>, SiftError> {
        let text = self
            .reasoner
            .query(prompt)
            .await
            .map_err(|e| SiftError::JudgmentUnavailable(e.to_string()))?;

        if let Some(score) = parse_score(&text) {
            return Ok(Some(score));
        }

        warn!("No number in judgment response, retrying with strict instruction");
        let strict = format!("{prompt}\n\n{STRICT_INSTRUCTION}");
        let text = self
            .reasoner
            .query(&strict)
            .await
            .map_err(|e| SiftError::JudgmentUnavailable(e.to_string()))?;

        Ok(parse_score(&text))
    }
}

/// Pull the first number out of free-form model output, clamped to 0-100.
fn parse_score(text: &str) -> Option<f64> {
    let mut number = String::new();
    let mut seen_digit = false;

    for c in text.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            seen_digit = true;
        } else if c == '.' && seen_digit && !number.contains('.') {
            number.push(c);
        } else if seen_digit {
            break;
        }
    }

    number
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .map(|v| v.clamp(0.0, 100.0))
}

/// Truncate from the end on a char boundary. Deterministic: no sampling.
fn truncate(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
