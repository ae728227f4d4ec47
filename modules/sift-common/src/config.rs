use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Scoring
    pub threshold: f64,
    pub max_sources: usize,

    // Concurrency
    pub concurrency_limit: usize,

    // Judgment
    pub prompt_token_budget: usize,

    // Reasoning service
    pub ollama_base_url: String,
    pub ollama_model: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Every knob has a default; panics with a clear message on malformed
    /// numeric values.
    pub fn from_env() -> Self {
        Self {
            threshold: parsed_env("TRUST_THRESHOLD", 85.0),
            max_sources: parsed_env("MAX_SOURCES", 10),
            concurrency_limit: parsed_env("CONCURRENCY_LIMIT", 5),
            prompt_token_budget: parsed_env("PROMPT_TOKEN_BUDGET", 2000),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.2:3b".to_string()),
        }
    }

    /// Prompt budget in characters. Tokens are approximated at four
    /// characters each; excess content is truncated from the end.
    pub fn prompt_char_budget(&self) -> usize {
        self.prompt_token_budget * 4
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 85.0,
            max_sources: 10,
            concurrency_limit: 5,
            prompt_token_budget: 2000,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:3b".to_string(),
        }
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {raw}")),
        Err(_) => default,
    }
}
