//! Heuristic feature extraction — cheap deterministic signals from a
//! source's url and raw text. No external calls, never suspends.

use chrono::{DateTime, Utc};
use sift_common::{HeuristicResult, Source};

/// Hosts trusted at the institutional tier regardless of TLD.
const ALLOWLISTED_HOSTS: &[&str] = &[
    "arxiv.org",
    "pubmed.ncbi.nlm.nih.gov",
    "www.nature.com",
    "www.science.org",
    "www.who.int",
    "www.reuters.com",
    "apnews.com",
];

/// Link shorteners hide the real destination, so they class with unknowns.
const URL_SHORTENERS: &[&str] = &[
    "bit.ly", "t.co", "goo.gl", "tinyurl.com", "ow.ly", "buff.ly", "is.gd",
];

/// Words that mark a quantity even when spelled out.
const QUANTITY_WORDS: &[&str] = &["percent", "million", "billion", "thousand", "dozen"];

/// Recency is flat at 100 inside this window.
const FRESH_WINDOW_DAYS: i64 = 30;
/// Recency hits 0 past this age.
const STALE_CUTOFF_DAYS: i64 = 5 * 365;
/// Undated content gets a fixed low score rather than zero, so evergreen
/// pages aren't over-penalized.
const UNDATED_RECENCY: f64 = 30.0;

/// Below this many sentences the density ratio is statistically unreliable.
const MIN_SENTENCES: usize = 3;
/// Cap applied to short-content density.
const SHORT_CONTENT_DENSITY_CAP: f64 = 40.0;

// Absolute weights against the final 100-point scale. The four sub-scores
// contribute at most 50 points; the judgment side carries the other 50.
const DOMAIN_WEIGHT: f64 = 0.20;
const DENSITY_WEIGHT: f64 = 0.15;
const RECENCY_WEIGHT: f64 = 0.10;
const TRANSPARENCY_WEIGHT: f64 = 0.05;

/// Derive heuristic signals for one source. Empty content returns the
/// sentinel result; the caller marks the source ScrapeFailed and excludes it
/// from scoring.
pub fn extract(source: &Source, now: DateTime<Utc>) -> HeuristicResult {
    if source.content.trim().is_empty() {
        return HeuristicResult::empty_content();
    }

    let domain = domain_score(source);
    let recency = recency_score(source.published_at, now);
    let density = density_score(&source.content);
    let transparency = match source.author.as_deref() {
        Some(a) if !a.trim().is_empty() => 100.0,
        _ => 0.0,
    };

    let composite = domain * DOMAIN_WEIGHT
        + density * DENSITY_WEIGHT
        + recency * RECENCY_WEIGHT
        + transparency * TRANSPARENCY_WEIGHT;

    HeuristicResult {
        domain,
        recency,
        density,
        transparency,
        composite,
    }
}

/// Categorical lookup: institutional domains 100, generic commercial 60,
/// unknown/IP-literal/shortener 20.
fn domain_score(source: &Source) -> f64 {
    let Some(host) = source.host() else {
        return 20.0;
    };

    if host.parse::<std::net::IpAddr>().is_ok() {
        return 20.0;
    }
    if URL_SHORTENERS.contains(&host.as_str()) {
        return 20.0;
    }
    if ALLOWLISTED_HOSTS.contains(&host.as_str()) {
        return 100.0;
    }
    if host.ends_with(".edu") || host.ends_with(".gov") {
        return 100.0;
    }
    if host.ends_with(".com") || host.ends_with(".org") {
        return 60.0;
    }
    20.0
}

/// Linear decay from 100 (published within the fresh window) to 0 (older
/// than the stale cutoff). Unknown dates get a fixed low score.
fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return UNDATED_RECENCY;
    };

    let age_days = (now - published).num_days();
    if age_days <= FRESH_WINDOW_DAYS {
        return 100.0;
    }
    if age_days >= STALE_CUTOFF_DAYS {
        return 0.0;
    }

    let span = (STALE_CUTOFF_DAYS - FRESH_WINDOW_DAYS) as f64;
    100.0 * (STALE_CUTOFF_DAYS - age_days) as f64 / span
}

/// Factual-density proxy: fraction of sentences carrying a digit or a
/// spelled-out quantity, scaled to 0-100. Fewer than MIN_SENTENCES caps the
/// result since the ratio means little on a couple of sentences.
fn density_score(content: &str) -> f64 {
    let sentences: Vec<&str> = content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return 0.0;
    }

    let factual = sentences.iter().filter(|s| is_factual(s)).count();
    let ratio = factual as f64 / sentences.len() as f64 * 100.0;

    if sentences.len() < MIN_SENTENCES {
        ratio.min(SHORT_CONTENT_DENSITY_CAP)
    } else {
        ratio
    }
}

fn is_factual(sentence: &str) -> bool {
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let lower = sentence.to_lowercase();
    QUANTITY_WORDS.iter().any(|w| lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn source(url: &str, content: &str) -> Source {
        let mut s = Source::discovered(url);
        s.content = content.to_string();
        s
    }

    #[test]
    fn empty_content_yields_sentinel() {
        let s = source("https://example.gov/report", "   ");
        let h = extract(&s, Utc::now());
        assert_eq!(h.composite, 0.0);
    }

    #[test]
    fn domain_tiers() {
        let now = Utc::now();
        let body = "First fact: 42. Second fact: 7. Third fact: 9.";

        let gov = extract(&source("https://data.census.gov/x", body), now);
        assert_eq!(gov.domain, 100.0);

        let com = extract(&source("https://news.example.com/x", body), now);
        assert_eq!(com.domain, 60.0);

        let weird = extract(&source("https://example.xyz/x", body), now);
        assert_eq!(weird.domain, 20.0);

        let ip = extract(&source("http://192.168.1.10/x", body), now);
        assert_eq!(ip.domain, 20.0);

        let shortener = extract(&source("https://bit.ly/abc", body), now);
        assert_eq!(shortener.domain, 20.0);

        let allowlisted = extract(&source("https://arxiv.org/abs/1234", body), now);
        assert_eq!(allowlisted.domain, 100.0);
    }

    #[test]
    fn recency_decays_linearly() {
        let now = Utc::now();
        let mut s = source("https://example.com/x", "A fact with 1 number. And more. And more.");

        s.published_at = Some(now - Duration::days(10));
        assert_eq!(extract(&s, now).recency, 100.0);

        s.published_at = Some(now - Duration::days(6 * 365));
        assert_eq!(extract(&s, now).recency, 0.0);

        s.published_at = None;
        assert_eq!(extract(&s, now).recency, UNDATED_RECENCY);

        // Midway through the decay span scores roughly half
        let mid = FRESH_WINDOW_DAYS + (STALE_CUTOFF_DAYS - FRESH_WINDOW_DAYS) / 2;
        s.published_at = Some(now - Duration::days(mid));
        let r = extract(&s, now).recency;
        assert!((r - 50.0).abs() < 1.0, "expected ~50, got {r}");
    }

    #[test]
    fn density_counts_numeric_and_quantity_sentences() {
        let now = Utc::now();
        let body = "The budget rose 12% this year. Officials disagreed. \
                    Three million residents were affected. No comment followed. \
                    The vote passed.";
        let h = extract(&source("https://example.com/x", body), now);
        // 2 of 5 sentences carry a quantity
        assert!((h.density - 40.0).abs() < 0.01);
    }

    #[test]
    fn short_content_density_is_capped() {
        let now = Utc::now();
        let h = extract(&source("https://example.com/x", "It was 42. Exactly 42."), now);
        assert!(h.density <= SHORT_CONTENT_DENSITY_CAP);
    }

    #[test]
    fn transparency_requires_nonempty_author() {
        let now = Utc::now();
        let mut s = source("https://example.com/x", "One. Two 2. Three.");

        assert_eq!(extract(&s, now).transparency, 0.0);
        s.author = Some("  ".to_string());
        assert_eq!(extract(&s, now).transparency, 0.0);
        s.author = Some("Jane Doe".to_string());
        assert_eq!(extract(&s, now).transparency, 100.0);
    }

    #[test]
    fn composite_is_pure() {
        let now = Utc::now();
        let mut s = source("https://example.gov/x", "Fact 1. Fact 2. Opinion here.");
        s.author = Some("Staff".to_string());
        s.published_at = Some(now - Duration::days(3));

        let a = extract(&s, now);
        let b = extract(&s, now);
        assert_eq!(a, b);
        assert!(a.composite >= 0.0 && a.composite <= 50.0);
        assert!(a.subtotal() >= 0.0 && a.subtotal() <= 100.0);
    }

    #[test]
    fn scenario_a_heuristic_side() {
        // .gov, published 10 days ago, author present, 6 of 10 sentences
        // with numeric facts: 100*0.20 + 60*0.15 + 100*0.10 + 100*0.05 = 44
        let now = Utc::now();
        let body = "Fact 1. Fact 2. Fact 3. Fact 4. Fact 5. Fact 6. \
                    Context follows. More context. Closing remarks. The end.";
        let mut s = source("https://agency.gov/report", body);
        s.author = Some("Agency Staff".to_string());
        s.published_at = Some(now - Duration::days(10));

        let h = extract(&s, now);
        assert_eq!(h.domain, 100.0);
        assert_eq!(h.recency, 100.0);
        assert!((h.density - 60.0).abs() < 0.01);
        assert_eq!(h.transparency, 100.0);
        assert!((h.composite - 44.0).abs() < 0.01);
    }
}
