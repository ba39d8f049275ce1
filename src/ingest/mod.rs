// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{Product, SourceProvider};
use anyhow::{anyhow, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::time::Duration;

/// Titles of filler entries the SPC feed publishes when nothing is active.
pub const NO_DATA_TERMS: &[&str] = &["No watches are valid", "No MDs are in effect"];

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "spc_products_fetched_total",
            "Products returned by all providers."
        );
        describe_counter!(
            "spc_products_new_total",
            "Products not present in the seen cache."
        );
        describe_counter!(
            "spc_products_seen_total",
            "Products skipped as previously seen."
        );
        describe_counter!(
            "spc_products_skipped_total",
            "Products skipped for missing dedup content or filler titles."
        );
        describe_counter!("spc_webhook_sent_total", "Successful webhook posts.");
        describe_counter!(
            "spc_webhook_failed_total",
            "Webhook posts that failed after retries."
        );
        describe_counter!(
            "spc_summary_failed_total",
            "Summaries that fell back to the original text."
        );
        describe_counter!("spc_fetch_errors_total", "Provider fetch/parse errors.");
        describe_histogram!("spc_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!("spc_last_cycle_ts", "Unix ts when the last cycle persisted.");
    });
}

/// Turn an RSS/HTML body into plain text for Discord:
/// strip tags, decode entities, drop the "Read more" link text, trim.
pub fn cleanup_summary(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?s)<[^>]*>").unwrap());
    let out = re_tags.replace_all(s, "");

    let out = html_escape::decode_html_entities(&out).replace("Read more", "");

    // Collapse runs of 3+ newlines left behind by removed markup
    static RE_BLANK: OnceCell<regex::Regex> = OnceCell::new();
    let re_blank = RE_BLANK.get_or_init(|| regex::Regex::new(r"\n\s*\n(\s*\n)+").unwrap());
    re_blank.replace_all(&out, "\n\n").trim().to_string()
}

/// Case-insensitive check for the feed's "nothing to report" placeholder entries.
pub fn is_no_data_entry(title: &str) -> bool {
    let t = title.to_lowercase();
    NO_DATA_TERMS.iter().any(|term| t.contains(&term.to_lowercase()))
}

/// Cut `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Bounded retry for upstream fetches.
#[derive(Clone, Copy, Debug)]
pub struct FetchRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for FetchRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Fetch one provider, retrying with exponential backoff on any error.
pub async fn fetch_with_retry(provider: &dyn SourceProvider, retry: FetchRetry) -> Result<Vec<Product>> {
    let attempts = retry.attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match provider.fetch_latest().await {
            Ok(items) => return Ok(items),
            Err(e) => {
                counter!("spc_fetch_errors_total").increment(1);
                if attempt >= attempts {
                    return Err(e.context(format!(
                        "{} fetch failed after {attempt} attempts",
                        provider.name()
                    )));
                }
                let delay = retry.backoff * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    provider = provider.name(),
                    attempt,
                    error = %format!("{e:#}"),
                    retry_in_ms = delay.as_millis() as u64,
                    "provider fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Fetch every provider in order and concatenate their products, keeping
/// each source's order. A required provider exhausting its retries fails the
/// whole fetch; an optional one is skipped for this cycle.
pub async fn fetch_all(providers: &[Box<dyn SourceProvider>], retry: FetchRetry) -> Result<Vec<Product>> {
    ensure_metrics_described();
    if providers.is_empty() {
        return Err(anyhow!("no source providers configured"));
    }

    let mut out = Vec::new();
    for p in providers {
        let mut items = match fetch_with_retry(p.as_ref(), retry).await {
            Ok(items) => items,
            Err(e) if !p.required() => {
                tracing::warn!(
                    provider = p.name(),
                    error = %format!("{e:#}"),
                    "optional provider unavailable, continuing without it"
                );
                continue;
            }
            Err(e) => return Err(e),
        };
        tracing::info!(provider = p.name(), count = items.len(), "retrieved products");
        out.append(&mut items);
    }
    counter!("spc_products_fetched_total").increment(out.len() as u64);
    Ok(out)
}
