//! Per-destination term filters over a product's title and summary.
//!
//! Every rule list is matched case-insensitively as a plain substring:
//! - `title_must_include_one` / `summary_must_include_one`: at least one term present
//! - `title_must_exclude_all` / `summary_must_exclude_all`: no term present
//!
//! An empty list never blocks. All four rules are always evaluated so the
//! outcome of each can be logged next to the product title.

use serde::{Deserialize, Serialize};

use crate::ingest::cleanup_summary;
use crate::ingest::types::Product;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermFilters {
    pub title_must_include_one: Vec<String>,
    pub title_must_exclude_all: Vec<String>,
    pub summary_must_include_one: Vec<String>,
    pub summary_must_exclude_all: Vec<String>,
}

impl TermFilters {
    pub fn is_empty(&self) -> bool {
        self.title_must_include_one.is_empty()
            && self.title_must_exclude_all.is_empty()
            && self.summary_must_include_one.is_empty()
            && self.summary_must_exclude_all.is_empty()
    }
}

/// Outcome of each rule; `true` means the rule passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub title_include: bool,
    pub title_exclude: bool,
    pub summary_include: bool,
    pub summary_exclude: bool,
}

impl FilterReport {
    pub fn passed(&self) -> bool {
        self.title_include && self.title_exclude && self.summary_include && self.summary_exclude
    }
}

/// True when `text` contains any of `terms` (case-insensitive). `None` when
/// there are no terms, so callers can pick the vacuous outcome.
fn contains_any(terms: &[String], text: &str) -> Option<bool> {
    if terms.is_empty() {
        return None;
    }
    let text = text.to_lowercase();
    Some(terms.iter().any(|t| text.contains(&t.to_lowercase())))
}

pub fn must_include_one(terms: &[String], text: &str) -> bool {
    contains_any(terms, text).unwrap_or(true)
}

pub fn must_exclude_all(terms: &[String], text: &str) -> bool {
    !contains_any(terms, text).unwrap_or(false)
}

/// Evaluate all four rules against already-cleaned text.
pub fn evaluate(title: &str, summary: &str, filters: &TermFilters) -> FilterReport {
    let report = FilterReport {
        title_include: must_include_one(&filters.title_must_include_one, title),
        title_exclude: must_exclude_all(&filters.title_must_exclude_all, title),
        summary_include: must_include_one(&filters.summary_must_include_one, summary),
        summary_exclude: must_exclude_all(&filters.summary_must_exclude_all, summary),
    };

    let verdict = |ok: bool| if ok { "pass" } else { "fail" };
    if report.passed() {
        tracing::debug!(product = %title, "product passed filters");
    } else {
        tracing::info!(
            product = %title,
            title_must_include_one = verdict(report.title_include),
            title_must_exclude_all = verdict(report.title_exclude),
            summary_must_include_one = verdict(report.summary_include),
            summary_must_exclude_all = verdict(report.summary_exclude),
            "product did not pass filters"
        );
    }
    report
}

/// Convenience over [`evaluate`] for a raw product; the summary is cleaned of markup first.
pub fn passes(product: &Product, filters: &TermFilters) -> bool {
    evaluate(&product.title, &cleanup_summary(&product.summary), filters).passed()
}
