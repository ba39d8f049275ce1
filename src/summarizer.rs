//! LLM summaries for long SPC texts: provider abstraction + bounded memo cache.
//!
//! A summary is always optional. Callers treat any `Err` as "use the original
//! text instead".

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::cache::sha256_hex;
use crate::config::ai::SummarizerConfig;

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROMPT: &str =
    "Summarize this National Weather Service Storm Prediction Center text concisely.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynSummarizer = Arc<dyn Summarizer>;

/// Factory: disabled unless the config enables a supported provider.
pub fn build_summarizer(cfg: &SummarizerConfig) -> Result<DynSummarizer> {
    if !cfg.enabled {
        return Ok(Arc::new(DisabledSummarizer));
    }
    match cfg.provider.as_str() {
        "claude" => {
            let provider = ClaudeSummarizer::new(cfg)?;
            Ok(Arc::new(CachingSummarizer::new(provider, cfg.cache_size)))
        }
        other => bail!("unsupported summarizer provider: {other}"),
    }
}

/// Always fails; used when summaries are turned off.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _text: &str) -> Result<String> {
        Err(anyhow!("summaries are disabled"))
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Anthropic Messages API.
pub struct ClaudeSummarizer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeSummarizer {
    pub fn new(cfg: &SummarizerConfig) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            bail!("summarizer api key is empty");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("spc-notifier/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building summarizer http client")?;
        Ok(Self {
            http,
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
        })
    }

    /// Point at a different base URL (proxies, local test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: String,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
}
#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    content: Vec<ContentBlock>,
}
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the first text block out of a Messages API response body.
pub(crate) fn parse_response_text(body: &str) -> Result<String> {
    let resp: Resp = serde_json::from_str(body).context("parsing summarizer response")?;
    resp.content
        .into_iter()
        .find_map(|b| b.text)
        .ok_or_else(|| anyhow!("summarizer response had no text content"))
}

#[async_trait]
impl Summarizer for ClaudeSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        tracing::info!(model = %self.model, "generating llm summary");
        let req = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Msg {
                role: "user",
                content: format!("{PROMPT}\n\n{text}"),
            }],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
            .context("summarizer request failed")?
            .error_for_status()
            .context("summarizer http error")?;
        let body = resp.text().await.context("reading summarizer body")?;

        let cleaned = cleanup_llm_response(&parse_response_text(&body)?);
        if cleaned.is_empty() {
            bail!("summarizer returned empty text");
        }
        Ok(cleaned)
    }

    fn provider_name(&self) -> &'static str {
        "claude"
    }
}

/// Tidy LLM output for Discord:
/// - drop a leading markdown heading line
/// - drop a first line that announces itself as a "summary"
/// - blank line after numbered list items (Discord collapses them otherwise)
pub fn cleanup_llm_response(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim_start().lines().collect();

    if lines.first().is_some_and(|l| l.starts_with('#')) {
        lines.remove(0);
    }
    if lines
        .first()
        .is_some_and(|l| l.to_lowercase().contains("summary"))
    {
        lines.remove(0);
    }

    static RE_NUMBERED: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_NUMBERED.get_or_init(|| regex::Regex::new(r"^\d+\.").unwrap());

    lines
        .iter()
        .map(|l| {
            if re.is_match(l) {
                format!("{l}\n")
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ------------------------------------------------------------
// Memo cache wrapper
// ------------------------------------------------------------

#[derive(Debug, Default)]
struct Memo {
    order: VecDeque<String>,
    entries: HashMap<String, String>,
}

/// Memoizes successful summaries by SHA-256 of the input. Failures are not cached.
pub struct CachingSummarizer<S: Summarizer> {
    inner: S,
    capacity: usize,
    memo: Mutex<Memo>,
}

impl<S: Summarizer> CachingSummarizer<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            memo: Mutex::new(Memo::default()),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let g = self.memo.lock().ok()?;
        g.entries.get(key).cloned()
    }

    fn store(&self, key: String, value: String) {
        let Ok(mut g) = self.memo.lock() else {
            return;
        };
        if g.entries.insert(key.clone(), value).is_none() {
            g.order.push_back(key);
        }
        while g.order.len() > self.capacity {
            if let Some(old) = g.order.pop_front() {
                g.entries.remove(&old);
            }
        }
    }
}

#[async_trait]
impl<S: Summarizer> Summarizer for CachingSummarizer<S> {
    async fn summarize(&self, text: &str) -> Result<String> {
        let key = sha256_hex(text.as_bytes());
        if let Some(hit) = self.lookup(&key) {
            tracing::debug!("summary cache hit");
            return Ok(hit);
        }
        let fresh = self.inner.summarize(text).await?;
        self.store(key, fresh.clone());
        Ok(fresh)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for Counting {
        async fn summarize(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("short: {}", text.len()))
        }
        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn cleanup_drops_heading_and_summary_line() {
        let raw = "# SPC Product\nHere is a summary of the text:\nStorms likely.\n1. Hail\n2. Wind";
        assert_eq!(
            cleanup_llm_response(raw),
            "Storms likely.\n1. Hail\n\n2. Wind"
        );
    }

    #[test]
    fn cleanup_leaves_plain_text_alone() {
        assert_eq!(cleanup_llm_response("  Storms likely.  "), "Storms likely.");
    }

    #[test]
    fn parses_first_text_block() {
        let body = r#"{"content":[{"type":"text","text":"Severe storms over Iowa."}]}"#;
        assert_eq!(parse_response_text(body).unwrap(), "Severe storms over Iowa.");
        assert!(parse_response_text(r#"{"content":[]}"#).is_err());
        assert!(parse_response_text("not json").is_err());
    }

    #[tokio::test]
    async fn caching_wrapper_memoizes_and_evicts() {
        let c = CachingSummarizer::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            1,
        );
        c.summarize("aaa").await.unwrap();
        c.summarize("aaa").await.unwrap();
        assert_eq!(c.inner.calls.load(Ordering::SeqCst), 1);

        c.summarize("bb").await.unwrap();
        c.summarize("aaa").await.unwrap();
        assert_eq!(c.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        assert!(DisabledSummarizer.summarize("x").await.is_err());
        let s = build_summarizer(&SummarizerConfig::default()).unwrap();
        assert_eq!(s.provider_name(), "disabled");
    }
}
