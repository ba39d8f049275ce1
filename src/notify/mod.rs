pub mod discord;
pub mod dispatcher;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::filter::TermFilters;

pub use dispatcher::{DeliveryOutcome, DispatchReport, Dispatcher};

/// Discord hard limits on message text.
pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_EMBED_DESCRIPTION_CHARS: usize = 4096;

/// What goes into the message text after the title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Title only; the body is still carried in the embed.
    #[default]
    None,
    /// Append the cleaned product text.
    Original,
    /// Append an LLM summary, falling back to the cleaned text.
    Generated,
}

/// One configured webhook target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub url: String,
    /// User or role id to ping; empty means no mention.
    #[serde(default)]
    pub mention_id: String,
    #[serde(default)]
    pub summary_mode: SummaryMode,
    #[serde(default)]
    pub filters: TermFilters,
}

impl Destination {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mention_id: String::new(),
            summary_mode: SummaryMode::None,
            filters: TermFilters::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Body of a Discord webhook execute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
}

/// Delivers a prepared payload to a webhook URL. Implementations own their
/// retry policy; an `Err` means delivery failed for good this cycle.
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()>;
}
