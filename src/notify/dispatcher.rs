//! Per-destination fan-out for one product: filter, format, optionally
//! summarize, post.
//!
//! A product counts as fully handled when every destination either filtered
//! it out or accepted the post. Only a failed post leaves it unhandled, so the
//! poll loop can try again next cycle.

use std::sync::Arc;

use metrics::counter;

use super::{
    Destination, Embed, SummaryMode, WebhookPayload, WebhookTransport, MAX_CONTENT_CHARS,
    MAX_EMBED_DESCRIPTION_CHARS,
};
use crate::filter;
use crate::ingest::types::Product;
use crate::ingest::{cleanup_summary, truncate_chars};
use crate::summarizer::DynSummarizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Destination filters rejected the product; nothing was sent.
    Filtered,
    Delivered,
    /// Post failed after the transport's retries.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// One entry per destination, in configured order.
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn fully_handled(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o, DeliveryOutcome::Failed(_)))
    }

    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Delivered))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Failed(_)))
    }

    pub fn filtered(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Filtered))
    }

    fn count(&self, f: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(o)).count()
    }
}

/// Message text: optional `<@id>` mention line, bold title, then the extra text.
pub fn format_content(mention_id: &str, title: &str, extra: Option<&str>) -> String {
    let mut text = if mention_id.is_empty() {
        format!("**{title}**")
    } else {
        format!("<@{mention_id}>\n**{title}**")
    };
    if let Some(extra) = extra.filter(|e| !e.is_empty()) {
        text.push('\n');
        text.push_str(extra);
    }
    truncate_chars(&text, MAX_CONTENT_CHARS)
}

pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    summarizer: DynSummarizer,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn WebhookTransport>, summarizer: DynSummarizer) -> Self {
        Self {
            transport,
            summarizer,
        }
    }

    /// Summary for `cleaned`, or `None` after logging why the original text is used.
    async fn generate_summary(&self, title: &str, cleaned: &str) -> Option<String> {
        match self.summarizer.summarize(cleaned).await {
            Ok(s) => Some(s),
            Err(e) => {
                counter!("spc_summary_failed_total").increment(1);
                tracing::warn!(
                    product = %title,
                    provider = self.summarizer.provider_name(),
                    error = %format!("{e:#}"),
                    "error generating summary, using original text"
                );
                None
            }
        }
    }

    pub async fn dispatch(&self, product: &Product, destinations: &[Destination]) -> DispatchReport {
        let cleaned = cleanup_summary(&product.summary);
        let embed = Embed {
            title: product.title.clone(),
            url: product.link.clone(),
            description: truncate_chars(&cleaned, MAX_EMBED_DESCRIPTION_CHARS),
        };
        // Summarize at most once per product, however many destinations want it.
        let mut generated: Option<Option<String>> = None;
        let mut report = DispatchReport::default();

        for (idx, dest) in destinations.iter().enumerate() {
            if !filter::evaluate(&product.title, &cleaned, &dest.filters).passed() {
                tracing::debug!(destination = idx, product = %product.title, "filtered out for destination");
                report.outcomes.push(DeliveryOutcome::Filtered);
                continue;
            }

            let extra = match dest.summary_mode {
                SummaryMode::None => None,
                SummaryMode::Original => Some(cleaned.clone()),
                SummaryMode::Generated => {
                    if generated.is_none() {
                        generated = Some(self.generate_summary(&product.title, &cleaned).await);
                    }
                    generated
                        .clone()
                        .flatten()
                        .or_else(|| Some(cleaned.clone()))
                }
            };

            let payload = WebhookPayload {
                content: format_content(&dest.mention_id, &product.title, extra.as_deref()),
                embeds: vec![embed.clone()],
            };

            tracing::info!(destination = idx, product = %product.title, "notifying discord of new spc product");
            match self.transport.post(&dest.url, &payload).await {
                Ok(()) => {
                    counter!("spc_webhook_sent_total").increment(1);
                    report.outcomes.push(DeliveryOutcome::Delivered);
                }
                Err(e) => {
                    counter!("spc_webhook_failed_total").increment(1);
                    let msg = format!("{e:#}");
                    tracing::warn!(
                        destination = idx,
                        product = %product.title,
                        error = %msg,
                        "error sending message for product, will retry next cycle"
                    );
                    report.outcomes.push(DeliveryOutcome::Failed(msg));
                }
            }
        }
        report
    }
}
