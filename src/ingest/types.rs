// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One product as published by a source (SPC RSS entry or map-server feature).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Product {
    pub title: String,
    /// Raw body text; may still contain HTML markup.
    pub summary: String,
    pub link: String,
    /// Stable id when the source provides one (e.g. mesoscale discussion number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
}

impl Product {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            link: link.into(),
            identifier: None,
            first_seen: None,
        }
    }

    pub fn with_identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
    }

    pub fn with_first_seen(mut self, ts: DateTime<Utc>) -> Self {
        self.first_seen = Some(ts);
        self
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Product>>;
    fn name(&self) -> &'static str;
    /// A required source failing its retries aborts the cycle; an optional
    /// one is logged and contributes nothing.
    fn required(&self) -> bool {
        true
    }
}
