use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{Product, SourceProvider};

pub const DEFAULT_FEED_URL: &str = "https://www.spc.noaa.gov/products/spcrss.xml";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Storm Prediction Center RSS feed (watches, outlooks, mesoscale discussions).
pub struct SpcRssProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl SpcRssProvider {
    /// Parse a fixed XML document on every fetch; used by tests and dry runs.
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("spc-notifier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("building rss http client")?;
        Ok(Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Product>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing spc rss xml")?;

        // An empty feed means something is wrong upstream; the SPC feed always
        // carries at least its "no watches" placeholder entries.
        if rss.channel.item.is_empty() {
            bail!("no entries found in spc rss feed");
        }

        let out: Vec<Product> = rss
            .channel
            .item
            .into_iter()
            .map(|it| {
                let mut p = Product::new(
                    it.title.unwrap_or_default().trim(),
                    it.description.unwrap_or_default(),
                    it.link.unwrap_or_default().trim(),
                );
                p.first_seen = it.pub_date.as_deref().and_then(parse_rfc2822);
                p
            })
            .collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("spc_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for SpcRssProvider {
    async fn fetch_latest(&self) -> Result<Vec<Product>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .context("spc rss http get()")?
                    .error_for_status()
                    .context("spc rss non-2xx")?
                    .text()
                    .await
                    .context("spc rss http .text()")?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "spc-rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>SPC Products</title>
<item>
  <title>SPC Severe Thunderstorm Watch 123</title>
  <link>https://www.spc.noaa.gov/products/watch/ww0123.html</link>
  <description><![CDATA[<pre>Watch 123 for portions of Iowa</pre>]]></description>
  <pubDate>Sat, 01 Jun 2024 20:15:00 +0000</pubDate>
</item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_items_and_pubdate() {
        let p = SpcRssProvider::from_fixture_str(FEED);
        let items = p.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "SPC Severe Thunderstorm Watch 123");
        assert!(items[0].summary.contains("Iowa"));
        assert_eq!(
            items[0].first_seen.map(|t| t.timestamp()),
            Some(1_717_272_900)
        );
    }

    #[tokio::test]
    async fn empty_channel_is_an_error() {
        let p = SpcRssProvider::from_fixture_str(
            r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#,
        );
        let err = p.fetch_latest().await.unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }
}
