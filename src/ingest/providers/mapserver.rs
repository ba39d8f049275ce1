//! Mesoscale discussions from the NOAA ESRI map service.
//!
//! The layer query returns one feature per active discussion. Each feature
//! carries the discussion number and a link to its info page; the discussion
//! text itself lives in the first `<pre>` block of that page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{Product, SourceProvider};

pub const DEFAULT_MAPSERVER_URL: &str =
    "https://mapservices.weather.noaa.gov/vector/rest/services/outlooks/spc_mesoscale_discussion";
const QUERY_SUFFIX: &str = "/MapServer/0/query?where=1%3D1&outFields=*&f=json";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    #[serde(default)]
    name: String,
    #[serde(default)]
    popupinfo: String,
}

/// A discussion listed by the map server, before its text has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdRef {
    pub id: String,
    pub info_page: String,
}

/// Parse a layer query response. `NoArea` placeholders and unnamed features are dropped.
pub fn parse_features(json: &str) -> Result<Vec<MdRef>> {
    let resp: QueryResponse = serde_json::from_str(json).context("parsing map server json")?;
    Ok(resp
        .features
        .into_iter()
        .filter_map(|f| {
            let name = f.attributes.name.trim();
            if name.is_empty() || name.eq_ignore_ascii_case("NoArea") {
                return None;
            }
            let id = name.trim_start_matches("MD").trim().to_string();
            if id.is_empty() {
                return None;
            }
            Some(MdRef {
                id,
                info_page: upgrade_to_https(f.attributes.popupinfo.trim()),
            })
        })
        .collect())
}

/// NOAA hosts report `http://` info pages but serve them over https.
fn upgrade_to_https(url: &str) -> String {
    let Some(rest) = url.strip_prefix("http://") else {
        return url.to_string();
    };
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    if host == "noaa.gov" || host.ends_with(".noaa.gov") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

/// Text of the first `<pre>` element, or `None` when the page has none.
pub fn extract_pre_text(html: &str) -> Option<String> {
    static RE_PRE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_PRE.get_or_init(|| regex::Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").unwrap());
    let inner = re.captures(html)?.get(1)?.as_str();
    let text = crate::ingest::cleanup_summary(inner);
    (!text.is_empty()).then_some(text)
}

pub struct MapServerProvider {
    base_url: String,
    client: reqwest::Client,
}

impl MapServerProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("spc-notifier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("building map server http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} non-2xx"))?
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))
    }
}

#[async_trait]
impl SourceProvider for MapServerProvider {
    async fn fetch_latest(&self) -> Result<Vec<Product>> {
        let body = self
            .get_text(&format!("{}{}", self.base_url, QUERY_SUFFIX))
            .await?;
        let refs = parse_features(&body)?;

        let mut out = Vec::with_capacity(refs.len());
        for md in refs {
            // Leave the discussion out this cycle rather than publish it without text.
            let text = match self.get_text(&md.info_page).await {
                Ok(html) => extract_pre_text(&html),
                Err(e) => {
                    tracing::warn!(md_id = %md.id, error = %format!("{e:#}"), "discussion page fetch failed");
                    None
                }
            };
            let Some(text) = text else {
                tracing::warn!(md_id = %md.id, info_page = %md.info_page, "no discussion text, deferring");
                continue;
            };

            out.push(
                Product::new(format!("Mesoscale Discussion {}", md.id), text, md.info_page)
                    .with_identifier(md.id)
                    .with_first_seen(Utc::now()),
            );
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "spc-mapserver"
    }

    fn required(&self) -> bool {
        false
    }
}
