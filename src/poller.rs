//! Poll loop: FETCHING -> PROCESSING -> PERSISTING, once or on an interval.
//!
//! The seen cache is written at the end of every cycle that fetched
//! successfully, even when nothing new arrived, so evictions are persisted.
//! A cycle whose fetch exhausts its retries leaves the file untouched.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, gauge};

use crate::cache::{dedup_key, SeenCache};
use crate::ingest::types::{Product, SourceProvider};
use crate::ingest::{fetch_all, is_no_data_entry, FetchRetry};
use crate::notify::{Destination, Dispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Fetching,
    Processing,
    Persisting,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    /// "No watches are valid"-style placeholder entries.
    pub no_data: usize,
    /// Products without usable dedup content.
    pub skipped: usize,
    /// Products already in the seen cache.
    pub seen: usize,
    pub new: usize,
    /// New products recorded as seen (delivered or filtered everywhere).
    pub recorded: usize,
    /// New products withheld from the cache after a failed post.
    pub failed: usize,
}

pub struct Poller {
    providers: Vec<Box<dyn SourceProvider>>,
    dispatcher: Dispatcher,
    destinations: Vec<Destination>,
    cache: SeenCache,
    cache_path: PathBuf,
    retry: FetchRetry,
    state: PollState,
}

impl Poller {
    pub fn new(
        providers: Vec<Box<dyn SourceProvider>>,
        dispatcher: Dispatcher,
        destinations: Vec<Destination>,
        cache: SeenCache,
        cache_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            providers,
            dispatcher,
            destinations,
            cache,
            cache_path: cache_path.into(),
            retry: FetchRetry::default(),
            state: PollState::Fetching,
        }
    }

    pub fn with_retry(mut self, retry: FetchRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &SeenCache {
        &self.cache
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    fn enter(&mut self, state: PollState) {
        tracing::debug!(from = ?self.state, to = ?state, "poll state");
        self.state = state;
    }

    /// Drive fetched products through dedup, filters and delivery, in source order.
    pub async fn process(&mut self, products: Vec<Product>) -> CycleReport {
        let mut report = CycleReport {
            fetched: products.len(),
            ..Default::default()
        };

        for product in products {
            if is_no_data_entry(&product.title) {
                report.no_data += 1;
                continue;
            }
            tracing::debug!(title = %product.title, "processing product");

            let Some(key) = dedup_key(&product) else {
                tracing::warn!(title = %product.title, "skipping entry with no summary text");
                counter!("spc_products_skipped_total").increment(1);
                report.skipped += 1;
                continue;
            };

            if self.cache.contains(&key) {
                tracing::debug!(title = %product.title, "product previously seen");
                report.seen += 1;
                continue;
            }
            report.new += 1;
            counter!("spc_products_new_total").increment(1);

            let outcome = self.dispatcher.dispatch(&product, &self.destinations).await;
            tracing::debug!(
                title = %product.title,
                delivered = outcome.delivered(),
                filtered = outcome.filtered(),
                failed = outcome.failed(),
                "dispatch finished"
            );
            if outcome.fully_handled() {
                if let Some(evicted) = self.cache.append(key) {
                    tracing::debug!(evicted = %evicted, "seen cache full, evicted oldest key");
                }
                report.recorded += 1;
            } else {
                report.failed += 1;
            }
        }

        counter!("spc_products_seen_total").increment(report.seen as u64);
        tracing::info!(count = report.seen, "skipped previously seen products");
        report
    }

    /// One full cycle. Errors when fetching exhausts its retries (nothing is
    /// persisted) or when the cache file cannot be written.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.enter(PollState::Fetching);
        let products = fetch_all(&self.providers, self.retry).await?;

        self.enter(PollState::Processing);
        let report = self.process(products).await;

        self.enter(PollState::Persisting);
        self.cache
            .save(&self.cache_path)
            .context("persisting seen products cache")?;
        gauge!("spc_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            fetched = report.fetched,
            no_data = report.no_data,
            skipped = report.skipped,
            seen = report.seen,
            new = report.new,
            recorded = report.recorded,
            failed = report.failed,
            "cycle complete"
        );
        self.enter(PollState::Fetching);
        Ok(report)
    }

    /// Run once, or keep cycling every `interval` until `shutdown` resolves.
    /// Shutdown is only observed between cycles, so a started cycle always
    /// reaches PERSISTING. In continuous mode a failed cycle is logged and the
    /// loop carries on; in single-shot mode it is returned.
    pub async fn run<F>(&mut self, continuous: bool, interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e) if continuous => {
                    tracing::error!(error = %format!("{e:#}"), "cycle failed, previous seen cache kept");
                }
                Err(e) => return Err(e),
            }

            if !continuous {
                return Ok(());
            }

            tracing::info!(secs = interval.as_secs(), "sleeping until next poll, press Ctrl+C to exit");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("exiting application");
                    return Ok(());
                }
            }
        }
    }
}
