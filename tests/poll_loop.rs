// tests/poll_loop.rs
//
// Loop timing runs on paused tokio time, so intervals and backoffs elapse instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use spc_notifier::ingest::types::SourceProvider;
use spc_notifier::ingest::FetchRetry;
use spc_notifier::summarizer::DisabledSummarizer;
use spc_notifier::{Destination, Dispatcher, Poller, Product, SeenCache, WebhookPayload, WebhookTransport};

struct Sink(AtomicUsize);

#[async_trait::async_trait]
impl WebhookTransport for Sink {
    async fn post(&self, _url: &str, _payload: &WebhookPayload) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the first `fail_first` fetches, then serves one watch.
struct Flaky {
    calls: Arc<AtomicUsize>,
    fail_first: usize,
}

#[async_trait::async_trait]
impl SourceProvider for Flaky {
    async fn fetch_latest(&self) -> Result<Vec<Product>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(anyhow!("spc rss non-2xx: 502 Bad Gateway"));
        }
        Ok(vec![Product::new(
            "Tornado Watch 200",
            "Portions of Oklahoma",
            "https://spc.test/ww0200",
        )])
    }
    fn name(&self) -> &'static str {
        "flaky"
    }
}

fn poller(calls: Arc<AtomicUsize>, fail_first: usize, sink: Arc<Sink>, path: &std::path::Path) -> Poller {
    Poller::new(
        vec![Box::new(Flaky { calls, fail_first })],
        Dispatcher::new(sink, Arc::new(DisabledSummarizer)),
        vec![Destination::new("https://discord.test/all")],
        SeenCache::with_capacity(500),
        path,
    )
    .with_retry(FetchRetry {
        attempts: 2,
        backoff: Duration::from_secs(1),
    })
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_cycles_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(Sink(AtomicUsize::new(0)));
    let mut p = poller(calls.clone(), 0, sink.clone(), &path);

    // Cycles at t=0, 60 and 120; shutdown lands during the third sleep.
    p.run(true, Duration::from_secs(60), tokio::time::sleep(Duration::from_secs(150)))
        .await
        .expect("clean shutdown");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    assert_eq!(p.cache().len(), 1);
    assert!(path.exists());
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_survives_failed_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(Sink(AtomicUsize::new(0)));
    let mut p = poller(calls.clone(), usize::MAX, sink.clone(), &path);

    // Two attempts per cycle (t=0,1 then t=61,62) before shutdown at t=100.
    p.run(true, Duration::from_secs(60), tokio::time::sleep(Duration::from_secs(100)))
        .await
        .expect("failed cycles do not end the loop");

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(sink.0.load(Ordering::SeqCst), 0);
    assert!(!path.exists(), "no cycle reached persisting");
}

#[tokio::test(start_paused = true)]
async fn single_shot_returns_fetch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(Sink(AtomicUsize::new(0)));
    let mut p = poller(calls.clone(), usize::MAX, sink, &path);

    let err = p
        .run(false, Duration::from_secs(60), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("failed after 2 attempts"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn single_shot_recovers_within_retry_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(Sink(AtomicUsize::new(0)));
    let mut p = poller(calls.clone(), 1, sink.clone(), &path);

    p.run(false, Duration::from_secs(60), std::future::pending::<()>())
        .await
        .expect("second attempt succeeds");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.0.load(Ordering::SeqCst), 1);

    let saved = SeenCache::load(&path, 500);
    assert_eq!(saved.len(), 1);
}
