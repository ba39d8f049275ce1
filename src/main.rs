//! spc-notifier binary entrypoint.
//! Loads config, restores the seen cache and runs the poll loop once or continuously.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spc_notifier::config::{self, AppConfig, LogFormat};
use spc_notifier::ingest::providers::{mapserver::MapServerProvider, spc_rss::SpcRssProvider};
use spc_notifier::ingest::types::SourceProvider;
use spc_notifier::notify::discord::DiscordWebhook;
use spc_notifier::shutdown::shutdown_signal;
use spc_notifier::summarizer::build_summarizer;
use spc_notifier::{Dispatcher, Poller, SeenCache};

#[derive(Debug, Parser)]
#[command(name = "spc-notifier", version, about = "Forward new SPC products to Discord webhooks")]
struct Cli {
    /// Keep polling on the configured interval instead of running a single cycle
    #[arg(long = "loop")]
    run_loop: bool,

    /// Config file (defaults to $SPC_NOTIFIER_CONFIG or config/spc_notifier.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when the config asks for it.
fn init_tracing(cfg: &AppConfig) {
    let default_level = if cfg.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match cfg.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init(),
    }
}

fn build_providers(cfg: &AppConfig) -> Result<Vec<Box<dyn SourceProvider>>> {
    let mut providers: Vec<Box<dyn SourceProvider>> = vec![Box::new(SpcRssProvider::from_url(
        cfg.feed_url.clone(),
        cfg.request_timeout(),
    )?)];
    if cfg.mapserver.enabled {
        providers.push(Box::new(MapServerProvider::new(
            cfg.mapserver.url.clone(),
            cfg.request_timeout(),
        )?));
    }
    Ok(providers)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env in local/dev so ANTHROPIC_API_KEY and ENV: webhook urls resolve.
    let _ = dotenvy::dotenv();

    let cfg = config::load_config(cli.config.as_deref())?;
    init_tracing(&cfg);

    if let Some(listen) = cfg.metrics_listen.as_deref() {
        spc_notifier::metrics::install(listen)?;
    }

    tracing::info!("ensuring storage path for seen products cache exists");
    if let Some(dir) = cfg.cache_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
    }
    let cache = SeenCache::load(&cfg.cache_file, cfg.cache_size);

    let transport = DiscordWebhook::new()?.with_timeout(cfg.request_timeout());
    let summarizer = build_summarizer(&cfg.summarizer)?;
    tracing::info!(
        provider = summarizer.provider_name(),
        webhooks = cfg.webhooks.len(),
        mapserver = cfg.mapserver.enabled,
        "notifier configured"
    );

    let mut poller = Poller::new(
        build_providers(&cfg)?,
        Dispatcher::new(Arc::new(transport), summarizer),
        cfg.webhooks.clone(),
        cache,
        cfg.cache_file.clone(),
    )
    .with_retry(cfg.fetch_retry());

    let shutdown = shutdown_signal()?;
    poller.run(cli.run_loop, cfg.poll_interval(), shutdown).await
}
