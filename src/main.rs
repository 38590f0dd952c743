//! Gaming news digest: one curation run per invocation.
//! Fetches the configured feeds, picks the day's stories, resolves the newest
//! video and hands both to the publisher.
//!
//! Exit status: 0 when the run finished (including "nothing to publish"),
//! 1 on a configuration error, 2 when publishing or persisting failed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gaming_news_digest::config::DigestConfig;
use gaming_news_digest::ingest::{rss::RssFeed, FeedSource};
use gaming_news_digest::media::{HttpTransport, Resolver};
use gaming_news_digest::pipeline::{run, Collaborators, Outcome};
use gaming_news_digest::publish::{DiscordWebhook, Publisher, StdoutPublisher};
use gaming_news_digest::JsonFileStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_sources(cfg: &DigestConfig) -> Result<Vec<Box<dyn FeedSource>>> {
    cfg.feeds
        .iter()
        .map(|f| Ok(Box::new(RssFeed::from_config(f, &cfg.http)?) as Box<dyn FeedSource>))
        .collect()
}

fn build_publisher(cfg: &DigestConfig) -> Result<Box<dyn Publisher>> {
    Ok(match cfg.discord_webhook_url.as_deref() {
        Some(url) => Box::new(DiscordWebhook::new(url.to_string(), &cfg.http)?),
        None => {
            tracing::info!("DISCORD_WEBHOOK_URL not set, writing digest to stdout");
            Box::new(StdoutPublisher)
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match DigestConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "configuration error");
            return ExitCode::from(1);
        }
    };

    let wired = (|| -> Result<_> {
        let sources = build_sources(&cfg)?;
        let transport = Arc::new(HttpTransport::new(&cfg.http)?);
        let resolver = Resolver::new(&cfg.media, transport);
        let publisher = build_publisher(&cfg)?;
        let store = JsonFileStore::new(&cfg.state_path, cfg.dedup.history_cap);
        Ok((sources, resolver, publisher, store))
    })();
    let (sources, resolver, publisher, store) = match wired {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "setup failed");
            return ExitCode::from(1);
        }
    };

    let io = Collaborators {
        sources: &sources,
        store: &store,
        resolver: &resolver,
        publisher: publisher.as_ref(),
    };
    match run(&cfg, io, Utc::now()).await {
        Ok(summary) => {
            match summary.outcome {
                Outcome::NothingToPublish => tracing::info!(
                    candidates = summary.candidates,
                    failed_sources = summary.failed_sources.len(),
                    "nothing to publish"
                ),
                Outcome::Published {
                    delivered,
                    remembered,
                } => tracing::info!(delivered, remembered, mode = ?summary.mode, "done"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run failed");
            ExitCode::from(2)
        }
    }
}
