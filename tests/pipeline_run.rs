// tests/pipeline_run.rs
// End-to-end runs over fixture feeds with in-memory collaborators.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use gaming_news_digest::config::{DigestConfig, RunMode};
use gaming_news_digest::dedup::{SeenState, SeenStore};
use gaming_news_digest::error::FetchError;
use gaming_news_digest::ingest::rss::RssFeed;
use gaming_news_digest::ingest::{FeedSource, RawEntry};
use gaming_news_digest::media::{Confidence, MediaTransport, Resolver};
use gaming_news_digest::pipeline::{run, Collaborators, Outcome};
use gaming_news_digest::publish::{Delivery, Digest, Publisher};

const IGN: &str = include_str!("fixtures/ign_rss.xml");
const BLUES: &str = include_str!("fixtures/bluesnews_rdf.xml");
const GAMESPOT: &str = include_str!("fixtures/gamespot_atom.xml");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap()
}

fn fixture_sources() -> Vec<Box<dyn FeedSource>> {
    vec![
        Box::new(RssFeed::from_fixture("IGN", IGN)),
        Box::new(RssFeed::from_fixture("GameSpot", GAMESPOT)),
        Box::new(RssFeed::from_fixture("Blue's News", BLUES)),
    ]
}

#[derive(Default)]
struct MemoryStore {
    state: Mutex<SeenState>,
    saves: Mutex<usize>,
}

impl SeenStore for MemoryStore {
    fn load(&self) -> Result<SeenState> {
        Ok(self.state.lock().unwrap().clone())
    }
    fn save(&self, state: &SeenState) -> Result<()> {
        *self.state.lock().unwrap() = state.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    digests: Mutex<Vec<Digest>>,
    fail: bool,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, digest: &Digest) -> Result<Delivery> {
        if self.fail {
            return Err(anyhow!("webhook down"));
        }
        self.digests.lock().unwrap().push(digest.clone());
        Ok(Delivery::all(digest.stories.len()))
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

struct Offline;

#[async_trait]
impl MediaTransport for Offline {
    async fn get_text(&self, url: &str, _bearer: Option<&str>) -> Result<String, FetchError> {
        Err(FetchError::Timeout { url: url.into() })
    }
}

struct Broken(&'static str);

#[async_trait]
impl FeedSource for Broken {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        Err(anyhow!("502 from upstream"))
    }
    fn name(&self) -> &str {
        self.0
    }
}

fn resolver(cfg: &DigestConfig) -> Resolver {
    Resolver::new(&cfg.media, Arc::new(Offline))
}

#[tokio::test]
async fn publish_run_selects_ranks_and_remembers() {
    let cfg = DigestConfig::default();
    let sources = fixture_sources();
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    let summary = run(
        &cfg,
        Collaborators {
            sources: &sources,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();

    assert_eq!(
        summary.outcome,
        Outcome::Published {
            delivered: 4,
            remembered: true
        }
    );

    let digests = publisher.digests.lock().unwrap();
    let titles: Vec<&str> = digests[0].stories.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Studio X Shuts Down After Layoffs",
            "Capcom announces Onimusha: Way of the Sword release window",
            "Silksong Gets a Release Date",
            "Valve ships Counter-Strike 2 patch",
        ]
    );
    // IGN represents the Silksong story; tracking noise is gone from URLs
    assert_eq!(digests[0].stories[2].source, "IGN");
    assert_eq!(
        digests[0].stories[0].url,
        "https://www.ign.com/articles/studio-x-shuts-down"
    );
    assert_eq!(
        digests[0].stories[3].url,
        "https://www.bluesnews.com/s/2/valve-patch"
    );
    assert_eq!(digests[0].media.confidence, Confidence::Fallback);

    let state = store.state.lock().unwrap();
    assert_eq!(state.len(), 4);
    assert!(state.has_url("https://www.gamespot.com/articles/onimusha-window/"));
    assert_eq!(*store.saves.lock().unwrap(), 1);
}

#[tokio::test]
async fn second_run_has_nothing_new() {
    let cfg = DigestConfig::default();
    let sources = fixture_sources();
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    for _ in 0..2 {
        run(
            &cfg,
            Collaborators {
                sources: &sources,
                store: &store,
                resolver: &resolver,
                publisher: &publisher,
            },
            now(),
        )
        .await
        .unwrap();
    }
    assert_eq!(publisher.digests.lock().unwrap().len(), 1);
    assert_eq!(*store.saves.lock().unwrap(), 1);
}

#[tokio::test]
async fn preview_never_touches_seen_state() {
    let cfg = DigestConfig {
        mode: RunMode::Preview,
        ..DigestConfig::default()
    };
    let sources = fixture_sources();
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    for _ in 0..2 {
        let summary = run(
            &cfg,
            Collaborators {
                sources: &sources,
                store: &store,
                resolver: &resolver,
                publisher: &publisher,
            },
            now(),
        )
        .await
        .unwrap();
        assert_eq!(
            summary.outcome,
            Outcome::Published {
                delivered: 4,
                remembered: false
            }
        );
    }
    assert_eq!(publisher.digests.lock().unwrap().len(), 2);
    assert_eq!(*store.saves.lock().unwrap(), 0);
    assert!(store.state.lock().unwrap().is_empty());
}

#[tokio::test]
async fn all_feeds_down_is_nothing_to_publish() {
    let cfg = DigestConfig::default();
    let sources: Vec<Box<dyn FeedSource>> = vec![Box::new(Broken("IGN")), Box::new(Broken("GameSpot"))];
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    let summary = run(
        &cfg,
        Collaborators {
            sources: &sources,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.outcome, Outcome::NothingToPublish);
    assert_eq!(summary.failed_sources, vec!["IGN", "GameSpot"]);
    assert!(publisher.digests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_feed_down_still_publishes_the_rest() {
    let cfg = DigestConfig::default();
    let sources: Vec<Box<dyn FeedSource>> = vec![
        Box::new(Broken("IGN")),
        Box::new(RssFeed::from_fixture("GameSpot", GAMESPOT)),
    ];
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    let summary = run(
        &cfg,
        Collaborators {
            sources: &sources,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.failed_sources, vec!["IGN"]);
}

#[tokio::test]
async fn failed_publish_leaves_state_alone() {
    let cfg = DigestConfig::default();
    let sources = fixture_sources();
    let store = MemoryStore::default();
    let publisher = RecordingPublisher {
        fail: true,
        ..RecordingPublisher::default()
    };
    let resolver = resolver(&cfg);

    let res = run(
        &cfg,
        Collaborators {
            sources: &sources,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await;
    assert!(res.is_err());
    assert_eq!(*store.saves.lock().unwrap(), 0);
}

#[tokio::test]
async fn follow_up_with_update_signal_is_published_again() {
    let cfg = DigestConfig::default();
    let store = MemoryStore::default();
    let publisher = RecordingPublisher::default();
    let resolver = resolver(&cfg);

    let first: Vec<Box<dyn FeedSource>> = vec![Box::new(RssFeed::from_fixture("IGN", IGN))];
    run(
        &cfg,
        Collaborators {
            sources: &first,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();

    let follow_up = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <item>
    <title>Silksong Gets a Release Date</title>
    <link>https://www.gamespot.com/articles/silksong-dated/</link>
    <pubDate>Tue, 14 Oct 2025 11:30:00 +0000</pubDate>
    <description>New details on launch editions and a fresh trailer.</description>
  </item>
  <item>
    <title>Silksong Gets a Release Date</title>
    <link>https://www.polygon.com/silksong-dated</link>
    <pubDate>Tue, 14 Oct 2025 11:45:00 +0000</pubDate>
    <description>Team Cherry set the date.</description>
  </item>
</channel></rss>"#;
    let second: Vec<Box<dyn FeedSource>> =
        vec![Box::new(RssFeed::from_fixture("GameSpot", follow_up))];
    let summary = run(
        &cfg,
        Collaborators {
            sources: &second,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();

    // Both entries share a story key; the cluster keeps the newest, which
    // carries no update signal, so nothing goes out.
    assert_eq!(summary.outcome, Outcome::NothingToPublish);

    let only_update: Vec<Box<dyn FeedSource>> = vec![Box::new(RssFeed::from_fixture(
        "GameSpot",
        &follow_up.replace("Team Cherry set the date.", "Update: editions confirmed."),
    ))];
    let summary = run(
        &cfg,
        Collaborators {
            sources: &only_update,
            store: &store,
            resolver: &resolver,
            publisher: &publisher,
        },
        now(),
    )
    .await
    .unwrap();
    assert!(matches!(summary.outcome, Outcome::Published { delivered: 1, .. }));
}
