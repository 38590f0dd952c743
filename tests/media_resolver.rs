// tests/media_resolver.rs
// Resolver strategy chain against a scripted media host.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use gaming_news_digest::config::{DigestConfig, MediaCfg, PositionalPick, MAX_MEDIA_AGE_DAYS};
use gaming_news_digest::error::FetchError;
use gaming_news_digest::media::{Confidence, MediaTransport, Resolver};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap()
}

/// Answers by URL prefix; anything unrouted is a 404. Records every request.
#[derive(Default)]
struct FakeHost {
    routes: Vec<(String, String)>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    fn route(mut self, prefix: &str, body: impl Into<String>) -> Self {
        self.routes.push((prefix.to_string(), body.into()));
        self
    }

    fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl MediaTransport for FakeHost {
    async fn get_text(&self, url: &str, _bearer: Option<&str>) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn cfg() -> MediaCfg {
    MediaCfg {
        watch_url_template: "https://host.test/watch/{id}".into(),
        hub_url: "https://host.test/hub/".into(),
        listing_url: "https://host.test/latest/".into(),
        ..MediaCfg::default()
    }
}

fn api_cfg() -> MediaCfg {
    MediaCfg {
        api_base: Some("https://api.test".into()),
        api_token: Some("secret".into()),
        collection_id: Some("c1".into()),
        ..cfg()
    }
}

fn meta(days_ago: i64) -> String {
    format!(
        r#"{{"data":{{"upload_timestamp":"{}"}}}}"#,
        (now() - Duration::days(days_ago)).to_rfc3339()
    )
}

fn watch_page(days_ago: Option<i64>) -> String {
    match days_ago {
        Some(d) => format!(
            r#"<html><script type="application/ld+json">{{"uploadDate":"{}"}}</script></html>"#,
            (now() - Duration::days(d)).to_rfc3339()
        ),
        None => "<html><p>no metadata</p></html>".to_string(),
    }
}

const LISTING: &str = r#"
    <a href="/en-us/watch/AAA111">first tile</a>
    <a href="/en-us/watch/BBB222">second tile</a>
    <a href="/en-us/watch/AAA111">first tile again</a>
"#;

async fn resolve(cfg: &MediaCfg, host: Arc<FakeHost>) -> gaming_news_digest::ResolvedMedia {
    Resolver::new(cfg, host).resolve(now()).await
}

#[tokio::test]
async fn forced_identifier_beats_everything() {
    let cfg = MediaCfg {
        forced_id: Some("ABC123".into()),
        ..api_cfg()
    };
    let host = Arc::new(FakeHost::default().route("https://", LISTING));
    let r = resolve(&cfg, host.clone()).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.watch_url, "https://host.test/watch/ABC123");
    assert!(host.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_everything_falls_back_to_hub() {
    let host = Arc::new(FakeHost::default());
    let r = resolve(&api_cfg(), host).await;
    assert_eq!(r.confidence, Confidence::Fallback);
    assert_eq!(r.watch_url, "https://host.test/hub/");
}

#[tokio::test]
async fn fresh_api_result_short_circuits() {
    let host = Arc::new(
        FakeHost::default()
            .route(
                "https://api.test/collection/c1/items",
                r#"{"data":[{"id":"old1"},{"id":"new1"}],"paging":{"next":null}}"#,
            )
            .route("https://api.test/items/old1/meta", meta(20))
            .route("https://api.test/items/new1/meta", meta(1)),
    );
    let r = resolve(&api_cfg(), host.clone()).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.media_id.as_deref(), Some("new1"));
    // one query variant was enough; no scraping
    assert_eq!(host.calls_to("https://api.test/collection/"), 1);
    assert_eq!(host.calls_to("https://host.test/"), 0);
}

#[tokio::test]
async fn api_newest_may_sit_anywhere_in_the_listing() {
    let host = Arc::new(
        FakeHost::default()
            .route(
                "https://api.test/collection/c1/items",
                r#"{"items":[{"video_id":1},{"video_id":2},{"video_id":3}]}"#,
            )
            .route("https://api.test/items/1/meta", r#"{"created_time":"2025-10-01T00:00:00Z"}"#)
            .route("https://api.test/items/2/meta", meta(5))
            .route("https://api.test/items/3/meta", r#"{"title":"no time"}"#),
    );
    let r = resolve(&api_cfg(), host.clone()).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.media_id.as_deref(), Some("2"));
    // not fresh enough to stop early: every variant probed, metadata cached
    assert_eq!(host.calls_to("https://api.test/collection/"), 3);
    assert_eq!(host.calls_to("https://api.test/items/2/meta"), 1);
}

#[tokio::test]
async fn stale_api_loses_to_validated_scrape() {
    let host = Arc::new(
        FakeHost::default()
            .route(
                "https://api.test/collection/c1/items",
                r#"[{"id":"OLD999"}]"#,
            )
            .route("https://api.test/items/OLD999/meta", meta(30))
            .route("https://host.test/latest/", LISTING)
            .route("https://host.test/watch/AAA111", watch_page(Some(3)))
            .route("https://host.test/watch/BBB222", watch_page(Some(1))),
    );
    let r = resolve(&api_cfg(), host.clone()).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.watch_url, "https://host.test/watch/BBB222");
    // listing fetched once per cache-bust variant
    assert_eq!(host.calls_to("https://host.test/latest/?cb="), 3);
}

#[tokio::test]
async fn stale_api_pick_survives_when_scrape_has_no_dates() {
    let host = Arc::new(
        FakeHost::default()
            .route("https://api.test/collection/c1/items", r#"[{"id":"OLD999"}]"#)
            .route("https://api.test/items/OLD999/meta", meta(30))
            .route("https://host.test/latest/", LISTING)
            .route("https://host.test/watch/", watch_page(None)),
    );
    let r = resolve(&api_cfg(), host).await;
    assert_eq!(r.confidence, Confidence::Low);
    assert_eq!(r.media_id.as_deref(), Some("OLD999"));
}

#[tokio::test]
async fn undated_scrape_uses_configured_position() {
    let host = Arc::new(
        FakeHost::default()
            .route("https://host.test/latest/", LISTING)
            .route("https://host.test/watch/", watch_page(None)),
    );
    let first = resolve(&cfg(), host.clone()).await;
    assert_eq!(first.confidence, Confidence::Low);
    assert_eq!(first.media_id.as_deref(), Some("AAA111"));

    let last_cfg = MediaCfg {
        positional_pick: PositionalPick::Last,
        ..cfg()
    };
    let last = resolve(&last_cfg, host).await;
    assert_eq!(last.media_id.as_deref(), Some("BBB222"));
}

#[tokio::test]
async fn hub_page_contributes_identifiers() {
    let host = Arc::new(
        FakeHost::default()
            .route("https://host.test/hub/", r#"<img src="/content-staging/HUB777/x.jpg">"#)
            .route("https://host.test/watch/HUB777", watch_page(Some(2))),
    );
    let r = resolve(&cfg(), host).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.media_id.as_deref(), Some("HUB777"));
}

#[tokio::test]
async fn validation_is_bounded() {
    let tiles: String = (0..20)
        .map(|i| format!(r#"<a href="/watch/ID{i:03}">t</a>"#))
        .collect();
    let host = Arc::new(
        FakeHost::default()
            .route("https://host.test/latest/", tiles)
            .route("https://host.test/watch/", watch_page(None)),
    );
    let cfg = MediaCfg {
        max_validate: 5,
        ..cfg()
    };
    let r = resolve(&cfg, host.clone()).await;
    assert_eq!(r.confidence, Confidence::Low);
    assert_eq!(host.calls_to("https://host.test/watch/"), 5);
}

#[tokio::test]
async fn out_of_range_age_windows_do_not_break_resolution() {
    let host = Arc::new(
        FakeHost::default()
            .route("https://api.test/collection/c1/items", r#"[{"id":"OLD999"}]"#)
            .route("https://api.test/items/OLD999/meta", meta(30)),
    );
    // unsanitized: the cutoffs cannot be represented, so nothing counts as fresh
    let raw = MediaCfg {
        fresh_days: 100_000_000,
        stale_days: i64::MAX,
        ..api_cfg()
    };
    let r = resolve(&raw, host.clone()).await;
    assert_eq!(r.confidence, Confidence::Low);
    assert_eq!(r.media_id.as_deref(), Some("OLD999"));

    // loaded through the config layer the window is clamped and the result is current
    let cfg = DigestConfig::from_toml_str(
        r#"
[media]
api_base = "https://api.test"
api_token = "secret"
collection_id = "c1"
watch_url_template = "https://host.test/watch/{id}"
hub_url = "https://host.test/hub/"
listing_url = "https://host.test/latest/"
stale_days = 100000000
"#,
    )
    .unwrap();
    assert_eq!(cfg.media.stale_days, MAX_MEDIA_AGE_DAYS);
    let r = resolve(&cfg.media, host).await;
    assert_eq!(r.confidence, Confidence::High);
    assert_eq!(r.watch_url, "https://host.test/watch/OLD999");
}
