// src/media/scrape.rs
//! Public-page scraping helpers: cache-busted listing URLs, identifier
//! extraction and publish-time discovery in a watch page's markup.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::media::types::parse_timestamp;

/// Append a unique `cb` query parameter so the CDN serves a fresh copy.
pub fn cache_busted(url: &str, nonce: &str) -> String {
    match Url::parse(url) {
        Ok(mut u) => {
            u.query_pairs_mut().append_pair("cb", nonce);
            u.to_string()
        }
        Err(_) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}cb={nonce}")
        }
    }
}

fn id_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
            /watch/(?P<watch>[A-Za-z0-9_-]{3,})
            | video\?id=(?P<vid>[A-Za-z0-9_-]{3,})
            | /content-staging/(?P<staging>[A-Za-z0-9_-]{3,})
            "#,
        )
        .unwrap()
    })
}

/// Every identifier in `html` matching a watch path, a `video?id=` query or a
/// content-staging path, deduplicated in discovery order.
pub fn extract_ids(html: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in id_regex().captures_iter(html) {
        let id = ["watch", "vid", "staging"]
            .iter()
            .find_map(|g| caps.name(g))
            .map(|m| m.as_str().to_string());
        if let Some(id) = id {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

type Extractor = fn(&str) -> Option<DateTime<Utc>>;

/// Ordered from most to least trustworthy; the first hit wins.
const EXTRACTORS: &[Extractor] = &[from_json_ld, from_meta_tags, from_any_iso_timestamp];

pub fn parse_published(html: &str) -> Option<DateTime<Utc>> {
    EXTRACTORS.iter().find_map(|f| f(html))
}

fn from_json_ld(html: &str) -> Option<DateTime<Utc>> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#""(?:uploadDate|datePublished)"\s*:\s*"([^"]+)""#).unwrap()
    });
    re.captures_iter(html)
        .find_map(|c| c.get(1).and_then(|m| parse_timestamp(m.as_str())))
}

fn from_meta_tags(html: &str) -> Option<DateTime<Utc>> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(?i)<meta[^>]+(?:property|name|itemprop)\s*=\s*["'](?:article:published_time|og:video:release_date|video:release_date|uploadDate|datePublished|pubdate)["'][^>]*content\s*=\s*["']([^"']+)["']"#,
        )
        .unwrap()
    });
    re.captures_iter(html)
        .find_map(|c| c.get(1).and_then(|m| parse_timestamp(m.as_str())))
}

fn from_any_iso_timestamp(html: &str) -> Option<DateTime<Utc>> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
    });
    re.find_iter(html).find_map(|m| parse_timestamp(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cache_buster_preserves_existing_query() {
        assert_eq!(
            cache_busted("https://host.test/latest/", "n1"),
            "https://host.test/latest/?cb=n1"
        );
        assert_eq!(
            cache_busted("https://host.test/latest/?page=2", "n2"),
            "https://host.test/latest/?page=2&cb=n2"
        );
    }

    #[test]
    fn ids_from_all_three_patterns_in_order() {
        let html = r#"
            <a href="/en-us/watch/AAA111">one</a>
            <a href="https://host.test/player/video?id=BBB222">two</a>
            <img src="https://cdn.test/content-staging/CCC333/thumb.jpg">
            <a href="/en-us/watch/AAA111">dup</a>
        "#;
        assert_eq!(extract_ids(html), vec!["AAA111", "BBB222", "CCC333"]);
        assert!(extract_ids("<html>nothing</html>").is_empty());
    }

    #[test]
    fn published_time_prefers_structured_data() {
        let want = Utc.with_ymd_and_hms(2025, 10, 14, 9, 30, 0).unwrap();
        let html = r#"
            <meta property="article:published_time" content="2020-01-01T00:00:00Z">
            <script type="application/ld+json">{"@type":"VideoObject","uploadDate":"2025-10-14T09:30:00Z"}</script>
        "#;
        assert_eq!(parse_published(html), Some(want));

        let meta_only = r#"<meta property="og:video:release_date" content="2025-10-14T09:30:00+00:00" />"#;
        assert_eq!(parse_published(meta_only), Some(want));

        let loose = r#"<span data-ts="2025-10-14T09:30:00Z">today</span>"#;
        assert_eq!(parse_published(loose), Some(want));

        assert_eq!(parse_published("<p>no dates</p>"), None);
    }
}
