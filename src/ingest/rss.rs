// src/ingest/rss.rs
//! Syndicated feed source. Understands RSS 2.0, RDF (RSS 1.0) and Atom documents,
//! fetched over HTTP or supplied as a fixture string.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::config::{FeedCfg, HttpCfg};
use crate::error::{FetchError, ParseError};
use crate::ingest::{FeedSource, RawEntry};

// RSS 2.0 nests items under <channel>; RDF and Atom keep them at the root.
#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default, rename = "item")]
    items: Vec<Item>,
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Channel {
    #[serde(default, rename = "item")]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "dc:date", alias = "date")]
    dc_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default, rename = "link")]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_config(feed: &FeedCfg, http: &HttpCfg) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .connect_timeout(http.connect_timeout())
            .timeout(http.timeout())
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: feed.name.clone(),
            mode: Mode::Http {
                url: feed.url.clone(),
                client,
            },
        })
    }

    async fn fetch_body(url: &str, client: &reqwest::Client) -> Result<String, FetchError> {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        match &self.mode {
            Mode::Fixture(xml) => Ok(parse_feed(xml)?),
            Mode::Http { url, client } => {
                let body = Self::fetch_body(url, client)
                    .await
                    .with_context(|| format!("fetching feed {}", self.name))?;
                Ok(parse_feed(&body).with_context(|| format!("parsing feed {}", self.name))?)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse a feed document into raw entries, in document order.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>, ParseError> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let doc: Document = from_str(&cleaned).map_err(|e| ParseError::Feed(e.to_string()))?;

    let mut out = Vec::new();
    let rss_items = doc
        .channel
        .map(|c| c.items)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.items);
    for it in rss_items {
        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_feed_date)
            .or_else(|| it.dc_date.as_deref().and_then(parse_feed_date));
        // guid doubles as a permalink in many RSS feeds
        let alt_links = it
            .guid
            .filter(|g| g.starts_with("http"))
            .into_iter()
            .collect();
        out.push(RawEntry {
            title: it.title.unwrap_or_default(),
            link: it.link,
            alt_links,
            published_at,
            summary_html: it.description,
        });
    }

    for e in doc.entries {
        let published_at = e
            .published
            .as_deref()
            .and_then(parse_feed_date)
            .or_else(|| e.updated.as_deref().and_then(parse_feed_date));
        let (primary, rest): (Vec<AtomLink>, Vec<AtomLink>) = e
            .links
            .into_iter()
            .partition(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"));
        let mut hrefs = primary
            .into_iter()
            .chain(rest)
            .filter_map(|l| l.href)
            .collect::<Vec<_>>();
        let link = if hrefs.is_empty() {
            None
        } else {
            Some(hrefs.remove(0))
        };
        out.push(RawEntry {
            title: e.title.unwrap_or_default(),
            link,
            alt_links: hrefs,
            published_at,
            summary_html: e.summary.or(e.content),
        });
    }

    Ok(out)
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, Dublin Core); anything else is treated as absent.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok();
    if let Some(dt) = odt {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // chrono is more forgiving about obsolete zone names in RFC 2822 dates
    DateTime::parse_from_rfc2822(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

// Feeds routinely embed HTML entities that plain XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
