// src/ingest/mod.rs
//! Feed ingestion: pull raw entries from every source and normalize them into
//! [`Candidate`]s. A failing source is logged and skipped; the others still count.

pub mod rss;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::candidate::{canonicalize_url, normalize_text, Candidate};

/// One entry as a feed collaborator hands it over, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: String,
    pub link: Option<String>,
    /// Further links in document order, used when `link` is missing.
    pub alt_links: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary_html: Option<String>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>>;
    /// Site identifier, matched against the source priority list.
    fn name(&self) -> &str;
}

/// What one ingest pass produced.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub candidates: Vec<Candidate>,
    pub failed_sources: Vec<String>,
    pub dropped: usize,
    pub sources_total: usize,
}

impl IngestReport {
    /// No source produced anything usable.
    pub fn nothing_usable(&self) -> bool {
        self.candidates.is_empty()
            && (self.sources_total == 0 || self.failed_sources.len() == self.sources_total)
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_candidates_total",
            "Entries normalized into candidates."
        );
        describe_counter!(
            "digest_dropped_entries_total",
            "Entries dropped during normalization (no title/link, duplicate URL)."
        );
        describe_counter!("digest_feed_errors_total", "Feed fetch/parse failures.");
    });
}

/// Turn a raw entry into a candidate. Entries without a usable title or absolute
/// link are dropped here so nothing malformed reaches the curation stages.
pub fn normalize_entry(source: &str, entry: RawEntry, now: DateTime<Utc>) -> Option<Candidate> {
    let title = normalize_text(&entry.title);
    if title.is_empty() {
        return None;
    }

    let url = entry
        .link
        .iter()
        .chain(entry.alt_links.iter())
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .find_map(canonicalize_url)?;

    let summary = entry
        .summary_html
        .as_deref()
        .map(normalize_text)
        .unwrap_or_default();

    Some(Candidate {
        title,
        url,
        source: source.trim().to_string(),
        published_at: entry.published_at.unwrap_or(now),
        summary,
    })
}

/// Fetch every source once, normalize, and drop exact-URL repeats within the batch.
///
/// `max_entries` caps how many entries are taken from each source (feed order).
pub async fn run_once(
    sources: &[Box<dyn FeedSource>],
    max_entries: usize,
    now: DateTime<Utc>,
) -> IngestReport {
    ensure_metrics_described();

    let mut report = IngestReport {
        sources_total: sources.len(),
        ..IngestReport::default()
    };
    let mut seen_urls: HashSet<String> = HashSet::new();

    for src in sources {
        let entries = match src.fetch_entries().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %format!("{e:#}"), source = src.name(), "feed fetch failed");
                counter!("digest_feed_errors_total").increment(1);
                report.failed_sources.push(src.name().to_string());
                continue;
            }
        };

        let mut kept = 0usize;
        for entry in entries.into_iter().take(max_entries) {
            match normalize_entry(src.name(), entry, now) {
                Some(c) if seen_urls.insert(c.url.clone()) => {
                    report.candidates.push(c);
                    kept += 1;
                }
                _ => report.dropped += 1,
            }
        }
        tracing::info!(target: "ingest", source = src.name(), kept, "feed ingested");
    }

    counter!("digest_candidates_total").increment(report.candidates.len() as u64);
    counter!("digest_dropped_entries_total").increment(report.dropped as u64);
    report
}
