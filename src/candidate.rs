// src/candidate.rs
//! Normalized feed entries and the fingerprints used to compare them.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that only track the click and never change the article.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "yclid", "mc_cid", "mc_eid", "ref", "source",
];

const SUMMARY_MAX_CHARS: usize = 1500;

/// One feed entry after normalization.
///
/// `url` is absolute and canonical; `title` is non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
}

impl Candidate {
    /// Title and summary joined, the text every keyword check looks at.
    pub fn text(&self) -> String {
        if self.summary.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.summary)
        }
    }

    pub fn story_key(&self) -> StoryKey {
        StoryKey::from_title(&self.title)
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = now.signed_duration_since(self.published_at).num_seconds();
        secs.max(0) as f64 / 3600.0
    }
}

/// Fingerprint of a story: the hashed, punctuation-free, lower-cased title.
///
/// Two candidates with the same key are treated as the same story. This is a
/// heuristic: rewritten headlines for one event produce different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryKey(String);

impl StoryKey {
    pub fn from_title(title: &str) -> Self {
        let canon = story_text(title);
        let digest = Sha256::digest(canon.as_bytes());
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case, strip URLs and punctuation, collapse whitespace.
pub fn story_text(title: &str) -> String {
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re_url = RE_URL.get_or_init(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());

    let lowered = title.to_lowercase();
    let without_urls = re_url.replace_all(&lowered, " ");
    let cleaned: String = without_urls
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title form kept in history for fuzzy comparison: lower-cased, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode entities, strip tags, fold typographic quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // Entities first so encoded tags (`&lt;p&gt;`) get stripped as well.
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > SUMMARY_MAX_CHARS {
        out = out.chars().take(SUMMARY_MAX_CHARS).collect();
    }
    out
}

/// Canonical absolute URL: tracking parameters and fragment removed, host lower-cased.
/// Returns `None` for anything that is not an absolute http(s) URL.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}
