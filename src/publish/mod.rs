// src/publish/mod.rs
//! Downstream publishers. They receive a finished [`Digest`] and report which
//! stories actually went out; nothing here feeds back into curation.

pub mod discord;

use std::fmt::Write as _;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::candidate::Candidate;
use crate::media::ResolvedMedia;

pub use discord::DiscordWebhook;

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub stories: Vec<Candidate>,
    pub media: ResolvedMedia,
    pub generated_at: DateTime<Utc>,
}

/// Indices into [`Digest::stories`] the publisher delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub accepted: Vec<usize>,
}

impl Delivery {
    pub fn all(n: usize) -> Self {
        Self {
            accepted: (0..n).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Errors only when nothing could be delivered.
    async fn publish(&self, digest: &Digest) -> Result<Delivery>;
    fn name(&self) -> &'static str;
}

/// Plain-text rendering, one line per story.
pub fn render_text(digest: &Digest) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Gaming news digest ({})",
        digest.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    for (i, s) in digest.stories.iter().enumerate() {
        let _ = writeln!(out, "{:>2}. [{}] {} <{}>", i + 1, s.source, s.title, s.url);
    }
    let _ = writeln!(
        out,
        "Latest video ({}): {}",
        digest.media.confidence, digest.media.watch_url
    );
    out
}

/// Writes the digest to stdout; used when no webhook is configured.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, digest: &Digest) -> Result<Delivery> {
        print!("{}", render_text(digest));
        tracing::info!(target: "publish", stories = digest.stories.len(), "digest written to stdout");
        Ok(Delivery::all(digest.stories.len()))
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Confidence;
    use chrono::TimeZone;

    #[test]
    fn text_rendering_lists_stories_and_video() {
        let d = Digest {
            stories: vec![Candidate {
                title: "Capcom announces Onimusha".into(),
                url: "https://ign.test/oni".into(),
                source: "IGN".into(),
                published_at: Utc::now(),
                summary: String::new(),
            }],
            media: ResolvedMedia {
                watch_url: "https://host.test/hub".into(),
                confidence: Confidence::Fallback,
                media_id: None,
            },
            generated_at: Utc.with_ymd_and_hms(2025, 10, 14, 8, 0, 0).unwrap(),
        };
        let text = render_text(&d);
        assert!(text.starts_with("Gaming news digest (2025-10-14 08:00 UTC)"));
        assert!(text.contains(" 1. [IGN] Capcom announces Onimusha <https://ign.test/oni>"));
        assert!(text.contains("Latest video (FALLBACK): https://host.test/hub"));
    }
}
