// src/publish/discord.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use super::{Delivery, Digest, Publisher};
use crate::candidate::Candidate;
use crate::config::HttpCfg;

/// Discord rejects messages with more embeds than this.
const MAX_EMBEDS: usize = 10;
const MAX_TITLE: usize = 256;

#[derive(Clone)]
pub struct DiscordWebhook {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

impl DiscordWebhook {
    pub fn new(webhook: String, http: &HttpCfg) -> Result<Self> {
        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .connect_timeout(http.connect_timeout())
            .build()
            .context("building webhook http client")?;
        Ok(Self {
            webhook,
            client,
            timeout: http.timeout(),
            max_retries: http.retry_attempts.max(1),
            backoff: Duration::from_millis(http.backoff_ms),
        })
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.backoff * (1u32 << (attempt - 1).min(6))).await;
        }
    }
}

#[async_trait]
impl Publisher for DiscordWebhook {
    async fn publish(&self, digest: &Digest) -> Result<Delivery> {
        let mut delivery = Delivery::default();
        let mut last_err = None;

        for (n, payload) in build_payloads(digest).into_iter().enumerate() {
            let start = n * MAX_EMBEDS;
            let count = payload.embeds.len();
            match self.post(&payload).await {
                Ok(()) => delivery.accepted.extend(start..start + count),
                Err(e) => {
                    warn!(target: "publish", error = %format!("{e:#}"), batch = n, "webhook batch failed");
                    last_err = Some(e);
                }
            }
        }

        if delivery.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        info!(target: "publish", delivered = delivery.accepted.len(), "digest posted to Discord");
        Ok(delivery)
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    description: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordEmbed {
    fn story(c: &Candidate) -> Self {
        Self {
            title: truncate(&c.title, MAX_TITLE),
            url: c.url.clone(),
            description: format!("Source: **{}**", c.source),
            timestamp: c.published_at.to_rfc3339(),
        }
    }
}

/// One embed per story, batched; the video link rides on the first message.
fn build_payloads(digest: &Digest) -> Vec<WebhookPayload> {
    let video = format!("Latest video: {}", digest.media.watch_url);
    let mut out: Vec<WebhookPayload> = digest
        .stories
        .chunks(MAX_EMBEDS)
        .map(|chunk| WebhookPayload {
            content: None,
            embeds: chunk.iter().map(DiscordEmbed::story).collect(),
        })
        .collect();
    match out.first_mut() {
        Some(first) => first.content = Some(video),
        None => out.push(WebhookPayload {
            content: Some(video),
            embeds: Vec::new(),
        }),
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
    t.push('…');
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Confidence, ResolvedMedia};
    use chrono::Utc;

    fn digest(n: usize) -> Digest {
        Digest {
            stories: (0..n)
                .map(|i| Candidate {
                    title: format!("Story {i}"),
                    url: format!("https://ign.test/{i}"),
                    source: "IGN".into(),
                    published_at: Utc::now(),
                    summary: String::new(),
                })
                .collect(),
            media: ResolvedMedia {
                watch_url: "https://host.test/watch/ABC123".into(),
                confidence: Confidence::High,
                media_id: Some("ABC123".into()),
            },
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn payloads_batch_embeds_and_carry_video_once() {
        let payloads = build_payloads(&digest(12));
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].embeds.len(), 10);
        assert_eq!(payloads[1].embeds.len(), 2);
        assert_eq!(
            payloads[0].content.as_deref(),
            Some("Latest video: https://host.test/watch/ABC123")
        );
        assert!(payloads[1].content.is_none());

        let json = serde_json::to_value(&payloads[1]).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["embeds"][0]["description"], "Source: **IGN**");
    }

    #[test]
    fn long_titles_are_truncated() {
        let t = truncate(&"x".repeat(300), MAX_TITLE);
        assert_eq!(t.chars().count(), MAX_TITLE);
        assert!(t.ends_with('…'));
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_error() {
        let http = HttpCfg {
            timeout_secs: 1,
            connect_timeout_secs: 1,
            backoff_ms: 1,
            ..HttpCfg::default()
        };
        let hook = DiscordWebhook::new("http://127.0.0.1:9/webhook".into(), &http)
            .unwrap()
            .with_retries(1);
        assert!(hook.publish(&digest(1)).await.is_err());
    }
}
