// src/media/chain.rs
//! Strategy chain for the "freshest video" pointer.
//!
//! Strategies run in order against shared [`ResolveState`]; the first one that
//! returns a [`ResolvedMedia`] wins. The last strategy always answers, so
//! [`Resolver::resolve`] is total.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{MediaCfg, PositionalPick};
use crate::media::api::ApiProbe;
use crate::media::host::MediaTransport;
use crate::media::scrape::{cache_busted, extract_ids, parse_published};
use crate::media::types::{
    days_before, BestCandidate, Confidence, Discovery, MediaCandidate, ResolvedMedia,
};

pub struct ResolveContext<'a> {
    pub cfg: &'a MediaCfg,
    pub transport: &'a dyn MediaTransport,
    pub now: DateTime<Utc>,
    /// Base for cache-busting parameters, unique per run.
    pub nonce: String,
}

impl ResolveContext<'_> {
    fn resolved(&self, id: &str, confidence: Confidence) -> ResolvedMedia {
        ResolvedMedia {
            watch_url: self.cfg.watch_url(id),
            confidence,
            media_id: Some(id.to_string()),
        }
    }
}

/// What earlier strategies learned, for later ones to use.
#[derive(Debug, Default)]
pub struct ResolveState {
    /// Newest timestamped candidate from any path.
    pub best: BestCandidate,
    /// Scraped identifiers, deduplicated, in discovery order.
    pub discovered: Vec<String>,
}

impl ResolveState {
    fn discover(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            if !self.discovered.contains(&id) {
                self.discovered.push(id);
            }
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ResolveState,
    ) -> Option<ResolvedMedia>;
}

/// Operator-supplied identifier (or full URL).
pub struct ForcedOverride;

#[async_trait]
impl Strategy for ForcedOverride {
    fn name(&self) -> &'static str {
        "forced_override"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>, _state: &mut ResolveState) -> Option<ResolvedMedia> {
        let forced = ctx.cfg.forced_id.as_deref()?.trim();
        if forced.is_empty() {
            return None;
        }
        if forced.starts_with("http://") || forced.starts_with("https://") {
            return Some(ResolvedMedia {
                watch_url: forced.to_string(),
                confidence: Confidence::High,
                media_id: None,
            });
        }
        Some(ctx.resolved(forced, Confidence::High))
    }
}

/// Newest item via the authenticated API. A result older than `stale_days` is
/// kept as a candidate but not returned, so scraping gets a chance to beat it.
pub struct ApiProbeStrategy;

#[async_trait]
impl Strategy for ApiProbeStrategy {
    fn name(&self) -> &'static str {
        "api_probe"
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ResolveState,
    ) -> Option<ResolvedMedia> {
        let probe = match ApiProbe::from_cfg(ctx.cfg, ctx.transport) {
            Ok(p) => p,
            Err(e) => {
                debug!(target: "media", reason = %e, "api probe skipped");
                return None;
            }
        };
        let mut found = probe.probe(ctx.now).await;
        let best = found.take()?;
        let ts = best.timestamp_hint?;

        // an unrepresentable cutoff counts as stale
        if days_before(ctx.now, ctx.cfg.stale_days).is_some_and(|cutoff| ts >= cutoff) {
            return Some(ctx.resolved(&best.id, Confidence::High));
        }
        info!(target: "media", id = %best.id, published = %ts, "api result looks stale, scraping");
        state.best.offer(best);
        None
    }
}

/// Cache-busted fetches of the listing page plus the hub page, collecting ids.
pub struct ScrapeListing;

#[async_trait]
impl Strategy for ScrapeListing {
    fn name(&self) -> &'static str {
        "scrape_listing"
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ResolveState,
    ) -> Option<ResolvedMedia> {
        let mut pages: Vec<String> = (0..ctx.cfg.cache_bust_variants.max(1))
            .map(|i| cache_busted(&ctx.cfg.listing_url, &format!("{}-{i}", ctx.nonce)))
            .collect();
        pages.push(cache_busted(&ctx.cfg.hub_url, &format!("{}-hub", ctx.nonce)));

        for url in pages {
            match ctx.transport.get_text(&url, None).await {
                Ok(html) => {
                    let ids = extract_ids(&html);
                    debug!(target: "media", %url, found = ids.len(), "scraped page");
                    state.discover(ids);
                }
                Err(e) => debug!(target: "media", error = %e, "scrape fetch failed"),
            }
        }
        None
    }
}

/// Fetch a bounded number of discovered watch pages and keep the newest.
pub struct ValidateCandidates;

#[async_trait]
impl Strategy for ValidateCandidates {
    fn name(&self) -> &'static str {
        "validate_candidates"
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ResolveState,
    ) -> Option<ResolvedMedia> {
        let mut round = BestCandidate::default();
        for id in state.discovered.iter().take(ctx.cfg.max_validate) {
            let html = match ctx.transport.get_text(&ctx.cfg.watch_url(id), None).await {
                Ok(h) => h,
                Err(e) => {
                    debug!(target: "media", %id, error = %e, "watch page fetch failed");
                    continue;
                }
            };
            let ts = parse_published(&html);
            round.offer(MediaCandidate::new(id.clone(), Discovery::ScrapePattern, ts));
        }
        state.best.merge(round);

        // A stale API pick that nothing newer displaced is still only a guess.
        let best = state.best.get()?;
        let confidence = match best.discovered_via {
            Discovery::ScrapePattern => Confidence::High,
            Discovery::Api => Confidence::Low,
        };
        Some(ctx.resolved(&best.id, confidence))
    }
}

/// No timestamps anywhere: trust page position.
pub struct PositionalFallback;

#[async_trait]
impl Strategy for PositionalFallback {
    fn name(&self) -> &'static str {
        "positional_fallback"
    }

    async fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        state: &mut ResolveState,
    ) -> Option<ResolvedMedia> {
        let id = match ctx.cfg.positional_pick {
            PositionalPick::First => state.discovered.first(),
            PositionalPick::Last => state.discovered.last(),
        }?;
        Some(ctx.resolved(id, Confidence::Low))
    }
}

pub struct HubFallback;

#[async_trait]
impl Strategy for HubFallback {
    fn name(&self) -> &'static str {
        "hub_fallback"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>, _state: &mut ResolveState) -> Option<ResolvedMedia> {
        Some(hub(ctx.cfg))
    }
}

fn hub(cfg: &MediaCfg) -> ResolvedMedia {
    ResolvedMedia {
        watch_url: cfg.hub_url.clone(),
        confidence: Confidence::Fallback,
        media_id: None,
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "media_resolved_total",
            "Media resolutions by confidence (HIGH, LOW, FALLBACK)."
        );
    });
}

pub struct Resolver {
    cfg: MediaCfg,
    transport: Arc<dyn MediaTransport>,
    strategies: Vec<Box<dyn Strategy>>,
}

impl Resolver {
    pub fn new(cfg: &MediaCfg, transport: Arc<dyn MediaTransport>) -> Self {
        Self::with_strategies(cfg, transport, default_chain())
    }

    pub fn with_strategies(
        cfg: &MediaCfg,
        transport: Arc<dyn MediaTransport>,
        strategies: Vec<Box<dyn Strategy>>,
    ) -> Self {
        Self {
            cfg: cfg.clone(),
            transport,
            strategies,
        }
    }

    /// Never fails; degrades to the hub URL.
    pub async fn resolve(&self, now: DateTime<Utc>) -> ResolvedMedia {
        ensure_metrics_described();

        let ctx = ResolveContext {
            cfg: &self.cfg,
            transport: self.transport.as_ref(),
            now,
            nonce: now.timestamp_millis().to_string(),
        };
        let mut state = ResolveState::default();

        let mut resolved = None;
        for s in &self.strategies {
            if let Some(r) = s.attempt(&ctx, &mut state).await {
                info!(target: "media", strategy = s.name(), confidence = %r.confidence, url = %r.watch_url, "media resolved");
                resolved = Some(r);
                break;
            }
        }
        let resolved = resolved.unwrap_or_else(|| {
            warn!(target: "media", "no strategy answered, using hub");
            hub(&self.cfg)
        });

        counter!("media_resolved_total", "confidence" => resolved.confidence.as_str()).increment(1);
        resolved
    }
}

pub fn default_chain() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(ForcedOverride),
        Box::new(ApiProbeStrategy),
        Box::new(ScrapeListing),
        Box::new(ValidateCandidates),
        Box::new(PositionalFallback),
        Box::new(HubFallback),
    ]
}
