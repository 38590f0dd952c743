// src/pipeline.rs
//! One run: ingest → classify → cluster → duplicate guard → select, resolve the
//! video, publish, remember.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::candidate::Candidate;
use crate::classify::{Classifier, Reason};
use crate::cluster::cluster;
use crate::config::{DigestConfig, RunMode, SourcesCfg};
use crate::dedup::{DuplicateGuard, SeenState, SeenStore};
use crate::ingest::{self, FeedSource};
use crate::media::{ResolvedMedia, Resolver};
use crate::publish::{Digest, Publisher};
use crate::rank::Ranker;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_rejected_total", "Candidates rejected by the classifier, by reason.");
        describe_counter!("digest_duplicates_total", "Story representatives already published or repeated within the run.");
        describe_counter!("digest_selected_total", "Stories selected for the digest.");
    });
}

/// The pure curation stages, built once from configuration.
pub struct Curator {
    classifier: Classifier,
    guard: DuplicateGuard,
    ranker: Ranker,
    sources: SourcesCfg,
    top_n: usize,
    max_per_source: usize,
}

#[derive(Debug, Default)]
pub struct Curation {
    pub selected: Vec<Candidate>,
    pub rejected: BTreeMap<Reason, usize>,
    pub duplicates: usize,
    /// Story representatives after clustering.
    pub stories: usize,
}

impl Curator {
    pub fn new(cfg: &DigestConfig) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new(&cfg.classifier).context("classifier vocabulary")?,
            guard: DuplicateGuard::new(&cfg.dedup).context("update vocabulary")?,
            ranker: Ranker::new(&cfg.ranking, &cfg.sources).context("news vocabulary")?,
            sources: cfg.sources.clone(),
            top_n: cfg.ranking.top_n,
            max_per_source: cfg.ranking.max_per_source,
        })
    }

    pub fn curate(&self, candidates: Vec<Candidate>, seen: &SeenState, now: DateTime<Utc>) -> Curation {
        ensure_metrics_described();
        let mut out = Curation::default();

        let accepted: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| {
                let r = self.classifier.classify(&c.title, &c.summary);
                if !r.accepted {
                    *out.rejected.entry(r.reason).or_default() += 1;
                }
                r.accepted
            })
            .collect();

        let reps = cluster(accepted, &self.sources);
        out.stories = reps.len();

        // Checked best-ranked first against history plus this run's survivors.
        // Survivors keep their clustering order.
        let mut working = seen.clone().bounded(seen.cap() + reps.len());
        let mut keep = vec![false; reps.len()];
        for i in self.ranker.rank_order(&reps, now) {
            let c = &reps[i];
            match self.guard.check(c, &working) {
                Some(kind) => {
                    debug!(target: "dedup", ?kind, url = %c.url, "duplicate story");
                    out.duplicates += 1;
                }
                None => {
                    working.remember(c);
                    keep[i] = true;
                }
            }
        }
        let fresh: Vec<Candidate> = reps
            .into_iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();

        out.selected = self.ranker.select(fresh, self.top_n, self.max_per_source, now);

        for (reason, n) in &out.rejected {
            counter!("digest_rejected_total", "reason" => reason.as_str()).increment(*n as u64);
        }
        counter!("digest_duplicates_total").increment(out.duplicates as u64);
        counter!("digest_selected_total").increment(out.selected.len() as u64);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No feed produced anything usable, or nothing survived curation.
    NothingToPublish,
    Published { delivered: usize, remembered: bool },
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: RunMode,
    pub candidates: usize,
    pub failed_sources: Vec<String>,
    pub selected: usize,
    pub media: Option<ResolvedMedia>,
    pub outcome: Outcome,
}

/// Everything a run needs from the outside world.
pub struct Collaborators<'a> {
    pub sources: &'a [Box<dyn FeedSource>],
    pub store: &'a dyn SeenStore,
    pub resolver: &'a Resolver,
    pub publisher: &'a dyn Publisher,
}

/// Seen-state is loaded once and, in [`RunMode::Publish`], saved once after the
/// publisher has delivered. A story is remembered only if it was delivered.
pub async fn run(cfg: &DigestConfig, io: Collaborators<'_>, now: DateTime<Utc>) -> Result<RunSummary> {
    let curator = Curator::new(cfg)?;

    let report = ingest::run_once(io.sources, cfg.http.max_entries_per_feed, now).await;
    let mut summary = RunSummary {
        mode: cfg.mode,
        candidates: report.candidates.len(),
        failed_sources: report.failed_sources.clone(),
        selected: 0,
        media: None,
        outcome: Outcome::NothingToPublish,
    };
    if report.nothing_usable() {
        info!(target: "pipeline", failed = report.failed_sources.len(), "no usable feed, nothing to publish");
        return Ok(summary);
    }

    let mut state = io.store.load().context("loading seen state")?;
    let curation = curator.curate(report.candidates, &state, now);
    info!(
        target: "pipeline",
        candidates = summary.candidates,
        stories = curation.stories,
        duplicates = curation.duplicates,
        selected = curation.selected.len(),
        "curation finished"
    );
    summary.selected = curation.selected.len();
    if curation.selected.is_empty() {
        return Ok(summary);
    }

    let media = io.resolver.resolve(now).await;
    summary.media = Some(media.clone());

    let digest = Digest {
        stories: curation.selected,
        media,
        generated_at: now,
    };
    let delivery = io
        .publisher
        .publish(&digest)
        .await
        .with_context(|| format!("publishing via {}", io.publisher.name()))?;
    if delivery.is_empty() && !digest.stories.is_empty() {
        return Err(anyhow!("{} accepted none of {} stories", io.publisher.name(), digest.stories.len()));
    }

    let remembered = match cfg.mode {
        RunMode::Publish => {
            for &i in &delivery.accepted {
                if let Some(story) = digest.stories.get(i) {
                    state.remember(story);
                }
            }
            io.store.save(&state).context("saving seen state")?;
            true
        }
        RunMode::Preview => {
            info!(target: "pipeline", "preview run, seen state left untouched");
            false
        }
    };

    summary.outcome = Outcome::Published {
        delivered: delivery.accepted.len(),
        remembered,
    };
    Ok(summary)
}
