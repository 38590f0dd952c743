// src/rank.rs
//! Ranker/selector: score by recency and source, then pick a source-diverse top N.
//!
//! score = max(0, window − age_h) + max(0, base − priority·weight) + news_bonus − low_trust_penalty

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::candidate::Candidate;
use crate::config::{RankingCfg, SourcesCfg};
use crate::terms::TermSet;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub priority: usize,
    /// Discovery order, the last tie-breaker.
    #[serde(skip)]
    order: usize,
}

#[derive(Debug, Clone)]
pub struct Ranker {
    sources: SourcesCfg,
    news_terms: TermSet,
    recency_window_hours: f64,
    source_base: f64,
    source_weight: f64,
    news_hint_bonus: f64,
    backfill_over_cap: bool,
}

impl Ranker {
    pub fn new(cfg: &RankingCfg, sources: &SourcesCfg) -> Result<Self> {
        Ok(Self {
            sources: sources.clone(),
            news_terms: TermSet::new(&cfg.news_terms)?,
            recency_window_hours: cfg.recency_window_hours,
            source_base: cfg.source_base,
            source_weight: cfg.source_weight,
            news_hint_bonus: cfg.news_hint_bonus,
            backfill_over_cap: cfg.backfill_over_cap,
        })
    }

    pub fn has_news_hint(&self, c: &Candidate) -> bool {
        self.news_terms.matches(&c.text())
    }

    pub fn score(&self, c: &Candidate, now: DateTime<Utc>) -> f64 {
        let recency = (self.recency_window_hours - c.age_hours(now)).max(0.0);
        let idx = self.sources.priority_index(&c.source) as f64;
        let source = (self.source_base - idx * self.source_weight).max(0.0);
        let bonus = if self.has_news_hint(c) {
            self.news_hint_bonus
        } else {
            0.0
        };
        let penalty = if self.sources.is_low_trust(&c.source) {
            self.sources.low_trust_penalty
        } else {
            0.0
        };
        recency + source + bonus - penalty
    }

    pub fn select(
        &self,
        candidates: Vec<Candidate>,
        top_n: usize,
        max_per_source: usize,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        self.select_scored(candidates, top_n, max_per_source, now)
            .into_iter()
            .map(|s| s.candidate)
            .collect()
    }

    /// Indices of `candidates` from best to worst, tie-broken like [`Ranker::select`].
    pub fn rank_order(&self, candidates: &[Candidate], now: DateTime<Utc>) -> Vec<usize> {
        let keys: Vec<(f64, usize)> = candidates
            .iter()
            .map(|c| (self.score(c, now), self.sources.priority_index(&c.source)))
            .collect();
        let mut idx: Vec<usize> = (0..candidates.len()).collect();
        idx.sort_by(|&a, &b| {
            keys[b]
                .0
                .total_cmp(&keys[a].0)
                .then(keys[a].1.cmp(&keys[b].1))
                .then(a.cmp(&b))
        });
        idx
    }

    /// Two passes plus an optional backfill:
    /// 1. the best item of each source, sources taken in priority order
    /// 2. best remaining by score while a source is under `max_per_source`
    /// 3. if still short and backfill is on, best remaining regardless of source
    pub fn select_scored(
        &self,
        candidates: Vec<Candidate>,
        top_n: usize,
        max_per_source: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        if top_n == 0 || candidates.is_empty() {
            return Vec::new();
        }
        let cap = max_per_source.max(1);

        let mut pool: Vec<Option<ScoredCandidate>> = candidates
            .into_iter()
            .enumerate()
            .map(|(order, c)| {
                Some(ScoredCandidate {
                    score: self.score(&c, now),
                    priority: self.sources.priority_index(&c.source),
                    candidate: c,
                    order,
                })
            })
            .collect();

        let mut by_rank: Vec<usize> = (0..pool.len()).collect();
        by_rank.sort_by(|&a, &b| rank_cmp(pool[a].as_ref(), pool[b].as_ref()));

        let mut picked: Vec<ScoredCandidate> = Vec::with_capacity(top_n);
        let mut per_source: HashMap<String, usize> = HashMap::new();

        // Pass 1: visit sources in (priority, first appearance) order.
        let mut source_order: Vec<(usize, usize, String)> = Vec::new();
        for s in pool.iter().flatten() {
            let key = source_key(&s.candidate.source);
            if !source_order.iter().any(|(_, _, k)| *k == key) {
                source_order.push((s.priority, s.order, key));
            }
        }
        source_order.sort();
        for (_, _, key) in &source_order {
            if picked.len() >= top_n {
                break;
            }
            let best = by_rank.iter().copied().find(|&i| {
                pool[i]
                    .as_ref()
                    .is_some_and(|s| source_key(&s.candidate.source) == *key)
            });
            if let Some(s) = best.and_then(|i| pool[i].take()) {
                *per_source.entry(key.clone()).or_default() += 1;
                picked.push(s);
            }
        }

        // Pass 2: global score under the cap.
        for &i in &by_rank {
            if picked.len() >= top_n {
                break;
            }
            let key = match pool[i].as_ref() {
                Some(s) => source_key(&s.candidate.source),
                None => continue,
            };
            let n = per_source.entry(key).or_default();
            if *n >= cap {
                continue;
            }
            if let Some(s) = pool[i].take() {
                *n += 1;
                picked.push(s);
            }
        }

        // Pass 3: the cap starved the slate.
        if self.backfill_over_cap && picked.len() < top_n {
            let before = picked.len();
            for &i in &by_rank {
                if picked.len() >= top_n {
                    break;
                }
                if let Some(s) = pool[i].take() {
                    picked.push(s);
                }
            }
            if picked.len() > before {
                debug!(target: "rank", backfilled = picked.len() - before, "filled past per-source cap");
            }
        }

        picked.sort_by(|a, b| rank_cmp(Some(a), Some(b)));
        picked
    }
}

fn source_key(source: &str) -> String {
    source.trim().to_lowercase()
}

/// Score descending, then priority ascending, then discovery order.
fn rank_cmp(a: Option<&ScoredCandidate>, b: Option<&ScoredCandidate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b
            .score
            .total_cmp(&a.score)
            .then(a.priority.cmp(&b.priority))
            .then(a.order.cmp(&b.order)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
