// src/dedup.rs
//! Duplicate guard against previously published stories.
//!
//! Rules, first match wins:
//! 1. exact URL seen → duplicate, whatever the wording
//! 2. story key seen, no update signal → duplicate
//! 3. a recent title is fuzzily similar (≥ threshold), no update signal → duplicate
//! 4. otherwise new (a follow-up carrying an update signal goes through)

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::candidate::{Candidate, StoryKey};
use crate::config::DedupCfg;
use crate::terms::TermSet;

fn default_cap() -> usize {
    DedupCfg::default().history_cap
}

/// Published history with ring-buffer semantics: once a list exceeds the cap,
/// its oldest entries fall off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenState {
    #[serde(default)]
    pub seen_urls: VecDeque<String>,
    #[serde(default)]
    pub seen_story_keys: VecDeque<StoryKey>,
    #[serde(default)]
    pub seen_titles: VecDeque<String>,
    #[serde(skip, default = "default_cap")]
    cap: usize,
}

impl Default for SeenState {
    fn default() -> Self {
        Self::with_capacity(default_cap())
    }
}

impl SeenState {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            seen_urls: VecDeque::new(),
            seen_story_keys: VecDeque::new(),
            seen_titles: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Apply a bound, evicting the oldest entries that no longer fit.
    pub fn bounded(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self.evict();
        self
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.seen_urls.iter().any(|u| u == url)
    }

    pub fn has_story(&self, key: &StoryKey) -> bool {
        self.seen_story_keys.iter().any(|k| k == key)
    }

    /// The most recent `n` normalized titles, newest first.
    pub fn recent_titles(&self, n: usize) -> impl Iterator<Item = &str> {
        self.seen_titles.iter().rev().take(n).map(String::as_str)
    }

    pub fn remember(&mut self, c: &Candidate) {
        self.seen_urls.push_back(c.url.clone());
        self.seen_story_keys.push_back(c.story_key());
        self.seen_titles.push_back(c.normalized_title());
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.seen_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_urls.is_empty() && self.seen_story_keys.is_empty() && self.seen_titles.is_empty()
    }

    fn evict(&mut self) {
        let cap = self.cap;
        while self.seen_urls.len() > cap {
            self.seen_urls.pop_front();
        }
        while self.seen_story_keys.len() > cap {
            self.seen_story_keys.pop_front();
        }
        while self.seen_titles.len() > cap {
            self.seen_titles.pop_front();
        }
    }
}

/// Which rule flagged a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Url,
    StoryKey,
    FuzzyTitle,
}

#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    update_terms: TermSet,
    /// 0–100 scale.
    threshold: f64,
    lookback: usize,
}

impl DuplicateGuard {
    pub fn new(cfg: &DedupCfg) -> Result<Self> {
        Ok(Self {
            update_terms: TermSet::new(&cfg.update_terms)?,
            threshold: f64::from(cfg.fuzzy_threshold.min(100)),
            lookback: cfg.fuzzy_lookback,
        })
    }

    pub fn is_duplicate(&self, c: &Candidate, state: &SeenState) -> bool {
        self.check(c, state).is_some()
    }

    pub fn check(&self, c: &Candidate, state: &SeenState) -> Option<DuplicateKind> {
        if state.has_url(&c.url) {
            return Some(DuplicateKind::Url);
        }

        if self.has_update_signal(c) {
            return None;
        }

        if state.has_story(&c.story_key()) {
            return Some(DuplicateKind::StoryKey);
        }

        let title = c.normalized_title();
        for seen in state.recent_titles(self.lookback) {
            let sim = normalized_levenshtein(&title, seen) * 100.0;
            if sim >= self.threshold {
                debug!(target: "dedup", similarity = sim, "fuzzy title match");
                return Some(DuplicateKind::FuzzyTitle);
            }
        }
        None
    }

    pub fn has_update_signal(&self, c: &Candidate) -> bool {
        self.update_terms.matches(&c.text())
    }
}

/// Where seen-state lives between runs.
pub trait SeenStore {
    fn load(&self) -> Result<SeenState>;
    fn save(&self, state: &SeenState) -> Result<()>;
}

/// Pretty-printed JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    cap: usize,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P, cap: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cap,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeenStore for JsonFileStore {
    /// A missing file is an empty history; an unreadable one is logged and treated the same.
    fn load(&self) -> Result<SeenState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SeenState::with_capacity(self.cap));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        match serde_json::from_str::<SeenState>(&content) {
            Ok(state) => Ok(state.bounded(self.cap)),
            Err(e) => {
                warn!(target: "dedup", path = %self.path.display(), error = %e, "corrupt state file, starting empty");
                Ok(SeenState::with_capacity(self.cap))
            }
        }
    }

    fn save(&self, state: &SeenState) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(state).context("serializing seen state")?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
