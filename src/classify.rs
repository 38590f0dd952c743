// src/classify.rs
//! Relevance classifier: separates genuine news from listicles, deals, rumors,
//! opinion pieces and off-topic content.
//!
//! Evaluation order is fixed and the first hit wins:
//! 1. relevance gate (domain vocabulary or a "specific title" shape)
//! 2. entertainment (skipped when the gate was opened by a strong platform term)
//! 3. opinion/community → listicle/guide → evergreen → deals → rumor
//!
//! Pure and total: any pair of strings yields exactly one result.

use anyhow::Result;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::ClassifierCfg;
use crate::terms::TermSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    NotRelevant,
    ListicleOrGuide,
    EvergreenContent,
    DealsOrShopping,
    RumorOrSpeculation,
    OpinionOrCommunity,
    None,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NotRelevant => "NOT_RELEVANT",
            Reason::ListicleOrGuide => "LISTICLE_OR_GUIDE",
            Reason::EvergreenContent => "EVERGREEN_CONTENT",
            Reason::DealsOrShopping => "DEALS_OR_SHOPPING",
            Reason::RumorOrSpeculation => "RUMOR_OR_SPECULATION",
            Reason::OpinionOrCommunity => "OPINION_OR_COMMUNITY",
            Reason::None => "NONE",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub accepted: bool,
    pub reason: Reason,
}

impl ClassificationResult {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: Reason::None,
        }
    }

    pub fn reject(reason: Reason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

/// How the relevance gate was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Strong,
    Domain,
    TitleShape,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    strong: TermSet,
    domain: TermSet,
    entertainment: TermSet,
    opinion: TermSet,
    listicle: TermSet,
    evergreen: TermSet,
    deals: TermSet,
    rumor: TermSet,
    title_shape_min_len: usize,
}

impl Classifier {
    pub fn new(cfg: &ClassifierCfg) -> Result<Self> {
        Ok(Self {
            strong: TermSet::new(&cfg.strong_terms)?,
            domain: TermSet::new(&cfg.domain_terms)?,
            entertainment: TermSet::new(&cfg.entertainment_terms)?,
            opinion: TermSet::new(&cfg.opinion_terms)?,
            listicle: TermSet::new(&cfg.listicle_terms)?,
            evergreen: TermSet::new(&cfg.evergreen_terms)?,
            deals: TermSet::new(&cfg.deals_terms)?,
            rumor: TermSet::new(&cfg.rumor_terms)?,
            title_shape_min_len: cfg.title_shape_min_len,
        })
    }

    pub fn classify(&self, title: &str, summary: &str) -> ClassificationResult {
        let text = format!("{title} {summary}");

        let gate = self.gate(title, &text);
        if gate == Gate::Closed {
            return self.rejected(Reason::NotRelevant, "gate", None);
        }

        if gate != Gate::Strong {
            if let Some(term) = self.entertainment.first_match(&text) {
                return self.rejected(Reason::NotRelevant, "entertainment", Some(term));
            }
        }
        let families = [
            (&self.opinion, Reason::OpinionOrCommunity, "opinion"),
            (&self.listicle, Reason::ListicleOrGuide, "listicle"),
            (&self.evergreen, Reason::EvergreenContent, "evergreen"),
        ];
        for (terms, reason, stage) in families {
            if let Some(term) = terms.first_match(&text) {
                return self.rejected(reason, stage, Some(term));
            }
        }
        if let Some(term) = self.deals.first_match(&text) {
            return self.rejected(Reason::DealsOrShopping, "deals", Some(term));
        }
        if looks_monetary(&text) {
            return self.rejected(Reason::DealsOrShopping, "deals", None);
        }
        if let Some(term) = self.rumor.first_match(&text) {
            return self.rejected(Reason::RumorOrSpeculation, "rumor", Some(term));
        }

        ClassificationResult::accept()
    }

    fn gate(&self, title: &str, text: &str) -> Gate {
        if self.strong.matches(text) {
            Gate::Strong
        } else if self.domain.matches(text) {
            Gate::Domain
        } else if has_title_shape(title, self.title_shape_min_len) {
            Gate::TitleShape
        } else {
            Gate::Closed
        }
    }

    fn rejected(
        &self,
        reason: Reason,
        stage: &'static str,
        term: Option<String>,
    ) -> ClassificationResult {
        let term = term.as_deref().unwrap_or("-");
        debug!(target: "classify", %reason, stage, term, "rejected");
        ClassificationResult::reject(reason)
    }
}

/// "Game Name: Subtitle" / "Game Name – Subtitle" style titles of some length.
fn has_title_shape(title: &str, min_len: usize) -> bool {
    let t = title.trim();
    if t.chars().count() < min_len {
        return false;
    }
    if t.contains(':') {
        return true;
    }
    // en or em dash between two non-empty parts, spaced or not
    t.split(['\u{2013}', '\u{2014}'])
        .filter(|part| !part.trim().is_empty())
        .count()
        >= 2
}

/// A currency symbol followed by digits, or a percentage followed by "off".
fn looks_monetary(text: &str) -> bool {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(?:[$£€¥]\s?\d)|(?:\d+(?:\.\d+)?\s?%\s*off\b)").unwrap()
    });
    re.is_match(text)
}
