// src/terms.rs
//! Case-insensitive phrase sets compiled into a single regex.
//!
//! A term gets a `\b` on each edge that is alphanumeric, so `ps5` does not match
//! inside `ps50` while `% off` still matches after a digit.

use anyhow::{anyhow, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct TermSet {
    re: Option<Regex>,
}

impl TermSet {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let mut alts: Vec<String> = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(term_pattern)
            .collect();
        if alts.is_empty() {
            return Ok(Self { re: None });
        }
        // Longest first so the reported match is the most specific phrase.
        alts.sort_by_key(|a| std::cmp::Reverse(a.len()));
        alts.dedup();
        let pattern = format!("(?i)(?:{})", alts.join("|"));
        let re = Regex::new(&pattern).map_err(|e| anyhow!("term set regex error: {e}"))?;
        Ok(Self { re: Some(re) })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.re.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// The first matching phrase, lower-cased.
    pub fn first_match(&self, text: &str) -> Option<String> {
        self.re
            .as_ref()
            .and_then(|re| re.find(text))
            .map(|m| m.as_str().to_lowercase())
    }
}

fn term_pattern(term: &str) -> String {
    let escaped = regex::escape(term);
    let starts_word = term.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = term.chars().last().is_some_and(char::is_alphanumeric);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}
