// src/config.rs
//! Run configuration.
//!
//! Everything tunable lives in one immutable [`DigestConfig`] that is built once at
//! startup and handed to each component. Components never read the environment.
//!
//! Load order:
//! 1) `.env` (done by the binary through `dotenvy`)
//! 2) TOML at `$DIGEST_CONFIG_PATH`, else `config/digest.toml`, else built-in defaults
//! 3) individual env overrides (`MAX_POSTS_PER_RUN`, `TITLE_FUZZY_THRESHOLD`, ...)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
/// Upper bound for the media freshness windows, in days.
pub const MAX_MEDIA_AGE_DAYS: i64 = 3650;

/// Whether a run may affect future deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Publish and remember what was published.
    #[default]
    Publish,
    /// Send the digest but leave the seen-state untouched.
    Preview,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish" | "post" => Ok(Self::Publish),
            "preview" | "digest" | "dry-run" => Ok(Self::Preview),
            other => Err(ConfigError::Invalid(format!("unknown run mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub feeds: Vec<FeedCfg>,
    pub sources: SourcesCfg,
    pub classifier: ClassifierCfg,
    pub dedup: DedupCfg,
    pub ranking: RankingCfg,
    pub http: HttpCfg,
    pub media: MediaCfg,
    pub state_path: PathBuf,
    pub discord_webhook_url: Option<String>,
    pub mode: RunMode,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
                FeedCfg::new("IGN", "http://feeds.ign.com/ign/all"),
                FeedCfg::new("GameSpot", "http://www.gamespot.com/feeds/mashup/"),
                FeedCfg::new("Blue's News", "https://www.bluesnews.com/news/news_1_0.rdf"),
            ],
            sources: SourcesCfg::default(),
            classifier: ClassifierCfg::default(),
            dedup: DedupCfg::default(),
            ranking: RankingCfg::default(),
            http: HttpCfg::default(),
            media: MediaCfg::default(),
            state_path: PathBuf::from("state.json"),
            discord_webhook_url: None,
            mode: RunMode::Publish,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedCfg {
    pub name: String,
    pub url: String,
}

impl FeedCfg {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Source priority (earlier = more trusted) and the optional low-trust deduction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesCfg {
    pub priority: Vec<String>,
    pub low_trust: Option<String>,
    pub low_trust_penalty: f64,
}

impl Default for SourcesCfg {
    fn default() -> Self {
        Self {
            priority: to_strings(&[
                "IGN",
                "GameSpot",
                "Polygon",
                "Eurogamer",
                "VGC",
                "PC Gamer",
                "Kotaku",
                "Blue's News",
            ]),
            low_trust: None,
            low_trust_penalty: 5.0,
        }
    }
}

impl SourcesCfg {
    /// Position in the priority list (case-insensitive); unknown sources rank last.
    pub fn priority_index(&self, source: &str) -> usize {
        let s = source.trim();
        self.priority
            .iter()
            .position(|p| p.trim().eq_ignore_ascii_case(s))
            .unwrap_or(self.priority.len())
    }

    pub fn is_low_trust(&self, source: &str) -> bool {
        self.low_trust
            .as_deref()
            .is_some_and(|lt| lt.trim().eq_ignore_ascii_case(source.trim()))
    }
}

/// Vocabulary for the relevance classifier. Matching is case-insensitive and
/// respects word boundaries at alphanumeric term edges.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierCfg {
    /// Platform/product names. A gate opened by one of these is not overridden
    /// by entertainment vocabulary.
    pub strong_terms: Vec<String>,
    /// General industry vocabulary.
    pub domain_terms: Vec<String>,
    pub entertainment_terms: Vec<String>,
    pub opinion_terms: Vec<String>,
    pub listicle_terms: Vec<String>,
    pub evergreen_terms: Vec<String>,
    pub deals_terms: Vec<String>,
    pub rumor_terms: Vec<String>,
    /// Minimum title length for the "specific title" shape heuristic.
    pub title_shape_min_len: usize,
}

impl Default for ClassifierCfg {
    fn default() -> Self {
        Self {
            strong_terms: to_strings(&[
                "playstation",
                "ps5",
                "ps4",
                "psvr2",
                "xbox",
                "nintendo",
                "switch 2",
                "steam",
                "steam deck",
                "game pass",
                "epic games store",
                "bluepoint",
                "naughty dog",
                "bungie",
                "bethesda",
                "ubisoft",
                "capcom",
                "square enix",
                "rockstar",
                "valve",
                "sega",
                "bandai namco",
                "activision",
                "blizzard",
                "ea sports",
                "electronic arts",
                "riot games",
                "fromsoftware",
                "cd projekt",
                "unreal engine",
                "unity",
            ]),
            domain_terms: to_strings(&[
                "game",
                "games",
                "gaming",
                "gamer",
                "gamers",
                "video game",
                "console",
                "consoles",
                "studio",
                "studios",
                "developer",
                "developers",
                "publisher",
                "dlc",
                "expansion",
                "patch",
                "update",
                "hotfix",
                "trailer",
                "remake",
                "remaster",
                "sequel",
                "early access",
                "multiplayer",
                "esports",
                "layoffs",
                "release date",
                "roadmap",
                "season",
                "beta",
            ]),
            entertainment_terms: to_strings(&[
                "movie",
                "film",
                "box office",
                "tv series",
                "tv show",
                "netflix",
                "hbo",
                "disney+",
                "episode",
                "album",
                "celebrity",
                "actor",
                "actress",
                "anime",
                "comic",
            ]),
            opinion_terms: to_strings(&[
                "opinion",
                "editorial",
                "column",
                "poll",
                "readers",
                "community",
                "we asked",
                "hot take",
                "unpopular opinion",
                "podcast",
                "mailbag",
                "weekend discussion",
                "i played",
            ]),
            listicle_terms: to_strings(&[
                "best",
                "top 5",
                "top 10",
                "top 20",
                "ranked",
                "ranking every",
                "guide",
                "how to",
                "tips",
                "tricks",
                "walkthrough",
                "review",
                "review roundup",
                "things you",
                "everything you need to know",
                "all the",
                "where to find",
                "explained",
                "tier list",
            ]),
            evergreen_terms: to_strings(&[
                "history of",
                "retrospective",
                "look back",
                "years later",
                "anniversary",
                "revisited",
                "what happened to",
                "the evolution of",
                "still worth",
            ]),
            deals_terms: to_strings(&[
                "deals",
                "deal alert",
                "sale",
                "discount",
                "discounted",
                "price cut",
                "cheapest",
                "lowest price",
                "bundle",
                "black friday",
                "cyber monday",
                "prime day",
                "coupon",
                "% off",
                "free games",
            ]),
            rumor_terms: to_strings(&[
                "rumor",
                "rumour",
                "rumored",
                "rumoured",
                "reportedly",
                "leak",
                "leaked",
                "leaks",
                "speculation",
                "insider",
                "allegedly",
                "could be",
                "might be",
            ]),
            title_shape_min_len: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupCfg {
    /// Fuzzy title similarity (0–100) at or above which a title counts as seen.
    pub fuzzy_threshold: u8,
    /// Ring-buffer bound for each remembered list.
    pub history_cap: usize,
    /// How many of the most recent titles the fuzzy check looks at.
    pub fuzzy_lookback: usize,
    /// Words that mark a legitimate follow-up to an already published story.
    pub update_terms: Vec<String>,
}

impl Default for DedupCfg {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 92,
            history_cap: 2000,
            fuzzy_lookback: 300,
            update_terms: to_strings(&[
                "update",
                "updated",
                "patch",
                "hotfix",
                "confirmed",
                "confirms",
                "new details",
                "now available",
                "delayed",
                "officially",
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingCfg {
    pub top_n: usize,
    pub max_per_source: usize,
    pub recency_window_hours: f64,
    pub source_base: f64,
    pub source_weight: f64,
    pub news_hint_bonus: f64,
    /// When the per-source cap leaves the slate short of `top_n`, fill the rest
    /// by score regardless of source.
    pub backfill_over_cap: bool,
    pub news_terms: Vec<String>,
}

impl Default for RankingCfg {
    fn default() -> Self {
        Self {
            top_n: 12,
            max_per_source: 4,
            recency_window_hours: 48.0,
            source_base: 20.0,
            source_weight: 2.0,
            news_hint_bonus: 6.0,
            backfill_over_cap: true,
            news_terms: to_strings(&[
                "announced",
                "announces",
                "launched",
                "launches",
                "released",
                "patched",
                "delayed",
                "delays",
                "acquired",
                "acquires",
                "acquisition",
                "sued",
                "lawsuit",
                "layoffs",
                "laid off",
                "shuts down",
                "shut down",
                "closes",
                "cancelled",
                "canceled",
                "revealed",
                "confirmed",
                "price increase",
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpCfg {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub retry_attempts: u8,
    pub backoff_ms: u64,
    pub max_entries_per_feed: usize,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            connect_timeout_secs: 5,
            user_agent: "IttyBittyGamingNewsBot/1.0".to_string(),
            retry_attempts: 3,
            backoff_ms: 500,
            max_entries_per_feed: 50,
        }
    }
}

impl HttpCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which discovered identifier to trust when no timestamp could be validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionalPick {
    #[default]
    First,
    Last,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaCfg {
    /// Operator override; skips every other strategy when set.
    pub forced_id: Option<String>,
    /// Watch URL with an `{id}` placeholder.
    pub watch_url_template: String,
    /// Static hub page, also the last-resort answer.
    pub hub_url: String,
    /// Public listing page (client-rendered, heavily cached).
    pub listing_url: String,
    pub api_base: Option<String>,
    pub api_token: Option<String>,
    pub collection_id: Option<String>,
    /// Items per listing whose metadata is fetched.
    pub api_sample: usize,
    pub api_page_size: usize,
    pub api_max_pages: usize,
    /// Extra query strings appended to the listing call, one probe each.
    pub api_query_variants: Vec<String>,
    /// An API timestamp this recent ends the probe early.
    pub fresh_days: i64,
    /// An API timestamp older than this is distrusted in favour of scraping.
    pub stale_days: i64,
    pub cache_bust_variants: usize,
    pub max_validate: usize,
    pub positional_pick: PositionalPick,
}

impl Default for MediaCfg {
    fn default() -> Self {
        Self {
            forced_id: None,
            watch_url_template: "https://www.playstation.com/en-us/watch/{id}".to_string(),
            hub_url: "https://www.playstation.com/en-us/ps-vids/".to_string(),
            listing_url: "https://www.playstation.com/en-us/ps-vids/latest/".to_string(),
            api_base: None,
            api_token: None,
            collection_id: None,
            api_sample: 12,
            api_page_size: 25,
            api_max_pages: 3,
            api_query_variants: to_strings(&[
                "",
                "sort=date&direction=desc",
                "sort=modified_time&direction=desc",
            ]),
            fresh_days: 3,
            stale_days: 10,
            cache_bust_variants: 3,
            max_validate: 8,
            positional_pick: PositionalPick::First,
        }
    }
}

impl MediaCfg {
    pub fn watch_url(&self, id: &str) -> String {
        self.watch_url_template.replace("{id}", id)
    }
}

impl DigestConfig {
    /// Resolve the config file, parse it, then apply process env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(ConfigError::MissingFile {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Self::from_path(&path)?
            }
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_path(&path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading digest config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing digest config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Apply overrides from a key lookup. Unparseable values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<usize>("MAX_POSTS_PER_RUN", get("MAX_POSTS_PER_RUN")) {
            self.ranking.top_n = v;
        }
        if let Some(v) = parse_override::<usize>("MAX_PER_SOURCE", get("MAX_PER_SOURCE")) {
            self.ranking.max_per_source = v;
        }
        if let Some(v) =
            parse_override::<u8>("TITLE_FUZZY_THRESHOLD", get("TITLE_FUZZY_THRESHOLD"))
        {
            self.dedup.fuzzy_threshold = v;
        }
        if let Some(v) = non_empty(get("USER_AGENT")) {
            self.http.user_agent = v;
        }
        if let Some(v) = non_empty(get("DISCORD_WEBHOOK_URL")) {
            self.discord_webhook_url = Some(v);
        }
        if let Some(v) = non_empty(get("STATE_PATH")) {
            self.state_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(get("MEDIA_FORCED_ID")) {
            self.media.forced_id = Some(v);
        }
        if let Some(v) = non_empty(get("MEDIA_API_TOKEN")) {
            self.media.api_token = Some(v);
        }
        if let Some(v) = non_empty(get("MEDIA_COLLECTION_ID")) {
            self.media.collection_id = Some(v);
        }
        if let Some(v) = non_empty(get("MEDIA_API_BASE")) {
            self.media.api_base = Some(v);
        }
        if let Some(v) = parse_override::<RunMode>("DIGEST_MODE", get("DIGEST_MODE")) {
            self.mode = v;
        }
    }

    /// Clamp numeric tunables into usable ranges and drop blank optional strings.
    pub fn sanitize(&mut self) {
        self.ranking.top_n = self.ranking.top_n.clamp(1, 50);
        self.ranking.max_per_source = self.ranking.max_per_source.max(1);
        if !self.ranking.recency_window_hours.is_finite() || self.ranking.recency_window_hours < 0.0
        {
            self.ranking.recency_window_hours = RankingCfg::default().recency_window_hours;
        }
        self.dedup.fuzzy_threshold = self.dedup.fuzzy_threshold.min(100);
        self.dedup.history_cap = self.dedup.history_cap.clamp(1, 100_000);
        self.http.timeout_secs = self.http.timeout_secs.clamp(1, 120);
        self.http.connect_timeout_secs = self.http.connect_timeout_secs.clamp(1, 60);
        self.http.retry_attempts = self.http.retry_attempts.clamp(1, 5);
        self.media.api_sample = self.media.api_sample.clamp(1, 50);
        self.media.api_max_pages = self.media.api_max_pages.clamp(1, 10);
        self.media.cache_bust_variants = self.media.cache_bust_variants.clamp(1, 10);
        self.media.max_validate = self.media.max_validate.clamp(1, 30);
        self.media.fresh_days = self.media.fresh_days.clamp(0, MAX_MEDIA_AGE_DAYS);
        self.media.stale_days = self.media.stale_days.clamp(0, MAX_MEDIA_AGE_DAYS);
        if self.media.stale_days < self.media.fresh_days {
            std::mem::swap(&mut self.media.stale_days, &mut self.media.fresh_days);
        }
        for opt in [
            &mut self.media.forced_id,
            &mut self.media.api_base,
            &mut self.media.api_token,
            &mut self.media.collection_id,
            &mut self.discord_webhook_url,
        ] {
            if opt.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *opt = None;
            }
        }
    }
}

fn parse_override<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "config", key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
