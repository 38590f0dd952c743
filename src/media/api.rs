// src/media/api.rs
//! Authenticated collection API of the media host.
//!
//! The listing order is not guaranteed newest-first and the response envelope
//! differs between endpoints and versions, so each response is matched against a
//! small set of known shapes and every listed item's own metadata is consulted
//! for its publish time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MediaCfg;
use crate::error::{ConfigError, ParseError};
use crate::media::host::MediaTransport;
use crate::media::types::{
    days_before, from_epoch, parse_timestamp, BestCandidate, Discovery, MediaCandidate,
};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListShape {
    Paged {
        data: Vec<ItemStub>,
        #[serde(default)]
        paging: Option<Paging>,
    },
    Items {
        items: Vec<ItemStub>,
        #[serde(default)]
        next_page: Option<serde_json::Value>,
    },
    Videos {
        videos: Vec<ItemStub>,
    },
    Bare(Vec<ItemStub>),
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemStub {
    Id { id: IdValue },
    VideoId { video_id: IdValue },
    /// `/videos/12345`-style resource path; the last segment is the id.
    Uri { uri: String },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Num(u64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(s) => s,
            IdValue::Num(n) => n.to_string(),
        }
    }
}

impl ItemStub {
    fn into_id(self) -> Option<String> {
        let id = match self {
            ItemStub::Id { id } | ItemStub::VideoId { video_id: id } => id.into_string(),
            ItemStub::Uri { uri } => uri.trim_end_matches('/').rsplit('/').next()?.to_string(),
            ItemStub::Other(_) => return None,
        };
        let id = id.trim().to_string();
        (!id.is_empty()).then_some(id)
    }
}

/// One page of listed ids and whether the host says more exist.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub ids: Vec<String>,
    pub has_more: bool,
}

pub fn parse_list(body: &str, page_size: usize) -> Result<ListPage, ParseError> {
    let shape: ListShape =
        serde_json::from_str(body).map_err(|e| ParseError::Metadata(e.to_string()))?;
    let (stubs, has_more) = match shape {
        ListShape::Paged { data, paging } => {
            let more = paging.and_then(|p| p.next).is_some_and(|n| !n.is_empty());
            (data, more)
        }
        ListShape::Items { items, next_page } => {
            let more = match next_page {
                None | Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::Bool(b)) => b,
                Some(serde_json::Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            (items, more)
        }
        // No paging hints: a full page suggests there may be another.
        ListShape::Videos { videos: v } | ListShape::Bare(v) => {
            let full = v.len() >= page_size && page_size > 0;
            (v, full)
        }
    };
    Ok(ListPage {
        ids: stubs.into_iter().filter_map(ItemStub::into_id).collect(),
        has_more,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetaShape {
    Wrapped { data: Box<MetaShape> },
    Flat(MetaFields),
}

#[derive(Debug, Default, Deserialize)]
struct MetaFields {
    upload_timestamp: Option<TsValue>,
    uploaded_at: Option<TsValue>,
    release_time: Option<TsValue>,
    published_at: Option<TsValue>,
    created_time: Option<TsValue>,
    date: Option<TsValue>,
    modified_time: Option<TsValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TsValue {
    Num(i64),
    Float(f64),
    Text(String),
}

impl TsValue {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            TsValue::Num(n) => from_epoch(*n),
            TsValue::Float(f) if f.is_finite() => from_epoch(*f as i64),
            TsValue::Float(_) => None,
            TsValue::Text(s) => parse_timestamp(s),
        }
    }
}

impl MetaShape {
    fn into_fields(self) -> MetaFields {
        match self {
            MetaShape::Wrapped { data } => data.into_fields(),
            MetaShape::Flat(f) => f,
        }
    }
}

impl MetaFields {
    /// First field that holds a usable time, most specific first.
    fn publish_time(&self) -> Option<DateTime<Utc>> {
        [
            &self.upload_timestamp,
            &self.uploaded_at,
            &self.release_time,
            &self.published_at,
            &self.created_time,
            &self.date,
            &self.modified_time,
        ]
        .into_iter()
        .flatten()
        .find_map(TsValue::to_datetime)
    }
}

pub fn parse_meta_timestamp(body: &str) -> Result<Option<DateTime<Utc>>, ParseError> {
    let shape: MetaShape =
        serde_json::from_str(body).map_err(|e| ParseError::Metadata(e.to_string()))?;
    Ok(shape.into_fields().publish_time())
}

pub struct ApiProbe<'a> {
    transport: &'a dyn MediaTransport,
    cfg: &'a MediaCfg,
    base: String,
    token: String,
    collection: String,
}

impl<'a> ApiProbe<'a> {
    /// Fails with [`ConfigError::MissingSetting`] when credentials are not configured.
    pub fn from_cfg(cfg: &'a MediaCfg, transport: &'a dyn MediaTransport) -> Result<Self, ConfigError> {
        let need = |v: &Option<String>, field| {
            v.clone().ok_or(ConfigError::MissingSetting {
                strategy: "api_probe",
                field,
            })
        };
        Ok(Self {
            transport,
            cfg,
            base: need(&cfg.api_base, "api_base")?.trim_end_matches('/').to_string(),
            token: need(&cfg.api_token, "api_token")?,
            collection: need(&cfg.collection_id, "collection_id")?,
        })
    }

    fn list_url(&self, page: usize, variant: &str) -> String {
        let mut url = format!(
            "{}/collection/{}/items?page={}&per_page={}",
            self.base, self.collection, page, self.cfg.api_page_size
        );
        let variant = variant.trim().trim_start_matches(['?', '&']);
        if !variant.is_empty() {
            url.push('&');
            url.push_str(variant);
        }
        url
    }

    fn meta_url(&self, id: &str) -> String {
        format!("{}/items/{}/meta", self.base, id)
    }

    /// Up to `api_sample` ids under one query variant, following pagination.
    async fn list_sample(&self, variant: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for page in 1..=self.cfg.api_max_pages.max(1) {
            let url = self.list_url(page, variant);
            let body = match self.transport.get_text(&url, Some(&self.token)).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "media", error = %e, "api listing failed");
                    break;
                }
            };
            let listed = match parse_list(&body, self.cfg.api_page_size) {
                Ok(p) => p,
                Err(e) => {
                    warn!(target: "media", error = %e, "api listing unrecognised");
                    break;
                }
            };
            for id in listed.ids {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            if ids.len() >= self.cfg.api_sample || !listed.has_more {
                break;
            }
        }
        ids.truncate(self.cfg.api_sample);
        ids
    }

    async fn fetch_meta(&self, id: &str) -> Option<DateTime<Utc>> {
        let body = match self.transport.get_text(&self.meta_url(id), Some(&self.token)).await {
            Ok(b) => b,
            Err(e) => {
                debug!(target: "media", %id, error = %e, "meta fetch failed");
                return None;
            }
        };
        match parse_meta_timestamp(&body) {
            Ok(ts) => ts,
            Err(e) => {
                debug!(target: "media", %id, error = %e, "meta unparseable");
                None
            }
        }
    }

    /// Probe every query variant, keeping the globally newest (id, time).
    /// Stops after a variant once the best is within `fresh_days` of `now`.
    pub async fn probe(&self, now: DateTime<Utc>) -> BestCandidate {
        let fresh_since = days_before(now, self.cfg.fresh_days);
        let mut meta_cache: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        let mut best = BestCandidate::default();

        let variants: Vec<&str> = if self.cfg.api_query_variants.is_empty() {
            vec![""]
        } else {
            self.cfg.api_query_variants.iter().map(String::as_str).collect()
        };

        for variant in variants {
            let mut round = BestCandidate::default();
            for id in self.list_sample(variant).await {
                let ts = match meta_cache.get(&id) {
                    Some(ts) => *ts,
                    None => {
                        let ts = self.fetch_meta(&id).await;
                        meta_cache.insert(id.clone(), ts);
                        ts
                    }
                };
                round.offer(MediaCandidate::new(id, Discovery::Api, ts));
            }
            best.merge(round);

            if best
                .timestamp()
                .zip(fresh_since)
                .is_some_and(|(ts, since)| ts >= since)
            {
                debug!(target: "media", variant, "fresh api result, stopping probe");
                break;
            }
        }
        best
    }
}
