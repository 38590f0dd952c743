// src/media/mod.rs
//! External media resolver: finds the most recently published video on a host
//! whose public pages are cache-prone and whose API may be stale.

pub mod api;
pub mod chain;
pub mod host;
pub mod scrape;
pub mod types;

pub use chain::{default_chain, ResolveContext, ResolveState, Resolver, Strategy};
pub use host::{HttpTransport, MediaTransport, RetryPolicy};
pub use types::{BestCandidate, Confidence, Discovery, MediaCandidate, ResolvedMedia};
