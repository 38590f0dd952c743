// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod candidate;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod rank;
pub mod terms;

// External media resolver (API probe, scrape, validation, fallbacks)
pub mod media;

// Wiring and delivery
pub mod pipeline;
pub mod publish;

// ---- Re-exports for stable public API ----
pub use crate::candidate::{Candidate, StoryKey};
pub use crate::classify::{ClassificationResult, Classifier, Reason};
pub use crate::config::{DigestConfig, RunMode};
pub use crate::dedup::{DuplicateGuard, JsonFileStore, SeenState, SeenStore};
pub use crate::media::{Confidence, ResolvedMedia, Resolver};
pub use crate::pipeline::{run, Collaborators, Curator, Outcome, RunSummary};
pub use crate::rank::Ranker;
