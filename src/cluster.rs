// src/cluster.rs
//! Story clustering: one representative per real-world story.
//!
//! Candidates are grouped by [`StoryKey`]. Within a group the representative is
//! the one from the highest-priority source, then the most recent, then the one
//! discovered first. Output is ordered newest first.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::candidate::{Candidate, StoryKey};
use crate::config::SourcesCfg;

pub fn cluster(candidates: Vec<Candidate>, sources: &SourcesCfg) -> Vec<Candidate> {
    // Groups keep first-seen order so ties downstream never depend on hash order.
    let mut index: HashMap<StoryKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<(usize, Candidate)>> = Vec::new();

    for (order, c) in candidates.into_iter().enumerate() {
        let key = c.story_key();
        match index.get(&key) {
            Some(&g) => groups[g].push((order, c)),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![(order, c)]);
            }
        }
    }

    let grouped = groups.len();
    let mut reps: Vec<Candidate> = groups
        .into_iter()
        .filter_map(|group| {
            group
                .into_iter()
                .min_by_key(|(order, c)| {
                    (
                        sources.priority_index(&c.source),
                        Reverse(c.published_at),
                        *order,
                    )
                })
                .map(|(_, c)| c)
        })
        .collect();

    // Stable: equal timestamps keep group discovery order.
    reps.sort_by_key(|c| Reverse(c.published_at));

    tracing::debug!(target: "cluster", stories = grouped, "clustered candidates");
    reps
}
