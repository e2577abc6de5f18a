//! Similarity matching of a query fingerprint set against stored sources.
//!
//! For every stored source, a query frame counts as matched when at least one
//! of that source's frames lies within `hamming_threshold`. Sources reaching
//! `min_matching_frames` matched query frames become [`MatchCandidate`]s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::fingerprint::FrameMatch;

/// A stored source that looks like the same footage as the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub candidate_source_id: String,
    /// Query frames with at least one stored frame of this source in range
    pub matching_frame_count: usize,
    /// Size of the query set
    pub frames_checked: usize,
    /// Smallest distance over all matched frame pairs
    pub best_distance: u32,
    /// Mean distance over matched frame pairs only
    pub average_distance: f64,
    /// `matching_frame_count / frames_checked`, in `[0, 1]`
    pub similarity_score: f64,
}

#[derive(Debug, Default)]
struct SourceTally {
    matched_frames: usize,
    distance_sum: u64,
    best_distance: u32,
}

/// Accumulates per-frame lookups into ranked candidates.
///
/// Feed it the stored frames found for each query frame with
/// [`record_frame`](Self::record_frame), then call [`finish`](Self::finish).
#[derive(Debug)]
pub struct MatchAggregator {
    hamming_threshold: u32,
    min_matching_frames: usize,
    frames_checked: usize,
    tallies: HashMap<String, SourceTally>,
}

impl MatchAggregator {
    pub fn new(config: &MatchConfig, frames_checked: usize) -> Self {
        Self {
            hamming_threshold: config.hamming_threshold,
            min_matching_frames: config.min_matching_frames,
            frames_checked,
            tallies: HashMap::new(),
        }
    }

    /// Record the stored frames found near one query frame.
    ///
    /// Each source is counted at most once per query frame, using its
    /// closest frame as the matched pair.
    pub fn record_frame(&mut self, matches: &[FrameMatch]) {
        let mut closest: HashMap<&str, u32> = HashMap::new();
        for m in matches {
            if m.distance > self.hamming_threshold {
                continue;
            }
            closest
                .entry(m.frame.source_id.as_str())
                .and_modify(|d| *d = (*d).min(m.distance))
                .or_insert(m.distance);
        }

        for (source_id, distance) in closest {
            let tally = self
                .tallies
                .entry(source_id.to_string())
                .or_insert_with(|| SourceTally {
                    best_distance: u32::MAX,
                    ..SourceTally::default()
                });
            tally.matched_frames += 1;
            tally.distance_sum += u64::from(distance);
            tally.best_distance = tally.best_distance.min(distance);
        }
    }

    /// Candidates ordered by descending similarity, then ascending best
    /// distance, then source id.
    pub fn finish(self) -> Vec<MatchCandidate> {
        if self.frames_checked == 0 {
            return Vec::new();
        }
        let frames_checked = self.frames_checked;
        let min_matching_frames = self.min_matching_frames;

        let mut candidates: Vec<MatchCandidate> = self
            .tallies
            .into_iter()
            .filter(|(_, t)| t.matched_frames >= min_matching_frames)
            .map(|(source_id, t)| MatchCandidate {
                candidate_source_id: source_id,
                matching_frame_count: t.matched_frames,
                frames_checked,
                best_distance: t.best_distance,
                average_distance: t.distance_sum as f64 / t.matched_frames as f64,
                similarity_score: (t.matched_frames as f64 / frames_checked as f64).min(1.0),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then(a.best_distance.cmp(&b.best_distance))
                .then_with(|| a.candidate_source_id.cmp(&b.candidate_source_id))
        });
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FrameHash, StoredFrame};

    fn hit(source: &str, distance: u32) -> FrameMatch {
        FrameMatch {
            frame: StoredFrame {
                source_id: source.to_string(),
                timestamp_seconds: 0.0,
                hash: FrameHash::new(0),
            },
            distance,
        }
    }

    #[test]
    fn test_empty_query_yields_nothing() {
        let aggregator = MatchAggregator::new(&MatchConfig::default(), 0);
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn test_candidate_metrics() {
        let mut aggregator = MatchAggregator::new(&MatchConfig::default(), 5);
        for d in [3, 1, 2, 0] {
            aggregator.record_frame(&[hit("A", d)]);
        }
        aggregator.record_frame(&[]);

        let candidates = aggregator.finish();
        assert_eq!(candidates.len(), 1);
        let a = &candidates[0];
        assert_eq!(a.candidate_source_id, "A");
        assert_eq!(a.matching_frame_count, 4);
        assert_eq!(a.frames_checked, 5);
        assert_eq!(a.best_distance, 0);
        assert!((a.average_distance - 1.5).abs() < f64::EPSILON);
        assert!((a.similarity_score - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_source_counted_once_per_query_frame() {
        let mut aggregator = MatchAggregator::new(&MatchConfig::new(5, 1), 1);
        aggregator.record_frame(&[hit("A", 4), hit("A", 2), hit("A", 3)]);
        let candidates = aggregator.finish();
        assert_eq!(candidates[0].matching_frame_count, 1);
        assert_eq!(candidates[0].best_distance, 2);
        assert_eq!(candidates[0].average_distance, 2.0);
    }

    #[test]
    fn test_below_min_frames_is_dropped() {
        let mut aggregator = MatchAggregator::new(&MatchConfig::new(5, 3), 4);
        aggregator.record_frame(&[hit("A", 1)]);
        aggregator.record_frame(&[hit("A", 1)]);
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn test_out_of_threshold_hits_ignored() {
        let mut aggregator = MatchAggregator::new(&MatchConfig::new(2, 1), 2);
        aggregator.record_frame(&[hit("A", 9)]);
        aggregator.record_frame(&[hit("A", 3)]);
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn test_ordering_by_score_then_best_distance() {
        let mut aggregator = MatchAggregator::new(&MatchConfig::new(5, 1), 3);
        aggregator.record_frame(&[hit("low", 0), hit("tie-far", 4), hit("tie-near", 1)]);
        aggregator.record_frame(&[hit("tie-far", 4), hit("tie-near", 3)]);
        aggregator.record_frame(&[hit("tie-far", 4), hit("tie-near", 3)]);

        let order: Vec<String> = aggregator
            .finish()
            .into_iter()
            .map(|c| c.candidate_source_id)
            .collect();
        assert_eq!(order, vec!["tie-near", "tie-far", "low"]);
    }
}
