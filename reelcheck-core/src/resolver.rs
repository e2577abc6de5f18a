//! Resolution policy: classify a submission and update the ledger.
//!
//! Every decision runs inside one [`StoreTransaction`], so the match query,
//! the classification and the writes are serialized against every other
//! submission. A failure anywhere before `commit` drops the transaction and
//! leaves the store untouched; the whole step can then be retried.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::MatchConfig;
use crate::error::{ReelcheckError, Result};
use crate::fingerprint::FingerprintSet;
use crate::matcher::{MatchAggregator, MatchCandidate};
use crate::store::{IncidentRecord, IncidentStore, StoreTransaction};

/// How a submission was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Never-seen footage; the submission became a canonical incident
    New,
    /// The submitted id itself was seen before
    ExactResubmission,
    /// Same footage as an existing incident under a new id
    Repost,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::New => write!(f, "NEW"),
            Outcome::ExactResubmission => write!(f, "EXACT_RESUBMISSION"),
            Outcome::Repost => write!(f, "REPOST"),
        }
    }
}

/// Result of [`Resolver::resolve_and_store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: Outcome,
    /// Incident the submission now belongs to
    pub canonical_id: String,
    /// Source id of the top match (reposts only)
    pub matched_against: Option<String>,
    /// Similarity score of the top match (reposts only)
    pub similarity: Option<f64>,
    /// Incident counter after this submission
    pub resubmission_count: u32,
    /// Fingerprint rows written for the submission
    pub frames_stored: usize,
}

/// Applies the resolution policy on top of an [`IncidentStore`].
///
/// Constructed once and shared (e.g. behind an `Arc`) by every submission.
#[derive(Debug)]
pub struct Resolver<S> {
    store: S,
    config: MatchConfig,
}

impl<S: IncidentStore> Resolver<S> {
    pub fn new(store: S, config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Rank stored sources against `fingerprints` without writing anything.
    #[instrument(skip(self, fingerprints, config), fields(frames = fingerprints.len()))]
    pub async fn find_matches(
        &self,
        fingerprints: &FingerprintSet,
        config: &MatchConfig,
    ) -> Result<Vec<MatchCandidate>> {
        config.validate()?;
        let mut aggregator = MatchAggregator::new(config, fingerprints.len());
        for frame in fingerprints {
            let hits = self
                .store
                .find_within(frame.hash, config.hamming_threshold, config.per_frame_limit)
                .await?;
            aggregator.record_frame(&hits);
        }
        Ok(aggregator.finish())
    }

    /// Classify `submitted_id` with the resolver's own match parameters.
    pub async fn resolve_and_store(
        &self,
        submitted_id: &str,
        fingerprints: &FingerprintSet,
    ) -> Result<Resolution> {
        self.resolve_and_store_with(submitted_id, fingerprints, &self.config)
            .await
    }

    /// Classify `submitted_id` and persist the outcome in one transaction.
    #[instrument(skip(self, fingerprints, config), fields(frames = fingerprints.len()))]
    pub async fn resolve_and_store_with(
        &self,
        submitted_id: &str,
        fingerprints: &FingerprintSet,
        config: &MatchConfig,
    ) -> Result<Resolution> {
        check_id(submitted_id)?;
        config.validate()?;

        let mut tx = self.store.begin().await?;

        if let Some(resolution) = exact_resubmission(&mut tx, submitted_id).await? {
            tx.commit().await?;
            log_resolution(submitted_id, &resolution);
            return Ok(resolution);
        }

        let candidates = candidates_in(&mut tx, fingerprints, config).await?;
        debug!(candidates = candidates.len(), "Matched against store");

        let resolution = match choose_incident(&mut tx, &candidates).await? {
            Some((top, incident)) => {
                let canonical_id = incident.canonical_id;
                tx.add_alias(&canonical_id, submitted_id).await?;
                let resubmission_count = tx.increment(&canonical_id).await?;
                let frames_stored = tx.insert_fingerprints(submitted_id, fingerprints).await?;
                Resolution {
                    outcome: Outcome::Repost,
                    canonical_id,
                    matched_against: Some(top.candidate_source_id.clone()),
                    similarity: Some(top.similarity_score),
                    resubmission_count,
                    frames_stored,
                }
            }
            None => {
                let incident = tx.create_canonical(submitted_id).await?;
                let frames_stored = tx.insert_fingerprints(submitted_id, fingerprints).await?;
                Resolution {
                    outcome: Outcome::New,
                    canonical_id: incident.canonical_id,
                    matched_against: None,
                    similarity: None,
                    resubmission_count: incident.resubmission_count,
                    frames_stored,
                }
            }
        };

        tx.commit().await?;
        log_resolution(submitted_id, &resolution);
        Ok(resolution)
    }

    /// Count a resubmission of an already known id without fingerprinting it.
    ///
    /// Returns `None` when the id is unknown and the caller has to fingerprint
    /// the video and call [`resolve_and_store`](Self::resolve_and_store).
    #[instrument(skip(self))]
    pub async fn record_resubmission(&self, submitted_id: &str) -> Result<Option<Resolution>> {
        check_id(submitted_id)?;

        let mut tx = self.store.begin().await?;
        let Some(resolution) = exact_resubmission(&mut tx, submitted_id).await? else {
            return Ok(None);
        };
        tx.commit().await?;
        log_resolution(submitted_id, &resolution);
        Ok(Some(resolution))
    }

    /// The incident `source_id` belongs to, as canonical id or alias.
    pub async fn incident(&self, source_id: &str) -> Result<Option<IncidentRecord>> {
        self.store.incident(source_id).await
    }
}

fn check_id(submitted_id: &str) -> Result<()> {
    if submitted_id.trim().is_empty() {
        return Err(ReelcheckError::invalid("submitted id must not be empty"));
    }
    Ok(())
}

fn log_resolution(submitted_id: &str, resolution: &Resolution) {
    info!(
        source_id = submitted_id,
        canonical_id = %resolution.canonical_id,
        outcome = %resolution.outcome,
        similarity = resolution.similarity,
        count = resolution.resubmission_count,
        frames = resolution.frames_stored,
        "Resolved submission"
    );
}

/// Increment the incident of an id that was already submitted.
///
/// An id counts as submitted if it owns fingerprints or is linked in the
/// ledger.
async fn exact_resubmission<T: StoreTransaction>(
    tx: &mut T,
    submitted_id: &str,
) -> Result<Option<Resolution>> {
    let Some(canonical_id) = tx.resolve(submitted_id).await? else {
        if tx.has_fingerprints(submitted_id).await? {
            return Err(ReelcheckError::InvariantViolation(format!(
                "{submitted_id} has fingerprints but no incident"
            )));
        }
        return Ok(None);
    };

    let resubmission_count = tx.increment(&canonical_id).await?;
    Ok(Some(Resolution {
        outcome: Outcome::ExactResubmission,
        canonical_id,
        matched_against: None,
        similarity: None,
        resubmission_count,
        frames_stored: 0,
    }))
}

async fn candidates_in<T: StoreTransaction>(
    tx: &mut T,
    fingerprints: &FingerprintSet,
    config: &MatchConfig,
) -> Result<Vec<MatchCandidate>> {
    let mut aggregator = MatchAggregator::new(config, fingerprints.len());
    for frame in fingerprints {
        let hits = tx
            .find_within(frame.hash, config.hamming_threshold, config.per_frame_limit)
            .await?;
        aggregator.record_frame(&hits);
    }
    Ok(aggregator.finish())
}

/// Pick the incident to link a repost to.
///
/// Among the candidates tied with the best (similarity, best distance), the
/// one whose incident was created first wins, then the lowest canonical id.
async fn choose_incident<'c, T: StoreTransaction>(
    tx: &mut T,
    candidates: &'c [MatchCandidate],
) -> Result<Option<(&'c MatchCandidate, IncidentRecord)>> {
    let Some(first) = candidates.first() else {
        return Ok(None);
    };

    let mut chosen: Option<(&MatchCandidate, IncidentRecord)> = None;
    for candidate in candidates.iter().take_while(|c| {
        c.similarity_score == first.similarity_score && c.best_distance == first.best_distance
    }) {
        let incident = incident_of(tx, &candidate.candidate_source_id).await?;
        let better = match &chosen {
            None => true,
            Some((_, current)) => {
                (incident.created_at, &incident.canonical_id)
                    < (current.created_at, &current.canonical_id)
            }
        };
        if better {
            chosen = Some((candidate, incident));
        }
    }
    Ok(chosen)
}

async fn incident_of<T: StoreTransaction>(tx: &mut T, source_id: &str) -> Result<IncidentRecord> {
    let canonical_id = tx.resolve(source_id).await?.ok_or_else(|| {
        ReelcheckError::InvariantViolation(format!("stored source {source_id} has no incident"))
    })?;
    tx.incident(&canonical_id).await?.ok_or_else(|| {
        ReelcheckError::InvariantViolation(format!("incident {canonical_id} missing"))
    })
}
