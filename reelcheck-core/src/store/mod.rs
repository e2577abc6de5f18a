//! Fingerprint store and incident ledger abstractions.
//!
//! Provides storage for:
//! - **Fingerprints**: append-only, write-once frame hashes per source id,
//!   queryable by Hamming distance.
//! - **Incidents**: one record per distinct piece of footage, with its
//!   resubmission counter and the alias ids that resolve to it.
//!
//! All writes go through a [`StoreTransaction`]. Opening one acquires the
//! store's serialization domain, so the match query, the decision and the
//! writes of a submission happen as one unit; dropping a transaction without
//! committing discards every write made through it.

mod memory;

pub use memory::{MemoryStore, MemoryTransaction};

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fingerprint::{FingerprintSet, FrameHash, FrameMatch};

/// The canonical record of one piece of footage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Source id of the first submission of this footage
    pub canonical_id: String,
    /// 1 for the first submission, +1 per recognised resubmission or repost
    pub resubmission_count: u32,
    /// Every source id classified as a repost of this footage
    pub known_alias_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub fn new(canonical_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            resubmission_count: 1,
            known_alias_ids: BTreeSet::new(),
            created_at,
        }
    }

    /// Whether `source_id` belongs to this incident.
    pub fn contains(&self, source_id: &str) -> bool {
        self.canonical_id == source_id || self.known_alias_ids.contains(source_id)
    }
}

/// Persistent backend for fingerprints and incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a transaction, blocking until the serialization domain is free.
    async fn begin(&self) -> Result<Self::Tx<'_>>;

    /// Read-only lookup of the incident `source_id` belongs to.
    async fn incident(&self, source_id: &str) -> Result<Option<IncidentRecord>>;

    /// Read-only distance query over committed fingerprints.
    async fn find_within(
        &self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>>;

    /// Check the backend is reachable.
    async fn check_health(&self) -> Result<()>;
}

/// One serialized decide-and-write unit.
#[async_trait]
pub trait StoreTransaction: Send {
    // ==================== Fingerprint Store ====================

    /// Whether a fingerprint set was ever written for `source_id`.
    async fn has_fingerprints(&mut self, source_id: &str) -> Result<bool>;

    /// Stored frames within `max_distance` of `hash`, closest first, at most
    /// `limit` of them.
    async fn find_within(
        &mut self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>>;

    /// Write the whole set for `source_id`. Fails with `InvariantViolation`
    /// if one was already written.
    async fn insert_fingerprints(&mut self, source_id: &str, set: &FingerprintSet)
        -> Result<usize>;

    // ==================== Incident Ledger ====================

    /// Canonical id `source_id` belongs to, either directly or as an alias.
    async fn resolve(&mut self, source_id: &str) -> Result<Option<String>>;

    async fn incident(&mut self, canonical_id: &str) -> Result<Option<IncidentRecord>>;

    /// Bump the resubmission counter, returning the new value.
    async fn increment(&mut self, canonical_id: &str) -> Result<u32>;

    /// Start a new incident. Fails with `InvariantViolation` if `source_id`
    /// already belongs to one.
    async fn create_canonical(&mut self, source_id: &str) -> Result<IncidentRecord>;

    /// Link `alias_id` to an existing canonical incident.
    async fn add_alias(&mut self, canonical_id: &str, alias_id: &str) -> Result<()>;

    /// Make every write visible atomically and release the serialization domain.
    async fn commit(self) -> Result<()>;
}
