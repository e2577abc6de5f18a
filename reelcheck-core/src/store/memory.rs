//! In-memory fingerprint store and incident ledger.
//!
//! Suitable for tests and single-process development. Everything is lost on
//! restart.
//!
//! A `tokio` mutex serializes transactions. Committed data sits behind an
//! `RwLock`; a transaction journals its writes and applies them under one
//! write lock on commit, so readers never see half a fingerprint set.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{IncidentRecord, IncidentStore, StoreTransaction};
use crate::error::{ReelcheckError, Result};
use crate::fingerprint::{FingerprintSet, FrameHash, FrameMatch, StoredFrame};
use crate::index::BandIndex;

#[derive(Debug, Default)]
struct MemoryState {
    frames: Vec<StoredFrame>,
    index: BandIndex,
    /// Sources whose fingerprint set has been written (possibly empty)
    fingerprinted: HashSet<String>,
    incidents: HashMap<String, IncidentRecord>,
    /// alias id -> canonical id
    aliases: HashMap<String, String>,
}

impl MemoryState {
    fn resolve(&self, source_id: &str) -> Option<String> {
        if self.incidents.contains_key(source_id) {
            return Some(source_id.to_string());
        }
        self.aliases.get(source_id).cloned()
    }

    fn find_within(&self, hash: FrameHash, max_distance: u32) -> Vec<FrameMatch> {
        let within = |frame: &StoredFrame| {
            let distance = frame.hash.distance(hash);
            (distance <= max_distance).then(|| FrameMatch {
                frame: frame.clone(),
                distance,
            })
        };

        match self.index.candidates(hash, max_distance) {
            Some(slots) => slots
                .into_iter()
                .filter_map(|slot| self.frames.get(slot))
                .filter_map(within)
                .collect(),
            None => self.frames.iter().filter_map(within).collect(),
        }
    }
}

/// In-memory [`IncidentStore`].
#[derive(Default)]
pub struct MemoryStore {
    write_lock: Mutex<()>,
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| ReelcheckError::StoreUnavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| ReelcheckError::StoreUnavailable("memory store lock poisoned".into()))
    }

    /// Number of committed frame rows.
    pub fn frame_count(&self) -> usize {
        self.read().map(|s| s.frames.len()).unwrap_or(0)
    }

    /// Number of committed incident records.
    pub fn incident_count(&self) -> usize {
        self.read().map(|s| s.incidents.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("frames", &self.frame_count())
            .field("incidents", &self.incident_count())
            .finish()
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    async fn begin(&self) -> Result<Self::Tx<'_>> {
        let guard = self.write_lock.lock().await;
        Ok(MemoryTransaction {
            store: self,
            _guard: guard,
            staged_frames: Vec::new(),
            staged_fingerprinted: HashSet::new(),
            staged_incidents: HashMap::new(),
            staged_aliases: HashMap::new(),
        })
    }

    async fn incident(&self, source_id: &str) -> Result<Option<IncidentRecord>> {
        let state = self.read()?;
        Ok(state
            .resolve(source_id)
            .and_then(|canonical| state.incidents.get(&canonical).cloned()))
    }

    async fn find_within(
        &self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>> {
        let mut matches = self.read()?.find_within(hash, max_distance);
        rank(&mut matches, limit);
        Ok(matches)
    }

    async fn check_health(&self) -> Result<()> {
        self.read().map(|_| ())
    }
}

/// Journaled transaction over a [`MemoryStore`]. Holds the store's write lock
/// until committed or dropped.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    _guard: MutexGuard<'a, ()>,
    staged_frames: Vec<StoredFrame>,
    staged_fingerprinted: HashSet<String>,
    /// Full copies of every incident touched in this transaction
    staged_incidents: HashMap<String, IncidentRecord>,
    staged_aliases: HashMap<String, String>,
}

impl MemoryTransaction<'_> {
    fn resolve_staged(&self, state: &MemoryState, source_id: &str) -> Option<String> {
        if self.staged_incidents.contains_key(source_id) {
            return Some(source_id.to_string());
        }
        self.staged_aliases
            .get(source_id)
            .cloned()
            .or_else(|| state.resolve(source_id))
    }

    /// Copy an incident into the journal so it can be modified.
    fn stage_incident(&mut self, canonical_id: &str) -> Result<&mut IncidentRecord> {
        if !self.staged_incidents.contains_key(canonical_id) {
            let record = self
                .store
                .read()?
                .incidents
                .get(canonical_id)
                .cloned()
                .ok_or_else(|| {
                    ReelcheckError::InvariantViolation(format!(
                        "no incident with canonical id {canonical_id}"
                    ))
                })?;
            self.staged_incidents.insert(canonical_id.to_string(), record);
        }
        self.staged_incidents.get_mut(canonical_id).ok_or_else(|| {
            ReelcheckError::InvariantViolation(format!("incident {canonical_id} vanished"))
        })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction<'_> {
    async fn has_fingerprints(&mut self, source_id: &str) -> Result<bool> {
        Ok(self.staged_fingerprinted.contains(source_id)
            || self.store.read()?.fingerprinted.contains(source_id))
    }

    async fn find_within(
        &mut self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>> {
        let mut matches = self.store.read()?.find_within(hash, max_distance);
        matches.extend(self.staged_frames.iter().filter_map(|frame| {
            let distance = frame.hash.distance(hash);
            (distance <= max_distance).then(|| FrameMatch {
                frame: frame.clone(),
                distance,
            })
        }));
        rank(&mut matches, limit);
        Ok(matches)
    }

    async fn insert_fingerprints(
        &mut self,
        source_id: &str,
        set: &FingerprintSet,
    ) -> Result<usize> {
        if self.has_fingerprints(source_id).await? {
            return Err(ReelcheckError::InvariantViolation(format!(
                "fingerprints for {source_id} already written"
            )));
        }
        self.staged_fingerprinted.insert(source_id.to_string());
        self.staged_frames.extend(set.iter().map(|f| StoredFrame {
            source_id: source_id.to_string(),
            timestamp_seconds: f.timestamp_seconds,
            hash: f.hash,
        }));
        Ok(set.len())
    }

    async fn resolve(&mut self, source_id: &str) -> Result<Option<String>> {
        let state = self.store.read()?;
        Ok(self.resolve_staged(&state, source_id))
    }

    async fn incident(&mut self, canonical_id: &str) -> Result<Option<IncidentRecord>> {
        if let Some(record) = self.staged_incidents.get(canonical_id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.store.read()?.incidents.get(canonical_id).cloned())
    }

    async fn increment(&mut self, canonical_id: &str) -> Result<u32> {
        let record = self.stage_incident(canonical_id)?;
        record.resubmission_count += 1;
        Ok(record.resubmission_count)
    }

    async fn create_canonical(&mut self, source_id: &str) -> Result<IncidentRecord> {
        let existing = {
            let state = self.store.read()?;
            self.resolve_staged(&state, source_id)
        };
        if let Some(canonical) = existing {
            return Err(ReelcheckError::InvariantViolation(format!(
                "{source_id} already belongs to incident {canonical}"
            )));
        }
        let record = IncidentRecord::new(source_id, Utc::now());
        self.staged_incidents
            .insert(source_id.to_string(), record.clone());
        Ok(record)
    }

    async fn add_alias(&mut self, canonical_id: &str, alias_id: &str) -> Result<()> {
        let existing = {
            let state = self.store.read()?;
            self.resolve_staged(&state, alias_id)
        };
        if let Some(canonical) = existing {
            return Err(ReelcheckError::InvariantViolation(format!(
                "{alias_id} already belongs to incident {canonical}"
            )));
        }
        self.stage_incident(canonical_id)?
            .known_alias_ids
            .insert(alias_id.to_string());
        self.staged_aliases
            .insert(alias_id.to_string(), canonical_id.to_string());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let store = self.store;
        let mut state = store.write()?;
        let frames = self.staged_frames.len();
        let incidents = self.staged_incidents.len();

        for frame in self.staged_frames {
            let slot = state.frames.len();
            state.index.insert(slot, frame.hash);
            state.frames.push(frame);
        }
        state.fingerprinted.extend(self.staged_fingerprinted);
        state.aliases.extend(self.staged_aliases);
        state.incidents.extend(self.staged_incidents);

        debug!(frames, incidents, "Committed memory transaction");
        Ok(())
    }
}

fn rank(matches: &mut Vec<FrameMatch>, limit: usize) {
    matches.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.frame.source_id.cmp(&b.frame.source_id))
            .then(a.frame.timestamp_seconds.total_cmp(&b.frame.timestamp_seconds))
    });
    matches.truncate(limit);
}
