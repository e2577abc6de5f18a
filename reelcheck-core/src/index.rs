//! Byte-band index over 64-bit frame hashes.
//!
//! The hash is split into eight 8-bit bands. If two hashes differ in at most
//! seven bits, at least one band is untouched (pigeonhole), so probing the
//! eight exact-band buckets finds every neighbour within that radius without
//! scanning the whole store. Larger radii fall back to a full scan.

use std::collections::HashMap;

use crate::fingerprint::FrameHash;

/// Number of bands the hash is split into.
pub const BAND_COUNT: usize = 8;

/// Largest distance for which band probing is exhaustive.
pub const MAX_INDEXED_DISTANCE: u32 = BAND_COUNT as u32 - 1;

/// Maps band values to slots in an external frame table.
#[derive(Debug, Clone)]
pub struct BandIndex {
    bands: [HashMap<u8, Vec<usize>>; BAND_COUNT],
    len: usize,
}

impl Default for BandIndex {
    fn default() -> Self {
        Self {
            bands: std::array::from_fn(|_| HashMap::new()),
            len: 0,
        }
    }
}

impl BandIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: usize, hash: FrameHash) {
        for (i, band) in self.bands.iter_mut().enumerate() {
            band.entry(hash.band(i)).or_default().push(slot);
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Candidate slots that may lie within `max_distance` of `hash`, sorted and
    /// deduplicated. `None` means the radius is too wide for the index and the
    /// caller has to scan.
    pub fn candidates(&self, hash: FrameHash, max_distance: u32) -> Option<Vec<usize>> {
        if max_distance > MAX_INDEXED_DISTANCE {
            return None;
        }
        let mut slots: Vec<usize> = self
            .bands
            .iter()
            .enumerate()
            .filter_map(|(i, band)| band.get(&hash.band(i)))
            .flatten()
            .copied()
            .collect();
        slots.sort_unstable();
        slots.dedup();
        Some(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_neighbour_with_one_bit_per_band_flipped() {
        let base = FrameHash::new(0x1122_3344_5566_7788);
        // Seven bands touched, one left intact.
        let near = FrameHash::new(base.bits() ^ 0x0001_0101_0101_0101);
        assert_eq!(base.distance(near), 7);

        let mut index = BandIndex::new();
        index.insert(0, base);
        assert_eq!(index.candidates(near, 7), Some(vec![0]));
    }

    #[test]
    fn test_unrelated_hash_not_a_candidate() {
        let mut index = BandIndex::new();
        index.insert(0, FrameHash::new(0));
        assert_eq!(index.candidates(FrameHash::new(u64::MAX), 5), Some(vec![]));
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let mut index = BandIndex::new();
        let hash = FrameHash::new(42);
        index.insert(3, hash);
        index.insert(1, hash);
        assert_eq!(index.candidates(hash, 0), Some(vec![1, 3]));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_wide_radius_requires_scan() {
        let index = BandIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.candidates(FrameHash::new(0), 8), None);
    }
}
