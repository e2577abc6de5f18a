//! Frame fingerprints and the Hamming metric over them.
//!
//! A video's visual signature is a [`FingerprintSet`]: one 64-bit perceptual
//! [`FrameHash`] per sampled frame, ordered by timestamp. Two frames are
//! considered the same footage when their hashes differ in only a few bits.

pub mod hasher;

pub use hasher::{FrameHasher, HashAlgorithm};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReelcheckError, Result};

/// Width of every frame hash in bits.
pub const HASH_BITS: u32 = 64;

/// Fixed hash size in bytes.
pub const HASH_BYTES: usize = 8;

/// A 64-bit perceptual hash of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameHash(u64);

impl FrameHash {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits between two hashes.
    pub fn distance(self, other: Self) -> u32 {
        hamming_distance(self, other)
    }

    /// The `index`-th byte band, least significant first.
    pub fn band(self, index: usize) -> u8 {
        (self.0 >> (8 * index)) as u8
    }

    pub fn to_bytes(self) -> [u8; HASH_BYTES] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Build a hash from a byte slice, which must be exactly 8 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH_BYTES] = bytes.try_into().map_err(|_| {
            ReelcheckError::invalid(format!(
                "frame hash must be {HASH_BYTES} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ReelcheckError::invalid(format!("invalid hex hash: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// 64-character `0`/`1` form, most significant bit first (a `BIT(64)` literal).
    pub fn to_bit_string(self) -> String {
        format!("{:064b}", self.0)
    }

    pub fn from_bit_string(bits: &str) -> Result<Self> {
        if bits.len() != HASH_BITS as usize {
            return Err(ReelcheckError::invalid(format!(
                "bit string must be {HASH_BITS} characters, got {}",
                bits.len()
            )));
        }
        u64::from_str_radix(bits, 2)
            .map(Self)
            .map_err(|e| ReelcheckError::invalid(format!("invalid bit string: {e}")))
    }
}

impl fmt::Display for FrameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Count of differing bits between two hashes.
pub fn hamming_distance(a: FrameHash, b: FrameHash) -> u32 {
    (a.0 ^ b.0).count_ones()
}

/// One sampled frame of a video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFingerprint {
    /// Offset from the start of the video, rounded to hundredths of a second
    pub timestamp_seconds: f64,
    pub hash: FrameHash,
}

impl FrameFingerprint {
    pub fn new(timestamp_seconds: f64, hash: FrameHash) -> Self {
        Self {
            timestamp_seconds,
            hash,
        }
    }
}

/// The ordered fingerprints of one video.
///
/// Serialized as a plain list of frames; deserializing goes through
/// [`FingerprintSet::new`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<FrameFingerprint>",
    into = "Vec<FrameFingerprint>"
)]
pub struct FingerprintSet {
    frames: Vec<FrameFingerprint>,
}

impl FingerprintSet {
    /// Validate and order a batch of fingerprints.
    ///
    /// Timestamps must be finite and non-negative.
    pub fn new(mut frames: Vec<FrameFingerprint>) -> Result<Self> {
        if let Some(bad) = frames
            .iter()
            .find(|f| !f.timestamp_seconds.is_finite() || f.timestamp_seconds < 0.0)
        {
            return Err(ReelcheckError::invalid(format!(
                "frame timestamp must be finite and >= 0, got {}",
                bad.timestamp_seconds
            )));
        }
        frames.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));
        Ok(Self { frames })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[FrameFingerprint] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameFingerprint> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<FrameFingerprint> {
        self.frames
    }
}

impl TryFrom<Vec<FrameFingerprint>> for FingerprintSet {
    type Error = ReelcheckError;

    fn try_from(frames: Vec<FrameFingerprint>) -> Result<Self> {
        Self::new(frames)
    }
}

impl From<FingerprintSet> for Vec<FrameFingerprint> {
    fn from(set: FingerprintSet) -> Self {
        set.frames
    }
}

impl<'a> IntoIterator for &'a FingerprintSet {
    type Item = &'a FrameFingerprint;
    type IntoIter = std::slice::Iter<'a, FrameFingerprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// A persisted fingerprint row, tagged with its owning source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFrame {
    pub source_id: String,
    pub timestamp_seconds: f64,
    pub hash: FrameHash,
}

/// A stored frame found within some distance of a query hash.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMatch {
    pub frame: StoredFrame,
    pub distance: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical_is_zero() {
        let a = FrameHash::new(0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(hamming_distance(a, a), 0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = FrameHash::new(0x0F0F_0000_1234_FFFF);
        let b = FrameHash::new(0xF00F_1000_4321_0FFF);
        assert_eq!(a.distance(b), b.distance(a));
        assert!(a.distance(b) > 0);
    }

    #[test]
    fn test_distance_all_bits() {
        assert_eq!(FrameHash::new(0).distance(FrameHash::new(u64::MAX)), 64);
        assert_eq!(FrameHash::new(0b1011).distance(FrameHash::new(0)), 3);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = FrameHash::from_bytes([0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(hash.to_hex(), "deadbeefcafebabe");
        assert_eq!(FrameHash::from_hex("deadbeefcafebabe").unwrap(), hash);
        assert_eq!(hash.to_string(), "deadbeefcafebabe");
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(matches!(
            FrameHash::from_slice(&[0u8; 5]),
            Err(ReelcheckError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_bit_string_form() {
        let hash = FrameHash::new(1);
        let bits = hash.to_bit_string();
        assert_eq!(bits.len(), 64);
        assert!(bits.ends_with('1'));
        assert_eq!(bits.matches('1').count(), 1);
        assert_eq!(FrameHash::from_bit_string(&bits).unwrap(), hash);
        assert!(FrameHash::from_bit_string("0101").is_err());
    }

    #[test]
    fn test_bands_cover_all_bytes() {
        let hash = FrameHash::new(0x0807_0605_0403_0201);
        let bands: Vec<u8> = (0..8).map(|i| hash.band(i)).collect();
        assert_eq!(bands, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_set_is_ordered_by_timestamp() {
        let set = FingerprintSet::new(vec![
            FrameFingerprint::new(4.0, FrameHash::new(3)),
            FrameFingerprint::new(0.0, FrameHash::new(1)),
            FrameFingerprint::new(2.0, FrameHash::new(2)),
        ])
        .unwrap();
        let ts: Vec<f64> = set.iter().map(|f| f.timestamp_seconds).collect();
        assert_eq!(ts, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_set_rejects_negative_timestamp() {
        let result = FingerprintSet::new(vec![FrameFingerprint::new(-1.0, FrameHash::new(0))]);
        assert!(matches!(result, Err(ReelcheckError::InvalidParameter(_))));
    }

    #[test]
    fn test_deserialized_set_is_validated_and_ordered() {
        let set: FingerprintSet = serde_json::from_str(
            r#"[{"timestamp_seconds":2.0,"hash":2},{"timestamp_seconds":0.0,"hash":1}]"#,
        )
        .unwrap();
        let ts: Vec<f64> = set.iter().map(|f| f.timestamp_seconds).collect();
        assert_eq!(ts, vec![0.0, 2.0]);

        let negative = serde_json::from_str::<FingerprintSet>(
            r#"[{"timestamp_seconds":-1.0,"hash":1}]"#,
        );
        let err = negative.unwrap_err().to_string();
        assert!(err.contains("timestamp"), "{err}");
    }

    #[test]
    fn test_set_serializes_as_frame_list() {
        let set = FingerprintSet::new(vec![FrameFingerprint::new(0.5, FrameHash::new(7))]).unwrap();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!([{"timestamp_seconds": 0.5, "hash": 7}]));
        assert_eq!(serde_json::from_value::<FingerprintSet>(json).unwrap(), set);
    }
}
