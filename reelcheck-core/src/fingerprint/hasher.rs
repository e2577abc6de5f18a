//! Perceptual hashing for sampled frames.
//!
//! Frames that differ only by re-encoding, scaling or a mild brightness shift
//! land within a few bits of each other, while unrelated frames disagree on
//! roughly half of the 64 bits.
//!
//! # Algorithms
//!
//! - **PHash** (default): 16×16 greyscale downscale, DCT, keep the 8×8
//!   low-frequency block, threshold each coefficient against the median.
//! - **Blockhash64**: grid-based mean thresholding, also 64 bits.
//!
//! The algorithm is fixed per deployment. Hashes from different algorithms are
//! not comparable.
//!
//! # Usage
//!
//! ```no_run
//! use reelcheck_core::fingerprint::{FrameHasher, HashAlgorithm};
//!
//! let frame = image::open("frame.png").unwrap();
//! let hasher = FrameHasher::new(HashAlgorithm::PHash);
//! let hash = hasher.hash_image(&frame);
//! println!("{}", hash.to_bit_string());
//! ```

use std::str::FromStr;

use blockhash::{blockhash64, Blockhash64};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

use super::{FrameHash, HASH_BYTES};
use crate::error::ReelcheckError;

/// Perceptual hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// DCT-based pHash over an 8×8 coefficient grid, median threshold.
    #[default]
    PHash,
    /// Blockhash with a consistent 64-bit output.
    Blockhash64,
}

impl FromStr for HashAlgorithm {
    type Err = ReelcheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phash" => Ok(Self::PHash),
            "blockhash" | "blockhash64" => Ok(Self::Blockhash64),
            other => Err(ReelcheckError::InvalidParameter(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}

/// Stateless, deterministic frame hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameHasher {
    algorithm: HashAlgorithm,
}

impl FrameHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Compute the 64-bit fingerprint of a decoded frame.
    pub fn hash_image(&self, image: &DynamicImage) -> FrameHash {
        match self.algorithm {
            HashAlgorithm::PHash => {
                let hasher = HasherConfig::new()
                    .hash_size(8, 8)
                    .hash_alg(HashAlg::Median)
                    .preproc_dct()
                    .to_hasher();
                let hash = hasher.hash_image(image);
                let mut bytes = [0u8; HASH_BYTES];
                for (dst, src) in bytes.iter_mut().zip(hash.as_bytes()) {
                    *dst = *src;
                }
                FrameHash::from_bytes(bytes)
            }
            HashAlgorithm::Blockhash64 => {
                let hash: Blockhash64 = blockhash64(image);
                let bytes: [u8; 8] = hash.into();
                FrameHash::from_bytes(bytes)
            }
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};

    /// 8×8 grid of grey cells with pseudo-random levels in 40..216.
    fn cells(size: u32, seed: u64) -> DynamicImage {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let levels: Vec<u8> = (0..64)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                40 + ((state >> 33) % 176) as u8
            })
            .collect();
        let cell = size / 8;
        let img: RgbImage = ImageBuffer::from_fn(size, size, |x, y| {
            let v = levels[((y / cell) * 8 + x / cell) as usize];
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_default_algorithm() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::PHash);
        assert_eq!(FrameHasher::default().algorithm(), HashAlgorithm::PHash);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("phash".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::PHash);
        assert_eq!(
            "Blockhash64".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Blockhash64
        );
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let frame = cells(128, 1);
        for algorithm in [HashAlgorithm::PHash, HashAlgorithm::Blockhash64] {
            let hasher = FrameHasher::new(algorithm);
            assert_eq!(hasher.hash_image(&frame), hasher.hash_image(&frame));
        }
    }

    #[test]
    fn test_phash_sets_about_half_the_bits() {
        let hasher = FrameHasher::new(HashAlgorithm::PHash);
        for seed in 0..8 {
            let ones = hasher.hash_image(&cells(256, seed)).bits().count_ones();
            assert!((24..=40).contains(&ones), "seed {seed}: {ones} bits set");
        }
    }

    #[test]
    fn test_rescaled_frame_stays_close() {
        let frame = cells(256, 2);
        let smaller = frame.resize_exact(128, 128, image::imageops::FilterType::Triangle);
        let hasher = FrameHasher::default();
        let distance = hasher.hash_image(&frame).distance(hasher.hash_image(&smaller));
        assert!(distance <= 5, "rescale moved the hash by {distance} bits");
    }
}
