//! Engine configuration
//!
//! Handles loading configuration from environment variables with sensible defaults.

use crate::error::{ReelcheckError, Result};
use crate::fingerprint::{HashAlgorithm, HASH_BITS};

/// Frame sampling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Seconds between sampled frames (default: 2.0)
    pub interval_seconds: f64,
    /// Cap on sampled frames per video; longer videos are truncated (default: 300)
    pub max_frames: usize,
    /// ffmpeg executable used to decode frames (default: "ffmpeg")
    pub ffmpeg_bin: String,
    /// ffprobe executable used to read stream metadata (default: "ffprobe")
    pub ffprobe_bin: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 2.0,
            max_frames: 300,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

/// Similarity matching configuration.
///
/// Raising `hamming_threshold` trades false positives for recall; raising
/// `min_matching_frames` lowers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    /// Max per-frame Hamming distance that still counts as a match (default: 5)
    pub hamming_threshold: u32,
    /// Matching frames required before a source is a candidate (default: 3)
    pub min_matching_frames: usize,
    /// Nearest stored frames considered per query frame (default: 100)
    pub per_frame_limit: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: 5,
            min_matching_frames: 3,
            per_frame_limit: 100,
        }
    }
}

impl MatchConfig {
    pub fn new(hamming_threshold: u32, min_matching_frames: usize) -> Self {
        Self {
            hamming_threshold,
            min_matching_frames,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hamming_threshold > HASH_BITS {
            return Err(ReelcheckError::invalid(format!(
                "hamming_threshold must be <= {HASH_BITS}, got {}",
                self.hamming_threshold
            )));
        }
        if self.min_matching_frames == 0 {
            return Err(ReelcheckError::invalid("min_matching_frames must be >= 1"));
        }
        if self.per_frame_limit == 0 {
            return Err(ReelcheckError::invalid("per_frame_limit must be >= 1"));
        }
        Ok(())
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub sampler: SamplerConfig,
    pub matching: MatchConfig,
    pub hash_algorithm: HashAlgorithm,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval_seconds = std::env::var("REELCHECK_SAMPLE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sampler.interval_seconds);

        let max_frames = std::env::var("REELCHECK_MAX_FRAMES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sampler.max_frames);

        let ffmpeg_bin =
            std::env::var("REELCHECK_FFMPEG").unwrap_or(defaults.sampler.ffmpeg_bin);

        let ffprobe_bin =
            std::env::var("REELCHECK_FFPROBE").unwrap_or(defaults.sampler.ffprobe_bin);

        let hamming_threshold = std::env::var("REELCHECK_HAMMING_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.matching.hamming_threshold);

        let min_matching_frames = std::env::var("REELCHECK_MIN_MATCHING_FRAMES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.matching.min_matching_frames);

        let per_frame_limit = std::env::var("REELCHECK_PER_FRAME_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.matching.per_frame_limit);

        let hash_algorithm = std::env::var("REELCHECK_HASH_ALGORITHM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hash_algorithm);

        Self {
            sampler: SamplerConfig {
                interval_seconds,
                max_frames,
                ffmpeg_bin,
                ffprobe_bin,
            },
            matching: MatchConfig {
                hamming_threshold,
                min_matching_frames,
                per_frame_limit,
            },
            hash_algorithm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval(self.sampler.interval_seconds)?;
        if self.sampler.max_frames == 0 {
            return Err(ReelcheckError::invalid("max_frames must be >= 1"));
        }
        self.matching.validate()
    }
}

/// Sampling interval must be a finite number of seconds greater than zero.
pub fn validate_interval(interval_seconds: f64) -> Result<()> {
    if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
        return Err(ReelcheckError::invalid(format!(
            "sampling interval must be > 0 seconds, got {interval_seconds}"
        )));
    }
    Ok(())
}
