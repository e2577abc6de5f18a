//! Reelcheck Core - perceptual video fingerprinting and repost resolution
//!
//! This crate decides, for each submitted short video, whether it is new
//! footage, an exact resubmission of a known post, or a repost of known
//! footage under a new identifier, and keeps one canonical incident record
//! per distinct piece of footage.
//!
//! # Features
//!
//! - Fixed-interval frame sampling with a per-video frame cap
//! - 64-bit perceptual frame hashes (DCT pHash or blockhash)
//! - Hamming-distance lookups over a band index
//! - Serialized decide-and-write resolution with rollback on failure
//!
//! # Example
//!
//! ```no_run
//! use reelcheck_core::{Config, Fingerprinter, MemoryStore, Outcome, Resolver};
//!
//! # async fn example() -> reelcheck_core::Result<()> {
//! let config = Config::from_env();
//! let fingerprinter = Fingerprinter::from_config(&config)?;
//! let resolver = Resolver::new(MemoryStore::new(), config.matching)?;
//!
//! let fingerprints = fingerprinter
//!     .fingerprint_async("clip.mp4", config.sampler.interval_seconds)
//!     .await?;
//! let resolution = resolver.resolve_and_store("C3xYz", &fingerprints).await?;
//! assert_eq!(resolution.outcome, Outcome::New);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod fingerprinter;
pub mod index;
pub mod matcher;
pub mod resolver;
pub mod sampler;
pub mod source_id;
pub mod store;

// Re-export main types for convenience
pub use config::{Config, MatchConfig, SamplerConfig};
pub use error::{ReelcheckError, Result};
pub use fingerprint::{
    hamming_distance, FingerprintSet, FrameFingerprint, FrameHash, FrameHasher, FrameMatch,
    HashAlgorithm, StoredFrame,
};
pub use fingerprinter::Fingerprinter;
pub use matcher::{MatchAggregator, MatchCandidate};
pub use resolver::{Outcome, Resolution, Resolver};
pub use sampler::{FrameDecoder, FrameSampler, SampledFrame, VideoInfo};
pub use source_id::normalize_source_id;
pub use store::{IncidentRecord, IncidentStore, MemoryStore, StoreTransaction};

#[cfg(feature = "ffmpeg")]
pub use sampler::FfmpegDecoder;
