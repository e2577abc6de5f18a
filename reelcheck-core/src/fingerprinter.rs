//! Video → fingerprint set pipeline (Frame Sampler + Hash Extractor).

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{ReelcheckError, Result};
use crate::fingerprint::{FingerprintSet, FrameFingerprint, FrameHasher, HashAlgorithm};
use crate::sampler::FrameSampler;

/// Samples a video and hashes every sampled frame.
///
/// Stateless between calls and cheap to clone; independent videos can be
/// fingerprinted in parallel.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    sampler: FrameSampler,
    hasher: FrameHasher,
}

impl Fingerprinter {
    pub fn new(sampler: FrameSampler, hasher: FrameHasher) -> Self {
        Self { sampler, hasher }
    }

    /// ffmpeg-backed fingerprinter built from `config`.
    #[cfg(feature = "ffmpeg")]
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            FrameSampler::ffmpeg(&config.sampler)?,
            FrameHasher::new(config.hash_algorithm),
        ))
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.hasher.algorithm()
    }

    /// Fingerprint `path`, one hash per `interval_seconds`.
    ///
    /// Fails with `InvalidParameter` for a non-positive interval and with
    /// `MediaUnreadable` when the video cannot be opened or decoded.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn fingerprint(
        &self,
        path: impl AsRef<Path>,
        interval_seconds: f64,
    ) -> Result<FingerprintSet> {
        let video = self.sampler.sample(path.as_ref(), interval_seconds)?;

        let mut frames = Vec::with_capacity(video.timestamps().len());
        for sample in video.frames() {
            let sample = sample?;
            let hash = self.hasher.hash_image(&sample.image);
            debug!(timestamp = sample.timestamp_seconds, hash = %hash, "Hashed frame");
            frames.push(FrameFingerprint::new(sample.timestamp_seconds, hash));
        }

        let set = FingerprintSet::new(frames)?;
        info!(
            frames = set.len(),
            duration = video.info().duration_seconds,
            algorithm = ?self.hasher.algorithm(),
            "Fingerprinted video"
        );
        Ok(set)
    }

    /// [`fingerprint`](Self::fingerprint) on the blocking thread pool.
    pub async fn fingerprint_async(
        &self,
        path: impl AsRef<Path>,
        interval_seconds: f64,
    ) -> Result<FingerprintSet> {
        let this = self.clone();
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || this.fingerprint(path, interval_seconds))
            .await
            .map_err(|e| ReelcheckError::unreadable(format!("fingerprint task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{FrameDecoder, VideoInfo};
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::Arc;

    /// Horizontal gradient whose direction flips every other second.
    struct GradientDecoder {
        duration: f64,
    }

    impl FrameDecoder for GradientDecoder {
        fn probe(&self, _path: &Path) -> Result<VideoInfo> {
            Ok(VideoInfo {
                duration_seconds: self.duration,
                fps: 25.0,
            })
        }

        fn decode_at(&self, _path: &Path, t: f64) -> Result<Option<DynamicImage>> {
            let flip = (t as u32 / 2) % 2 == 1;
            let img = GrayImage::from_fn(64, 64, |x, _| {
                let v = (x * 4) as u8;
                Luma([if flip { 255 - v } else { v }])
            });
            Ok(Some(DynamicImage::ImageLuma8(img)))
        }
    }

    fn fingerprinter(duration: f64) -> Fingerprinter {
        let sampler = FrameSampler::new(Arc::new(GradientDecoder { duration }), 300).unwrap();
        Fingerprinter::new(sampler, FrameHasher::default())
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let fp = fingerprinter(10.0);
        let a = fp.fingerprint("clip.mp4", 2.0).unwrap();
        let b = fp.fingerprint("clip.mp4", 2.0).unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_duration_yields_one_frame() {
        let set = fingerprinter(0.0).fingerprint("still.mp4", 2.0).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.frames()[0].timestamp_seconds, 0.0);
    }

    #[test]
    fn test_invalid_interval() {
        assert!(matches!(
            fingerprinter(10.0).fingerprint("clip.mp4", -1.0),
            Err(ReelcheckError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_fingerprint_async_matches_sync() {
        let fp = fingerprinter(6.0);
        let sync = fp.fingerprint("clip.mp4", 2.0).unwrap();
        let async_set = fp.fingerprint_async("clip.mp4", 2.0).await.unwrap();
        assert_eq!(sync, async_set);
    }
}
