//! Fixed-interval frame sampling.
//!
//! [`FrameSampler`] probes a video once and then decodes frames lazily at
//! `0, interval, 2 * interval, ...` up to the video's duration. The resulting
//! [`SampledVideo`] can be iterated any number of times; each call to
//! [`SampledVideo::frames`] restarts from the first timestamp.
//!
//! Decoding goes through the [`FrameDecoder`] trait so the sampling policy is
//! independent of the media backend.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::config::{validate_interval, SamplerConfig};
use crate::error::{ReelcheckError, Result};

/// Stream metadata needed to plan sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Duration in seconds; 0 when unknown or a single still frame.
    pub duration_seconds: f64,
    /// Average frame rate; 0 when unknown.
    pub fps: f64,
}

/// Media backend able to read stream metadata and decode single frames.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait FrameDecoder: Send + Sync {
    /// Read duration and frame rate. Fails with `MediaUnreadable` if the
    /// video cannot be opened.
    fn probe(&self, path: &Path) -> Result<VideoInfo>;

    /// Decode the frame shown at `timestamp_seconds`.
    ///
    /// Returns `Ok(None)` when the timestamp lies past the last decodable frame.
    fn decode_at(&self, path: &Path, timestamp_seconds: f64) -> Result<Option<DynamicImage>>;
}

/// One decoded sample.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub timestamp_seconds: f64,
    pub image: DynamicImage,
}

/// Samples frames from videos at a fixed cadence.
#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn FrameDecoder>,
    max_frames: usize,
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn FrameDecoder>, max_frames: usize) -> Result<Self> {
        if max_frames == 0 {
            return Err(ReelcheckError::invalid("max_frames must be >= 1"));
        }
        Ok(Self {
            decoder,
            max_frames,
        })
    }

    /// Sampler backed by the ffmpeg/ffprobe executables named in `config`.
    #[cfg(feature = "ffmpeg")]
    pub fn ffmpeg(config: &SamplerConfig) -> Result<Self> {
        let decoder = FfmpegDecoder::new(&config.ffmpeg_bin, &config.ffprobe_bin);
        Self::new(Arc::new(decoder), config.max_frames)
    }

    pub fn from_config(decoder: Arc<dyn FrameDecoder>, config: &SamplerConfig) -> Result<Self> {
        validate_interval(config.interval_seconds)?;
        Self::new(decoder, config.max_frames)
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Probe `path` and plan the sample timestamps.
    ///
    /// No frame is decoded until the returned video is iterated.
    pub fn sample(
        &self,
        path: impl AsRef<Path>,
        interval_seconds: f64,
    ) -> Result<SampledVideo<'_>> {
        validate_interval(interval_seconds)?;
        let path = path.as_ref();
        let info = self.decoder.probe(path)?;

        let (timestamps, truncated) =
            plan_timestamps(info.duration_seconds, interval_seconds, self.max_frames);
        if truncated {
            warn!(
                path = %path.display(),
                duration = info.duration_seconds,
                max_frames = self.max_frames,
                "Video exceeds frame cap, sampling truncated"
            );
        }
        debug!(
            path = %path.display(),
            duration = info.duration_seconds,
            fps = info.fps,
            frames = timestamps.len(),
            "Planned frame samples"
        );

        Ok(SampledVideo {
            decoder: self.decoder.as_ref(),
            path: path.to_path_buf(),
            info,
            timestamps,
        })
    }
}

impl std::fmt::Debug for FrameSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSampler")
            .field("max_frames", &self.max_frames)
            .finish()
    }
}

/// A probed video with its sampling plan.
pub struct SampledVideo<'a> {
    decoder: &'a dyn FrameDecoder,
    path: PathBuf,
    info: VideoInfo,
    timestamps: Vec<f64>,
}

impl SampledVideo<'_> {
    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// Planned sample timestamps (the actual sequence may end earlier if the
    /// stream runs out of decodable frames).
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Lazily decode the planned frames from the start.
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            decoder: self.decoder,
            path: &self.path,
            timestamps: &self.timestamps,
            next: 0,
            done: false,
        }
    }
}

/// Iterator over decoded samples. Fused after the first error or end of stream.
pub struct Frames<'a> {
    decoder: &'a dyn FrameDecoder,
    path: &'a Path,
    timestamps: &'a [f64],
    next: usize,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(&timestamp_seconds) = self.timestamps.get(self.next) else {
            self.done = true;
            return None;
        };
        let index = self.next;
        self.next += 1;

        match self.decoder.decode_at(self.path, timestamp_seconds) {
            Ok(Some(image)) => Some(Ok(SampledFrame {
                timestamp_seconds,
                image,
            })),
            Ok(None) if index == 0 => {
                self.done = true;
                Some(Err(ReelcheckError::unreadable(format!(
                    "no decodable frame in {}",
                    self.path.display()
                ))))
            }
            Ok(None) => {
                debug!(timestamp = timestamp_seconds, "Stream ended before planned sample");
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.timestamps.len() - self.next))
        }
    }
}

impl std::iter::FusedIterator for Frames<'_> {}

/// Sample timestamps for a video of `duration_seconds`.
///
/// Always yields at least `[0.0]`, strictly increasing. Returns `true`
/// alongside the plan when the cap cut it short.
pub fn plan_timestamps(
    duration_seconds: f64,
    interval_seconds: f64,
    max_frames: usize,
) -> (Vec<f64>, bool) {
    let duration = if duration_seconds.is_finite() && duration_seconds > 0.0 {
        duration_seconds
    } else {
        0.0
    };

    // Tolerance keeps 10.0 / 2.0 at five samples despite float noise.
    // An overflowing quotient is +inf and counts as over the cap.
    let wanted = ((duration / interval_seconds) - 1e-9).ceil();
    let truncated = wanted > max_frames as f64;
    let count = if truncated {
        max_frames
    } else if wanted >= 1.0 {
        wanted as usize
    } else {
        1
    }
    .max(1);

    let mut timestamps: Vec<f64> = (0..count)
        .map(|i| round_hundredths(i as f64 * interval_seconds))
        .collect();
    // Sub-centisecond intervals round several samples onto the same offset.
    timestamps.dedup();
    (timestamps, truncated)
}

fn round_hundredths(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubDecoder {
        duration: f64,
        decodable_until: f64,
        decodes: AtomicUsize,
    }

    impl StubDecoder {
        fn new(duration: f64) -> Self {
            Self {
                duration,
                decodable_until: duration,
                decodes: AtomicUsize::new(0),
            }
        }
    }

    impl FrameDecoder for StubDecoder {
        fn probe(&self, _path: &Path) -> Result<VideoInfo> {
            Ok(VideoInfo {
                duration_seconds: self.duration,
                fps: 30.0,
            })
        }

        fn decode_at(
            &self,
            _path: &Path,
            timestamp_seconds: f64,
        ) -> Result<Option<DynamicImage>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            if timestamp_seconds > self.decodable_until {
                return Ok(None);
            }
            Ok(Some(DynamicImage::ImageRgb8(RgbImage::new(4, 4))))
        }
    }

    #[test]
    fn test_plan_ten_second_clip() {
        let (ts, truncated) = plan_timestamps(10.0, 2.0, 300);
        assert_eq!(ts, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert!(!truncated);
    }

    #[test]
    fn test_plan_partial_interval_includes_tail() {
        let (ts, _) = plan_timestamps(10.5, 2.0, 300);
        assert_eq!(ts.last().copied(), Some(10.0));
        assert_eq!(ts.len(), 6);
    }

    #[test]
    fn test_plan_zero_duration_yields_first_frame() {
        assert_eq!(plan_timestamps(0.0, 2.0, 300).0, vec![0.0]);
        assert_eq!(plan_timestamps(f64::NAN, 2.0, 300).0, vec![0.0]);
    }

    #[test]
    fn test_plan_truncates_at_cap() {
        let (ts, truncated) = plan_timestamps(3600.0, 2.0, 10);
        assert_eq!(ts.len(), 10);
        assert!(truncated);

        let (ts, truncated) = plan_timestamps(20.0, 2.0, 10);
        assert_eq!(ts.len(), 10);
        assert!(!truncated);
    }

    #[test]
    fn test_plan_rounds_to_hundredths() {
        let (ts, _) = plan_timestamps(1.0, 0.333, 300);
        assert_eq!(ts, vec![0.0, 0.33, 0.67, 1.0]);
    }

    #[test]
    fn test_plan_overflowing_frame_count_hits_cap() {
        let (ts, truncated) = plan_timestamps(10.0, 5e-324, 300);
        assert!(truncated);
        assert_eq!(ts, vec![0.0]);

        let (ts, truncated) = plan_timestamps(f64::MAX, 0.5, 50);
        assert!(truncated);
        assert_eq!(ts.len(), 50);
        assert_eq!(ts.last().copied(), Some(24.5));
    }

    #[test]
    fn test_plan_sub_centisecond_interval_has_no_duplicates() {
        let (ts, truncated) = plan_timestamps(1.0, 0.004, 300);
        assert!(!truncated);
        assert_eq!(ts.first().copied(), Some(0.0));
        assert_eq!(ts.last().copied(), Some(1.0));
        assert!(ts.windows(2).all(|w| w[0] < w[1]), "{ts:?}");
        assert_eq!(ts.len(), 101);
    }

    #[test]
    fn test_sample_rejects_bad_interval() {
        let sampler = FrameSampler::new(Arc::new(StubDecoder::new(10.0)), 300).unwrap();
        assert!(matches!(
            sampler.sample("clip.mp4", 0.0),
            Err(ReelcheckError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_frames_are_lazy_and_restartable() {
        let decoder = Arc::new(StubDecoder::new(10.0));
        let sampler = FrameSampler::new(decoder.clone(), 300).unwrap();
        let video = sampler.sample("clip.mp4", 2.0).unwrap();
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 0);

        let first: Vec<f64> = video
            .frames()
            .map(|f| f.unwrap().timestamp_seconds)
            .collect();
        let second: Vec<f64> = video
            .frames()
            .map(|f| f.unwrap().timestamp_seconds)
            .collect();
        assert_eq!(first, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(first, second);
        assert_eq!(decoder.decodes.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_stream_ending_early_truncates() {
        let decoder = StubDecoder {
            duration: 10.0,
            decodable_until: 5.0,
            decodes: AtomicUsize::new(0),
        };
        let sampler = FrameSampler::new(Arc::new(decoder), 300).unwrap();
        let video = sampler.sample("clip.mp4", 2.0).unwrap();
        let frames: Vec<_> = video.frames().collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_undecodable_first_frame_is_unreadable() {
        let decoder = StubDecoder {
            duration: 10.0,
            decodable_until: -1.0,
            decodes: AtomicUsize::new(0),
        };
        let sampler = FrameSampler::new(Arc::new(decoder), 300).unwrap();
        let video = sampler.sample("clip.mp4", 2.0).unwrap();
        let mut frames = video.frames();
        assert!(matches!(
            frames.next(),
            Some(Err(ReelcheckError::MediaUnreadable(_)))
        ));
        assert!(frames.next().is_none());
    }
}
