//! Frame decoding through the `ffprobe` and `ffmpeg` executables.
//!
//! Each sample is a seek-and-grab: `ffmpeg -ss <t> -i <video> -frames:v 1`
//! writing a single PNG to stdout, which is then decoded with `image`.

use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use image::DynamicImage;
use serde::Deserialize;
use tracing::debug;

use super::{FrameDecoder, VideoInfo};
use crate::error::{ReelcheckError, Result};

/// Process-backed decoder.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    fn run(&self, bin: &str, command: &mut Command) -> Result<Output> {
        command
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ReelcheckError::invalid(format!("executable not found: {bin}"))
                }
                _ => ReelcheckError::unreadable(format!("failed to run {bin}: {e}")),
            })
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        if !path.is_file() {
            return Err(ReelcheckError::unreadable(format!(
                "video not found: {}",
                path.display()
            )));
        }

        let output = self.run(
            &self.ffprobe_bin,
            Command::new(&self.ffprobe_bin)
                .args(["-v", "error", "-select_streams", "v:0"])
                .args(["-show_entries", "stream=avg_frame_rate,duration:format=duration"])
                .args(["-of", "json"])
                .arg(path),
        )?;

        if !output.status.success() {
            return Err(ReelcheckError::unreadable(format!(
                "ffprobe rejected {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let info = parse_probe(&output.stdout)?;
        debug!(path = %path.display(), duration = info.duration_seconds, fps = info.fps, "Probed video");
        Ok(info)
    }

    fn decode_at(&self, path: &Path, timestamp_seconds: f64) -> Result<Option<DynamicImage>> {
        let output = self.run(
            &self.ffmpeg_bin,
            Command::new(&self.ffmpeg_bin)
                .args(["-v", "error", "-nostdin"])
                .args(["-ss", &format!("{timestamp_seconds:.3}")])
                .arg("-i")
                .arg(path)
                .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]),
        )?;

        if !output.status.success() {
            return Err(ReelcheckError::unreadable(format!(
                "ffmpeg failed at {timestamp_seconds}s in {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Seeking past the last frame succeeds with empty output.
        if output.stdout.is_empty() {
            return Ok(None);
        }

        image::load_from_memory(&output.stdout)
            .map(Some)
            .map_err(|e| ReelcheckError::unreadable(format!("failed to decode frame: {e}")))
    }
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| ReelcheckError::unreadable(format!("unexpected ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| ReelcheckError::unreadable("no video stream"))?;

    let duration_seconds = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration_seconds,
        fps,
    })
}

/// Parse ffprobe rationals such as `30000/1001`.
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert!((parse_rational("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("25"), Some(25.0));
        assert_eq!(parse_rational("n/a"), None);
    }

    #[test]
    fn test_parse_probe_stream_duration() {
        let json = br#"{"streams":[{"avg_frame_rate":"30/1","duration":"10.000000"}],"format":{"duration":"10.05"}}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.duration_seconds, 10.0);
        assert_eq!(info.fps, 30.0);
    }

    #[test]
    fn test_parse_probe_falls_back_to_container_duration() {
        let json = br#"{"streams":[{"avg_frame_rate":"24/1"}],"format":{"duration":"7.5"}}"#;
        assert_eq!(parse_probe(json).unwrap().duration_seconds, 7.5);
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        let json = br#"{"streams":[],"format":{"duration":"3.0"}}"#;
        assert!(matches!(
            parse_probe(json),
            Err(ReelcheckError::MediaUnreadable(_))
        ));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let decoder = FfmpegDecoder::default();
        assert!(matches!(
            decoder.probe(Path::new("/nonexistent/clip.mp4")),
            Err(ReelcheckError::MediaUnreadable(_))
        ));
    }
}
