//! Media artifacts and the ffprobe JSON they are derived from.
//!
//! An artifact is a file plus the metadata probed from it. Artifacts are
//! never edited in place: a step that changes a file's duration or content
//! writes a new file and probes a new artifact.

use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: Option<u64>,
    pub frame_rate: f64,
}

impl VideoStreamInfo {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtifact {
    path: PathBuf,
    duration_secs: f64,
    video: Option<VideoStreamInfo>,
    audio: Option<AudioStreamInfo>,
}

impl MediaArtifact {
    pub fn new(
        path: impl Into<PathBuf>,
        duration_secs: f64,
        video: Option<VideoStreamInfo>,
        audio: Option<AudioStreamInfo>,
    ) -> Self {
        Self {
            path: path.into(),
            duration_secs,
            video,
            audio,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn video(&self) -> Option<&VideoStreamInfo> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioStreamInfo> {
        self.audio.as_ref()
    }

    /// Video metadata, or `Probe` when the file carries no usable video stream.
    pub fn require_video(&self) -> PipelineResult<&VideoStreamInfo> {
        self.video.as_ref().ok_or_else(|| {
            PipelineError::Probe(format!(
                "no decodable video stream in '{}'",
                self.path.display()
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    coded_width: Option<u32>,
    coded_height: Option<u32>,
    nb_frames: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

/// Builds an artifact from `ffprobe -print_format json -show_format -show_streams`.
pub fn parse_probe_json(path: &Path, json: &str) -> PipelineResult<MediaArtifact> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| PipelineError::Probe(format!("{}: {e}", path.display())))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_secs = parse_f64(probe.format.duration.as_deref())
        .or_else(|| video_stream.and_then(|s| parse_f64(s.duration.as_deref())))
        .or_else(|| audio_stream.and_then(|s| parse_f64(s.duration.as_deref())))
        .filter(|d| *d > 0.0)
        .ok_or_else(|| {
            PipelineError::Probe(format!("no duration reported for '{}'", path.display()))
        })?;

    let video = match video_stream {
        Some(s) => Some(video_info(path, s, duration_secs)?),
        None => None,
    };

    let audio = audio_stream.and_then(|s| {
        let sample_rate = s.sample_rate.as_deref()?.parse().ok()?;
        let channels = s.channels?;
        let bit_rate = parse_u64(s.bit_rate.as_deref())
            .or_else(|| parse_u64(probe.format.bit_rate.as_deref()));
        Some(AudioStreamInfo {
            sample_rate,
            channels,
            bit_rate,
        })
    });

    Ok(MediaArtifact::new(path, duration_secs, video, audio))
}

fn video_info(path: &Path, s: &ProbeStream, duration_secs: f64) -> PipelineResult<VideoStreamInfo> {
    let width = s.coded_width.filter(|w| *w > 0).or(s.width);
    let height = s.coded_height.filter(|h| *h > 0).or(s.height);
    let (Some(width), Some(height)) = (width, height) else {
        return Err(PipelineError::Probe(format!(
            "video stream in '{}' has no dimensions",
            path.display()
        )));
    };
    if width == 0 || height == 0 {
        return Err(PipelineError::Probe(format!(
            "video stream in '{}' has zero dimensions",
            path.display()
        )));
    }

    let frame_count = parse_u64(s.nb_frames.as_deref()).filter(|n| *n > 0);
    let frame_rate = match frame_count {
        Some(n) => n as f64 / duration_secs,
        None => parse_rational(s.avg_frame_rate.as_deref())
            .or_else(|| parse_rational(s.r_frame_rate.as_deref()))
            .ok_or_else(|| {
                PipelineError::Probe(format!(
                    "no frame count or frame rate for '{}'",
                    path.display()
                ))
            })?,
    };

    Ok(VideoStreamInfo {
        width,
        height,
        frame_count,
        frame_rate,
    })
}

fn parse_f64(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_u64(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok()
}

/// Parses ffprobe's `num/den` rates, rejecting the `0/0` placeholder.
fn parse_rational(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
