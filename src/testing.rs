//! In-memory stand-ins for the engine and palette.
//!
//! `FakeEngine` records every job, writes a placeholder file for each output
//! and answers probes from what it has seen, so the orchestration can be
//! exercised without ffmpeg on the machine.

use crate::artifact::{AudioStreamInfo, MediaArtifact, VideoStreamInfo};
use crate::audio::AudioBuffer;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::ffmpeg::{EngineJob, MediaEngine};
use crate::palette::Palette;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const FAKE_WIDTH: u32 = 1920;
pub const FAKE_HEIGHT: u32 = 1080;
pub const FAKE_FRAME_RATE: f64 = 24.0;

#[derive(Default)]
pub struct FakeEngine {
    fail_at: Option<Stage>,
    jobs: RefCell<Vec<(Stage, EngineJob)>>,
    artifacts: RefCell<HashMap<PathBuf, MediaArtifact>>,
    audio: RefCell<HashMap<PathBuf, AudioBuffer>>,
    probes: Cell<usize>,
}

impl FakeEngine {
    /// An engine whose `run` fails at `stage` after writing a partial output.
    pub fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn seed_audio(&self, path: &Path, audio: AudioBuffer, bit_rate: Option<u64>) {
        std::fs::write(path, b"audio").unwrap();
        self.store_audio(path, audio, bit_rate);
    }

    pub fn seed_video(&self, artifact: MediaArtifact) {
        std::fs::write(artifact.path(), b"video").unwrap();
        self.artifacts
            .borrow_mut()
            .insert(artifact.path().to_path_buf(), artifact);
    }

    pub fn audio_at(&self, path: &Path) -> Option<AudioBuffer> {
        self.audio.borrow().get(path).cloned()
    }

    pub fn bit_rate_at(&self, path: &Path) -> Option<u64> {
        self.artifacts
            .borrow()
            .get(path)
            .and_then(|a| a.audio())
            .and_then(|a| a.bit_rate)
    }

    pub fn jobs(&self) -> Vec<(Stage, EngineJob)> {
        self.jobs.borrow().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.get()
    }

    fn store_audio(&self, path: &Path, audio: AudioBuffer, bit_rate: Option<u64>) {
        let artifact = MediaArtifact::new(
            path,
            audio.duration_secs(),
            None,
            Some(AudioStreamInfo {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bit_rate,
            }),
        );
        self.artifacts
            .borrow_mut()
            .insert(path.to_path_buf(), artifact);
        self.audio.borrow_mut().insert(path.to_path_buf(), audio);
    }

    /// Output length: the expected duration, else the first input's `-t`,
    /// else the longest known input.
    fn output_secs(&self, job: &EngineJob) -> f64 {
        if let Some(secs) = job.expected_secs {
            return secs;
        }
        let capped = job.inputs.iter().find_map(|input| {
            input
                .options
                .windows(2)
                .find(|w| w[0] == "-t")
                .and_then(|w| w[1].parse::<f64>().ok())
        });
        if let Some(secs) = capped {
            return secs;
        }
        let artifacts = self.artifacts.borrow();
        job.inputs
            .iter()
            .filter_map(|input| artifacts.get(&input.path))
            .map(MediaArtifact::duration_secs)
            .fold(0.0, f64::max)
    }
}

impl MediaEngine for FakeEngine {
    fn run(&self, stage: Stage, job: &EngineJob) -> PipelineResult<()> {
        self.jobs.borrow_mut().push((stage, job.clone()));
        std::fs::write(&job.output, b"partial").map_err(|e| PipelineError::io(&job.output, e))?;
        if self.fail_at == Some(stage) {
            return Err(PipelineError::encode(stage, "simulated failure"));
        }

        let secs = self.output_secs(job);
        let audio = {
            let artifacts = self.artifacts.borrow();
            job.inputs
                .iter()
                .filter_map(|input| artifacts.get(&input.path))
                .find_map(|a| a.audio().cloned())
        };
        let audio = if job.output_options.iter().any(|o| o == "-an") {
            None
        } else {
            audio
        };
        let artifact = MediaArtifact::new(
            &job.output,
            secs,
            Some(VideoStreamInfo {
                width: FAKE_WIDTH,
                height: FAKE_HEIGHT,
                frame_count: Some((secs * FAKE_FRAME_RATE).round() as u64),
                frame_rate: FAKE_FRAME_RATE,
            }),
            audio,
        );
        self.artifacts
            .borrow_mut()
            .insert(job.output.clone(), artifact);
        Ok(())
    }

    fn probe(&self, path: &Path) -> PipelineResult<MediaArtifact> {
        self.probes.set(self.probes.get() + 1);
        self.artifacts
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::Probe(format!("'{}' was never produced", path.display())))
    }

    fn decode_audio(&self, source: &MediaArtifact) -> PipelineResult<AudioBuffer> {
        self.audio_at(source.path()).ok_or_else(|| {
            PipelineError::Decode(format!("no audio stream in '{}'", source.path().display()))
        })
    }

    fn encode_audio(
        &self,
        audio: &AudioBuffer,
        output: &Path,
        bit_rate: Option<u64>,
    ) -> PipelineResult<()> {
        if self.fail_at == Some(Stage::AudioEncode) {
            return Err(PipelineError::encode(Stage::AudioEncode, "simulated failure"));
        }
        std::fs::write(output, b"audio").map_err(|e| PipelineError::io(output, e))?;
        self.store_audio(output, audio.clone(), bit_rate);
        Ok(())
    }
}

/// Palette that always answers with the same colour.
pub struct FixedPalette {
    color: [u8; 3],
    calls: Cell<usize>,
}

impl FixedPalette {
    pub fn new(color: [u8; 3]) -> Self {
        Self {
            color,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Palette for FixedPalette {
    fn representative_color(&self, _image: &Path, _quality: u32) -> PipelineResult<[u8; 3]> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.color)
    }
}
