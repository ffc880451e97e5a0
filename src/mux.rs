use crate::artifact::MediaArtifact;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::ffmpeg::{EngineJob, JobInput, MediaEngine};
use std::path::Path;
use tracing::{info, warn};

/// Largest visual/audio length difference accepted by default. The visual is
/// cut to `ceil(audio seconds)`, so it can run up to a second past the audio.
pub const DEFAULT_TOLERANCE_SECS: f64 = 1.0;

pub fn mux_job(visual: &Path, audio: &Path, output: &Path) -> EngineJob {
    EngineJob::new(output)
        .input(JobInput::new(visual))
        .input(JobInput::new(audio))
        .map("0:v:0")
        .map("1:a:0")
        .output_args(["-c", "copy"])
}

/// Combines the first video stream of `visual` and the first audio stream of
/// `audio` into `output` without re-encoding.
///
/// Nothing is written when the two durations differ by more than `tolerance`.
pub fn mux(
    engine: &dyn MediaEngine,
    visual: &MediaArtifact,
    audio: &MediaArtifact,
    output: &Path,
    tolerance: f64,
) -> PipelineResult<MediaArtifact> {
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(PipelineError::invalid(format!(
            "mux tolerance must be a non-negative number of seconds, got {tolerance}"
        )));
    }
    let drift = (visual.duration_secs() - audio.duration_secs()).abs();
    if drift > tolerance {
        return Err(PipelineError::Mux(format!(
            "visual is {:.3}s but audio is {:.3}s (difference {drift:.3}s exceeds {tolerance}s)",
            visual.duration_secs(),
            audio.duration_secs()
        )));
    }

    info!(
        visual = %visual.path().display(),
        audio = %audio.path().display(),
        output = %output.display(),
        "muxing"
    );
    if let Err(e) = engine.run(Stage::Mux, &mux_job(visual.path(), audio.path(), output)) {
        if output.exists() {
            if let Err(rm) = std::fs::remove_file(output) {
                warn!(path = %output.display(), error = %rm, "could not remove partial output");
            }
        }
        return Err(e);
    }
    engine.probe(output)
}
