//! Loop synchronizer.
//!
//! A short visual is stretched to the required length in two encodes:
//!
//! 1. `Raw -> Materialized`: the lazy graph (or raw gif) is fully encoded
//!    once to a scratch mp4.
//! 2. `Materialized -> LoopTrimmed`: that mp4 is opened with
//!    `-stream_loop -1`, capped at the required duration and rewritten with
//!    stream copy.
//!
//! A required duration shorter than the clip truncates it.

use crate::artifact::MediaArtifact;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::ffmpeg::{EngineJob, JobInput, MediaEngine};
use crate::graph::Visual;
use crate::scratch::ScratchDir;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Raw,
    Materialized,
    LoopTrimmed,
}

/// Job that loops `clip` forever, stops reading after `required_secs` and
/// copies the packets to `output`.
pub fn loop_trim_job(clip: &Path, required_secs: f64, output: &Path) -> EngineJob {
    EngineJob::new(output)
        .input(
            JobInput::new(clip)
                .option("-stream_loop", -1)
                .option("-t", required_secs),
        )
        .map("0:v:0")
        .output_args(["-c", "copy"])
        .expect_secs(required_secs)
}

/// Extends `visual` to exactly `required_secs`, writing to `output` when given
/// or to a scratch file otherwise.
pub fn extend(
    engine: &dyn MediaEngine,
    scratch: &ScratchDir,
    visual: Visual,
    required_secs: f64,
    output: Option<&Path>,
) -> PipelineResult<MediaArtifact> {
    if !(required_secs.is_finite() && required_secs > 0.0) {
        return Err(PipelineError::invalid(format!(
            "required duration must be > 0 seconds, got {required_secs}"
        )));
    }

    let mut state = LoopState::Raw;
    if matches!(visual, Visual::Materialized(_)) {
        state = LoopState::Materialized;
    }
    if visual.duration_secs() > required_secs {
        info!(
            source_secs = visual.duration_secs(),
            required_secs, "visual is longer than required, truncating"
        );
    }

    let clip = visual.materialize(engine, scratch)?;
    if state == LoopState::Raw {
        state = LoopState::Materialized;
        info!(?state, clip = %clip.path().display(), secs = clip.duration_secs(), "visual materialized");
    }

    let target = match output {
        Some(path) => path.to_path_buf(),
        None => scratch.create("mp4"),
    };
    let job = loop_trim_job(clip.path(), required_secs, &target);
    if let Err(e) = engine.run(Stage::LoopTrim, &job) {
        if output.is_some() && target.exists() {
            if let Err(rm) = std::fs::remove_file(&target) {
                warn!(path = %target.display(), error = %rm, "could not remove partial output");
            }
        }
        return Err(e);
    }

    let looped = engine.probe(&target)?;
    state = LoopState::LoopTrimmed;
    info!(?state, output = %target.display(), secs = looped.duration_secs(), "visual looped");
    Ok(looped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphNode, LazyVisual};
    use crate::testing::FakeEngine;

    fn lazy(secs: f64) -> Visual {
        Visual::Lazy(LazyVisual {
            node: GraphNode::source("eyes.gif"),
            duration_secs: secs,
            frame_rate: 24.0,
        })
    }

    #[test]
    fn materializes_then_stream_loops() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let engine = FakeEngine::default();

        let out = extend(&engine, &scratch, lazy(2.0), 12.0, None).unwrap();
        assert_eq!(out.duration_secs(), 12.0);

        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 2);
        let (first_stage, first) = &jobs[0];
        assert_eq!(*first_stage, Stage::Materialize);
        assert!(first.has_arg_pair("-c:v", "libx264"));
        assert!(!first.has_arg_pair("-stream_loop", "-1"));

        let (second_stage, second) = &jobs[1];
        assert_eq!(*second_stage, Stage::LoopTrim);
        assert_eq!(second.inputs[0].path, first.output);
        assert!(second.has_arg_pair("-stream_loop", "-1"));
        assert!(second.has_arg_pair("-t", "12"));
        assert!(second.has_arg_pair("-c", "copy"));
    }

    #[test]
    fn shorter_target_truncates_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let engine = FakeEngine::default();
        let out = extend(&engine, &scratch, lazy(5.0), 1.0, None).unwrap();
        assert_eq!(out.duration_secs(), 1.0);
    }

    #[test]
    fn materialized_input_skips_first_encode() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let engine = FakeEngine::default();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"mp4").unwrap();
        let visual = Visual::Materialized(MediaArtifact::new(&clip, 2.0, None, None));

        let target = dir.path().join("video.mp4");
        let out = extend(&engine, &scratch, visual, 7.0, Some(&target)).unwrap();
        assert_eq!(out.path(), target.as_path());
        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, Stage::LoopTrim);
    }

    #[test]
    fn failed_loop_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path().join("temp")).unwrap();
        let engine = FakeEngine::failing_at(Stage::LoopTrim);
        let target = dir.path().join("video.mp4");

        let err = extend(&engine, &scratch, lazy(2.0), 9.0, Some(&target)).unwrap_err();
        assert!(matches!(err, PipelineError::Encode { stage: Stage::LoopTrim, .. }));
        assert!(!target.exists());
    }

    #[test]
    fn failed_materialize_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let engine = FakeEngine::failing_at(Stage::Materialize);
        let err = extend(&engine, &scratch, lazy(2.0), 9.0, None).unwrap_err();
        assert!(matches!(err, PipelineError::Encode { stage: Stage::Materialize, .. }));
        assert_eq!(engine.jobs().len(), 1);
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let engine = FakeEngine::default();
        assert!(matches!(
            extend(&engine, &scratch, lazy(2.0), 0.0, None),
            Err(PipelineError::InvalidParameter(_))
        ));
        assert!(engine.jobs().is_empty());
    }
}
