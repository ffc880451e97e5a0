//! One run of the whole pipeline: audio in, looped visual over a canvas, one
//! muxed video out.

use crate::acquire::acquire;
use crate::audio::{EffectRegistry, apply_chain};
use crate::cli::{AppConfig, default_output};
use crate::compose::{CompositionConfig, compose};
use crate::dimensions::{CANVAS_HEIGHT, CANVAS_WIDTH, check_padding};
use crate::error::{PipelineError, PipelineResult, ensure_input};
use crate::ffmpeg::MediaEngine;
use crate::looping::extend;
use crate::mux::mux;
use crate::palette::Palette;
use crate::scratch::ScratchDir;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub output: PathBuf,
    pub duration_secs: f64,
    /// Whole seconds the visual was looped to.
    pub required_secs: u32,
}

pub struct Session<'a> {
    config: &'a AppConfig,
    engine: &'a dyn MediaEngine,
    palette: &'a dyn Palette,
    registry: EffectRegistry,
    yt_dlp: Option<PathBuf>,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a AppConfig, engine: &'a dyn MediaEngine, palette: &'a dyn Palette) -> Self {
        Self {
            config,
            engine,
            palette,
            registry: EffectRegistry::builtin(),
            yt_dlp: None,
        }
    }

    /// Downloader used for remote audio locators.
    pub fn with_downloader(mut self, yt_dlp: Option<PathBuf>) -> Self {
        self.yt_dlp = yt_dlp;
        self
    }

    pub fn run(&self) -> PipelineResult<SessionReport> {
        let config = self.config;
        let effects = self.registry.resolve(&config.effects)?;
        check_padding(CANVAS_WIDTH, CANVAS_HEIGHT, config.pad_x, config.pad_y)?;
        if !(config.mux_tolerance.is_finite() && config.mux_tolerance >= 0.0) {
            return Err(PipelineError::invalid(format!(
                "mux tolerance must be a non-negative number of seconds, got {}",
                config.mux_tolerance
            )));
        }
        ensure_input(&config.visual)?;

        ScratchDir::scoped(&config.work_dir, |scratch| {
            let named = [
                ("output", config.output.as_deref()),
                ("audio output", config.audio_output.as_deref()),
                ("video output", config.video_output.as_deref()),
            ];
            for (what, path) in named {
                if let Some(path) = path.filter(|p| scratch.holds(p)) {
                    return Err(PipelineError::invalid(format!(
                        "{what} '{}' is inside the work directory, which is emptied after the run",
                        path.display()
                    )));
                }
            }
            if scratch.holds(&config.download_dir.join("audio")) {
                return Err(PipelineError::invalid(
                    "the download directory cannot be the work directory",
                ));
            }

            let acquired = acquire(&config.audio, &config.download_dir, self.yt_dlp.as_deref())?;

            let audio_target = match &config.audio_output {
                Some(path) => path.clone(),
                None => scratch.create(
                    acquired
                        .path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("mp3"),
                ),
            };
            let final_audio = apply_chain(self.engine, scratch, &acquired.path, &effects, &audio_target)?;
            if let Some(keep) = &config.audio_output {
                if final_audio != *keep {
                    std::fs::copy(&final_audio, keep).map_err(|e| PipelineError::io(keep, e))?;
                    info!(path = %keep.display(), "unprocessed audio kept");
                }
            }
            let audio = self.engine.probe(&final_audio)?;
            let required_secs = (audio.duration_secs().ceil() as u32).max(1);
            info!(
                audio = %final_audio.display(),
                secs = audio.duration_secs(),
                required_secs,
                "audio ready"
            );

            let source = self.engine.probe(&config.visual)?;
            let composition = CompositionConfig::new(
                &config.visual,
                required_secs,
                config.pad_x,
                config.pad_y,
                config.background,
            )?;
            let visual = compose(self.engine, self.palette, scratch, &composition, &source)?;
            let looped = extend(
                self.engine,
                scratch,
                visual,
                required_secs as f64,
                config.video_output.as_deref(),
            )?;

            let output = config
                .output
                .clone()
                .unwrap_or_else(|| default_output(&acquired.title));
            let muxed = mux(self.engine, &looped, &audio, &output, config.mux_tolerance)?;
            info!(output = %output.display(), secs = muxed.duration_secs(), "video written");

            Ok(SessionReport {
                output,
                duration_secs: muxed.duration_secs(),
                required_secs,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{MediaArtifact, VideoStreamInfo};
    use crate::audio::EffectSpec;
    use crate::audio::tests::sine;
    use crate::compose::Background;
    use crate::error::Stage;
    use crate::testing::{FakeEngine, FixedPalette};
    use std::path::Path;

    fn config(dir: &Path, effects: Vec<EffectSpec>) -> AppConfig {
        AppConfig {
            audio: dir.join("song.mp3").to_string_lossy().into_owned(),
            visual: dir.join("eyes.gif"),
            output: Some(dir.join("final.mp4")),
            effects,
            pad_x: 75,
            pad_y: 75,
            background: Background::FromSource,
            work_dir: dir.join("temp"),
            audio_output: None,
            video_output: None,
            download_dir: dir.to_path_buf(),
            mux_tolerance: 1.0,
            verbose: false,
            ffmpeg: None,
            ffprobe: None,
            yt_dlp: None,
        }
    }

    fn seed(engine: &FakeEngine, dir: &Path) {
        engine.seed_audio(&dir.join("song.mp3"), sine(8000, 2, 2.5, 440.0), Some(128_000));
        engine.seed_video(MediaArtifact::new(
            dir.join("eyes.gif"),
            2.0,
            Some(VideoStreamInfo {
                width: 498,
                height: 280,
                frame_count: Some(48),
                frame_rate: 24.0,
            }),
            None,
        ));
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("temp")).unwrap().count()
    }

    #[test]
    fn full_run_produces_output_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        seed(&engine, dir.path());
        let palette = FixedPalette::new([40, 10, 90]);
        let cfg = config(dir.path(), vec![EffectSpec::new("reverb", 0.15)]);

        let report = Session::new(&cfg, &engine, &palette).run().unwrap();

        assert_eq!(report.output, dir.path().join("final.mp4"));
        assert_eq!(report.required_secs, 3);
        assert!(report.output.exists());
        assert_eq!(temp_files(dir.path()), 0);
        assert_eq!(palette.calls(), 1);

        let stages: Vec<Stage> = engine.jobs().into_iter().map(|(s, _)| s).collect();
        assert_eq!(stages, [Stage::Materialize, Stage::LoopTrim, Stage::Mux]);
        let (_, looped) = &engine.jobs()[1];
        assert!(looped.has_arg_pair("-t", "3"));
    }

    #[test]
    fn named_intermediate_outputs_survive_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        seed(&engine, dir.path());
        let mut cfg = config(dir.path(), vec![EffectSpec::new("speed", 1.25)]);
        cfg.audio_output = Some(dir.path().join("reverbed.mp3"));
        cfg.video_output = Some(dir.path().join("looped.mp4"));
        cfg.background = Background::None;

        let report = Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap();

        // 2.5 s at 1.25x is exactly 2 s.
        assert_eq!(report.required_secs, 2);
        assert!(dir.path().join("reverbed.mp3").exists());
        assert!(dir.path().join("looped.mp4").exists());
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn empty_plan_still_keeps_requested_audio() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        seed(&engine, dir.path());
        let mut cfg = config(dir.path(), Vec::new());
        cfg.audio_output = Some(dir.path().join("kept.mp3"));

        Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap();

        let kept = dir.path().join("kept.mp3");
        assert!(kept.exists());
        assert_eq!(std::fs::read(&kept).unwrap(), b"audio");
    }

    #[test]
    fn outputs_inside_work_dir_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        seed(&engine, dir.path());

        let mut cfg = config(dir.path(), Vec::new());
        cfg.output = Some(dir.path().join("temp").join("final.mp4"));
        let err = Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));

        let mut cfg = config(dir.path(), Vec::new());
        cfg.video_output = Some(dir.path().join(".").join("temp").join("looped.mp4"));
        let err = Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));

        let mut cfg = config(dir.path(), Vec::new());
        cfg.download_dir = dir.path().join("temp");
        assert!(matches!(
            Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0])).run(),
            Err(PipelineError::InvalidParameter(_))
        ));

        assert!(engine.jobs().is_empty());
        assert!(!dir.path().join("temp").join("final.mp4").exists());
    }

    #[test]
    fn failure_mid_pipeline_still_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::failing_at(Stage::LoopTrim);
        seed(&engine, dir.path());
        let cfg = config(dir.path(), vec![EffectSpec::new("8d", 200.0)]);

        let err = Session::new(&cfg, &engine, &FixedPalette::new([1, 1, 1]))
            .run()
            .unwrap_err();

        assert!(matches!(err, PipelineError::Encode { stage: Stage::LoopTrim, .. }));
        assert_eq!(temp_files(dir.path()), 0);
        assert!(!dir.path().join("final.mp4").exists());
    }

    #[test]
    fn unknown_effect_fails_before_any_engine_call() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        seed(&engine, dir.path());
        let cfg = config(
            dir.path(),
            vec![EffectSpec::new("reverb", 0.1), EffectSpec::new("flanger", 1.0)],
        );

        let err = Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnknownEffect(name) if name == "flanger"));
        assert!(engine.jobs().is_empty());
        assert_eq!(engine.probe_count(), 0);
        assert!(!dir.path().join("temp").exists());
    }

    #[test]
    fn missing_visual_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::default();
        engine.seed_audio(&dir.path().join("song.mp3"), sine(8000, 1, 1.0, 220.0), None);
        let cfg = config(dir.path(), Vec::new());
        let err = Session::new(&cfg, &engine, &FixedPalette::new([0, 0, 0]))
            .run()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
