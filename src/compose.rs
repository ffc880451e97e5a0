//! Background compositing: a solid canvas held for the visual's duration,
//! with the aspect-scaled visual centred on top.

use crate::artifact::MediaArtifact;
use crate::dimensions::{CANVAS_HEIGHT, CANVAS_WIDTH, centered_offset, check_padding, resolve};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::ffmpeg::{EngineJob, JobInput, MediaEngine};
use crate::graph::{GraphNode, LazyVisual, SourceOptions, Visual};
use crate::palette::{Palette, is_still_image, write_canvas};
use crate::scratch::ScratchDir;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Palette sampling stride; a rough colour is good enough for a backdrop.
pub const PALETTE_QUALITY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Color([u8; 3]),
    /// Representative colour of the visual itself.
    FromSource,
    /// No canvas: the raw visual is looped as-is.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionConfig {
    visual: PathBuf,
    required_secs: u32,
    pad_x: u32,
    pad_y: u32,
    background: Background,
}

impl CompositionConfig {
    pub fn new(
        visual: impl Into<PathBuf>,
        required_secs: u32,
        pad_x: u32,
        pad_y: u32,
        background: Background,
    ) -> PipelineResult<Self> {
        if required_secs == 0 {
            return Err(PipelineError::invalid("required duration must be at least 1 second"));
        }
        check_padding(CANVAS_WIDTH, CANVAS_HEIGHT, pad_x, pad_y)?;
        Ok(Self {
            visual: visual.into(),
            required_secs,
            pad_x,
            pad_y,
            background,
        })
    }

    pub fn visual(&self) -> &Path {
        &self.visual
    }

    pub fn required_secs(&self) -> u32 {
        self.required_secs
    }

    pub fn padding(&self) -> (u32, u32) {
        (self.pad_x, self.pad_y)
    }

    pub fn background(&self) -> Background {
        self.background
    }

    pub fn canvas(&self) -> (u32, u32) {
        (CANVAS_WIDTH, CANVAS_HEIGHT)
    }
}

/// Builds the lazy visual for `source` under `config`.
///
/// With [`Background::None`] this is the raw source; otherwise it is the
/// overlay graph. Either way its duration is the source's, not the required
/// length.
pub fn compose(
    engine: &dyn MediaEngine,
    palette: &dyn Palette,
    scratch: &ScratchDir,
    config: &CompositionConfig,
    source: &MediaArtifact,
) -> PipelineResult<Visual> {
    let video = source.require_video()?;
    let color = match config.background() {
        Background::None => return Visual::from_source(source),
        Background::Color(rgb) => rgb,
        Background::FromSource => sample_color(engine, palette, scratch, source.path())?,
    };

    let (canvas_w, canvas_h) = config.canvas();
    let (pad_x, pad_y) = config.padding();
    let target = resolve(video.width, video.height, canvas_w, canvas_h, pad_x, pad_y)?;
    let (width, height) = target.to_even_pixels();
    let (x, y) = centered_offset(canvas_w, canvas_h, width, height);

    let canvas = scratch.create("png");
    write_canvas(&canvas, canvas_w, canvas_h, color)?;
    debug!(canvas = %canvas.display(), ?color, "background canvas written");

    let background = GraphNode::Source {
        path: canvas,
        options: SourceOptions {
            loop_image: true,
            frame_rate: Some(video.frame_rate),
            duration_cap: Some(source.duration_secs()),
        },
    };
    let scaled = GraphNode::source(source.path()).scale(width, height);
    info!(
        source = %source.path().display(),
        aspect = video.aspect_ratio(),
        target_w = target.width,
        target_h = target.height,
        x,
        y,
        "compositing visual over background"
    );

    Ok(Visual::Lazy(LazyVisual {
        node: GraphNode::overlay(background, scaled, x, y),
        duration_secs: source.duration_secs(),
        frame_rate: video.frame_rate,
    }))
}

fn sample_color(
    engine: &dyn MediaEngine,
    palette: &dyn Palette,
    scratch: &ScratchDir,
    source: &Path,
) -> PipelineResult<[u8; 3]> {
    if is_still_image(source) {
        return palette.representative_color(source, PALETTE_QUALITY);
    }
    let frame = scratch.create("png");
    let job = EngineJob::new(&frame)
        .input(JobInput::new(source))
        .output_args(["-frames:v", "1"]);
    engine.run(Stage::FrameExtract, &job)?;
    palette.representative_color(&frame, PALETTE_QUALITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::VideoStreamInfo;
    use crate::testing::{FakeEngine, FixedPalette};

    fn gif(path: &Path, w: u32, h: u32) -> MediaArtifact {
        MediaArtifact::new(
            path,
            2.0,
            Some(VideoStreamInfo {
                width: w,
                height: h,
                frame_count: Some(48),
                frame_rate: 24.0,
            }),
            None,
        )
    }

    #[test]
    fn config_validates_padding_and_length() {
        assert!(CompositionConfig::new("a.gif", 10, 75, 75, Background::FromSource).is_ok());
        assert!(CompositionConfig::new("a.gif", 0, 75, 75, Background::FromSource).is_err());
        assert!(CompositionConfig::new("a.gif", 10, 960, 0, Background::FromSource).is_err());
        assert!(CompositionConfig::new("a.gif", 10, 0, 540, Background::FromSource).is_err());
    }

    #[test]
    fn builds_centered_overlay_over_palette_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let source_path = dir.path().join("eyes.gif");
        std::fs::write(&source_path, b"gif").unwrap();
        let source = gif(&source_path, 1280, 720);
        let palette = FixedPalette::new([10, 20, 30]);
        let config =
            CompositionConfig::new(&source_path, 30, 75, 75, Background::FromSource).unwrap();

        let visual = compose(&FakeEngine::default(), &palette, &scratch, &config, &source).unwrap();
        let Visual::Lazy(lazy) = visual else {
            panic!("compositing must stay lazy");
        };
        assert_eq!(lazy.duration_secs, 2.0);
        assert_eq!(lazy.frame_rate, 24.0);

        let GraphNode::Overlay { base, top, x, y } = &lazy.node else {
            panic!("expected overlay root, got {:?}", lazy.node);
        };
        assert_eq!((*x, *y), (134, 75));
        let GraphNode::Scale { width, height, .. } = top.as_ref() else {
            panic!("expected scaled top layer");
        };
        assert_eq!((*width, *height), (1652, 930));
        let GraphNode::Source { path, options } = base.as_ref() else {
            panic!("expected canvas source");
        };
        assert!(options.loop_image);
        assert_eq!(options.frame_rate, Some(24.0));
        assert_eq!(options.duration_cap, Some(2.0));

        let canvas = image::open(path).unwrap().to_rgb8();
        assert_eq!(canvas.dimensions(), (1920, 1080));
        assert_eq!(canvas.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(palette.calls(), 1);
    }

    #[test]
    fn fixed_colour_skips_palette() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let source = gif(&dir.path().join("eyes.gif"), 300, 600);
        let palette = FixedPalette::new([0, 0, 0]);
        let config =
            CompositionConfig::new(source.path(), 5, 0, 0, Background::Color([1, 2, 3])).unwrap();
        compose(&FakeEngine::default(), &palette, &scratch, &config, &source).unwrap();
        assert_eq!(palette.calls(), 0);
    }

    #[test]
    fn no_background_returns_raw_source() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let source = gif(&dir.path().join("eyes.gif"), 300, 600);
        let config = CompositionConfig::new(source.path(), 5, 0, 0, Background::None).unwrap();
        let visual = compose(
            &FakeEngine::default(),
            &FixedPalette::new([0, 0, 0]),
            &scratch,
            &config,
            &source,
        )
        .unwrap();
        assert_eq!(visual, Visual::from_source(&source).unwrap());
        assert_eq!(scratch.file_count().unwrap(), 0);
    }

    #[test]
    fn video_sources_get_a_frame_extracted_first() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let source = gif(&dir.path().join("clip.mp4"), 640, 360);
        let engine = FakeEngine::default();
        let config =
            CompositionConfig::new(source.path(), 5, 0, 0, Background::FromSource).unwrap();
        compose(&engine, &FixedPalette::new([9, 9, 9]), &scratch, &config, &source).unwrap();
        let jobs = engine.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, Stage::FrameExtract);
        assert!(jobs[0].1.has_arg_pair("-frames:v", "1"));
    }

    #[test]
    fn source_without_video_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::open(dir.path()).unwrap();
        let source = MediaArtifact::new(dir.path().join("song.mp3"), 3.0, None, None);
        let config =
            CompositionConfig::new(source.path(), 5, 0, 0, Background::FromSource).unwrap();
        let err = compose(
            &FakeEngine::default(),
            &FixedPalette::new([0, 0, 0]),
            &scratch,
            &config,
            &source,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Probe(_)));
    }
}
