//! Lazy filter graphs and the visuals built from them.
//!
//! A [`GraphNode`] tree only describes work. Nothing touches the disk until
//! [`Visual::materialize`] compiles the tree into an [`EngineJob`] and runs
//! it. The engine's stream looping needs a real file, so the loop
//! synchronizer always materializes first.

use crate::artifact::MediaArtifact;
use crate::dimensions::TargetSize;
use crate::error::{PipelineResult, Stage};
use crate::ffmpeg::{EngineJob, JobInput, MediaEngine};
use crate::filters::{overlay_filter, scale_filter};
use crate::scratch::ScratchDir;
use std::path::PathBuf;
use tracing::info;

/// Demuxer options attached to a source input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceOptions {
    /// Repeat a still image as a video stream.
    pub loop_image: bool,
    pub frame_rate: Option<f64>,
    /// Stop reading the input after this many seconds.
    pub duration_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Source {
        path: PathBuf,
        options: SourceOptions,
    },
    Scale {
        input: Box<GraphNode>,
        width: u32,
        height: u32,
    },
    Overlay {
        base: Box<GraphNode>,
        top: Box<GraphNode>,
        x: u32,
        y: u32,
    },
}

impl GraphNode {
    pub fn source(path: impl Into<PathBuf>) -> Self {
        GraphNode::Source {
            path: path.into(),
            options: SourceOptions::default(),
        }
    }

    pub fn scale(self, width: u32, height: u32) -> Self {
        GraphNode::Scale {
            input: Box::new(self),
            width,
            height,
        }
    }

    pub fn overlay(base: GraphNode, top: GraphNode, x: u32, y: u32) -> Self {
        GraphNode::Overlay {
            base: Box::new(base),
            top: Box::new(top),
            x,
            y,
        }
    }

    /// Compiles the tree into an engine job writing `output`.
    pub fn compile(&self, output: impl Into<PathBuf>) -> EngineJob {
        let mut compiler = Compiler::default();
        let label = compiler.visit(self);
        let mut job = EngineJob::new(output);
        job.inputs = compiler.inputs;
        if compiler.statements.is_empty() {
            job.maps.push(format!("{label}:v:0"));
        } else {
            job.filter_complex = Some(compiler.statements.join(";"));
            job.maps.push(format!("[{label}]"));
        }
        job
    }
}

#[derive(Default)]
struct Compiler {
    inputs: Vec<JobInput>,
    statements: Vec<String>,
    filters: usize,
}

impl Compiler {
    /// Returns the bare input index for sources, or the output label of a filter.
    fn visit(&mut self, node: &GraphNode) -> String {
        match node {
            GraphNode::Source { path, options } => {
                let mut input = JobInput::new(path);
                if options.loop_image {
                    input = input.option("-loop", 1);
                }
                if let Some(rate) = options.frame_rate {
                    input = input.option("-framerate", rate);
                }
                if let Some(secs) = options.duration_cap {
                    input = input.option("-t", secs);
                }
                self.inputs.push(input);
                (self.inputs.len() - 1).to_string()
            }
            GraphNode::Scale {
                input,
                width,
                height,
            } => {
                let src = self.stream_ref(input);
                let out = self.next_label();
                self.statements
                    .push(format!("{src}{}[{out}]", scale_filter(*width, *height)));
                out
            }
            GraphNode::Overlay { base, top, x, y } => {
                let base = self.stream_ref(base);
                let top = self.stream_ref(top);
                let out = self.next_label();
                self.statements
                    .push(format!("{base}{top}{}[{out}]", overlay_filter(*x, *y)));
                out
            }
        }
    }

    fn stream_ref(&mut self, node: &GraphNode) -> String {
        let is_source = matches!(node, GraphNode::Source { .. });
        let label = self.visit(node);
        if is_source {
            format!("[{label}:v]")
        } else {
            format!("[{label}]")
        }
    }

    fn next_label(&mut self) -> String {
        let label = format!("v{}", self.filters);
        self.filters += 1;
        label
    }
}

/// A graph plus the timing it will have once rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct LazyVisual {
    pub node: GraphNode,
    pub duration_secs: f64,
    pub frame_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    Lazy(LazyVisual),
    Materialized(MediaArtifact),
}

impl Visual {
    /// Wraps a probed source so it is re-encoded before looping.
    ///
    /// yuv420p needs even sides, so odd-sized sources are scaled down to the
    /// nearest even size.
    pub fn from_source(source: &MediaArtifact) -> PipelineResult<Self> {
        let video = source.require_video()?;
        let (width, height) = TargetSize {
            width: video.width as f64,
            height: video.height as f64,
        }
        .to_even_pixels();
        let mut node = GraphNode::source(source.path());
        if (width, height) != (video.width, video.height) {
            node = node.scale(width, height);
        }
        Ok(Visual::Lazy(LazyVisual {
            node,
            duration_secs: source.duration_secs(),
            frame_rate: video.frame_rate,
        }))
    }

    pub fn duration_secs(&self) -> f64 {
        match self {
            Visual::Lazy(lazy) => lazy.duration_secs,
            Visual::Materialized(artifact) => artifact.duration_secs(),
        }
    }

    /// Encodes a lazy visual to a scratch `.mp4`; materialized visuals pass through.
    pub fn materialize(
        self,
        engine: &dyn MediaEngine,
        scratch: &ScratchDir,
    ) -> PipelineResult<MediaArtifact> {
        let lazy = match self {
            Visual::Materialized(artifact) => return Ok(artifact),
            Visual::Lazy(lazy) => lazy,
        };
        let output = scratch.create("mp4");
        let job = lazy
            .node
            .compile(&output)
            .output_args(["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .expect_secs(lazy.duration_secs);
        info!(output = %output.display(), secs = lazy.duration_secs, "materializing visual");
        engine.run(Stage::Materialize, &job)?;
        engine.probe(&output)
    }
}
