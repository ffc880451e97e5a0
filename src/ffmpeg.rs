use crate::artifact::{MediaArtifact, parse_probe_json};
use crate::audio::AudioBuffer;
use crate::error::{PipelineError, PipelineResult, Stage, ensure_input};
use crate::progress::{ProgressUi, pump_progress};
use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;
use which::which;

#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

pub fn resolve_tools(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Tools> {
    Ok(Tools {
        ffmpeg: resolve_bin(ffmpeg, "ffmpeg")?,
        ffprobe: resolve_bin(ffprobe, "ffprobe")?,
    })
}

pub fn resolve_bin(bin_opt: Option<PathBuf>, default: &str) -> Result<PathBuf> {
    if let Some(path) = bin_opt {
        if path.is_file() {
            return Ok(path);
        }
        bail!("Provided binary not found: {}", path.display());
    }

    which(default)
        .or_else(|_| {
            if cfg!(windows) {
                let exe = format!("{default}.exe");
                which(&exe)
            } else {
                Err(which::Error::CannotFindBinaryPath)
            }
        })
        .with_context(|| format!("`{default}` not found in PATH"))
}

/// One input of an engine job; `options` go right before its `-i`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    pub path: PathBuf,
    pub options: Vec<String>,
}

impl JobInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.push(key.to_string());
        self.options.push(value.to_string());
        self
    }
}

/// Declarative description of a single engine run: inputs, an optional
/// filter graph, stream maps, output options and the output file.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineJob {
    pub inputs: Vec<JobInput>,
    pub filter_complex: Option<String>,
    pub maps: Vec<String>,
    pub output_options: Vec<String>,
    pub output: PathBuf,
    /// Expected output duration, used for progress only.
    pub expected_secs: Option<f64>,
}

impl EngineJob {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            filter_complex: None,
            maps: Vec::new(),
            output_options: Vec::new(),
            output: output.into(),
            expected_secs: None,
        }
    }

    pub fn input(mut self, input: JobInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn map(mut self, spec: impl Into<String>) -> Self {
        self.maps.push(spec.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn expect_secs(mut self, secs: f64) -> Self {
        self.expected_secs = Some(secs);
        self
    }

    /// Arguments after the global flags, in ffmpeg order.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        for input in &self.inputs {
            args.extend(input.options.iter().map(OsString::from));
            args.push("-i".into());
            args.push(input.path.clone().into_os_string());
        }
        if let Some(graph) = &self.filter_complex {
            args.push("-filter_complex".into());
            args.push(graph.into());
        }
        for map in &self.maps {
            args.push("-map".into());
            args.push(map.into());
        }
        args.extend(self.output_options.iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());
        args
    }

    /// Whether `flag` is immediately followed by `value` anywhere in the job.
    pub fn has_arg_pair(&self, flag: &str, value: &str) -> bool {
        self.args()
            .windows(2)
            .any(|w| w[0] == flag && w[1] == value)
    }
}

/// The processing engine and probe facility the pipeline drives.
pub trait MediaEngine {
    /// Realises `job`, overwriting its output.
    fn run(&self, stage: Stage, job: &EngineJob) -> PipelineResult<()>;

    fn probe(&self, path: &Path) -> PipelineResult<MediaArtifact>;

    /// Decodes the first audio stream of `source` to interleaved f32.
    fn decode_audio(&self, source: &MediaArtifact) -> PipelineResult<AudioBuffer>;

    /// Encodes `audio` to `output`, at `bit_rate` when known.
    fn encode_audio(
        &self,
        audio: &AudioBuffer,
        output: &Path,
        bit_rate: Option<u64>,
    ) -> PipelineResult<()>;
}

/// [`MediaEngine`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    tools: Tools,
    verbose: bool,
}

impl Ffmpeg {
    pub fn new(tools: Tools, verbose: bool) -> Self {
        Self { tools, verbose }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.arg("-hide_banner");
        if !self.verbose {
            cmd.arg("-nostats").arg("-loglevel").arg("error");
        }
        cmd.arg("-y");
        cmd
    }

    fn stderr_mode(&self) -> Stdio {
        if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::piped()
        }
    }
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("ffmpeg exited with {}", output.status)
    } else {
        format!("ffmpeg exited with {}: {stderr}", output.status)
    }
}

impl MediaEngine for Ffmpeg {
    fn run(&self, stage: Stage, job: &EngineJob) -> PipelineResult<()> {
        let mut cmd = self.base_command();
        let show_progress = !self.verbose && job.expected_secs.is_some();
        if show_progress {
            cmd.arg("-progress").arg("-");
        }
        cmd.args(job.args());
        debug!(%stage, command = ?cmd, "running ffmpeg");

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(if show_progress {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(self.stderr_mode())
            .spawn()
            .map_err(|e| PipelineError::encode(stage, format!("failed to spawn ffmpeg: {e}")))?;

        let pump = match (show_progress, child.stdout.take(), job.expected_secs) {
            (true, Some(stdout), Some(secs)) => {
                let total_ms = (secs * 1000.0).max(1.0) as u64;
                Some(pump_progress(stdout, ProgressUi::new(total_ms, stage)))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| PipelineError::encode(stage, format!("failed to wait for ffmpeg: {e}")))?;
        if let Some(handle) = pump {
            let _ = handle.join();
        }
        if !output.status.success() {
            return Err(PipelineError::encode(stage, failure_message(&output)));
        }
        Ok(())
    }

    fn probe(&self, path: &Path) -> PipelineResult<MediaArtifact> {
        ensure_input(path)?;
        let out = Command::new(&self.tools.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| PipelineError::Probe(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(PipelineError::Probe(format!(
                "ffprobe rejected '{}' ({}): {}",
                path.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_probe_json(path, &String::from_utf8_lossy(&out.stdout))
    }

    fn decode_audio(&self, source: &MediaArtifact) -> PipelineResult<AudioBuffer> {
        let info = source.audio().ok_or_else(|| {
            PipelineError::Decode(format!("no audio stream in '{}'", source.path().display()))
        })?;
        let out = Command::new(&self.tools.ffmpeg)
            .args(["-hide_banner", "-nostats", "-loglevel", "error", "-i"])
            .arg(source.path())
            .args(["-vn", "-map", "0:a:0", "-f", "f32le", "-acodec", "pcm_f32le"])
            .args(["-ar", &info.sample_rate.to_string()])
            .args(["-ac", &info.channels.to_string()])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PipelineError::Decode(format!("failed to run ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(PipelineError::Decode(format!(
                "'{}': {}",
                source.path().display(),
                failure_message(&out)
            )));
        }

        let samples = out
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        AudioBuffer::new(samples, info.sample_rate, info.channels)
    }

    fn encode_audio(
        &self,
        audio: &AudioBuffer,
        output: &Path,
        bit_rate: Option<u64>,
    ) -> PipelineResult<()> {
        let stage = Stage::AudioEncode;
        let mut cmd = self.base_command();
        cmd.args(["-f", "f32le"])
            .args(["-ar", &audio.sample_rate.to_string()])
            .args(["-ac", &audio.channels.to_string()])
            .args(["-i", "pipe:0"]);
        if let Some(rate) = bit_rate {
            cmd.args(["-b:a", &rate.to_string()]);
        }
        cmd.arg(output);
        debug!(%stage, command = ?cmd, "running ffmpeg");

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(self.stderr_mode())
            .spawn()
            .map_err(|e| PipelineError::encode(stage, format!("failed to spawn ffmpeg: {e}")))?;

        let bytes: Vec<u8> = audio.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&bytes),
            None => Err(std::io::Error::other("ffmpeg stdin unavailable")),
        };

        let out = child
            .wait_with_output()
            .map_err(|e| PipelineError::encode(stage, format!("failed to wait for ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(PipelineError::encode(stage, failure_message(&out)));
        }
        write_result
            .map_err(|e| PipelineError::encode(stage, format!("failed to feed ffmpeg: {e}")))
    }
}
