use crate::audio::EffectSpec;
use crate::compose::Background;
use crate::filters::{parse_background, parse_effect_spec, validate_seconds};
use crate::mux::DEFAULT_TOLERANCE_SECS;
use anyhow::{Result, bail};
use clap::{ArgAction, Parser, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "loopcast",
    version,
    about = "Apply audio effects to a track and loop a gif over a canvas for its whole length"
)]
pub struct Cli {
    /// Audio file path, or an http(s) URL to download with yt-dlp
    #[arg(short = 'a', long)]
    pub audio: String,

    /// Looping visual (gif, or any short video)
    #[arg(short = 'g', long, value_hint = ValueHint::FilePath)]
    pub gif: PathBuf,

    /// Output file (default: <audio title>.mp4)
    #[arg(short = 'o', long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Audio effect as name=value, applied in the order given
    /// (reverb=0..1, change_speed=>0, eight_d=period)
    #[arg(short = 'e', long = "effect", value_parser = parse_effect_spec)]
    pub effects: Vec<EffectSpec>,

    /// Horizontal padding around the visual, in pixels
    #[arg(long, default_value = "75")]
    pub pad_x: u32,

    /// Vertical padding around the visual, in pixels
    #[arg(long, default_value = "75")]
    pub pad_y: u32,

    /// Canvas colour: default (from the gif), none, R,G,B or #rrggbb
    #[arg(long, default_value = "default", value_parser = parse_background)]
    pub background: Background,

    /// Scratch directory for intermediate files (emptied after the run)
    #[arg(long, default_value = "temp", value_hint = ValueHint::DirPath)]
    pub work_dir: PathBuf,

    /// Keep the processed audio at this path
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub audio_output: Option<PathBuf>,

    /// Keep the looped, silent video at this path
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub video_output: Option<PathBuf>,

    /// Where downloaded audio is stored
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    pub download_dir: PathBuf,

    /// Largest accepted video/audio length difference, in seconds
    #[arg(long, default_value_t = DEFAULT_TOLERANCE_SECS, value_parser = validate_seconds)]
    pub mux_tolerance: f64,

    /// Show raw ffmpeg logs and debug output
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Path to ffmpeg binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to ffprobe binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,

    /// Path to yt-dlp binary (overrides PATH lookup)
    #[arg(long = "yt-dlp", value_hint = ValueHint::ExecutablePath)]
    pub yt_dlp: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub audio: String,
    pub visual: PathBuf,
    /// `None` means `<audio title>.mp4`, known only after acquisition.
    pub output: Option<PathBuf>,
    pub effects: Vec<EffectSpec>,
    pub pad_x: u32,
    pub pad_y: u32,
    pub background: Background,
    pub work_dir: PathBuf,
    pub audio_output: Option<PathBuf>,
    pub video_output: Option<PathBuf>,
    pub download_dir: PathBuf,
    pub mux_tolerance: f64,
    pub verbose: bool,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Result<AppConfig> {
        if !self.gif.exists() {
            bail!("Visual not found: {}", self.gif.display());
        }
        if self.audio.trim().is_empty() {
            bail!("Audio source must not be empty");
        }
        if self.work_dir == self.download_dir {
            bail!("--work-dir is emptied after every run and cannot double as --download-dir");
        }

        Ok(AppConfig {
            audio: self.audio,
            visual: self.gif,
            output: self.output,
            effects: self.effects,
            pad_x: self.pad_x,
            pad_y: self.pad_y,
            background: self.background,
            work_dir: self.work_dir,
            audio_output: self.audio_output,
            video_output: self.video_output,
            download_dir: self.download_dir,
            mux_tolerance: self.mux_tolerance,
            verbose: self.verbose,
            ffmpeg: self.ffmpeg,
            ffprobe: self.ffprobe,
            yt_dlp: self.yt_dlp,
        })
    }
}

/// `<title>.mp4` in the current directory, with path separators replaced.
pub fn default_output(title: &str) -> PathBuf {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let stem = if cleaned.is_empty() { "output" } else { cleaned.as_str() };
    PathBuf::from(format!("{stem}.mp4"))
}
