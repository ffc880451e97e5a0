mod acquire;
mod artifact;
mod audio;
mod cli;
mod compose;
mod dimensions;
mod error;
mod ffmpeg;
mod filters;
mod graph;
mod looping;
mod mux;
mod palette;
mod progress;
mod scratch;
mod session;
#[cfg(test)]
mod testing;
mod tui;

use crate::acquire::is_remote;
use crate::cli::{AppConfig, Cli};
use crate::ffmpeg::{Ffmpeg, resolve_bin, resolve_tools};
use crate::palette::ImagePalette;
use crate::session::Session;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

fn main() -> Result<()> {
    let config = if std::env::args_os().len() > 1 {
        Cli::parse().into_config()?
    } else {
        tui::interactive_config()?
    };
    init_logging(config.verbose);
    run(&config)
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &AppConfig) -> Result<()> {
    let tools = resolve_tools(config.ffmpeg.clone(), config.ffprobe.clone())?;
    let yt_dlp = if is_remote(&config.audio) {
        Some(resolve_bin(config.yt_dlp.clone(), "yt-dlp")?)
    } else {
        None
    };

    let engine = Ffmpeg::new(tools, config.verbose);
    let report = Session::new(config, &engine, &ImagePalette)
        .with_downloader(yt_dlp)
        .run()
        .with_context(|| format!("Failed to build video from {}", config.audio))?;

    println!(
        "Wrote {} ({:.1}s, visual looped to {}s)",
        report.output.display(),
        report.duration_secs,
        report.required_secs
    );
    Ok(())
}
