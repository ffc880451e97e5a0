use crate::audio::{EffectRegistry, EffectSpec};
use crate::cli::AppConfig;
use crate::compose::Background;
use crate::filters::{parse_background, parse_effect_spec, validate_seconds};
use crate::mux::DEFAULT_TOLERANCE_SECS;
use anyhow::{Result, bail};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::path::PathBuf;

pub fn interactive_config() -> Result<AppConfig> {
    println!("Interactive loopcast");
    println!("Press Enter to accept defaults or leave options unset.\n");

    let theme = ColorfulTheme::default();
    let audio: String = Input::with_theme(&theme)
        .with_prompt("Audio file path or http(s) URL")
        .validate_with(|raw: &String| -> std::result::Result<(), &str> {
            if raw.trim().is_empty() {
                Err("Audio source must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let visual = loop {
        let raw: String = Input::with_theme(&theme)
            .with_prompt("Gif (or short video) path")
            .interact_text()?;
        let path = PathBuf::from(raw.trim());
        if path.exists() {
            break path;
        } else {
            println!("Path not found, please try again.");
        }
    };

    let effects = prompt_effects(&theme)?;

    let pad_x: u32 = Input::with_theme(&theme)
        .with_prompt("Horizontal padding (px)")
        .default(75)
        .interact_text()?;
    let pad_y: u32 = Input::with_theme(&theme)
        .with_prompt("Vertical padding (px)")
        .default(75)
        .interact_text()?;
    let background = prompt_background(&theme)?;

    let output = prompt_optional_path(&theme, "Output file (blank = <audio title>.mp4)")?;
    let audio_output = prompt_optional_path(&theme, "Keep processed audio at (blank = discard)")?;
    let video_output = prompt_optional_path(&theme, "Keep looped video at (blank = discard)")?;

    let work_dir: String = Input::with_theme(&theme)
        .with_prompt("Scratch directory")
        .default("temp".into())
        .interact_text()?;
    let download_dir: String = Input::with_theme(&theme)
        .with_prompt("Download directory")
        .default(".".into())
        .interact_text()?;
    let (work_dir, download_dir) = (PathBuf::from(work_dir), PathBuf::from(download_dir));
    if work_dir == download_dir {
        bail!("The scratch directory is emptied after every run and cannot double as the download directory");
    }

    let mux_tolerance = loop {
        let raw: String = Input::with_theme(&theme)
            .with_prompt("Mux tolerance in seconds")
            .default(DEFAULT_TOLERANCE_SECS.to_string())
            .interact_text()?;
        match validate_seconds(raw.trim()) {
            Ok(secs) => break secs,
            Err(err) => println!("Invalid value: {err}."),
        }
    };

    let verbose = Confirm::with_theme(&theme)
        .with_prompt("Show ffmpeg logs?")
        .default(false)
        .interact()?;

    let ffmpeg = prompt_optional_existing(&theme, "Custom ffmpeg path (blank = PATH)")?;
    let ffprobe = prompt_optional_existing(&theme, "Custom ffprobe path (blank = PATH)")?;
    let yt_dlp = prompt_optional_existing(&theme, "Custom yt-dlp path (blank = PATH)")?;

    Ok(AppConfig {
        audio: audio.trim().to_string(),
        visual,
        output,
        effects,
        pad_x,
        pad_y,
        background,
        work_dir,
        audio_output,
        video_output,
        download_dir,
        mux_tolerance,
        verbose,
        ffmpeg,
        ffprobe,
        yt_dlp,
    })
}

fn prompt_effects(theme: &ColorfulTheme) -> Result<Vec<EffectSpec>> {
    let registry = EffectRegistry::builtin();
    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();
    let prompt = format!("Effect name=value ({}; blank = done)", names.join(", "));
    let mut effects = Vec::new();
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt(&prompt)
            .allow_empty(true)
            .interact_text()?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(effects);
        }
        let spec = match parse_effect_spec(trimmed) {
            Ok(spec) => spec,
            Err(err) => {
                println!("Invalid effect: {err}.");
                continue;
            }
        };
        match registry.resolve(std::slice::from_ref(&spec)) {
            Ok(_) => effects.push(spec),
            Err(err) => println!("{err}."),
        }
    }
}

fn prompt_background(theme: &ColorfulTheme) -> Result<Background> {
    loop {
        let raw: String = Input::with_theme(theme)
            .with_prompt("Background (default, none, R,G,B or #rrggbb)")
            .default("default".into())
            .interact_text()?;
        match parse_background(&raw) {
            Ok(bg) => return Ok(bg),
            Err(err) => println!("Invalid value: {err}."),
        }
    }
}

fn prompt_optional_path(theme: &ColorfulTheme, prompt: &str) -> Result<Option<PathBuf>> {
    let raw: String = Input::with_theme(theme)
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let trimmed = raw.trim();
    Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
}

fn prompt_optional_existing(theme: &ColorfulTheme, prompt: &str) -> Result<Option<PathBuf>> {
    loop {
        let Some(path) = prompt_optional_path(theme, prompt)? else {
            return Ok(None);
        };
        if path.exists() {
            return Ok(Some(path));
        } else {
            println!("Path not found. Leave blank to skip or enter a valid file path.");
        }
    }
}
