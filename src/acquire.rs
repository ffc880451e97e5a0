//! Getting the source audio onto local disk.

use crate::error::{PipelineError, PipelineResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    /// Human title, used for the default output name.
    pub title: String,
}

pub fn is_remote(locator: &str) -> bool {
    let lower = locator.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves `locator` to a local audio file.
///
/// Local paths are used in place. `http(s)` locators are fetched with
/// `yt-dlp` into `download_dir` and converted to mp3.
pub fn acquire(
    locator: &str,
    download_dir: &Path,
    yt_dlp: Option<&Path>,
) -> PipelineResult<AcquiredAudio> {
    let locator = locator.trim();
    if !is_remote(locator) {
        let path = PathBuf::from(locator);
        if !path.is_file() {
            return Err(PipelineError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "audio source not found"),
            ));
        }
        let title = title_from_path(&path);
        info!(path = %path.display(), "using local audio");
        return Ok(AcquiredAudio { path, title });
    }

    let yt_dlp = yt_dlp.ok_or_else(|| {
        PipelineError::Acquire(format!("`yt-dlp` is required to download {locator}"))
    })?;
    std::fs::create_dir_all(download_dir).map_err(|e| PipelineError::io(download_dir, e))?;

    let mut cmd = Command::new(yt_dlp);
    cmd.args(["--no-playlist", "--no-simulate", "--no-progress"])
        .args(["-x", "--audio-format", "mp3"])
        .args(["--print", "title", "--print", "after_move:filepath"])
        .arg("-P")
        .arg(download_dir)
        .args(["-o", "%(title)s.%(ext)s"])
        .arg(locator)
        .stdin(Stdio::null());
    debug!(command = ?cmd, "running yt-dlp");
    info!(url = locator, "downloading audio");

    let out = cmd
        .output()
        .map_err(|e| PipelineError::Acquire(format!("failed to run yt-dlp: {e}")))?;
    if !out.status.success() {
        return Err(PipelineError::Acquire(format!(
            "yt-dlp exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let (title, path) = parse_download_output(&String::from_utf8_lossy(&out.stdout))
        .ok_or_else(|| {
            PipelineError::Acquire("yt-dlp did not report a downloaded file".to_string())
        })?;
    if !path.is_file() {
        return Err(PipelineError::Acquire(format!(
            "yt-dlp reported '{}' but it does not exist",
            path.display()
        )));
    }
    info!(title = %title, path = %path.display(), "audio downloaded");
    Ok(AcquiredAudio { path, title })
}

/// Splits yt-dlp's `--print title --print after_move:filepath` output.
pub fn parse_download_output(stdout: &str) -> Option<(String, PathBuf)> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).rev();
    let path = PathBuf::from(lines.next()?);
    let title = lines
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| title_from_path(&path));
    Some((title, path))
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("output")
        .to_string()
}
