use crate::error::Stage;
use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use regex::Regex;
use std::io::{BufRead, BufReader, Read};
use std::thread;
use std::time::Duration;

pub struct ProgressUi {
    _multi: MultiProgress,
    spinner: ProgressBar,
    bar: ProgressBar,
    total_ms: u64,
    stage: Stage,
}

impl ProgressUi {
    pub fn new(total_ms: u64, stage: Stage) -> Self {
        let multi = MultiProgress::new();

        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.enable_steady_tick(Duration::from_millis(80));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style.tick_strings(&["-", "\\", "|", "/"]));
        }
        spinner.set_message(format!("{}: starting.", stage_label(stage)));

        let bar = multi.add(ProgressBar::new(total_ms));
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}]  [{bar:60.cyan/bright-black}] {percent:>3}%  {pos}/{len}ms  ETA:{eta_precise}\n{wide_msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(stage_detail(stage));

        Self {
            _multi: multi,
            spinner,
            bar,
            total_ms,
            stage,
        }
    }

    fn update(&self, pos_ms: u64) {
        self.bar.set_position(pos_ms);
        let pct = (pos_ms as f64) / (self.total_ms as f64);
        let label = stage_label(self.stage);
        if pct < 0.95 {
            self.spinner.set_message(format!("{label}: working."));
        } else {
            self.spinner
                .set_message(format!("{label}: writing headers, closing output."));
        }
    }

    fn finish(&self) {
        self.bar.finish_with_message("Done");
        self.spinner
            .finish_with_message(format!("{}: completed", stage_label(self.stage)));
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::AudioEncode => "Encoding audio",
        Stage::FrameExtract => "Extracting frame",
        Stage::Materialize => "Encoding composite",
        Stage::LoopTrim => "Looping visual",
        Stage::Mux => "Muxing",
    }
}

fn stage_detail(stage: Stage) -> &'static str {
    match stage {
        Stage::Materialize => "Rendering background, scaled visual and overlay...",
        Stage::LoopTrim => "Stream-looping the encoded clip to the target length...",
        Stage::Mux => "Copying video and audio streams into the container...",
        _ => "Processing...",
    }
}

/// Parses ffmpeg `-progress` key=value lines into milliseconds of output.
pub fn parse_progress_line(re: &Regex, line: &str) -> Option<ProgressEvent> {
    let caps = re.captures(line)?;
    match &caps[1] {
        "out_time_ms" => caps[2].parse::<u64>().ok().map(|us| ProgressEvent::At(us / 1000)),
        "progress" if &caps[2] == "end" => Some(ProgressEvent::End),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    At(u64),
    End,
}

fn progress_regex() -> Regex {
    Regex::new(r"^(\w+)=([\w\-\.:]+)$").expect("progress pattern is valid")
}

pub fn pump_progress<R: Read + Send + 'static>(
    reader: R,
    ui: ProgressUi,
) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || {
        let re_kv = progress_regex();
        let reader = BufReader::new(reader);

        for line in reader.lines() {
            let line = line?;
            match parse_progress_line(&re_kv, &line) {
                Some(ProgressEvent::At(ms)) => ui.update(ms.min(ui.total_ms)),
                Some(ProgressEvent::End) => ui.finish(),
                None => {}
            }
        }
        Ok(())
    })
}
