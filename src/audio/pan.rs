//! "8D" audio: a slow periodic sweep of the stereo image.

use super::AudioBuffer;
use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_PERIOD: usize = 200;
/// Pan window length.
pub const WINDOW_MS: usize = 100;
/// Silence appended after the track before panning.
pub const PADDING_MS: usize = 150;
const PAN_DEPTH: f64 = 0.9;

/// Negative periods sweep the same cycle; zero means the default.
pub fn normalize_period(period: i64) -> usize {
    match period {
        0 => DEFAULT_PERIOD,
        p => p.unsigned_abs() as usize,
    }
}

/// Point `k` of one full sine cycle sampled at `period` points, endpoints
/// included.
pub fn pan_position(period: usize, k: usize) -> f64 {
    if period <= 1 {
        return 0.0;
    }
    let step = 2.0 * std::f64::consts::PI / (period - 1) as f64;
    PAN_DEPTH * (k as f64 * step).sin()
}

/// Left/right linear gains for a pan position in [-1, 1].
///
/// The favoured side is boosted by up to +3 dB, the other side is cut so the
/// pair never exceeds a 6 dB swing.
pub fn pan_gains(pan: f64) -> (f32, f32) {
    let boost_factor = 2f64.powf(pan.abs());
    let reduce = 2.0 - boost_factor;
    let boost = boost_factor.sqrt();
    if pan < 0.0 {
        (boost as f32, reduce as f32)
    } else {
        (reduce as f32, boost as f32)
    }
}

pub fn eight_d(audio: &AudioBuffer, period: f64) -> PipelineResult<AudioBuffer> {
    if !period.is_finite() {
        return Err(PipelineError::invalid(format!(
            "8D period must be a finite number, got {period}"
        )));
    }
    let stereo = match audio.channels {
        1 => audio.upmix_to_stereo(),
        2 => audio.clone(),
        n => {
            return Err(PipelineError::invalid(format!(
                "8D panning supports mono or stereo input, got {n} channels"
            )));
        }
    };

    let period = normalize_period(period as i64);

    let rate = stereo.sample_rate as usize;
    let padding = rate * PADDING_MS / 1000;
    let window = (rate * WINDOW_MS / 1000).max(1);

    let mut padded = stereo.samples;
    padded.resize(padded.len() + padding * 2, 0.0);

    let mut samples = Vec::with_capacity(padded.len());
    for (i, chunk) in padded.chunks_exact(window * 2).enumerate() {
        let (left, right) = pan_gains(pan_position(period, i % period));
        for frame in chunk.chunks_exact(2) {
            samples.push(frame[0] * left);
            samples.push(frame[1] * right);
        }
    }

    Ok(AudioBuffer {
        samples,
        sample_rate: stereo.sample_rate,
        channels: 2,
    })
}
