use super::AudioBuffer;
use crate::error::{PipelineError, PipelineResult};
use rubato::{FftFixedInOut, Resampler};

const RESAMPLER_CHUNK: usize = 1024;

/// Speeds audio up (or down) by relabelling its sample clock and resampling
/// back to the original rate. Pitch and tempo move together.
pub fn change_speed(audio: &AudioBuffer, factor: f64) -> PipelineResult<AudioBuffer> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(PipelineError::invalid(format!(
            "speed factor must be > 0, got {factor}"
        )));
    }
    let reinterpreted_rate = (audio.sample_rate as f64 * factor) as usize;
    if reinterpreted_rate == 0 {
        return Err(PipelineError::invalid(format!(
            "speed factor {factor} collapses the {} Hz sample clock",
            audio.sample_rate
        )));
    }
    if reinterpreted_rate == audio.sample_rate as usize || audio.samples.is_empty() {
        return Ok(audio.clone());
    }

    let channels = audio.channels as usize;
    let output = resample(
        &audio.deinterleave(),
        reinterpreted_rate,
        audio.sample_rate as usize,
        channels,
    )?;

    Ok(AudioBuffer::interleave(
        &output,
        audio.sample_rate,
        audio.channels,
    ))
}

fn resample(
    input: &[Vec<f32>],
    source_rate: usize,
    target_rate: usize,
    channels: usize,
) -> PipelineResult<Vec<Vec<f32>>> {
    let mut resampler = FftFixedInOut::<f32>::new(source_rate, target_rate, RESAMPLER_CHUNK, channels)
        .map_err(|e| PipelineError::invalid(format!("cannot build resampler: {e}")))?;

    let frames = input.first().map_or(0, Vec::len);
    let expected = (frames as u128 * target_rate as u128 / source_rate as u128) as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(delay + expected); channels];

    // The first `delay` frames out are latency, not signal. Keep feeding
    // zero-padded chunks past the end until `expected` real frames follow.
    let mut pos = 0;
    while output[0].len() < delay + expected {
        let chunk_size = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = input
            .iter()
            .map(|ch| {
                let end = (pos + chunk_size).min(ch.len());
                let mut v = if pos < end { ch[pos..end].to_vec() } else { Vec::new() };
                v.resize(chunk_size, 0.0);
                v
            })
            .collect();

        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| PipelineError::Decode(format!("resampling failed: {e}")))?;
        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }
        pos += chunk_size;
    }

    for ch in &mut output {
        ch.drain(..delay);
        ch.truncate(expected);
    }
    Ok(output)
}
