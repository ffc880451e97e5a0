//! Freeverb-style reverb applied to a whole buffer.
//!
//! The buffer is fed through one persistent filter state in fixed-size
//! chunks. The state is never reset between chunks, so the reverb tail of
//! one chunk rings into the next and the result does not depend on the
//! chunk size.

use super::AudioBuffer;
use crate::error::{PipelineError, PipelineResult};

/// Seconds of audio processed per chunk.
pub const CHUNK_SECONDS: f64 = 1.0;

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;

const INPUT_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;

const DAMPING: f32 = 0.5;
const WET_LEVEL: f32 = 0.33;
const DRY_LEVEL: f32 = 0.4;
const WIDTH: f32 = 1.0;

struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - damp) + self.filter_store * damp;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }
}

/// Reverb state for up to two channels.
pub struct Reverb {
    comb_l: [CombFilter; 8],
    allpass_l: [AllpassFilter; 4],
    comb_r: [CombFilter; 8],
    allpass_r: [AllpassFilter; 4],
    feedback: f32,
    damp: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, room_size: f32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let scaled = |tuning: usize| (tuning as f32 * scale) as usize;
        let spread = scaled(STEREO_SPREAD);

        let wet = WET_LEVEL * WET_SCALE;
        Self {
            comb_l: std::array::from_fn(|i| CombFilter::new(scaled(COMB_TUNINGS[i]))),
            allpass_l: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_TUNINGS[i]))),
            comb_r: std::array::from_fn(|i| CombFilter::new(scaled(COMB_TUNINGS[i]) + spread)),
            allpass_r: std::array::from_fn(|i| {
                AllpassFilter::new(scaled(ALLPASS_TUNINGS[i]) + spread)
            }),
            feedback: room_size * ROOM_SCALE + ROOM_OFFSET,
            damp: DAMPING * DAMP_SCALE,
            wet1: 0.5 * wet * (1.0 + WIDTH),
            wet2: 0.5 * wet * (1.0 - WIDTH),
            dry: DRY_LEVEL * DRY_SCALE,
        }
    }

    fn process_stereo(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * INPUT_GAIN;
        let mut out_l = 0.0;
        let mut out_r = 0.0;
        for comb in &mut self.comb_l {
            out_l += comb.process(input, self.feedback, self.damp);
        }
        for comb in &mut self.comb_r {
            out_r += comb.process(input, self.feedback, self.damp);
        }
        for allpass in &mut self.allpass_l {
            out_l = allpass.process(out_l);
        }
        for allpass in &mut self.allpass_r {
            out_r = allpass.process(out_r);
        }
        (
            out_l * self.wet1 + out_r * self.wet2 + left * self.dry,
            out_r * self.wet1 + out_l * self.wet2 + right * self.dry,
        )
    }

    fn process_mono(&mut self, sample: f32) -> f32 {
        let input = sample * INPUT_GAIN;
        let mut out = 0.0;
        for comb in &mut self.comb_l {
            out += comb.process(input, self.feedback, self.damp);
        }
        for allpass in &mut self.allpass_l {
            out = allpass.process(out);
        }
        out * self.wet1 + sample * self.dry
    }

    /// Processes interleaved frames in place, carrying state across calls.
    pub fn process(&mut self, samples: &mut [f32], channels: u16) {
        match channels {
            1 => {
                for s in samples.iter_mut() {
                    *s = self.process_mono(*s);
                }
            }
            _ => {
                for frame in samples.chunks_exact_mut(2) {
                    let (l, r) = self.process_stereo(frame[0], frame[1]);
                    frame[0] = l;
                    frame[1] = r;
                }
            }
        }
    }
}

pub fn reverb(audio: &AudioBuffer, room_size: f64) -> PipelineResult<AudioBuffer> {
    let chunk_frames = ((audio.sample_rate as f64 * CHUNK_SECONDS) as usize).max(1);
    reverb_in_chunks(audio, room_size, chunk_frames)
}

pub(crate) fn reverb_in_chunks(
    audio: &AudioBuffer,
    room_size: f64,
    chunk_frames: usize,
) -> PipelineResult<AudioBuffer> {
    if !(0.0..=1.0).contains(&room_size) {
        return Err(PipelineError::invalid(format!(
            "reverb room size must be within [0, 1], got {room_size}"
        )));
    }
    if !matches!(audio.channels, 1 | 2) {
        return Err(PipelineError::invalid(format!(
            "reverb supports mono or stereo input, got {} channels",
            audio.channels
        )));
    }

    let mut state = Reverb::new(audio.sample_rate, room_size as f32);
    let mut samples = audio.samples.clone();
    let chunk_len = chunk_frames.max(1) * audio.channels as usize;
    for chunk in samples.chunks_mut(chunk_len) {
        state.process(chunk, audio.channels);
    }

    Ok(AudioBuffer {
        samples,
        sample_rate: audio.sample_rate,
        channels: audio.channels,
    })
}
