//! Audio effect chain.
//!
//! Effects are looked up by name in an [`EffectRegistry`]. A whole plan is
//! resolved (names and parameter domains) before any file is touched, then
//! the effects run in order, each one reading the file the previous one
//! wrote.

pub mod pan;
pub mod reverb;
pub mod speed;

use crate::error::{PipelineError, PipelineResult, ensure_input};
use crate::ffmpeg::MediaEngine;
use crate::scratch::ScratchDir;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Decoded, interleaved PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> PipelineResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(PipelineError::Decode(format!(
                "unusable audio layout: {sample_rate} Hz, {channels} channels"
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let channels = self.channels as usize;
        (0..channels)
            .map(|ch| {
                self.samples
                    .iter()
                    .skip(ch)
                    .step_by(channels)
                    .copied()
                    .collect()
            })
            .collect()
    }

    pub fn interleave(planes: &[Vec<f32>], sample_rate: u32, channels: u16) -> Self {
        let frames = planes.first().map_or(0, Vec::len);
        let mut samples = Vec::with_capacity(frames * planes.len());
        for f in 0..frames {
            for plane in planes {
                samples.push(plane[f]);
            }
        }
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn upmix_to_stereo(&self) -> Self {
        Self {
            samples: self.samples.iter().flat_map(|s| [*s, *s]).collect(),
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }
}

/// One step of an effect plan, e.g. `reverb=0.15`.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSpec {
    pub name: String,
    pub param: f64,
}

impl EffectSpec {
    pub fn new(name: impl Into<String>, param: f64) -> Self {
        Self {
            name: name.into(),
            param,
        }
    }
}

/// Values an effect parameter may take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDomain {
    UnitInterval,
    Positive,
    Finite,
}

impl ParamDomain {
    fn check(self, effect: &str, value: f64) -> PipelineResult<()> {
        let ok = match self {
            ParamDomain::UnitInterval => (0.0..=1.0).contains(&value),
            ParamDomain::Positive => value.is_finite() && value > 0.0,
            ParamDomain::Finite => value.is_finite(),
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            ParamDomain::UnitInterval => "within [0, 1]",
            ParamDomain::Positive => "> 0",
            ParamDomain::Finite => "a finite number",
        };
        Err(PipelineError::invalid(format!(
            "`{effect}` parameter must be {expected}, got {value}"
        )))
    }
}

pub type Transform = fn(&AudioBuffer, f64) -> PipelineResult<AudioBuffer>;

#[derive(Clone, Copy)]
pub struct EffectEntry {
    pub name: &'static str,
    pub domain: ParamDomain,
    pub transform: Transform,
}

pub struct EffectRegistry {
    entries: BTreeMap<&'static str, EffectEntry>,
}

impl EffectRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Reverb, change-speed and 8D panning under their names and aliases.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            &["reverb"],
            EffectEntry {
                name: "reverb",
                domain: ParamDomain::UnitInterval,
                transform: reverb::reverb,
            },
        );
        registry.register(
            &["change_speed", "speed"],
            EffectEntry {
                name: "change_speed",
                domain: ParamDomain::Positive,
                transform: speed::change_speed,
            },
        );
        registry.register(
            &["eight_d", "8d", "pan"],
            EffectEntry {
                name: "eight_d",
                domain: ParamDomain::Finite,
                transform: pan::eight_d,
            },
        );
        registry
    }

    pub fn register(&mut self, names: &[&'static str], entry: EffectEntry) {
        for name in names {
            self.entries.insert(*name, entry);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Checks every step of `plan` up front.
    pub fn resolve(&self, plan: &[EffectSpec]) -> PipelineResult<Vec<ResolvedEffect>> {
        plan.iter()
            .map(|spec| {
                let key = spec.name.trim().to_ascii_lowercase();
                let entry = *self
                    .entries
                    .get(key.as_str())
                    .ok_or_else(|| PipelineError::UnknownEffect(spec.name.clone()))?;
                entry.domain.check(entry.name, spec.param)?;
                Ok(ResolvedEffect {
                    entry,
                    param: spec.param,
                })
            })
            .collect()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A plan step bound to its transform.
#[derive(Clone, Copy)]
pub struct ResolvedEffect {
    entry: EffectEntry,
    param: f64,
}

impl std::fmt::Debug for ResolvedEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.entry.name, self.param)
    }
}

impl ResolvedEffect {
    pub fn name(&self) -> &'static str {
        self.entry.name
    }

    pub fn param(&self) -> f64 {
        self.param
    }

    pub fn apply_buffer(&self, audio: &AudioBuffer) -> PipelineResult<AudioBuffer> {
        (self.entry.transform)(audio, self.param)
    }

    /// Decodes `input`, transforms it and writes `output` at the input's bit rate.
    pub fn apply_file(
        &self,
        engine: &dyn MediaEngine,
        input: &Path,
        output: &Path,
    ) -> PipelineResult<PathBuf> {
        ensure_input(input)?;
        let source = engine.probe(input).map_err(|e| match e {
            PipelineError::Probe(msg) => PipelineError::Decode(msg),
            other => other,
        })?;
        let bit_rate = source
            .audio()
            .ok_or_else(|| {
                PipelineError::Decode(format!("no audio stream in '{}'", input.display()))
            })?
            .bit_rate;

        let decoded = engine.decode_audio(&source)?;
        let processed = self.apply_buffer(&decoded)?;
        engine.encode_audio(&processed, output, bit_rate)?;
        Ok(output.to_path_buf())
    }
}

/// Runs `effects` in order from `input`, writing the last result to `output`.
///
/// Intermediate results go to scratch files with the output's extension.
/// With no effects the input path is returned untouched.
pub fn apply_chain(
    engine: &dyn MediaEngine,
    scratch: &ScratchDir,
    input: &Path,
    effects: &[ResolvedEffect],
    output: &Path,
) -> PipelineResult<PathBuf> {
    ensure_input(input)?;
    let Some((last, head)) = effects.split_last() else {
        return Ok(input.to_path_buf());
    };

    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp3")
        .to_string();

    let mut current = input.to_path_buf();
    for effect in head {
        let next = scratch.create(&ext);
        info!(effect = ?effect, from = %current.display(), "applying audio effect");
        current = effect.apply_file(engine, &current, &next)?;
    }
    info!(effect = ?last, output = %output.display(), "applying final audio effect");
    last.apply_file(engine, &current, output)
}
