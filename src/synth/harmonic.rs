//! Harmonic bass: octave-shifted root notes following the tracked pitch.
//!
//! Each qualifying pitch sample starts or retunes a phase-continuous sine
//! sustained until the next sample or a silence cutoff. When no usable
//! pitch data exists the mixer substitutes the beat-synced buffer (an
//! explicit, configurable fallback — see `GenerationConfig::harmonic_fallback`).

use std::f32::consts::TAU;

use crate::analysis::AnalysisResult;
use crate::buffer::SampleBuffer;
use crate::config::GenerationConfig;
use crate::error::CoreError;
use crate::progress::{BEAT_BATCH, Monitor, Stage};
use crate::synth::{TARGET_PEAK, output_len};

/// Pitch samples below this confidence do not produce notes.
const MIN_CONFIDENCE: f32 = 0.3;
/// A note with no successor stops after this long.
const MAX_HOLD: f32 = 1.0;
/// Release ramp to avoid clicks at note ends.
const RELEASE: f32 = 0.05;

/// Whether the analysis carries pitch data strong enough to drive this
/// generator.
pub fn has_usable_pitch(analysis: &AnalysisResult) -> bool {
    analysis
        .pitch_samples
        .iter()
        .any(|p| p.confidence >= MIN_CONFIDENCE)
}

pub fn generate(
    config: &GenerationConfig,
    analysis: &AnalysisResult,
    monitor: &mut Monitor,
) -> Result<SampleBuffer, CoreError> {
    let sample_rate = analysis.sample_rate as f32;
    let len = output_len(analysis);
    let mut out = vec![0.0f32; len];

    let attack_samples = ((config.attack * sample_rate) as usize).max(1);
    let release_samples = ((RELEASE * sample_rate) as usize).max(1);

    let notes: Vec<_> = analysis
        .pitch_samples
        .iter()
        .filter(|p| p.confidence >= MIN_CONFIDENCE)
        .collect();

    // Phase accumulator shared across notes keeps retunes click-free.
    let mut phase = 0.0f64;
    for (n, sample) in notes.iter().enumerate() {
        if n % BEAT_BATCH == 0 {
            monitor.checkpoint()?;
            monitor.report(
                Stage::Generation,
                n as f32 / notes.len().max(1) as f32 * 100.0,
                "harmonic bass",
            );
        }

        let frequency = (sample.frequency * config.octave_shift.factor())
            .clamp(config.frequency_min, config.frequency_max);
        let amplitude = config.intensity * sample.confidence;

        let start = (sample.time * sample_rate) as usize;
        let end_time = notes
            .get(n + 1)
            .map(|next| next.time)
            .unwrap_or(sample.time + MAX_HOLD)
            .min(sample.time + MAX_HOLD);
        let end = ((end_time * sample_rate) as usize).min(len);
        if start >= end {
            continue;
        }

        let note_len = end - start;
        let inc = frequency as f64 / sample_rate as f64;
        for s in 0..note_len {
            let envelope = if s < attack_samples {
                s as f32 / attack_samples as f32
            } else if note_len - s <= release_samples {
                (note_len - s) as f32 / release_samples as f32
            } else {
                1.0
            };
            phase += inc;
            out[start + s] += amplitude * envelope * (TAU as f64 * phase).sin() as f32;
        }
        phase %= 1.0;
    }

    let mut buffer = SampleBuffer::from_mono(out, analysis.sample_rate);
    buffer.normalize_peak(TARGET_PEAK);
    Ok(buffer)
}
