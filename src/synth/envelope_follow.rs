//! Envelope-follow bass: amplified low band plus a synthesized sub-harmonic.
//!
//! The sub-harmonic comes either from zero-crossing octave division of the
//! filtered signal or from a sine whose amplitude follows the smoothed bass
//! profile. A gentle 3:1 compressor above 1.5x the average energy keeps the
//! result even before normalization.

use std::f32::consts::TAU;

use crate::analysis::AnalysisResult;
use crate::analysis::lowband::LowBandAnalysis;
use crate::buffer::SampleBuffer;
use crate::config::{GenerationConfig, SubHarmonicMode};
use crate::error::CoreError;
use crate::filter::moving_average;
use crate::progress::{Monitor, SAMPLE_BATCH, Stage};
use crate::synth::TARGET_PEAK;

/// Envelope smoothing window.
const SMOOTH_S: f32 = 0.010;
const COMPRESS_RATIO: f32 = 3.0;
const COMPRESS_KNEE: f32 = 1.5;

pub fn generate(
    config: &GenerationConfig,
    analysis: &AnalysisResult,
    lowband: &LowBandAnalysis,
    monitor: &mut Monitor,
) -> Result<SampleBuffer, CoreError> {
    let sample_rate = analysis.sample_rate;
    let filtered = lowband.filtered.mono();
    let len = filtered.len();

    let sub = match config.sub_harmonic_mode {
        SubHarmonicMode::OctaveDivide => octave_divide_sub(&filtered, sample_rate),
        SubHarmonicMode::EnvelopeDriven => {
            envelope_driven_sub(config, &lowband.bass_profile, len, sample_rate)
        }
    };

    let mut out = vec![0.0f32; len];
    for i in 0..len {
        if i % SAMPLE_BATCH == 0 {
            monitor.checkpoint()?;
            monitor.report(
                Stage::Generation,
                i as f32 / len.max(1) as f32 * 100.0,
                "envelope bass",
            );
        }
        out[i] = filtered[i] * config.enhancement_gain + sub[i];
    }

    compress(&mut out, lowband.average_bass_energy, sample_rate);

    let mut buffer = SampleBuffer::from_mono(out, sample_rate);
    buffer.normalize_peak(TARGET_PEAK);
    Ok(buffer)
}

/// Flip-flop octave divider: toggles on positive-going zero crossings, so
/// the square it produces runs an octave below the filtered signal. Scaled
/// by the smoothed local amplitude to follow the source dynamics.
fn octave_divide_sub(filtered: &[f32], sample_rate: u32) -> Vec<f32> {
    let amplitude: Vec<f32> = filtered.iter().map(|s| s.abs()).collect();
    let smooth_width = (SMOOTH_S * sample_rate as f32) as usize;
    let envelope = moving_average(&amplitude, smooth_width);

    let mut out = Vec::with_capacity(filtered.len());
    let mut state = 1.0f32;
    let mut prev = 0.0f32;
    for (i, &s) in filtered.iter().enumerate() {
        if prev <= 0.0 && s > 0.0 {
            state = -state;
        }
        prev = s;
        out.push(state * envelope[i]);
    }
    out
}

/// Sine at the configured base frequency, its amplitude linearly
/// interpolated between bass-profile frames and smoothed.
fn envelope_driven_sub(
    config: &GenerationConfig,
    profile: &[crate::analysis::BassEnergyFrame],
    len: usize,
    sample_rate: u32,
) -> Vec<f32> {
    if profile.is_empty() {
        return vec![0.0; len];
    }

    let mut envelope = Vec::with_capacity(len);
    let mut frame = 0usize;
    for i in 0..len {
        let t = i as f32 / sample_rate as f32;
        while frame + 1 < profile.len() && profile[frame + 1].time <= t {
            frame += 1;
        }
        let value = if frame + 1 < profile.len() {
            let a = &profile[frame];
            let b = &profile[frame + 1];
            let span = b.time - a.time;
            let frac = if span > 0.0 { (t - a.time) / span } else { 0.0 };
            a.low_energy + (b.low_energy - a.low_energy) * frac.clamp(0.0, 1.0)
        } else {
            profile[frame].low_energy
        };
        envelope.push(value);
    }
    let smooth_width = (SMOOTH_S * sample_rate as f32) as usize;
    let envelope = moving_average(&envelope, smooth_width);

    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            envelope[i] * (TAU * config.base_frequency * t).sin()
        })
        .collect()
}

/// Soft 3:1 compression of everything above 1.5x the average energy,
/// driven by a smoothed amplitude envelope.
fn compress(samples: &mut [f32], average_energy: f32, sample_rate: u32) {
    let threshold = COMPRESS_KNEE * average_energy;
    if threshold <= 0.0 {
        return;
    }
    let amplitude: Vec<f32> = samples.iter().map(|s| s.abs()).collect();
    let smooth_width = (SMOOTH_S * sample_rate as f32) as usize;
    let envelope = moving_average(&amplitude, smooth_width);

    for (s, &env) in samples.iter_mut().zip(envelope.iter()) {
        if env > threshold {
            let gain = (threshold + (env - threshold) / COMPRESS_RATIO) / env;
            *s *= gain;
        }
    }
}
