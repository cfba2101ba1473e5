//! Loudness and peak safety chain applied to every final mix.
//!
//! Stateless pure-function chain: DC removal, band-limiting, loudness
//! normalization (whole-buffer RMS or K-weighted gated loudness), soft
//! clip, true-peak limiting, and edge fades. For any finite input the
//! output peak stays at or below the configured ceiling; pure silence
//! passes through gain-wise untouched.

use crate::buffer::SampleBuffer;
use crate::config::{LoudnessMode, SafetyConfig};
use crate::error::CoreError;
use crate::filter::{Biquad, BiquadKind, moving_average, one_pole_highpass, one_pole_lowpass};
use crate::progress::{Monitor, Stage};

/// Soft-clip threshold ahead of the limiter.
const CLIP_THRESHOLD: f32 = 0.95;

/// K-weighting design parameters (ITU-R BS.1770 pre-filter), realized at
/// the buffer's sample rate.
const K_SHELF_HZ: f64 = 1681.97;
const K_SHELF_GAIN_DB: f64 = 3.99984;
const K_SHELF_Q: f64 = 0.7071752;
const K_HIGHPASS_HZ: f64 = 38.13547;
const K_HIGHPASS_Q: f64 = 0.5003270;

/// Gating constants for the integrated loudness measurement.
const BLOCK_S: f32 = 0.4;
const HOP_S: f32 = 0.1;
const ABSOLUTE_GATE_DB: f64 = -70.0;
const RELATIVE_GATE_DB: f64 = -10.0;
const LOUDNESS_OFFSET_DB: f64 = -0.691;

/// Run the full chain over a buffer and return the processed copy.
pub fn process(
    buffer: &SampleBuffer,
    config: &SafetyConfig,
    monitor: &mut Monitor,
) -> Result<SampleBuffer, CoreError> {
    config.validate()?;
    buffer.ensure_finite()?;

    let sample_rate = buffer.sample_rate();
    let mut out = buffer.clone();

    monitor.report(Stage::Safety, 0.0, "dc removal and band limiting");
    monitor.checkpoint()?;
    for ch in out.channels_mut() {
        remove_dc_offset(ch);
        let band_limited = band_limit(ch, config, sample_rate);
        ch.copy_from_slice(&band_limited);
    }

    monitor.report(Stage::Safety, 30.0, "loudness normalization");
    monitor.checkpoint()?;
    let gain_db = match config.loudness_mode {
        LoudnessMode::Rms => rms_gain_db(&out, config.target_db),
        LoudnessMode::Gated => {
            measure_gated_loudness(&out).map(|measured| config.target_db - measured)
        }
    };
    if let Some(gain_db) = gain_db {
        let gain = db_to_linear(gain_db + config.makeup_db);
        for ch in out.channels_mut() {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }

    monitor.report(Stage::Safety, 60.0, "clipping and limiting");
    monitor.checkpoint()?;
    let ceiling = db_to_linear(config.ceiling_db);
    for ch in out.channels_mut() {
        for s in ch.iter_mut() {
            *s = soft_clip(*s);
        }
        let limited = true_peak_limit(ch, ceiling, config.attack, config.release, sample_rate);
        ch.copy_from_slice(&limited);
    }

    monitor.report(Stage::Safety, 90.0, "edge fades");
    monitor.checkpoint()?;
    for ch in out.channels_mut() {
        apply_edge_fades(ch, config.fade_in, config.fade_out, sample_rate);
    }

    monitor.report(Stage::Safety, 100.0, "safety chain done");
    Ok(out)
}

/// Subtract the mean. Applying this twice is the same as applying it once.
pub fn remove_dc_offset(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = (samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64) as f32;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// One-pole high-pass, then one-pole low-pass when vibroacoustic
/// band-limiting is configured.
fn band_limit(samples: &[f32], config: &SafetyConfig, sample_rate: u32) -> Vec<f32> {
    let high_passed = one_pole_highpass(samples, config.highpass_hz, sample_rate);
    match config.lowpass_hz {
        Some(cutoff) => one_pole_lowpass(&high_passed, cutoff, sample_rate),
        None => high_passed,
    }
}

/// Gain in dB that brings whole-buffer RMS to the target. `None` for
/// silence — normalizing the noise floor up to target is never wanted.
fn rms_gain_db(buffer: &SampleBuffer, target_db: f32) -> Option<f32> {
    let mono = buffer.mono();
    let mut sum = 0.0f64;
    for &s in &mono {
        sum += s as f64 * s as f64;
    }
    let rms = (sum / mono.len().max(1) as f64).sqrt();
    if rms <= 1e-10 {
        return None;
    }
    Some(target_db - (20.0 * rms.log10()) as f32)
}

/// K-weighted, gated integrated loudness of the mono sum, in LUFS.
/// `None` when every block is below the absolute gate (i.e. silence).
pub fn measure_gated_loudness(buffer: &SampleBuffer) -> Option<f32> {
    let sample_rate = buffer.sample_rate();
    let mono = buffer.mono();

    let mut shelf = Biquad::new(
        BiquadKind::Highshelf {
            gain_db: K_SHELF_GAIN_DB,
        },
        K_SHELF_HZ,
        K_SHELF_Q,
        sample_rate as f64,
    );
    let mut highpass = Biquad::new(
        BiquadKind::Highpass,
        K_HIGHPASS_HZ,
        K_HIGHPASS_Q,
        sample_rate as f64,
    );
    let weighted: Vec<f32> = mono
        .iter()
        .map(|&s| highpass.process(shelf.process(s)))
        .collect();

    let block = (BLOCK_S * sample_rate as f32) as usize;
    let hop = (HOP_S * sample_rate as f32) as usize;
    if block == 0 || hop == 0 || weighted.len() < block {
        return None;
    }

    // Mean-square power per 400 ms block, hopped by 100 ms.
    let mut block_power = Vec::new();
    let mut pos = 0;
    while pos + block <= weighted.len() {
        let mut sum = 0.0f64;
        for &s in &weighted[pos..pos + block] {
            sum += s as f64 * s as f64;
        }
        block_power.push(sum / block as f64);
        pos += hop;
    }

    let block_loudness = |power: f64| LOUDNESS_OFFSET_DB + 10.0 * power.max(1e-12).log10();

    // Absolute gate at -70, then a relative gate 10 dB under the mean of
    // the survivors, both in linear power.
    let absolute: Vec<f64> = block_power
        .iter()
        .copied()
        .filter(|&p| block_loudness(p) > ABSOLUTE_GATE_DB)
        .collect();
    if absolute.is_empty() {
        return None;
    }

    let mean_power = absolute.iter().sum::<f64>() / absolute.len() as f64;
    let relative_gate = block_loudness(mean_power) + RELATIVE_GATE_DB;

    let gated: Vec<f64> = absolute
        .into_iter()
        .filter(|&p| block_loudness(p) > relative_gate)
        .collect();
    if gated.is_empty() {
        return None;
    }

    let integrated = gated.iter().sum::<f64>() / gated.len() as f64;
    Some(block_loudness(integrated) as f32)
}

/// Soft clip at 0.95 with a tanh knee on the excess.
fn soft_clip(x: f32) -> f32 {
    let t = CLIP_THRESHOLD;
    if x.abs() <= t {
        x
    } else {
        x.signum() * (t + (1.0 - t) * ((x.abs() - t) / (1.0 - t)).tanh())
    }
}

/// True-peak limiting: an attack/release envelope follower over |x| drives
/// instantaneous gain wherever the envelope exceeds the ceiling; the gain
/// curve is smoothed by a moving average the width of the attack window to
/// avoid clicks, then clamped per sample so the ceiling bound is exact.
pub fn true_peak_limit(
    samples: &[f32],
    ceiling: f32,
    attack: f32,
    release: f32,
    sample_rate: u32,
) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let attack_coef = (-1.0 / (attack as f64 * sample_rate as f64)).exp();
    let release_coef = (-1.0 / (release as f64 * sample_rate as f64)).exp();

    let mut envelope = 0.0f64;
    let mut gain = Vec::with_capacity(samples.len());
    for &s in samples {
        let level = s.abs() as f64;
        let coef = if level > envelope {
            attack_coef
        } else {
            release_coef
        };
        envelope = coef * envelope + (1.0 - coef) * level;
        gain.push(if envelope > ceiling as f64 {
            (ceiling as f64 / envelope) as f32
        } else {
            1.0
        });
    }

    let attack_window = ((attack * sample_rate as f32) as usize).max(1);
    let smoothed = moving_average(&gain, attack_window);

    samples
        .iter()
        .zip(smoothed.iter())
        .map(|(&s, &g)| {
            let y = s * g;
            // Smoothing can locally relax the gain; the ceiling is a hard
            // guarantee, so clamp the residue.
            if y.abs() > ceiling {
                y.signum() * ceiling
            } else {
                y
            }
        })
        .collect()
}

/// Quadratic fade-in/out at the buffer edges.
fn apply_edge_fades(samples: &mut [f32], fade_in: f32, fade_out: f32, sample_rate: u32) {
    let len = samples.len();
    let fade_in_samples = ((fade_in * sample_rate as f32) as usize).min(len);
    for i in 0..fade_in_samples {
        let t = i as f32 / fade_in_samples as f32;
        samples[i] *= t * t;
    }
    let fade_out_samples = ((fade_out * sample_rate as f32) as usize).min(len);
    for i in 0..fade_out_samples {
        let t = i as f32 / fade_out_samples as f32;
        samples[len - 1 - i] *= t * t;
    }
}

fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn sine(freq: f32, sample_rate: u32, duration: f32, amp: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * duration) as usize;
        (0..len)
            .map(|i| amp * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn dc_removal_is_idempotent() {
        let mut once: Vec<f32> = sine(60.0, 44100, 0.5, 0.4)
            .iter()
            .map(|s| s + 0.25)
            .collect();
        remove_dc_offset(&mut once);
        let mut twice = once.clone();
        remove_dc_offset(&mut twice);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        let mean: f32 = once.iter().sum::<f32>() / once.len() as f32;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn limiter_enforces_ceiling_on_hot_input() {
        let input = sine(55.0, 44100, 1.0, 2.5); // way over full scale
        let ceiling = db_to_linear(-1.0);
        let out = true_peak_limit(&input, ceiling, 0.005, 0.05, 44100);
        let peak = out.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!(
            peak <= ceiling + 1e-6,
            "peak {peak} exceeds ceiling {ceiling}"
        );
    }

    #[test]
    fn limiter_passes_quiet_signal_unchanged() {
        let input = sine(55.0, 44100, 0.5, 0.1);
        let out = true_peak_limit(&input, db_to_linear(-1.0), 0.005, 0.05, 44100);
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn limiter_survives_impulse_burst() {
        let mut input = vec![0.0f32; 22050];
        for i in 10000..10100 {
            input[i] = if i % 2 == 0 { 3.0 } else { -3.0 };
        }
        let ceiling = db_to_linear(-0.5);
        let out = true_peak_limit(&input, ceiling, 0.005, 0.05, 44100);
        let peak = out.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!(peak <= ceiling + 1e-6);
    }

    #[test]
    fn rms_normalization_hits_target() {
        let buffer = SampleBuffer::from_mono(sine(60.0, 44100, 2.0, 0.05), 44100);
        let config = SafetyConfig {
            loudness_mode: LoudnessMode::Rms,
            target_db: -20.0,
            lowpass_hz: Some(120.0),
            fade_in: 0.0,
            fade_out: 0.0,
            ..SafetyConfig::default()
        };
        let out = process(&buffer, &config, &mut Monitor::silent()).unwrap();
        let mono = out.mono();
        // Measure away from the edges and the filter transient.
        let body = &mono[8820..mono.len() - 8820];
        let rms = (body.iter().map(|&s| s as f64 * s as f64).sum::<f64>() / body.len() as f64)
            .sqrt();
        let rms_db = 20.0 * rms.log10();
        assert!(
            (rms_db - (-20.0)).abs() < 1.5,
            "RMS should land near -20 dB, got {rms_db:.2}"
        );
    }

    #[test]
    fn gated_normalization_hits_target() {
        let buffer = SampleBuffer::from_mono(sine(100.0, 48000, 3.0, 0.1), 48000);
        let config = SafetyConfig {
            loudness_mode: LoudnessMode::Gated,
            target_db: -16.0,
            fade_in: 0.0,
            fade_out: 0.0,
            ..SafetyConfig::default()
        };
        let out = process(&buffer, &config, &mut Monitor::silent()).unwrap();
        let measured = measure_gated_loudness(&out).unwrap();
        assert!(
            (measured - (-16.0)).abs() < 1.0,
            "gated loudness should land near -16 LUFS, got {measured:.2}"
        );
        // Level well below the clip and limiter stages, so the gain is
        // purely the normalization correction.
        assert!(out.peak() < db_to_linear(config.ceiling_db));
    }

    #[test]
    fn silence_passes_through_unamplified() {
        let buffer = SampleBuffer::silence(2, 44100, 44100);
        let out = process(&buffer, &SafetyConfig::default(), &mut Monitor::silent()).unwrap();
        assert_eq!(out.peak(), 0.0, "silence must stay silent");
    }

    #[test]
    fn gated_loudness_of_silence_is_none() {
        let buffer = SampleBuffer::silence(1, 48000 * 2, 48000);
        assert!(measure_gated_loudness(&buffer).is_none());
    }

    #[test]
    fn gated_loudness_tracks_level_changes() {
        let quiet = SampleBuffer::from_mono(sine(100.0, 48000, 2.0, 0.05), 48000);
        let loud = SampleBuffer::from_mono(sine(100.0, 48000, 2.0, 0.5), 48000);
        let lq = measure_gated_loudness(&quiet).unwrap();
        let ll = measure_gated_loudness(&loud).unwrap();
        // 20 dB amplitude difference should read ~20 LU apart.
        assert!(
            ((ll - lq) - 20.0).abs() < 1.0,
            "expected ~20 LU spread, got {}",
            ll - lq
        );
    }

    #[test]
    fn gated_loudness_ignores_long_silent_stretch() {
        // Tone then silence: gating should keep the measurement close to
        // the tone-only value instead of averaging the silence in.
        let mut with_gap = sine(100.0, 48000, 2.0, 0.3);
        with_gap.extend(vec![0.0f32; 48000 * 2]);
        let tone_only = SampleBuffer::from_mono(sine(100.0, 48000, 2.0, 0.3), 48000);
        let gap = measure_gated_loudness(&SampleBuffer::from_mono(with_gap, 48000)).unwrap();
        let tone = measure_gated_loudness(&tone_only).unwrap();
        assert!(
            (gap - tone).abs() < 1.5,
            "gated measurement drifted: {gap} vs {tone}"
        );
    }

    #[test]
    fn full_chain_respects_ceiling() {
        let buffer = SampleBuffer::from_mono(sine(60.0, 44100, 3.0, 0.8), 44100);
        let config = SafetyConfig::default();
        let out = process(&buffer, &config, &mut Monitor::silent()).unwrap();
        let ceiling = db_to_linear(config.ceiling_db);
        assert!(out.peak() <= ceiling + 1e-4);
    }

    #[test]
    fn edge_fades_zero_the_boundaries() {
        let buffer = SampleBuffer::from_mono(sine(60.0, 44100, 3.0, 0.5), 44100);
        let out = process(&buffer, &SafetyConfig::default(), &mut Monitor::silent()).unwrap();
        let data = out.channel(0);
        assert_eq!(data[0], 0.0);
        assert!(data[44].abs() < 1e-3, "fade-in start stays tiny");
        assert_eq!(*data.last().unwrap(), 0.0);
    }

    #[test]
    fn non_finite_input_rejected() {
        let buffer = SampleBuffer::from_mono(vec![0.0, f32::NAN, 0.0], 44100);
        assert!(matches!(
            process(&buffer, &SafetyConfig::default(), &mut Monitor::silent()),
            Err(CoreError::InvalidAudioData)
        ));
    }
}
