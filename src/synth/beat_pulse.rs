//! Beat-synced bass: one decaying sine pulse per detected beat.
//!
//! Pulses sum additively with no voice stealing — overlapping decays can
//! exceed unity before the final peak normalization, which is what bounds
//! the output.

use std::f32::consts::TAU;

use crate::analysis::AnalysisResult;
use crate::buffer::SampleBuffer;
use crate::config::GenerationConfig;
use crate::error::CoreError;
use crate::progress::{BEAT_BATCH, Monitor, Stage};
use crate::synth::{TARGET_PEAK, output_len};

pub fn generate(
    config: &GenerationConfig,
    analysis: &AnalysisResult,
    monitor: &mut Monitor,
) -> Result<SampleBuffer, CoreError> {
    let sample_rate = analysis.sample_rate as f32;
    let len = output_len(analysis);
    let mut out = vec![0.0f32; len];

    let attack_samples = ((config.attack * sample_rate) as usize).max(1);
    let decay_samples = ((config.decay * sample_rate) as usize).max(1);
    let beat_period = 60.0 / analysis.bpm.max(1.0);

    for (n, beat) in analysis.beats.iter().enumerate() {
        if n % BEAT_BATCH == 0 {
            monitor.checkpoint()?;
            monitor.report(
                Stage::Generation,
                n as f32 / analysis.beats.len().max(1) as f32 * 100.0,
                "beat pulses",
            );
        }

        let frequency = pulse_frequency(config, beat.time, beat_period);
        let amplitude = config.intensity * beat.strength;
        let start = (beat.time * sample_rate) as usize;

        for s in 0..attack_samples + decay_samples {
            let idx = start + s;
            if idx >= len {
                break;
            }
            let envelope = if s < attack_samples {
                s as f32 / attack_samples as f32
            } else {
                (-3.0 * (s - attack_samples) as f32 / decay_samples as f32).exp()
            };
            let t = s as f32 / sample_rate;
            out[idx] += amplitude * envelope * (TAU * frequency * t).sin();
        }
    }

    let mut buffer = SampleBuffer::from_mono(out, analysis.sample_rate);
    buffer.normalize_peak(TARGET_PEAK);
    Ok(buffer)
}

/// Pulse frequency from the beat's quantized position in a 4-beat bar:
/// downbeats sit at the bottom of the range, backbeats at the middle,
/// offbeats in between.
fn pulse_frequency(config: &GenerationConfig, time: f32, beat_period: f32) -> f32 {
    let range = config.frequency_max - config.frequency_min;
    let position = (time / beat_period).round() as i64 % 4;
    match position {
        0 => config.frequency_min,
        2 => config.frequency_min + range * 0.5,
        _ => config.frequency_min + range * 0.25,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Beat;

    fn analysis_with_beats(beats: Vec<Beat>, duration: f32) -> AnalysisResult {
        AnalysisResult {
            duration,
            sample_rate: 44100,
            bpm: 120.0,
            beats,
            pitch_samples: Vec::new(),
            detected_key: None,
            bass_profile: Vec::new(),
            average_bass_energy: 0.0,
        }
    }

    #[test]
    fn no_beats_yields_silence() {
        let analysis = analysis_with_beats(Vec::new(), 2.0);
        let buffer = generate(
            &GenerationConfig::default(),
            &analysis,
            &mut Monitor::silent(),
        )
        .unwrap();
        assert_eq!(buffer.len(), 88200);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn pulses_peak_normalized() {
        let beats = (0..4)
            .map(|n| Beat {
                time: 0.25 + n as f32 * 0.5,
                strength: 1.0,
            })
            .collect();
        let analysis = analysis_with_beats(beats, 3.0);
        let buffer = generate(
            &GenerationConfig::default(),
            &analysis,
            &mut Monitor::silent(),
        )
        .unwrap();
        assert!((buffer.peak() - TARGET_PEAK).abs() < 1e-3);
    }

    #[test]
    fn energy_concentrates_after_beats() {
        let beats = vec![Beat {
            time: 1.0,
            strength: 1.0,
        }];
        let analysis = analysis_with_beats(beats, 2.0);
        let buffer = generate(
            &GenerationConfig::default(),
            &analysis,
            &mut Monitor::silent(),
        )
        .unwrap();
        let data = buffer.channel(0);
        let before: f32 = data[..44100].iter().map(|s| s.abs()).sum();
        let after: f32 = data[44100..].iter().map(|s| s.abs()).sum();
        assert_eq!(before, 0.0, "nothing before the only beat");
        assert!(after > 0.0);
    }

    #[test]
    fn pulse_frequency_stays_in_range() {
        let config = GenerationConfig::default();
        for n in 0..16 {
            let f = pulse_frequency(&config, n as f32 * 0.5, 0.5);
            assert!(f >= config.frequency_min && f <= config.frequency_max);
        }
    }

    #[test]
    fn downbeat_lower_than_backbeat() {
        let config = GenerationConfig::default();
        let down = pulse_frequency(&config, 0.0, 0.5);
        let back = pulse_frequency(&config, 1.0, 0.5);
        let off = pulse_frequency(&config, 0.5, 0.5);
        assert!(down < off && off < back);
    }

    #[test]
    fn cancellation_stops_generation() {
        let beats = (0..200)
            .map(|n| Beat {
                time: n as f32 * 0.01,
                strength: 0.5,
            })
            .collect();
        let analysis = analysis_with_beats(beats, 3.0);
        let mut monitor = Monitor::silent();
        monitor.cancel_handle().cancel();
        let result = generate(&GenerationConfig::default(), &analysis, &mut monitor);
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
