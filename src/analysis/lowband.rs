//! Low-band extraction: isolates near-bass content and profiles its energy.
//!
//! The energy profile is a deliberately simplified single-band proxy: one
//! wideband RMS per hop, split 0.3/0.7/1.0 into sub/bass/low shares. The
//! filtered buffer, not the profile, carries the actual frequency
//! selection.

use crate::analysis::{BassEnergyFrame, rms};
use crate::buffer::SampleBuffer;
use crate::filter::{Biquad, BiquadKind};

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 1024;
const FRAME_STRIDE: usize = 4;

#[derive(Debug, Clone)]
pub struct LowBandExtractor {
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub q: f32,
}

impl Default for LowBandExtractor {
    fn default() -> Self {
        LowBandExtractor {
            highpass_hz: 20.0,
            lowpass_hz: 80.0,
            q: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LowBandAnalysis {
    pub bass_profile: Vec<BassEnergyFrame>,
    pub average_bass_energy: f32,
    /// Source filtered through the high-pass/low-pass cascade, same shape
    /// as the input.
    pub filtered: SampleBuffer,
}

impl LowBandExtractor {
    pub fn extract(&self, source: &SampleBuffer) -> LowBandAnalysis {
        let sample_rate = source.sample_rate();

        // Fresh filter state per channel; the cascade runs high-pass first
        // to drop DC before the low-pass narrows the band.
        let filtered_channels: Vec<Vec<f32>> = source
            .channels()
            .iter()
            .map(|ch| {
                let mut hp = Biquad::new(
                    BiquadKind::Highpass,
                    self.highpass_hz as f64,
                    self.q as f64,
                    sample_rate as f64,
                );
                let mut lp = Biquad::new(
                    BiquadKind::Lowpass,
                    self.lowpass_hz as f64,
                    self.q as f64,
                    sample_rate as f64,
                );
                ch.iter().map(|&s| lp.process(hp.process(s))).collect()
            })
            .collect();
        let filtered = SampleBuffer::new(filtered_channels, sample_rate);

        let mono = source.mono();
        let mut bass_profile = Vec::new();
        let mut frame_index = 0usize;
        let mut pos = 0;
        while pos + FRAME_SIZE <= mono.len() {
            if frame_index % FRAME_STRIDE == 0 {
                let energy = rms(&mono[pos..pos + FRAME_SIZE]);
                bass_profile.push(BassEnergyFrame {
                    time: pos as f32 / sample_rate as f32,
                    sub_bass_energy: 0.3 * energy,
                    bass_energy: 0.7 * energy,
                    low_energy: energy,
                });
            }
            frame_index += 1;
            pos += HOP_SIZE;
        }

        let average_bass_energy = if bass_profile.is_empty() {
            0.0
        } else {
            bass_profile.iter().map(|f| f.low_energy).sum::<f32>() / bass_profile.len() as f32
        };

        log::debug!(
            "low-band extraction: {} profile frames, avg energy {:.4}",
            bass_profile.len(),
            average_bass_energy
        );

        LowBandAnalysis {
            bass_profile,
            average_bass_energy,
            filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn sine_buffer(freq: f32, sample_rate: u32, duration: f32, amp: f32) -> SampleBuffer {
        let len = (sample_rate as f32 * duration) as usize;
        let data = (0..len)
            .map(|i| amp * (TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        SampleBuffer::from_mono(data, sample_rate)
    }

    #[test]
    fn filtered_buffer_matches_input_shape() {
        let src = sine_buffer(55.0, 44100, 1.0, 0.5);
        let result = LowBandExtractor::default().extract(&src);
        assert_eq!(result.filtered.len(), src.len());
        assert_eq!(result.filtered.num_channels(), src.num_channels());
        assert_eq!(result.filtered.sample_rate(), 44100);
    }

    #[test]
    fn passes_bass_rejects_treble() {
        let bass = LowBandExtractor::default().extract(&sine_buffer(50.0, 44100, 1.0, 0.5));
        let treble = LowBandExtractor::default().extract(&sine_buffer(2000.0, 44100, 1.0, 0.5));
        let bass_peak = bass.filtered.peak();
        let treble_peak = treble.filtered.peak();
        assert!(bass_peak > 0.2, "50 Hz should survive, peak {bass_peak}");
        assert!(
            treble_peak < 0.02,
            "2 kHz should be rejected, peak {treble_peak}"
        );
    }

    #[test]
    fn profile_split_is_consistent() {
        let result = LowBandExtractor::default().extract(&sine_buffer(60.0, 44100, 2.0, 0.5));
        assert!(!result.bass_profile.is_empty());
        for f in &result.bass_profile {
            assert!((f.sub_bass_energy - 0.3 * f.low_energy).abs() < 1e-6);
            assert!((f.bass_energy - 0.7 * f.low_energy).abs() < 1e-6);
        }
        // 0.5 amplitude sine has RMS ~0.354
        assert!((result.average_bass_energy - 0.354).abs() < 0.02);
    }

    #[test]
    fn short_buffer_has_empty_profile() {
        let result = LowBandExtractor::default().extract(&sine_buffer(60.0, 44100, 0.01, 0.5));
        assert!(result.bass_profile.is_empty());
        assert_eq!(result.average_bass_energy, 0.0);
    }
}
