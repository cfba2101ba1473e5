//! Analysis-domain types shared by the detectors and the mixer.

pub mod beat;
pub mod lowband;
pub mod pitch;

use serde::Serialize;

/// A detected onset, ordered by time and unique by construction (the
/// detector enforces a minimum inter-beat spacing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Beat {
    /// Seconds from the start of the buffer.
    pub time: f32,
    /// Onset strength normalized to [0, 1] against the global maximum.
    pub strength: f32,
}

/// A voiced pitch estimate. Silent/unvoiced frames produce no entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchSample {
    pub time: f32,
    pub frequency: f32,
    /// Normalized autocorrelation at the chosen lag, clamped to [0, 1].
    pub confidence: f32,
    pub note: Option<String>,
}

/// Coarse low-band energy at one analysis hop. Linear energy, not dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BassEnergyFrame {
    pub time: f32,
    pub sub_bass_energy: f32,
    pub bass_energy: f32,
    pub low_energy: f32,
}

/// Aggregate of one analysis run over a source recording. Immutable once
/// produced; the mixer holds it until cleared or replaced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub duration: f32,
    pub sample_rate: u32,
    pub bpm: f32,
    pub beats: Vec<Beat>,
    pub pitch_samples: Vec<PitchSample>,
    pub detected_key: Option<String>,
    pub bass_profile: Vec<BassEnergyFrame>,
    pub average_bass_energy: f32,
}

pub(crate) const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch class (0 = C) of a frequency, A4 = 440 Hz.
pub(crate) fn pitch_class(frequency: f32) -> usize {
    let midi = 69.0 + 12.0 * (frequency / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// Note name (without octave) for a frequency.
pub(crate) fn note_name(frequency: f32) -> &'static str {
    NOTE_NAMES[pitch_class(frequency)]
}

/// Short-time RMS of a window.
pub(crate) fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / window.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_names_for_reference_pitches() {
        assert_eq!(note_name(440.0), "A");
        assert_eq!(note_name(261.63), "C");
        assert_eq!(note_name(55.0), "A");
        assert_eq!(note_name(46.25), "F#");
    }

    #[test]
    fn rms_of_constant_signal() {
        let window = vec![0.5f32; 256];
        assert!((rms(&window) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
