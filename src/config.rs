//! User-tunable configuration for bass generation and the safety chain.
//!
//! All types deserialize from partial JSON (`#[serde(default)]`) so the UI
//! only has to send the fields it changes.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Octaves below a detected pitch used to pick the synthesized bass note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OctaveShift {
    #[default]
    Down1,
    Down2,
}

impl OctaveShift {
    pub fn factor(self) -> f32 {
        match self {
            OctaveShift::Down1 => 0.5,
            OctaveShift::Down2 => 0.25,
        }
    }
}

/// How the envelope-follow synthesizer derives its sub-harmonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubHarmonicMode {
    /// Flip-flop octave division on zero crossings of the filtered signal.
    OctaveDivide,
    /// Sine oscillator whose amplitude follows the smoothed bass profile.
    #[default]
    EnvelopeDriven,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Lowest synthesized frequency in Hz.
    pub frequency_min: f32,
    /// Highest synthesized frequency in Hz.
    pub frequency_max: f32,
    /// Fallback oscillator frequency for envelope-driven sub-harmonics.
    pub base_frequency: f32,

    /// Blend weight of the beat-pulse generator [0, 1].
    pub beat_weight: f32,
    /// Blend weight of the harmonic generator [0, 1].
    pub harmonic_weight: f32,
    /// Blend weight of the envelope-follow generator [0, 1].
    pub envelope_weight: f32,

    /// Dry/wet blend with the original: 1 = original only, 0 = bass only.
    pub dry_wet: f32,
    /// Overall bass level [0, 1].
    pub intensity: f32,

    /// Pulse attack time in seconds.
    pub attack: f32,
    /// Pulse decay time in seconds.
    pub decay: f32,

    pub octave_shift: OctaveShift,
    /// Gain applied to the extracted low band before sub-harmonics are added.
    pub enhancement_gain: f32,
    pub sub_harmonic_mode: SubHarmonicMode,

    /// Run the pitch tracker during analysis. Off saves roughly half the
    /// analysis time; the harmonic generator then uses its fallback.
    pub track_pitch: bool,
    /// Substitute the beat-synced buffer when no usable pitch data exists.
    pub harmonic_fallback: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            frequency_min: 30.0,
            frequency_max: 80.0,
            base_frequency: 40.0,
            beat_weight: 0.5,
            harmonic_weight: 0.3,
            envelope_weight: 0.2,
            dry_wet: 0.5,
            intensity: 0.7,
            attack: 0.01,
            decay: 0.3,
            octave_shift: OctaveShift::default(),
            enhancement_gain: 1.5,
            sub_harmonic_mode: SubHarmonicMode::default(),
            track_pitch: true,
            harmonic_fallback: true,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let unit = |name: &str, v: f32| -> Result<(), CoreError> {
            if !(0.0..=1.0).contains(&v) || !v.is_finite() {
                return Err(CoreError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {v}"
                )));
            }
            Ok(())
        };
        unit("beat_weight", self.beat_weight)?;
        unit("harmonic_weight", self.harmonic_weight)?;
        unit("envelope_weight", self.envelope_weight)?;
        unit("dry_wet", self.dry_wet)?;
        unit("intensity", self.intensity)?;

        if !(self.frequency_min > 0.0 && self.frequency_max > self.frequency_min) {
            return Err(CoreError::InvalidConfig(format!(
                "frequency range must satisfy 0 < min < max, got [{}, {}]",
                self.frequency_min, self.frequency_max
            )));
        }
        if !(self.attack > 0.0 && self.attack.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "attack must be > 0, got {}",
                self.attack
            )));
        }
        if !(self.decay > 0.0 && self.decay.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "decay must be > 0, got {}",
                self.decay
            )));
        }
        if !(self.enhancement_gain >= 0.0 && self.enhancement_gain.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "enhancement_gain must be >= 0, got {}",
                self.enhancement_gain
            )));
        }
        Ok(())
    }

    /// Weights normalized to sum to 1. `None` when the total is zero —
    /// the mixer turns that into silence rather than dividing by zero.
    pub fn normalized_weights(&self) -> Option<(f32, f32, f32)> {
        let total = self.beat_weight + self.harmonic_weight + self.envelope_weight;
        if total <= f32::EPSILON {
            return None;
        }
        Some((
            self.beat_weight / total,
            self.harmonic_weight / total,
            self.envelope_weight / total,
        ))
    }
}

/// Loudness mode for the safety chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoudnessMode {
    /// Whole-buffer RMS matched to the target.
    Rms,
    /// K-weighted, gated integrated loudness (LUFS-style).
    #[default]
    Gated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Target loudness (dB RMS or LUFS depending on `loudness_mode`).
    pub target_db: f32,
    /// True-peak ceiling in dBFS (must be <= 0).
    pub ceiling_db: f32,
    pub loudness_mode: LoudnessMode,
    /// Extra gain on top of the measured correction.
    pub makeup_db: f32,

    /// High-pass cutoff in Hz (DC/rumble guard).
    pub highpass_hz: f32,
    /// Low-pass cutoff in Hz. `None` leaves full-range content alone.
    pub lowpass_hz: Option<f32>,

    /// Limiter attack in seconds.
    pub attack: f32,
    /// Limiter release in seconds.
    pub release: f32,

    pub fade_in: f32,
    pub fade_out: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            target_db: -16.0,
            ceiling_db: -1.0,
            loudness_mode: LoudnessMode::default(),
            makeup_db: 0.0,
            highpass_hz: 20.0,
            lowpass_hz: Some(120.0),
            attack: 0.005,
            release: 0.05,
            fade_in: 0.1,
            fade_out: 0.5,
        }
    }
}

impl SafetyConfig {
    /// Full-range variant: 20 Hz high-pass only, no low-pass.
    pub fn full_range() -> Self {
        SafetyConfig {
            lowpass_hz: None,
            ..SafetyConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ceiling_db > 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "ceiling_db must be <= 0, got {}",
                self.ceiling_db
            )));
        }
        if !(self.attack > 0.0 && self.release > 0.0) {
            return Err(CoreError::InvalidConfig(
                "limiter attack and release must be > 0".into(),
            ));
        }
        if self.highpass_hz <= 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "highpass_hz must be > 0, got {}",
                self.highpass_hz
            )));
        }
        if let Some(lp) = self.lowpass_hz
            && lp <= self.highpass_hz
        {
            return Err(CoreError::InvalidConfig(format!(
                "lowpass_hz must exceed highpass_hz, got {lp}"
            )));
        }
        if self.fade_in < 0.0 || self.fade_out < 0.0 {
            return Err(CoreError::InvalidConfig(
                "fade times must be >= 0".into(),
            ));
        }
        Ok(())
    }
}
