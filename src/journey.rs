//! Offline journey rendering: fully synthetic audio from a phase timeline.
//!
//! Each phase layers base/support/texture oscillators with S-curve
//! frequency and amplitude ramps driven by an entrainment rate. Phases are
//! concatenated with S-curve crossfades and the whole render goes through
//! the safety chain before it leaves the core.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::buffer::SampleBuffer;
use crate::config::SafetyConfig;
use crate::error::CoreError;
use crate::progress::{Monitor, SAMPLE_BATCH, Stage};
use crate::safety;

/// Default crossfade between adjacent phases, clamped to half the shorter
/// phase.
const CROSSFADE_S: f32 = 2.0;

/// Frequency ratios of the support and texture layers above the base.
const SUPPORT_RATIO: f32 = 1.5;
const TEXTURE_RATIO: f32 = 2.0;
const TEXTURE_DRIFT_HZ: f32 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyPhase {
    /// Phase length in seconds.
    pub duration: f32,
    pub base_freq_start: f32,
    pub base_freq_end: f32,
    /// Amplitude-modulation rate in Hz at the phase edges.
    pub entrainment_start: f32,
    pub entrainment_end: f32,
    pub base_amp: f32,
    pub support_amp: f32,
    pub texture_amp: f32,
}

impl Default for JourneyPhase {
    fn default() -> Self {
        JourneyPhase {
            duration: 60.0,
            base_freq_start: 40.0,
            base_freq_end: 40.0,
            entrainment_start: 8.0,
            entrainment_end: 8.0,
            base_amp: 0.8,
            support_amp: 0.3,
            texture_amp: 0.15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseRenderer {
    pub sample_rate: u32,
    pub crossfade: f32,
    pub safety: SafetyConfig,
}

impl PhaseRenderer {
    pub fn new(sample_rate: u32) -> Self {
        PhaseRenderer {
            sample_rate,
            crossfade: CROSSFADE_S,
            safety: SafetyConfig::default(),
        }
    }

    /// Render a whole timeline into a single safety-processed mono buffer.
    pub fn render(
        &self,
        phases: &[JourneyPhase],
        monitor: &mut Monitor,
    ) -> Result<SampleBuffer, CoreError> {
        monitor.report(Stage::Render, 0.0, "setup");
        if phases.is_empty() {
            return Ok(SampleBuffer::silence(1, 0, self.sample_rate));
        }
        for (i, p) in phases.iter().enumerate() {
            if !(p.duration > 0.0 && p.duration.is_finite()) {
                return Err(CoreError::InvalidConfig(format!(
                    "phase {i} duration must be > 0, got {}",
                    p.duration
                )));
            }
        }

        let mut rendered = Vec::with_capacity(phases.len());
        for (i, phase) in phases.iter().enumerate() {
            monitor.report(
                Stage::Render,
                10.0 + 60.0 * i as f32 / phases.len() as f32,
                format!("generating phase {}/{}", i + 1, phases.len()),
            );
            rendered.push(self.render_phase(phase, monitor)?);
        }

        monitor.report(Stage::Render, 70.0, "crossfading phases");
        let joined = self.crossfade_concat(&rendered, monitor)?;

        monitor.report(Stage::Safety, 80.0, "safety chain");
        let buffer = SampleBuffer::from_mono(joined, self.sample_rate);
        let processed = safety::process(&buffer, &self.safety, monitor)?;
        monitor.report(Stage::Render, 100.0, "render complete");
        Ok(processed)
    }

    /// Base/support/texture sine layers with ramped frequency and
    /// entrainment-rate amplitude modulation.
    fn render_phase(
        &self,
        phase: &JourneyPhase,
        monitor: &mut Monitor,
    ) -> Result<Vec<f32>, CoreError> {
        let sr = self.sample_rate as f32;
        let len = (phase.duration * sr) as usize;
        let mut out = vec![0.0f32; len];

        // Phase accumulators keep ramped-frequency layers click-free.
        let mut base_phase = 0.0f64;
        let mut support_phase = 0.0f64;
        let mut texture_phase = 0.0f64;
        let mut mod_phase = 0.0f64;

        for (i, o) in out.iter_mut().enumerate() {
            if i % SAMPLE_BATCH == 0 {
                monitor.checkpoint()?;
            }
            let t = i as f32 / sr;
            let ramp = s_curve(t / phase.duration);
            let freq = phase.base_freq_start + (phase.base_freq_end - phase.base_freq_start) * ramp;
            let rate =
                phase.entrainment_start + (phase.entrainment_end - phase.entrainment_start) * ramp;

            base_phase += freq as f64 / sr as f64;
            support_phase += (freq * SUPPORT_RATIO) as f64 / sr as f64;
            texture_phase += (freq * TEXTURE_RATIO) as f64 / sr as f64;
            mod_phase += rate as f64 / sr as f64;

            // Raised-cosine AM at the entrainment rate.
            let pulse = 0.5 * (1.0 - (TAU as f64 * mod_phase).cos() as f32);
            let drift = 0.5 * (1.0 + (TAU * TEXTURE_DRIFT_HZ * t).sin());

            let base = phase.base_amp * pulse * (TAU as f64 * base_phase).sin() as f32;
            let support = phase.support_amp * pulse * (TAU as f64 * support_phase).sin() as f32;
            let texture = phase.texture_amp * drift * (TAU as f64 * texture_phase).sin() as f32;

            // Short edge ramp (first/last 10% capped by the S-curve) so
            // crossfades never splice against a hard onset.
            let u = t / phase.duration;
            let edge = s_curve(u.min(1.0 - u) * 10.0);
            *o = (base + support + texture) * edge;
        }
        Ok(out)
    }

    /// Concatenate phases, overlapping adjacent ones by the crossfade
    /// length with complementary S-curve fades.
    fn crossfade_concat(
        &self,
        rendered: &[Vec<f32>],
        monitor: &mut Monitor,
    ) -> Result<Vec<f32>, CoreError> {
        let sr = self.sample_rate as f32;
        let mut out: Vec<f32> = Vec::new();

        for (n, phase) in rendered.iter().enumerate() {
            monitor.checkpoint()?;
            if n == 0 {
                out.extend_from_slice(phase);
                continue;
            }
            let fade = ((self.crossfade * sr) as usize)
                .min(phase.len() / 2)
                .min(out.len() / 2);

            let overlap_start = out.len() - fade;
            for i in 0..fade {
                let x = s_curve(i as f32 / fade.max(1) as f32);
                out[overlap_start + i] = out[overlap_start + i] * (1.0 - x) + phase[i] * x;
            }
            out.extend_from_slice(&phase[fade..]);
        }
        Ok(out)
    }
}

/// Smoothstep: 3t^2 - 2t^3, clamped.
fn s_curve(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
