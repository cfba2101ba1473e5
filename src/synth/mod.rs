//! Bass generators: three independent algorithms behind one dispatch enum.
//!
//! Each generator returns a single-channel buffer peak-normalized to 0.9;
//! the mixer blends them by configurable weight.

pub mod beat_pulse;
pub mod envelope_follow;
pub mod harmonic;

use crate::analysis::AnalysisResult;
use crate::analysis::lowband::LowBandAnalysis;
use crate::buffer::SampleBuffer;
use crate::config::GenerationConfig;
use crate::error::CoreError;
use crate::progress::Monitor;

/// Peak target for generated bass buffers.
pub const TARGET_PEAK: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesizer {
    /// Decaying sine pulses locked to detected beats.
    BeatPulse,
    /// Octave-shifted root notes following tracked pitch.
    Harmonic,
    /// Amplified low band plus a synthesized sub-harmonic.
    EnvelopeFollow,
}

impl Synthesizer {
    pub fn generate(
        self,
        config: &GenerationConfig,
        analysis: &AnalysisResult,
        lowband: &LowBandAnalysis,
        monitor: &mut Monitor,
    ) -> Result<SampleBuffer, CoreError> {
        match self {
            Synthesizer::BeatPulse => beat_pulse::generate(config, analysis, monitor),
            Synthesizer::Harmonic => harmonic::generate(config, analysis, monitor),
            Synthesizer::EnvelopeFollow => {
                envelope_follow::generate(config, analysis, lowband, monitor)
            }
        }
    }
}

/// Output length in samples for a generator, derived from the analysis.
pub(crate) fn output_len(analysis: &AnalysisResult) -> usize {
    (analysis.duration as f64 * analysis.sample_rate as f64).round() as usize
}
