//! BassMixer — the per-recording session handle that runs the pipeline.
//!
//! Construct one per source recording, call `process_audio` once, then pull
//! mixes out. Mixing before analysis is a `NotReady` error so the UI can
//! tell "no audio yet" apart from a processed-but-empty result. Analysis
//! runs must be serialized per session; the handle owns its buffers
//! exclusively.

use crate::analysis::AnalysisResult;
use crate::analysis::beat::BeatDetector;
use crate::analysis::lowband::LowBandExtractor;
use crate::analysis::pitch::PitchTracker;
use crate::buffer::SampleBuffer;
use crate::config::GenerationConfig;
use crate::error::CoreError;
use crate::progress::{Monitor, SAMPLE_BATCH, Stage};
use crate::synth::{Synthesizer, TARGET_PEAK, harmonic};

/// Soft-clip threshold for the final dry/wet mix.
const CLIP_THRESHOLD: f32 = 0.9;

#[derive(Default)]
pub struct BassMixer {
    config: GenerationConfig,
    source: Option<SampleBuffer>,
    analysis: Option<AnalysisResult>,
    beat_bass: Option<SampleBuffer>,
    harmonic_bass: Option<SampleBuffer>,
    envelope_bass: Option<SampleBuffer>,
}

impl BassMixer {
    pub fn new(config: GenerationConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(BassMixer {
            config,
            ..BassMixer::default()
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// Run the full analysis + generation pipeline over a source recording.
    /// Replaces any previous run's state.
    pub fn process_audio(
        &mut self,
        source: SampleBuffer,
        monitor: &mut Monitor,
    ) -> Result<&AnalysisResult, CoreError> {
        source.ensure_finite()?;
        self.clear();

        let sample_rate = source.sample_rate();
        let mono = source.mono();

        monitor.report(Stage::BeatDetection, 0.0, "detecting beats");
        monitor.checkpoint()?;
        let beat_analysis = BeatDetector::default().detect(&mono, sample_rate);
        log::info!(
            "analysis: {} beats, {:.0} BPM",
            beat_analysis.beats.len(),
            beat_analysis.bpm
        );

        let pitch_analysis = if self.config.track_pitch {
            monitor.report(Stage::PitchTracking, 20.0, "tracking pitch");
            monitor.checkpoint()?;
            Some(PitchTracker::default().track(&mono, sample_rate))
        } else {
            None
        };

        monitor.report(Stage::BassExtraction, 40.0, "extracting low band");
        monitor.checkpoint()?;
        let lowband = LowBandExtractor::default().extract(&source);

        let analysis = AnalysisResult {
            duration: source.duration(),
            sample_rate,
            bpm: beat_analysis.bpm,
            beats: beat_analysis.beats,
            pitch_samples: pitch_analysis
                .as_ref()
                .map(|p| p.pitch_samples.clone())
                .unwrap_or_default(),
            detected_key: pitch_analysis.and_then(|p| p.detected_key),
            bass_profile: lowband.bass_profile.clone(),
            average_bass_energy: lowband.average_bass_energy,
        };

        monitor.report(Stage::Generation, 50.0, "generating bass layers");
        let beat_bass =
            Synthesizer::BeatPulse.generate(&self.config, &analysis, &lowband, monitor)?;

        let harmonic_bass = if harmonic::has_usable_pitch(&analysis) {
            Synthesizer::Harmonic.generate(&self.config, &analysis, &lowband, monitor)?
        } else if self.config.harmonic_fallback {
            // Documented fallback: beat-synced output stands in when no
            // usable pitch data exists.
            log::debug!("no usable pitch data; harmonic layer falls back to beat bass");
            beat_bass.clone()
        } else {
            SampleBuffer::silence(1, beat_bass.len(), sample_rate)
        };

        let envelope_bass =
            Synthesizer::EnvelopeFollow.generate(&self.config, &analysis, &lowband, monitor)?;

        monitor.report(Stage::Generation, 90.0, "bass layers ready");

        self.source = Some(source);
        self.beat_bass = Some(beat_bass);
        self.harmonic_bass = Some(harmonic_bass);
        self.envelope_bass = Some(envelope_bass);
        Ok(self.analysis.insert(analysis))
    }

    /// Blend the three generated layers by normalized weight into a
    /// bass-only buffer, peak-normalized to 0.9. Zero total weight yields
    /// silence of the correct length.
    pub fn get_mixed_bass(&self, monitor: &mut Monitor) -> Result<SampleBuffer, CoreError> {
        let analysis = self.analysis.as_ref().ok_or(CoreError::NotReady)?;
        let beat = self.beat_bass.as_ref().ok_or(CoreError::NotReady)?;
        let harmonic = self.harmonic_bass.as_ref().ok_or(CoreError::NotReady)?;
        let envelope = self.envelope_bass.as_ref().ok_or(CoreError::NotReady)?;

        // Layer lengths can differ by a frame (analysis hop rounding);
        // mix over the longest and treat the others as silent past their end.
        let len = beat.len().max(harmonic.len()).max(envelope.len());

        let Some((wb, wh, we)) = self.config.normalized_weights() else {
            return Ok(SampleBuffer::silence(1, len, analysis.sample_rate));
        };

        monitor.report(Stage::Mixing, 0.0, "mixing bass layers");
        let b = beat.channel(0);
        let h = harmonic.channel(0);
        let e = envelope.channel(0);
        let mut out = vec![0.0f32; len];
        for (i, o) in out.iter_mut().enumerate() {
            if i % SAMPLE_BATCH == 0 {
                monitor.checkpoint()?;
            }
            let sb = b.get(i).copied().unwrap_or(0.0);
            let sh = h.get(i).copied().unwrap_or(0.0);
            let se = e.get(i).copied().unwrap_or(0.0);
            *o = sb * wb + sh * wh + se * we;
        }

        let mut buffer = SampleBuffer::from_mono(out, analysis.sample_rate);
        buffer.normalize_peak(TARGET_PEAK);
        monitor.report(Stage::Mixing, 100.0, "bass mix ready");
        Ok(buffer)
    }

    /// Combine the original and the mixed bass per channel:
    /// `out = original * dry_wet + bass * (1 - dry_wet) * intensity`,
    /// soft-clipped with a tanh knee above 0.9.
    pub fn get_final_mix(&self, monitor: &mut Monitor) -> Result<SampleBuffer, CoreError> {
        let source = self.source.as_ref().ok_or(CoreError::NotReady)?;
        let bass = self.get_mixed_bass(monitor)?;

        let dry = self.config.dry_wet;
        let wet = (1.0 - dry) * self.config.intensity;
        let bass_data = bass.channel(0);

        monitor.report(Stage::Mixing, 0.0, "combining with original");
        let mut channels = Vec::with_capacity(source.num_channels());
        for ch in source.channels() {
            let mut out = Vec::with_capacity(ch.len());
            for (i, &s) in ch.iter().enumerate() {
                if i % SAMPLE_BATCH == 0 {
                    monitor.checkpoint()?;
                }
                let b = bass_data.get(i).copied().unwrap_or(0.0);
                out.push(soft_clip(s * dry + b * wet));
            }
            channels.push(out);
        }
        monitor.report(Stage::Mixing, 100.0, "final mix ready");
        Ok(SampleBuffer::new(channels, source.sample_rate()))
    }

    /// Drop all cached buffers and the analysis result. Idempotent.
    pub fn clear(&mut self) {
        self.source = None;
        self.analysis = None;
        self.beat_bass = None;
        self.harmonic_bass = None;
        self.envelope_bass = None;
    }
}

/// Soft clip: linear below the threshold, tanh knee on the excess above it.
fn soft_clip(x: f32) -> f32 {
    let t = CLIP_THRESHOLD;
    if x.abs() <= t {
        x
    } else {
        x.signum() * (t + (1.0 - t) * ((x.abs() - t) / (1.0 - t)).tanh())
    }
}
