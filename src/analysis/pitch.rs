//! Autocorrelation pitch tracking and key detection.
//!
//! Per-frame normalized autocorrelation restricted to the lag range implied
//! by the configured frequency bounds. Only every fourth frame is processed;
//! pitch moves slowly compared to the hop and the tracker feeds a sub-bass
//! generator, not a tuner display.

use crate::analysis::{NOTE_NAMES, PitchSample, note_name, pitch_class, rms};

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 1024;
const FRAME_STRIDE: usize = 4;
const SILENCE_RMS: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct PitchTracker {
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Minimum normalized correlation for a frame to emit a sample.
    pub confidence_threshold: f32,
}

impl Default for PitchTracker {
    fn default() -> Self {
        PitchTracker {
            min_frequency: 80.0,
            max_frequency: 1000.0,
            confidence_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PitchAnalysis {
    pub pitch_samples: Vec<PitchSample>,
    pub detected_key: Option<String>,
}

impl PitchTracker {
    pub fn track(&self, mono: &[f32], sample_rate: u32) -> PitchAnalysis {
        let min_lag = (sample_rate as f32 / self.max_frequency).ceil() as usize;
        let max_lag = ((sample_rate as f32 / self.min_frequency).floor() as usize)
            .min(FRAME_SIZE.saturating_sub(1));

        let mut pitch_samples = Vec::new();
        let mut frame_index = 0usize;
        let mut pos = 0;
        while pos + FRAME_SIZE <= mono.len() {
            if frame_index % FRAME_STRIDE == 0 {
                let frame = &mono[pos..pos + FRAME_SIZE];
                let time = pos as f32 / sample_rate as f32;
                if let Some(sample) = self.track_frame(frame, sample_rate, time, min_lag, max_lag) {
                    pitch_samples.push(sample);
                }
            }
            frame_index += 1;
            pos += HOP_SIZE;
        }

        let detected_key = detect_key(&pitch_samples);
        log::debug!(
            "pitch tracking: {} voiced frames, key {:?}",
            pitch_samples.len(),
            detected_key
        );
        PitchAnalysis {
            pitch_samples,
            detected_key,
        }
    }

    fn track_frame(
        &self,
        frame: &[f32],
        sample_rate: u32,
        time: f32,
        min_lag: usize,
        max_lag: usize,
    ) -> Option<PitchSample> {
        if min_lag >= max_lag || rms(frame) < SILENCE_RMS {
            return None;
        }

        // Normalized autocorrelation r[lag] / r[0]
        let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if energy <= 0.0 {
            return None;
        }
        let corr_at = |lag: usize| -> f64 {
            let mut sum = 0.0f64;
            for i in 0..frame.len() - lag {
                sum += frame[i] as f64 * frame[i + lag] as f64;
            }
            sum / energy
        };

        let corr: Vec<f64> = (min_lag..=max_lag).map(corr_at).collect();

        // Walk past the initial dip, then take the maximum after it.
        let mut dip = 0usize;
        while dip + 1 < corr.len() && corr[dip + 1] < corr[dip] {
            dip += 1;
        }
        let (best_offset, &best_corr) = corr[dip..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

        let confidence = (best_corr as f32).clamp(0.0, 1.0);
        if confidence < self.confidence_threshold {
            return None;
        }

        let lag = min_lag + dip + best_offset;
        let frequency = sample_rate as f32 / lag as f32;
        Some(PitchSample {
            time,
            frequency,
            confidence,
            note: Some(note_name(frequency).to_string()),
        })
    }
}

/// Confidence-weighted chroma histogram; the strongest pitch class is the
/// root, and the major/minor third weights disambiguate the mode.
fn detect_key(samples: &[PitchSample]) -> Option<String> {
    if samples.is_empty() {
        return None;
    }

    let mut chroma = [0.0f32; 12];
    for s in samples {
        chroma[pitch_class(s.frequency)] += s.confidence;
    }

    let root = chroma
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)?;

    let major_third = chroma[(root + 4) % 12];
    let minor_third = chroma[(root + 3) % 12];
    let mode = if major_third >= minor_third {
        "major"
    } else {
        "minor"
    };
    Some(format!("{} {}", NOTE_NAMES[root], mode))
}
