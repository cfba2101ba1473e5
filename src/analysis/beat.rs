//! Onset-energy beat detection and tempo estimation.
//!
//! Short-time energy, half-wave rectified first difference as onset
//! strength, adaptive local threshold, then a mode-of-intervals tempo
//! estimate. No beats is a valid result, not an error: the caller gets an
//! empty list and the 120 BPM default.

use crate::analysis::{Beat, rms};

const DEFAULT_BPM: f32 = 120.0;

#[derive(Debug, Clone)]
pub struct BeatDetector {
    /// Energy window in samples.
    pub window: usize,
    /// Hop between energy windows in samples.
    pub hop: usize,
    /// Minimum spacing between accepted beats in seconds.
    pub min_beat_interval: f32,
    /// Local threshold = moving average over this many seconds x 1.4.
    pub threshold_window: f32,
}

impl Default for BeatDetector {
    fn default() -> Self {
        BeatDetector {
            window: 1024,
            hop: 512,
            min_beat_interval: 0.2,
            threshold_window: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BeatAnalysis {
    pub beats: Vec<Beat>,
    pub bpm: f32,
}

impl BeatDetector {
    pub fn detect(&self, mono: &[f32], sample_rate: u32) -> BeatAnalysis {
        let onsets = self.onset_strength(mono);
        let beats = self.pick_beats(&onsets, sample_rate);
        let bpm = estimate_bpm(&beats);
        log::debug!(
            "beat detection: {} frames, {} beats, {:.1} BPM",
            onsets.len(),
            beats.len(),
            bpm
        );
        BeatAnalysis { beats, bpm }
    }

    /// Half-wave rectified first difference of short-time RMS energy.
    fn onset_strength(&self, mono: &[f32]) -> Vec<f32> {
        let mut energies = Vec::new();
        let mut pos = 0;
        while pos + self.window <= mono.len() {
            energies.push(rms(&mono[pos..pos + self.window]));
            pos += self.hop;
        }

        let mut onsets = vec![0.0f32; energies.len()];
        for i in 1..energies.len() {
            onsets[i] = (energies[i] - energies[i - 1]).max(0.0);
        }
        onsets
    }

    fn pick_beats(&self, onsets: &[f32], sample_rate: u32) -> Vec<Beat> {
        if onsets.is_empty() {
            return Vec::new();
        }

        let global_max = onsets.iter().copied().fold(0.0f32, f32::max);
        if global_max <= 0.0 {
            return Vec::new();
        }

        // Centered moving-average window in frames.
        let half = ((self.threshold_window * sample_rate as f32 / self.hop as f32) / 2.0)
            .round()
            .max(1.0) as usize;

        let mut beats: Vec<Beat> = Vec::new();
        for i in 1..onsets.len().saturating_sub(1) {
            // Strict local maximum
            if !(onsets[i] > onsets[i - 1] && onsets[i] > onsets[i + 1]) {
                continue;
            }

            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(onsets.len());
            let local_mean: f32 =
                onsets[start..end].iter().sum::<f32>() / (end - start) as f32;
            if onsets[i] <= local_mean * 1.4 {
                continue;
            }

            let time = (i * self.hop) as f32 / sample_rate as f32;
            if let Some(last) = beats.last()
                && time - last.time < self.min_beat_interval
            {
                continue;
            }

            beats.push(Beat {
                time,
                strength: (onsets[i] / global_max).clamp(0.0, 1.0),
            });
        }
        beats
    }
}

/// Mode of inter-beat intervals, bucketed to 5 BPM, restricted to
/// [60, 180]. Defaults to 120 when nothing usable exists.
fn estimate_bpm(beats: &[Beat]) -> f32 {
    if beats.len() < 2 {
        return DEFAULT_BPM;
    }

    let mut histogram: std::collections::HashMap<i32, usize> = std::collections::HashMap::new();
    for pair in beats.windows(2) {
        let interval = pair[1].time - pair[0].time;
        if !(0.2..=2.0).contains(&interval) {
            continue;
        }
        let bucket = ((60.0 / interval / 5.0).round() * 5.0) as i32;
        if (60..=180).contains(&bucket) {
            *histogram.entry(bucket).or_insert(0) += 1;
        }
    }

    histogram
        .into_iter()
        .max_by_key(|&(bucket, count)| (count, bucket))
        .map(|(bucket, _)| bucket as f32)
        .unwrap_or(DEFAULT_BPM)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Impulse train: bursts of full-scale samples at a fixed spacing.
    fn impulse_train(
        sample_rate: u32,
        duration: f32,
        spacing: f32,
        first: f32,
        count: usize,
    ) -> Vec<f32> {
        let mut samples = vec![0.0f32; (sample_rate as f32 * duration) as usize];
        for n in 0..count {
            let at = ((first + n as f32 * spacing) * sample_rate as f32) as usize;
            for i in at..(at + 1024).min(samples.len()) {
                samples[i] = 1.0;
            }
        }
        samples
    }

    #[test]
    fn silent_buffer_yields_defaults() {
        let mono = vec![0.0f32; 48000 * 5];
        let result = BeatDetector::default().detect(&mono, 48000);
        assert!(result.beats.is_empty());
        assert_eq!(result.bpm, 120.0);
    }

    #[test]
    fn evenly_spaced_impulses_detected() {
        let mono = impulse_train(44100, 5.0, 0.5, 0.5, 8);
        let result = BeatDetector::default().detect(&mono, 44100);
        assert_eq!(result.beats.len(), 8, "one beat per impulse");
        assert!(
            (result.bpm - 120.0).abs() <= 5.0,
            "0.5 s spacing is 120 BPM +/- bucket, got {}",
            result.bpm
        );
        // Spacing should track the impulse grid
        for pair in result.beats.windows(2) {
            let interval = pair[1].time - pair[0].time;
            assert!((interval - 0.5).abs() < 0.05, "interval {interval}");
        }
    }

    #[test]
    fn strengths_normalized_to_unit_range() {
        let mono = impulse_train(44100, 4.0, 0.5, 0.4, 6);
        let result = BeatDetector::default().detect(&mono, 44100);
        assert!(!result.beats.is_empty());
        assert!(result.beats.iter().all(|b| (0.0..=1.0).contains(&b.strength)));
        assert!(result.beats.iter().any(|b| b.strength > 0.9));
    }

    #[test]
    fn min_interval_suppresses_doubles() {
        // Two bursts 100 ms apart, repeated: only one of each pair survives.
        let mut mono = vec![0.0f32; 44100 * 3];
        for n in 0..4 {
            for &offset in &[0.0, 0.1] {
                let at = ((0.5 + n as f32 * 0.6 + offset) * 44100.0) as usize;
                for i in at..(at + 1024).min(mono.len()) {
                    mono[i] = 1.0;
                }
            }
        }
        let result = BeatDetector::default().detect(&mono, 44100);
        for pair in result.beats.windows(2) {
            assert!(pair[1].time - pair[0].time >= 0.2 - 1e-3);
        }
    }

    #[test]
    fn beats_are_ordered() {
        let mono = impulse_train(22050, 6.0, 0.4, 0.3, 12);
        let result = BeatDetector::default().detect(&mono, 22050);
        for pair in result.beats.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
    }
}
