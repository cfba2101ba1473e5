//! SampleBuffer — the unit of audio passed between pipeline stages.
//!
//! Planar 32-bit float channels at a known sample rate. Stages allocate a
//! new buffer rather than mutating their input, except for the explicitly
//! in-place peak normalization used by the synthesizers.

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap planar channel data. All channels must share a length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(!channels.is_empty());
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        SampleBuffer {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// De-interleave an interleaved frame stream (the layout decoded audio
    /// arrives in from the host).
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Self {
        let num_channels = num_channels.max(1);
        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in 0..frames {
            for (ch, data) in channels.iter_mut().enumerate() {
                data.push(samples[frame * num_channels + ch]);
            }
        }
        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn silence(num_channels: usize, len: usize, sample_rate: u32) -> Self {
        SampleBuffer {
            channels: vec![vec![0.0; len]; num_channels.max(1)],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Mono sum: the per-frame average across channels. Analysis stages
    /// always operate on this view.
    pub fn mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f32;
        let mut out = vec![0.0f32; self.len()];
        for ch in &self.channels {
            for (o, &s) in out.iter_mut().zip(ch.iter()) {
                *o += s;
            }
        }
        for o in out.iter_mut() {
            *o *= scale;
        }
        out
    }

    /// Interleave channels into a single frame stream for the host.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.len();
        let nch = self.channels.len();
        let mut out = Vec::with_capacity(frames * nch);
        for frame in 0..frames {
            for ch in &self.channels {
                out.push(ch[frame]);
            }
        }
        out
    }

    /// Peak absolute amplitude across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// In-place normalize so the peak hits `target`. Silent buffers are
    /// left untouched (no noise amplification).
    pub fn normalize_peak(&mut self, target: f32) {
        let peak = self.peak();
        if peak <= f32::EPSILON {
            return;
        }
        let gain = target / peak;
        for ch in self.channels.iter_mut() {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }

    /// Reject buffers carrying NaN/infinite samples before they poison the
    /// numeric chain.
    pub fn ensure_finite(&self) -> Result<(), CoreError> {
        for ch in &self.channels {
            if ch.iter().any(|s| !s.is_finite()) {
                return Err(CoreError::InvalidAudioData);
            }
        }
        Ok(())
    }
}
