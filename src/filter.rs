//! IIR filters used by the extractor and the safety chain.
//!
//! Biquad coefficient formulas follow the Audio EQ Cookbook (Robert
//! Bristow-Johnson), Direct Form II Transposed, with f64 state to keep the
//! recursion well-conditioned at sub-bass cutoffs.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
    /// High shelf with a gain in dB; used by the K-weighting pre-filter.
    Highshelf { gain_db: f64 },
}

#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(kind: BiquadKind, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            BiquadKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (
                    b0,
                    -(1.0 + cos_w0),
                    b0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            BiquadKind::Highshelf { gain_db } => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
                let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
                let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
                let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
                let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
                let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y as f32
    }

    /// Filter a whole channel into a fresh vector.
    pub fn process_block(&mut self, input: &[f32]) -> Vec<f32> {
        input.iter().map(|&s| self.process(s)).collect()
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// One-pole high-pass: `y[n] = a * (y[n-1] + x[n] - x[n-1])`.
pub fn one_pole_highpass(input: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let a = rc / (rc + dt);
    let mut out = Vec::with_capacity(input.len());
    let mut prev_x = input[0];
    let mut prev_y = 0.0f32;
    out.push(0.0);
    for &x in &input[1..] {
        let y = a * (prev_y + x - prev_x);
        out.push(y);
        prev_x = x;
        prev_y = y;
    }
    out
}

/// One-pole low-pass: `y[n] = y[n-1] + a * (x[n] - y[n-1])`.
pub fn one_pole_lowpass(input: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let a = dt / (rc + dt);
    let mut out = Vec::with_capacity(input.len());
    let mut prev = 0.0f32;
    for &x in input {
        prev += a * (x - prev);
        out.push(prev);
    }
    out
}

/// Centered moving average with edge shrinking; width is clamped to at
/// least 1. Used for envelope smoothing and limiter gain smoothing.
pub fn moving_average(input: &[f32], width: usize) -> Vec<f32> {
    let width = width.max(1);
    if input.is_empty() || width == 1 {
        return input.to_vec();
    }
    let half = width / 2;
    let mut out = Vec::with_capacity(input.len());
    // Sliding-window sum in f64 so long buffers do not drift.
    let mut sum = 0.0f64;
    let mut lo = 0usize;
    let mut hi = 0usize; // exclusive
    for i in 0..input.len() {
        let want_lo = i.saturating_sub(half);
        let want_hi = (i + half + 1).min(input.len());
        while hi < want_hi {
            sum += input[hi] as f64;
            hi += 1;
        }
        while lo < want_lo {
            sum -= input[lo] as f64;
            lo += 1;
        }
        out.push((sum / (hi - lo) as f64) as f32);
    }
    out
}
