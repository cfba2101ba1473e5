pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod journey;
pub mod mixer;
pub mod progress;
pub mod safety;
pub mod synth;
pub mod wav;

use wasm_bindgen::prelude::*;

use crate::buffer::SampleBuffer;
use crate::config::{GenerationConfig, SafetyConfig};
use crate::journey::{JourneyPhase, PhaseRenderer};
use crate::mixer::BassMixer;
use crate::progress::Monitor;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the subwave-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Analyze a decoded recording and return the combined original + bass mix
/// with the safety chain applied, as interleaved f32 frames.
///
/// `config` is a partial `GenerationConfig` object; missing fields take
/// their defaults.
#[wasm_bindgen]
pub fn process_bass_track(
    samples: Vec<f32>,
    num_channels: u32,
    sample_rate: u32,
    config: JsValue,
) -> Result<Vec<f32>, JsValue> {
    let config: GenerationConfig =
        serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let source = SampleBuffer::from_interleaved(&samples, num_channels as usize, sample_rate);
    let mixed = run_bass_pipeline(source, config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(mixed.to_interleaved())
}

/// Same pipeline as `process_bass_track`, returning only the generated
/// bass layer (for preview/solo playback in the UI).
#[wasm_bindgen]
pub fn process_bass_only(
    samples: Vec<f32>,
    num_channels: u32,
    sample_rate: u32,
    config: JsValue,
) -> Result<Vec<f32>, JsValue> {
    let config: GenerationConfig =
        serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let source = SampleBuffer::from_interleaved(&samples, num_channels as usize, sample_rate);
    let mut mixer = BassMixer::new(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let mut monitor = Monitor::silent();
    mixer
        .process_audio(source, &mut monitor)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let bass = mixer
        .get_mixed_bass(&mut monitor)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(bass.to_interleaved())
}

/// Full pipeline, encoded to 16-bit WAV bytes ready for download.
#[wasm_bindgen]
pub fn process_bass_track_wav(
    samples: Vec<f32>,
    num_channels: u32,
    sample_rate: u32,
    config: JsValue,
) -> Result<Vec<u8>, JsValue> {
    let config: GenerationConfig =
        serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let source = SampleBuffer::from_interleaved(&samples, num_channels as usize, sample_rate);
    let mixed = run_bass_pipeline(source, config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    wav::encode(&mixed, wav::WavFormat::Pcm16, &mut Monitor::silent())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a journey phase timeline to a 16-bit WAV byte
/// array ready for download.
#[wasm_bindgen]
pub fn render_journey_wav(phases: JsValue, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let phases: Vec<JourneyPhase> =
        serde_wasm_bindgen::from_value(phases).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let renderer = PhaseRenderer::new(sample_rate);
    let mut monitor = Monitor::silent();
    let rendered = renderer
        .render(&phases, &mut monitor)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    wav::encode(&rendered, wav::WavFormat::Pcm16, &mut monitor)
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// Native entry point: run the full bass pipeline (analysis, generation,
/// final mix, safety chain) over a source buffer.
pub fn run_bass_pipeline(
    source: SampleBuffer,
    config: GenerationConfig,
) -> Result<SampleBuffer, error::CoreError> {
    let mut mixer = BassMixer::new(config)?;
    let mut monitor = Monitor::silent();
    mixer.process_audio(source, &mut monitor)?;
    let mixed = mixer.get_final_mix(&mut monitor)?;
    safety::process(&mixed, &SafetyConfig::full_range(), &mut monitor)
}
