//! WAV container encode/decode for finished mixes.
//!
//! Only uncompressed layouts: 16/24-bit PCM (44-byte header) and 32-bit
//! float (format tag 3, with a `fact` chunk). Compressed and exotic chunk
//! layouts are the host's problem, not the core's.

use crate::buffer::SampleBuffer;
use crate::error::CoreError;
use crate::progress::{Monitor, SAMPLE_BATCH, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    Pcm16,
    Pcm24,
    Float32,
}

impl WavFormat {
    fn bits_per_sample(self) -> u16 {
        match self {
            WavFormat::Pcm16 => 16,
            WavFormat::Pcm24 => 24,
            WavFormat::Float32 => 32,
        }
    }

    fn format_tag(self) -> u16 {
        match self {
            WavFormat::Pcm16 | WavFormat::Pcm24 => 1,
            WavFormat::Float32 => 3,
        }
    }
}

/// Encode a buffer to WAV bytes. Samples are clamped to [-1, 1] before
/// quantization. The quantization loop checkpoints at batch boundaries so
/// a long encode stays cancellable.
pub fn encode(
    buffer: &SampleBuffer,
    format: WavFormat,
    monitor: &mut Monitor,
) -> Result<Vec<u8>, CoreError> {
    let channels = buffer.num_channels() as u16;
    let sample_rate = buffer.sample_rate();
    let bits = format.bits_per_sample();
    let bytes_per_sample = (bits / 8) as u32;
    let frames = buffer.len() as u32;

    let byte_rate = sample_rate * channels as u32 * bytes_per_sample;
    let block_align = channels * (bits / 8);
    let data_size = frames * channels as u32 * bytes_per_sample;

    // Float files carry a fact chunk; the PCM paths keep the classic
    // 44-byte header.
    let fact_size: u32 = if format == WavFormat::Float32 { 12 } else { 0 };
    let file_size = 36 + fact_size + data_size;

    let mut buf = Vec::with_capacity(44 + fact_size as usize + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&format.format_tag().to_le_bytes());
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits.to_le_bytes());

    if format == WavFormat::Float32 {
        buf.extend_from_slice(b"fact");
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&frames.to_le_bytes());
    }

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());

    monitor.report(Stage::Encode, 0.0, "writing samples");
    for frame in 0..buffer.len() {
        if frame % SAMPLE_BATCH == 0 {
            monitor.checkpoint()?;
        }
        for ch in buffer.channels() {
            let s = ch[frame].clamp(-1.0, 1.0);
            match format {
                WavFormat::Pcm16 => {
                    let q = (s * 32767.0).round() as i16;
                    buf.extend_from_slice(&q.to_le_bytes());
                }
                WavFormat::Pcm24 => {
                    let q = (s as f64 * 8_388_607.0).round() as i32;
                    let b = q.to_le_bytes();
                    buf.extend_from_slice(&b[0..3]);
                }
                WavFormat::Float32 => {
                    buf.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
    }
    monitor.report(Stage::Encode, 100.0, "encode done");

    Ok(buf)
}

/// Decode WAV bytes produced by `encode` (or an equivalent writer) back
/// into a planar buffer.
pub fn decode(bytes: &[u8]) -> Result<SampleBuffer, CoreError> {
    let err = |msg: &str| CoreError::MalformedWav(msg.to_string());

    if bytes.len() < 44 {
        return Err(err("file shorter than a WAV header"));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(err("missing RIFF/WAVE magic"));
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u16, u32, u16)> = None; // tag, channels, rate, bits
    let mut data: Option<&[u8]> = None;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let body_start = pos + 8;
        let body_end = body_start + size;
        if body_end > bytes.len() {
            return Err(err("chunk extends past end of file"));
        }
        let body = &bytes[body_start..body_end];
        match id {
            b"fmt " => {
                if size < 16 {
                    return Err(err("fmt chunk too small"));
                }
                let tag = u16::from_le_bytes(body[0..2].try_into().unwrap());
                let channels = u16::from_le_bytes(body[2..4].try_into().unwrap());
                let rate = u32::from_le_bytes(body[4..8].try_into().unwrap());
                let bits = u16::from_le_bytes(body[14..16].try_into().unwrap());
                fmt = Some((tag, channels, rate, bits));
            }
            b"data" => data = Some(body),
            _ => {} // fact and friends are informational
        }
        // Chunks are word-aligned
        pos = body_end + (size & 1);
    }

    let (tag, channels, rate, bits) = fmt.ok_or_else(|| err("no fmt chunk"))?;
    let data = data.ok_or_else(|| err("no data chunk"))?;
    if channels == 0 {
        return Err(err("zero channels"));
    }

    let format = match (tag, bits) {
        (1, 16) => WavFormat::Pcm16,
        (1, 24) => WavFormat::Pcm24,
        (3, 32) => WavFormat::Float32,
        _ => return Err(err("unsupported format tag / bit depth")),
    };

    let bytes_per_sample = (bits / 8) as usize;
    let frame_bytes = bytes_per_sample * channels as usize;
    if frame_bytes == 0 || data.len() % frame_bytes != 0 {
        return Err(err("data chunk not frame-aligned"));
    }
    let frames = data.len() / frame_bytes;

    let mut planar = vec![Vec::with_capacity(frames); channels as usize];
    for frame in 0..frames {
        for (ch, out) in planar.iter_mut().enumerate() {
            let at = frame * frame_bytes + ch * bytes_per_sample;
            let s = match format {
                WavFormat::Pcm16 => {
                    let q = i16::from_le_bytes(data[at..at + 2].try_into().unwrap());
                    q as f32 / 32767.0
                }
                WavFormat::Pcm24 => {
                    // Sign-extend the 24-bit little-endian value
                    let q = i32::from_le_bytes([data[at], data[at + 1], data[at + 2], 0]) << 8 >> 8;
                    (q as f64 / 8_388_607.0) as f32
                }
                WavFormat::Float32 => f32::from_le_bytes(data[at..at + 4].try_into().unwrap()),
            };
            out.push(s);
        }
    }

    Ok(SampleBuffer::new(planar, rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(channels: usize) -> SampleBuffer {
        let data: Vec<Vec<f32>> = (0..channels)
            .map(|ch| {
                (0..500)
                    .map(|i| ((i as f32 / 500.0) * 2.0 - 1.0) * 0.8 + ch as f32 * 0.01)
                    .collect()
            })
            .collect();
        SampleBuffer::new(data, 44100)
    }

    fn encode_ok(buffer: &SampleBuffer, format: WavFormat) -> Vec<u8> {
        encode(buffer, format, &mut Monitor::silent()).unwrap()
    }

    #[test]
    fn header_layout_pcm16() {
        let wav = encode_ok(&ramp_buffer(2), WavFormat::Pcm16);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 500 * 2 * 2);

        let sr = u32::from_le_bytes(wav[24..28].try_into().unwrap());
        assert_eq!(sr, 44100);
        let ch = u16::from_le_bytes(wav[22..24].try_into().unwrap());
        assert_eq!(ch, 2);
    }

    #[test]
    fn round_trip_pcm16_within_one_step() {
        let buf = ramp_buffer(2);
        let decoded = decode(&encode_ok(&buf, WavFormat::Pcm16)).unwrap();
        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.len(), buf.len());
        let step = 1.0 / 32767.0;
        for ch in 0..2 {
            for (a, b) in buf.channel(ch).iter().zip(decoded.channel(ch)) {
                assert!((a - b).abs() <= step, "pcm16 error beyond one step");
            }
        }
    }

    #[test]
    fn round_trip_pcm24() {
        let buf = ramp_buffer(1);
        let decoded = decode(&encode_ok(&buf, WavFormat::Pcm24)).unwrap();
        let step = 1.0 / 8_388_607.0;
        for (a, b) in buf.channel(0).iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() <= step * 2.0);
        }
    }

    #[test]
    fn round_trip_float_exact() {
        let buf = ramp_buffer(1);
        let decoded = decode(&encode_ok(&buf, WavFormat::Float32)).unwrap();
        assert_eq!(decoded.channel(0), buf.channel(0));
    }

    #[test]
    fn encode_clamps_overs() {
        let buf = SampleBuffer::from_mono(vec![2.0, -2.0], 44100);
        let decoded = decode(&encode_ok(&buf, WavFormat::Pcm16)).unwrap();
        assert!((decoded.channel(0)[0] - 1.0).abs() < 1e-4);
        assert!((decoded.channel(0)[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn cancellation_stops_encode() {
        let buffer = SampleBuffer::silence(1, 200_000, 44100);
        let mut monitor = Monitor::silent();
        monitor.cancel_handle().cancel();
        let result = encode(&buffer, WavFormat::Pcm16, &mut monitor);
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[test]
    fn encode_reports_encode_stage() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let stages: Rc<RefCell<Vec<Stage>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = stages.clone();
        let mut monitor = Monitor::with_callback(move |u| sink.borrow_mut().push(u.stage));
        encode(&ramp_buffer(1), WavFormat::Pcm16, &mut monitor).unwrap();
        assert!(stages.borrow().iter().all(|&s| s == Stage::Encode));
        assert!(!stages.borrow().is_empty());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode(&[0u8; 16]),
            Err(CoreError::MalformedWav(_))
        ));
        let mut wav = encode_ok(&ramp_buffer(1), WavFormat::Pcm16);
        wav[0] = b'X';
        assert!(decode(&wav).is_err());
    }
}
