//! Crate-level error type.
//!
//! Analysis and synthesis degrade gracefully to defaults wherever possible
//! (missing beats, missing pitch data); errors are reserved for genuinely
//! invalid calls and malformed data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A mixing operation was called before a successful `process_audio`.
    #[error("no analysis available; call process_audio first")]
    NotReady,

    /// The input buffer contains NaN or infinite samples.
    #[error("audio buffer contains non-finite samples")]
    InvalidAudioData,

    /// A configuration field is outside its documented range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// WAV bytes could not be parsed.
    #[error("malformed WAV data: {0}")]
    MalformedWav(String),

    /// The caller's cancellation flag was raised at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,
}
