use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the DSP layer.
///
/// Processors never let these escape to playback: `run_fail_open` turns them
/// into a pass-through of the original buffer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DspError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("unsupported channel layout: {0} channels")]
    ChannelLayout(u16),

    #[error("buffer length {len} is not a multiple of {channels} channels")]
    Interleave { len: usize, channels: u16 },

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Errors raised while encoding or decoding a signature key.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("sample id '{0}' contains a reserved signature token")]
    ReservedToken(String),

    #[error("malformed entry '{0}', expected id@offset")]
    MalformedEntry(String),

    #[error("invalid beat offset '{0}'")]
    BadOffset(String),

    #[error("malformed bar '{0}'")]
    MalformedBar(String),

    #[error("JSON signature: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error type for the radio.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("sample manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("failed to decode WAV {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unsupported sample format in {path}: {reason}")]
    SampleFormat { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown musical key '{0}'")]
    UnknownKey(String),

    #[error("narrative generation failed: {0}")]
    Generation(String),

    #[error("timed out after {0:?} waiting for the playback handshake")]
    HandshakeTimeout(Duration),

    #[error(transparent)]
    Dsp(#[from] DspError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, RadioError>;
