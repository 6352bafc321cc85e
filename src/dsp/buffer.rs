//! PCM sample buffers.
//!
//! Samples are stored as interleaved signed 16-bit PCM, the format the mixer
//! plays. Processors work on planar `f64` copies and re-quantize through
//! [`clip_sample`] at every stage boundary.

use std::path::Path;

use crate::error::{DspError, RadioError, Result};

/// Full-scale value used to normalize samples to [-1, 1].
pub const FULL_SCALE: f64 = 32768.0;

/// Maximum number of DSP channels a buffer can carry.
pub const MAX_CHANNELS: usize = 2;

/// A fixed-rate mono or stereo PCM buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    /// Interleaved samples (L R L R ... for stereo).
    samples: Vec<i16>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> std::result::Result<Self, DspError> {
        if channels == 0 || channels as usize > MAX_CHANNELS {
            return Err(DspError::ChannelLayout(channels));
        }
        if samples.len() % channels as usize != 0 {
            return Err(DspError::Interleave {
                len: samples.len(),
                channels,
            });
        }
        Ok(AudioBuffer {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Create a mono buffer.
    pub fn mono(sample_rate: u32, samples: Vec<i16>) -> Self {
        AudioBuffer {
            sample_rate,
            channels: 1,
            samples,
        }
    }

    /// Build a buffer from planar `f64` channels in sample units, clipping
    /// every value to the i16 range.
    pub fn from_planar(sample_rate: u32, planar: &[Vec<f64>]) -> std::result::Result<Self, DspError> {
        let channels = planar.len();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(DspError::ChannelLayout(channels as u16));
        }
        let frames = planar[0].len();
        if planar.iter().any(|c| c.len() != frames) {
            return Err(DspError::InvalidParameter(
                "planar channels differ in length".to_string(),
            ));
        }

        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            for channel in planar {
                samples.push(clip_sample(channel[i]));
            }
        }
        Ok(AudioBuffer {
            sample_rate,
            channels: channels as u16,
            samples,
        })
    }

    /// Split into planar `f64` channels in sample units (not normalized).
    pub fn to_planar(&self) -> Vec<Vec<f64>> {
        let channels = self.channels as usize;
        let mut planar = vec![Vec::with_capacity(self.frames()); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (c, &s) in frame.iter().enumerate() {
                planar[c].push(s as f64);
            }
        }
        planar
    }

    /// Decode a 16-bit PCM WAV file.
    pub fn load_wav(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(|source| RadioError::Wav {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(RadioError::SampleFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "{:?} {}-bit, expected 16-bit integer PCM",
                    spec.sample_format, spec.bits_per_sample
                ),
            });
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| RadioError::Wav {
                path: path.to_path_buf(),
                source,
            })?;

        AudioBuffer::new(spec.sample_rate, spec.channels, samples).map_err(|e| {
            RadioError::SampleFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Absolute peak over all channels, normalized to [0, 1].
    pub fn peak(&self) -> f64 {
        self.samples
            .iter()
            .map(|&s| (s as f64).abs() / FULL_SCALE)
            .fold(0.0, f64::max)
    }
}

/// Round and clip a sample-unit value into the i16 range.
#[inline]
pub fn clip_sample(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(-32768.0, 32767.0) as i16
}

/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
