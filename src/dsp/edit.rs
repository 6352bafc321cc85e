//! Structural edits: crop and reverse.

use super::buffer::AudioBuffer;
use super::processor::Processor;
use crate::error::DspError;

/// Keep the `[start_ratio, end_ratio)` portion of a buffer with linear
/// fades at both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crop {
    pub start_ratio: f64,
    pub end_ratio: f64,
    pub fade_ms: f64,
}

impl Default for Crop {
    /// First half, 10 ms fades.
    fn default() -> Self {
        Crop {
            start_ratio: 0.0,
            end_ratio: 0.5,
            fade_ms: 10.0,
        }
    }
}

impl Crop {
    pub fn new(start_ratio: f64, end_ratio: f64, fade_ms: f64) -> Result<Self, DspError> {
        let start_ratio = start_ratio.clamp(0.0, 1.0);
        let end_ratio = end_ratio.clamp(0.0, 1.0);
        if start_ratio >= end_ratio {
            return Err(DspError::InvalidParameter(format!(
                "crop start {start_ratio} must be before end {end_ratio}"
            )));
        }
        Ok(Crop {
            start_ratio,
            end_ratio,
            fade_ms: fade_ms.max(0.0),
        })
    }
}

impl Processor for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        let channels = input.channels() as usize;
        let frames = input.frames();
        let start = (frames as f64 * self.start_ratio) as usize;
        let end = ((frames as f64 * self.end_ratio) as usize).min(frames);
        if start > end {
            return Err(DspError::InvalidParameter(format!(
                "crop window {}..{}",
                self.start_ratio, self.end_ratio
            )));
        }
        let len = end - start;

        // Fades never take more than a quarter of the cropped length.
        let fade = ((input.sample_rate() as f64 * self.fade_ms / 1000.0) as usize).min(len / 4);

        let mut samples = input.samples()[start * channels..end * channels].to_vec();
        for i in 0..fade {
            let gain = i as f64 / fade as f64;
            let head = i * channels;
            let tail = (len - 1 - i) * channels;
            for c in 0..channels {
                samples[head + c] = (samples[head + c] as f64 * gain) as i16;
                samples[tail + c] = (samples[tail + c] as f64 * gain) as i16;
            }
        }
        AudioBuffer::new(input.sample_rate(), input.channels(), samples)
    }
}

/// Play a buffer backwards, keeping stereo frames intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse;

impl Processor for Reverse {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        let channels = input.channels() as usize;
        let samples: Vec<i16> = input
            .samples()
            .chunks_exact(channels)
            .rev()
            .flatten()
            .copied()
            .collect();
        AudioBuffer::new(input.sample_rate(), input.channels(), samples)
    }
}
