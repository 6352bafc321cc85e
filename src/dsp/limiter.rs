//! Peak limiters.
//!
//! [`Limiter`] looks ahead for peaks and eases its gain toward the target;
//! [`FastLimiter`] hard-limits each sample; [`SimpleLimiter`] attacks
//! instantly and releases geometrically.

use std::collections::VecDeque;

use super::buffer::{AudioBuffer, FULL_SCALE, MAX_CHANNELS, db_to_linear};
use super::compressor::time_coefficient;
use super::processor::{Processor, process_planar};
use crate::error::DspError;

/// Running maximum of |x| over the window `[i, i + len)` for every `i`.
fn check_channel(channel: usize) -> Result<(), DspError> {
    if channel >= MAX_CHANNELS {
        return Err(DspError::ChannelLayout(channel as u16 + 1));
    }
    Ok(())
}

fn lookahead_peaks(samples: &[f64], len: usize) -> Vec<f64> {
    let n = samples.len();
    let mut peaks = vec![0.0; n];
    // Indices with decreasing magnitude; front is the window max.
    let mut window: VecDeque<usize> = VecDeque::with_capacity(len + 1);

    for j in (0..n).rev() {
        let amp = samples[j].abs();
        while window.back().is_some_and(|&k| samples[k].abs() <= amp) {
            window.pop_back();
        }
        window.push_back(j);
        while window.front().is_some_and(|&k| k >= j + len) {
            window.pop_front();
        }
        peaks[j] = window.front().map_or(0.0, |&k| samples[k].abs());
    }
    peaks
}

/// Lookahead limiter with a smoothed per-channel gain.
#[derive(Debug, Clone)]
pub struct Limiter {
    /// Ceiling in dB.
    pub threshold_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub lookahead_ms: f64,

    gain: [f64; MAX_CHANNELS],
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Limiter {
    /// Defaults: -3 dB ceiling, 1 ms attack, 50 ms release, 5 ms lookahead.
    pub fn new() -> Self {
        Limiter {
            threshold_db: -3.0,
            attack_ms: 1.0,
            release_ms: 50.0,
            lookahead_ms: 5.0,
            gain: [1.0; MAX_CHANNELS],
        }
    }

    pub fn with_params(threshold_db: f64, attack_ms: f64, release_ms: f64, lookahead_ms: f64) -> Self {
        Limiter {
            threshold_db,
            attack_ms,
            release_ms,
            lookahead_ms,
            ..Self::new()
        }
    }

    /// Current linear gain of a channel.
    pub fn gain(&self, channel: usize) -> Option<f64> {
        self.gain.get(channel).copied()
    }

    fn lookahead_samples(&self, sample_rate: u32) -> usize {
        ((sample_rate as f64 * self.lookahead_ms / 1000.0).round() as usize).max(1)
    }

    pub fn process_channel(
        &mut self,
        channel: usize,
        samples: &[f64],
        sample_rate: u32,
    ) -> Result<Vec<f64>, DspError> {
        check_channel(channel)?;
        let threshold = db_to_linear(self.threshold_db);
        let attack = time_coefficient(sample_rate, self.attack_ms);
        let release = time_coefficient(sample_rate, self.release_ms);
        let peaks = lookahead_peaks(samples, self.lookahead_samples(sample_rate));
        let mut gain = self.gain[channel];

        let out = samples
            .iter()
            .zip(peaks)
            .map(|(&x, peak)| {
                let peak = peak / FULL_SCALE;
                let target = if peak > threshold { threshold / peak } else { 1.0 };
                let coeff = if target < gain { attack } else { release };
                gain = target + (gain - target) * coeff;
                x * gain
            })
            .collect();
        self.gain[channel] = gain;
        Ok(out)
    }
}

impl Processor for Limiter {
    fn name(&self) -> &'static str {
        "limiter"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        if !(self.attack_ms > 0.0 && self.release_ms > 0.0 && self.lookahead_ms >= 0.0) {
            return Err(DspError::InvalidParameter(format!(
                "limiter times {}/{}/{} ms",
                self.attack_ms, self.release_ms, self.lookahead_ms
            )));
        }
        let rate = input.sample_rate();
        process_planar(input, |channel, samples| self.process_channel(channel, samples, rate))
    }

    fn reset(&mut self) {
        self.gain = [1.0; MAX_CHANNELS];
    }
}

/// Stateless hard limiter.
#[derive(Debug, Clone, Copy)]
pub struct FastLimiter {
    pub threshold_db: f64,
}

impl Default for FastLimiter {
    fn default() -> Self {
        FastLimiter { threshold_db: -3.0 }
    }
}

impl FastLimiter {
    pub fn new(threshold_db: f64) -> Self {
        FastLimiter { threshold_db }
    }

    /// Ceiling in sample units, rounded down to a whole sample so that
    /// quantization can never push a limited sample past the threshold.
    pub fn ceiling(&self) -> f64 {
        (db_to_linear(self.threshold_db) * FULL_SCALE).floor()
    }

    pub fn limit(&self, samples: &[f64]) -> Vec<f64> {
        let ceiling = self.ceiling();
        samples
            .iter()
            .map(|&x| {
                let amp = x.abs();
                if amp > ceiling { x * (ceiling / amp) } else { x }
            })
            .collect()
    }
}

impl Processor for FastLimiter {
    fn name(&self) -> &'static str {
        "fast-limiter"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        process_planar(input, |_, samples| Ok(self.limit(samples)))
    }
}

/// Instant-attack limiter with geometric release toward unity gain.
#[derive(Debug, Clone)]
pub struct SimpleLimiter {
    pub threshold_db: f64,
    /// Per-sample release factor; closer to 1 releases slower.
    pub release_factor: f64,
    gain: [f64; MAX_CHANNELS],
}

impl Default for SimpleLimiter {
    fn default() -> Self {
        Self::new(-3.0)
    }
}

impl SimpleLimiter {
    pub fn new(threshold_db: f64) -> Self {
        SimpleLimiter {
            threshold_db,
            release_factor: 0.999,
            gain: [1.0; MAX_CHANNELS],
        }
    }

    pub fn process_channel(&mut self, channel: usize, samples: &[f64]) -> Result<Vec<f64>, DspError> {
        check_channel(channel)?;
        let threshold = db_to_linear(self.threshold_db);
        let rf = self.release_factor;
        let mut gain = self.gain[channel];

        let out = samples
            .iter()
            .map(|&x| {
                gain = (gain * rf + (1.0 - rf)).min(1.0);
                let amp = x.abs() / FULL_SCALE;
                if amp > threshold {
                    gain = gain.min(threshold / amp);
                }
                x * gain
            })
            .collect();
        self.gain[channel] = gain;
        Ok(out)
    }
}

impl Processor for SimpleLimiter {
    fn name(&self) -> &'static str {
        "simple-limiter"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        if !(0.0..1.0).contains(&self.release_factor) {
            return Err(DspError::InvalidParameter(format!(
                "release factor {}",
                self.release_factor
            )));
        }
        process_planar(input, |channel, samples| self.process_channel(channel, samples))
    }

    fn reset(&mut self) {
        self.gain = [1.0; MAX_CHANNELS];
    }
}
