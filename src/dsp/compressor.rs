//! Compressors: dynamics processing for sample leveling.
//!
//! Gain math works on amplitude normalized to [0, 1] (sample / 32768).
//! Thresholds are given in dB and converted once; makeup gain is linear.

use super::buffer::{AudioBuffer, FULL_SCALE, MAX_CHANNELS, db_to_linear};
use super::processor::{Processor, process_planar};
use crate::error::DspError;

/// Envelope smoothing coefficient for a time constant in milliseconds.
#[inline]
pub fn time_coefficient(sample_rate: u32, ms: f64) -> f64 {
    (-1.0 / (sample_rate as f64 * ms / 1000.0)).exp()
}

/// Convert linear amplitude to dB.
#[inline]
fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}

/// Static gain curve: above `threshold` the excess is divided by `ratio`.
#[inline]
fn curve_gain(level: f64, threshold: f64, ratio: f64) -> f64 {
    if level > threshold {
        (threshold + (level - threshold) / ratio) / level
    } else {
        1.0
    }
}

/// Peak-envelope compressor with per-channel state.
#[derive(Debug, Clone)]
pub struct Compressor {
    /// Threshold in dB.
    pub threshold_db: f64,
    /// Compression ratio (4.0 = 4:1). `f64::INFINITY` limits.
    pub ratio: f64,
    /// Attack time in milliseconds.
    pub attack_ms: f64,
    /// Release time in milliseconds.
    pub release_ms: f64,
    /// Linear gain applied after compression.
    pub makeup_gain: f64,

    envelope: [f64; MAX_CHANNELS],
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    /// Defaults: -20 dB threshold, 4:1, 10 ms attack, 100 ms release, unity makeup.
    pub fn new() -> Self {
        Compressor {
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain: 1.0,
            envelope: [0.0; MAX_CHANNELS],
        }
    }

    pub fn with_params(threshold_db: f64, ratio: f64, attack_ms: f64, release_ms: f64) -> Self {
        Compressor {
            threshold_db: threshold_db.clamp(-96.0, 0.0),
            ratio: ratio.max(1.0),
            attack_ms: attack_ms.clamp(0.01, 5000.0),
            release_ms: release_ms.clamp(0.01, 5000.0),
            ..Self::new()
        }
    }

    pub fn with_makeup(mut self, gain: f64) -> Self {
        self.makeup_gain = gain;
        self
    }

    pub fn with_attack(mut self, attack_ms: f64) -> Self {
        self.attack_ms = attack_ms;
        self
    }

    /// Current gain reduction of a channel in dB (for metering).
    pub fn gain_reduction_db(&self, channel: usize) -> f64 {
        let env = self.envelope.get(channel).copied().unwrap_or(0.0);
        let gain = curve_gain(env, db_to_linear(self.threshold_db), self.ratio);
        -linear_to_db(gain)
    }

    fn check(&self) -> Result<(), DspError> {
        if self.ratio.is_nan() || self.ratio < 1.0 {
            return Err(DspError::InvalidParameter(format!("ratio {}", self.ratio)));
        }
        if !(self.attack_ms > 0.0 && self.release_ms > 0.0) {
            return Err(DspError::InvalidParameter(format!(
                "attack {} ms / release {} ms",
                self.attack_ms, self.release_ms
            )));
        }
        if !self.makeup_gain.is_finite() {
            return Err(DspError::InvalidParameter("makeup gain".to_string()));
        }
        Ok(())
    }

    /// Compress one channel (sample units), continuing its envelope.
    pub fn process_channel(
        &mut self,
        channel: usize,
        samples: &[f64],
        sample_rate: u32,
    ) -> Result<Vec<f64>, DspError> {
        if channel >= MAX_CHANNELS {
            return Err(DspError::ChannelLayout(channel as u16 + 1));
        }
        let threshold = db_to_linear(self.threshold_db);
        let attack = time_coefficient(sample_rate, self.attack_ms);
        let release = time_coefficient(sample_rate, self.release_ms);
        let mut env = self.envelope[channel];

        let out = samples
            .iter()
            .map(|&x| {
                let amp = x.abs() / FULL_SCALE;
                let coeff = if amp > env { attack } else { release };
                env = coeff * env + (1.0 - coeff) * amp;
                x * curve_gain(env, threshold, self.ratio) * self.makeup_gain
            })
            .collect();
        self.envelope[channel] = env;
        Ok(out)
    }
}

impl Processor for Compressor {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        self.check()?;
        let rate = input.sample_rate();
        process_planar(input, |channel, samples| self.process_channel(channel, samples, rate))
    }

    fn reset(&mut self) {
        self.envelope = [0.0; MAX_CHANNELS];
    }
}

/// Stateless compressor: the gain curve is applied to each sample's own
/// amplitude with no envelope.
#[derive(Debug, Clone, Copy)]
pub struct SimpleCompressor {
    pub threshold_db: f64,
    pub ratio: f64,
    pub makeup_gain: f64,
}

impl Default for SimpleCompressor {
    fn default() -> Self {
        SimpleCompressor {
            threshold_db: -20.0,
            ratio: 4.0,
            makeup_gain: 1.0,
        }
    }
}

impl SimpleCompressor {
    pub fn new(threshold_db: f64, ratio: f64) -> Self {
        SimpleCompressor {
            threshold_db,
            ratio: ratio.max(1.0),
            makeup_gain: 1.0,
        }
    }

    /// Compress one channel in sample units.
    pub fn compress(&self, samples: &[f64]) -> Vec<f64> {
        let threshold = db_to_linear(self.threshold_db);
        samples
            .iter()
            .map(|&x| {
                let amp = x.abs() / FULL_SCALE;
                x * curve_gain(amp, threshold, self.ratio) * self.makeup_gain
            })
            .collect()
    }
}

impl Processor for SimpleCompressor {
    fn name(&self) -> &'static str {
        "simple-compressor"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        process_planar(input, |_, samples| Ok(self.compress(samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const RATE: u32 = 44100;

    fn sine_buffer(freq: f64, amplitude: f64, secs: f64) -> AudioBuffer {
        let len = (RATE as f64 * secs) as usize;
        let planar = vec![
            (0..len)
                .map(|i| amplitude * FULL_SCALE * (2.0 * PI * freq * i as f64 / RATE as f64).sin())
                .collect::<Vec<_>>(),
        ];
        AudioBuffer::from_planar(RATE, &planar).unwrap()
    }

    fn peak_of(samples: &[i16]) -> f64 {
        samples.iter().map(|&s| (s as f64).abs()).fold(0.0, f64::max) / FULL_SCALE
    }

    #[test]
    fn time_coefficient_matches_formula() {
        assert_abs_diff_eq!(time_coefficient(1000, 1.0), (-1.0_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn limiting_ratio_converges_to_threshold() {
        let mut comp = Compressor::with_params(-12.0, f64::INFINITY, 1.0, 500.0);
        let out = comp.process(&sine_buffer(100.0, 0.8, 2.0)).unwrap();
        let settled = &out.samples()[RATE as usize..];
        let threshold = db_to_linear(-12.0);
        let peak = peak_of(settled);
        assert!(
            peak <= threshold * 1.05,
            "Settled peak {peak} should be at most threshold {threshold}"
        );
        assert!(peak > threshold * 0.8, "Should not over-compress: {peak}");
    }

    #[test]
    fn passthrough_below_threshold() {
        let mut comp = Compressor::with_params(-20.0, 4.0, 1.0, 100.0);
        let input = sine_buffer(440.0, 0.05, 0.1);
        let out = comp.process(&input).unwrap();
        assert_eq!(out, input, "-26 dB signal must pass a -20 dB compressor untouched");
    }

    #[test]
    fn reduces_loud_signals() {
        let mut comp = Compressor::with_params(-12.0, 4.0, 1.0, 100.0);
        let input = AudioBuffer::mono(RATE, vec![32767; 5000]);
        let out = comp.process(&input).unwrap();
        let last = out.samples()[4999] as f64 / FULL_SCALE;

        // Linear curve at full scale: T + (1 - T) / 4, about 0.44
        assert!(last < 0.5, "Compressor should reduce loud signals: got {last}");
        assert!(last > 0.3, "Compressor should not over-compress: got {last}");
    }

    #[test]
    fn attack_lets_transient_through() {
        let mut comp = Compressor::with_params(-20.0, 10.0, 10.0, 500.0);
        let out = comp.process(&AudioBuffer::mono(RATE, vec![32767; 1000])).unwrap();
        let first = out.samples()[0];
        let later = out.samples()[999];
        assert!(
            first > later,
            "First sample should be louder than after attack: first={first}, later={later}"
        );
    }

    #[test]
    fn envelope_persists_and_resets() {
        let mut comp = Compressor::with_params(-20.0, 10.0, 1.0, 1000.0);
        comp.process(&AudioBuffer::mono(RATE, vec![32767; 2000])).unwrap();
        assert!(comp.gain_reduction_db(0) > 10.0);

        let quiet = AudioBuffer::mono(RATE, vec![3000; 10]);
        let held = comp.process(&quiet).unwrap();
        comp.reset();
        let fresh = comp.process(&quiet).unwrap();
        assert!(held.samples()[0] < fresh.samples()[0]);
        assert_abs_diff_eq!(comp.gain_reduction_db(1), 0.0);
    }

    #[test]
    fn makeup_gain_scales_output() {
        let input = AudioBuffer::mono(RATE, vec![1000; 100]);
        let mut comp = Compressor::new().with_makeup(0.5);
        let out = comp.process(&input).unwrap();
        assert!(out.samples().iter().all(|&s| s == 500));
    }

    #[test]
    fn invalid_parameters_error() {
        let mut comp = Compressor::new();
        comp.ratio = 0.5;
        assert!(comp.process(&AudioBuffer::mono(RATE, vec![0; 4])).is_err());
    }

    #[test]
    fn out_of_range_channel_is_an_error() {
        let mut comp = Compressor::new();
        assert!(matches!(
            comp.process_channel(MAX_CHANNELS, &[1.0], RATE),
            Err(DspError::ChannelLayout(_))
        ));
        assert!(comp.process_channel(0, &[1.0], RATE).is_ok());
    }

    #[test]
    fn attack_builder_keeps_other_defaults() {
        let comp = Compressor::new().with_attack(50.0).with_makeup(0.6);
        assert_eq!(comp.attack_ms, 50.0);
        assert_eq!(comp.release_ms, 100.0);
        assert_eq!(comp.makeup_gain, 0.6);
    }

    #[test]
    fn simple_compressor_is_instantaneous() {
        let comp = SimpleCompressor::new(-6.0, f64::INFINITY);
        let threshold = db_to_linear(-6.0) * FULL_SCALE;
        let out = comp.compress(&[32000.0, -32000.0, 1000.0]);
        assert_abs_diff_eq!(out[0], threshold, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], -threshold, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 1000.0);
    }

    #[test]
    fn simple_compressor_unity_ratio_is_identity() {
        let comp = SimpleCompressor::new(-30.0, 1.0);
        let input = [12000.0, -20000.0, 5.0];
        for (out, x) in comp.compress(&input).iter().zip(input) {
            assert_abs_diff_eq!(*out, x, epsilon = 1e-9);
        }
    }
}
