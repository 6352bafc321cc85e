//! Three-band compressor with an FFT band split.
//!
//! The whole channel is transformed at once, bins are assigned to the low,
//! mid or high band by frequency, and each band is brought back to the time
//! domain and compressed on its own. Bins are partitioned without overlap,
//! so unity ratios sum back to the input; the brick-wall split is otherwise
//! approximate and not phase-exact.

use realfft::RealFftPlanner;
use realfft::num_complex::Complex;

use super::buffer::AudioBuffer;
use super::compressor::SimpleCompressor;
use super::processor::{Processor, process_planar};
use crate::error::DspError;

/// Upper edge of the low band.
pub const LOW_MID_CROSSOVER_HZ: f64 = 300.0;
/// Upper edge of the mid band.
pub const MID_HIGH_CROSSOVER_HZ: f64 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    fn of(frequency: f64) -> Band {
        if frequency < LOW_MID_CROSSOVER_HZ {
            Band::Low
        } else if frequency < MID_HIGH_CROSSOVER_HZ {
            Band::Mid
        } else {
            Band::High
        }
    }
}

/// Low/mid/high compressor.
#[derive(Debug, Clone)]
pub struct MultibandCompressor {
    pub low: SimpleCompressor,
    pub mid: SimpleCompressor,
    pub high: SimpleCompressor,
    /// Linear gain applied to the summed bands.
    pub makeup_gain: f64,
}

impl Default for MultibandCompressor {
    fn default() -> Self {
        MultibandCompressor::new(
            SimpleCompressor::new(-24.0, 3.0),
            SimpleCompressor::new(-20.0, 2.0),
            SimpleCompressor::new(-18.0, 2.0),
        )
    }
}

impl MultibandCompressor {
    pub fn new(low: SimpleCompressor, mid: SimpleCompressor, high: SimpleCompressor) -> Self {
        MultibandCompressor {
            low,
            mid,
            high,
            makeup_gain: 1.0,
        }
    }

    /// All three bands at the same settings.
    pub fn uniform(threshold_db: f64, ratio: f64) -> Self {
        let c = SimpleCompressor::new(threshold_db, ratio);
        Self::new(c, c, c)
    }

    fn compressor(&self, band: Band) -> &SimpleCompressor {
        match band {
            Band::Low => &self.low,
            Band::Mid => &self.mid,
            Band::High => &self.high,
        }
    }

    /// Split, compress and recombine one channel (sample units).
    pub fn process_channel(&self, samples: &[f64], sample_rate: u32) -> Result<Vec<f64>, DspError> {
        let len = samples.len();
        if len < 2 {
            return Ok(samples.iter().map(|x| x * self.makeup_gain).collect());
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);

        let mut input = forward.make_input_vec();
        input.copy_from_slice(samples);
        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| DspError::Fft(e.to_string()))?;

        let bin_hz = sample_rate as f64 / len as f64;
        let scale = 1.0 / len as f64;
        let mut mixed = vec![0.0; len];

        for band in [Band::Low, Band::Mid, Band::High] {
            let mut band_spectrum: Vec<Complex<f64>> = spectrum
                .iter()
                .enumerate()
                .map(|(k, &bin)| {
                    if Band::of(k as f64 * bin_hz) == band {
                        bin
                    } else {
                        Complex::new(0.0, 0.0)
                    }
                })
                .collect();
            // The inverse transform requires real DC and Nyquist bins.
            band_spectrum[0].im = 0.0;
            if len % 2 == 0 {
                if let Some(last) = band_spectrum.last_mut() {
                    last.im = 0.0;
                }
            }

            let mut band_signal = inverse.make_output_vec();
            inverse
                .process(&mut band_spectrum, &mut band_signal)
                .map_err(|e| DspError::Fft(e.to_string()))?;
            for s in band_signal.iter_mut() {
                *s *= scale;
            }

            let compressed = self.compressor(band).compress(&band_signal);
            for (m, c) in mixed.iter_mut().zip(compressed) {
                *m += c;
            }
        }

        for m in mixed.iter_mut() {
            *m *= self.makeup_gain;
        }
        Ok(mixed)
    }
}

impl Processor for MultibandCompressor {
    fn name(&self) -> &'static str {
        "multiband-compressor"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        if input.sample_rate() == 0 {
            return Err(DspError::InvalidParameter("sample rate 0".to_string()));
        }
        let rate = input.sample_rate();
        process_planar(input, |_, samples| self.process_channel(samples, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const RATE: u32 = 44100;

    fn tone(freq: f64, amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / RATE as f64).sin())
            .collect()
    }

    #[test]
    fn unity_ratios_reconstruct_input() {
        let mb = MultibandCompressor::uniform(-20.0, 1.0);
        let input: Vec<f64> = tone(100.0, 8000.0, 4410)
            .iter()
            .zip(tone(1000.0, 6000.0, 4410))
            .zip(tone(8000.0, 4000.0, 4410))
            .map(|((a, b), c)| a + b + c)
            .collect();
        let out = mb.process_channel(&input, RATE).unwrap();
        for (i, (o, x)) in out.iter().zip(&input).enumerate() {
            assert!((o - x).abs() < 1e-6, "sample {i}: {o} vs {x}");
        }
    }

    #[test]
    fn odd_length_reconstructs() {
        let mb = MultibandCompressor::uniform(-20.0, 1.0);
        let input = tone(440.0, 10000.0, 1001);
        let out = mb.process_channel(&input, RATE).unwrap();
        assert!(out.iter().zip(&input).all(|(o, x)| (o - x).abs() < 1e-6));
    }

    #[test]
    fn compresses_only_the_loud_band() {
        // Loud low tone, quiet high tone; only the low band crosses threshold.
        let len = 4410;
        let low = tone(100.0, 30000.0, len);
        let high = tone(5000.0, 500.0, len);
        let input: Vec<f64> = low.iter().zip(&high).map(|(a, b)| a + b).collect();

        let mb = MultibandCompressor::uniform(-12.0, f64::INFINITY);
        let out = mb.process_channel(&input, RATE).unwrap();
        let peak = out.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(peak < 30000.0 * 0.5, "low band should be limited, peak {peak}");
    }

    #[test]
    fn band_assignment() {
        assert_eq!(Band::of(0.0), Band::Low);
        assert_eq!(Band::of(299.9), Band::Low);
        assert_eq!(Band::of(300.0), Band::Mid);
        assert_eq!(Band::of(3000.0), Band::High);
    }

    #[test]
    fn tiny_buffers_pass_with_makeup() {
        let mut mb = MultibandCompressor::default();
        mb.makeup_gain = 2.0;
        assert_eq!(mb.process_channel(&[10.0], RATE).unwrap(), vec![20.0]);
        let out = mb.process(&AudioBuffer::mono(RATE, vec![])).unwrap();
        assert!(out.is_empty());
    }
}
