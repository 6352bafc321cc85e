//! Biquad and state-variable filters.
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
//! Filters are applied offline, one channel at a time, with history kept per
//! channel so consecutive buffers continue seamlessly.

use std::f64::consts::PI;

use super::buffer::{AudioBuffer, MAX_CHANNELS};
use super::processor::{Processor, process_planar};
use crate::error::DspError;

/// Bound applied to state-variable internals on every sample.
pub const SVF_STATE_LIMIT: f64 = 1e6;

/// Output tap of the state-variable filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvfOutput {
    Low,
    Band,
    High,
}

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
    Peaking,
    /// Resonant state-variable filter; `FilterSpec::q` holds the resonance.
    StateVariable(SvfOutput),
}

/// Frequency-domain description of a filter. Immutable once designed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff_hz: f64,
    pub q: f64,
    /// Upper edge for two-cutoff band-pass / band-stop.
    pub high_cutoff_hz: Option<f64>,
    /// Only used for Peaking.
    pub gain_db: f64,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, cutoff_hz: f64, q: f64) -> Self {
        FilterSpec {
            kind,
            cutoff_hz,
            q,
            high_cutoff_hz: None,
            gain_db: 0.0,
        }
    }

    pub fn lowpass(cutoff_hz: f64, q: f64) -> Self {
        Self::new(FilterKind::Lowpass, cutoff_hz, q)
    }

    pub fn highpass(cutoff_hz: f64, q: f64) -> Self {
        Self::new(FilterKind::Highpass, cutoff_hz, q)
    }

    /// Single biquad band-pass around `center_hz`.
    pub fn bandpass(center_hz: f64, q: f64) -> Self {
        Self::new(FilterKind::Bandpass, center_hz, q)
    }

    /// Highpass at `low_hz` cascaded into lowpass at `high_hz`.
    pub fn band(low_hz: f64, high_hz: f64, q: f64) -> Self {
        FilterSpec {
            high_cutoff_hz: Some(high_hz),
            ..Self::new(FilterKind::Bandpass, low_hz, q)
        }
    }

    /// Single biquad notch at `center_hz`.
    pub fn notch(center_hz: f64, q: f64) -> Self {
        Self::new(FilterKind::Bandstop, center_hz, q)
    }

    /// Lowpass at `low_hz` and highpass at `high_hz` mixed 50/50.
    pub fn band_stop(low_hz: f64, high_hz: f64, q: f64) -> Self {
        FilterSpec {
            high_cutoff_hz: Some(high_hz),
            ..Self::new(FilterKind::Bandstop, low_hz, q)
        }
    }

    pub fn peaking(center_hz: f64, q: f64, gain_db: f64) -> Self {
        FilterSpec {
            gain_db,
            ..Self::new(FilterKind::Peaking, center_hz, q)
        }
    }

    /// Resonant state-variable filter. Resonance is clamped to [0.1, 10].
    pub fn state_variable(cutoff_hz: f64, resonance: f64, output: SvfOutput) -> Self {
        Self::new(FilterKind::StateVariable(output), cutoff_hz, resonance)
    }

    /// Reject parameters that would produce NaN or unstable coefficients.
    pub fn validate(&self, sample_rate: u32) -> Result<(), DspError> {
        if sample_rate == 0 {
            return Err(DspError::InvalidFilter("sample rate must be positive".to_string()));
        }
        let nyquist = sample_rate as f64 / 2.0;
        if !(self.q.is_finite() && self.q > 0.0) {
            return Err(DspError::InvalidFilter(format!("Q must be > 0, got {}", self.q)));
        }
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0 && self.cutoff_hz < nyquist) {
            return Err(DspError::InvalidFilter(format!(
                "cutoff {} Hz outside (0, {nyquist})",
                self.cutoff_hz
            )));
        }
        if let Some(high) = self.high_cutoff_hz {
            if !(high.is_finite() && high > self.cutoff_hz && high < nyquist) {
                return Err(DspError::InvalidFilter(format!(
                    "high cutoff {high} Hz outside ({}, {nyquist})",
                    self.cutoff_hz
                )));
            }
        }
        if !self.gain_db.is_finite() {
            return Err(DspError::InvalidFilter("gain must be finite".to_string()));
        }
        Ok(())
    }
}

/// Normalized biquad coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Pass-through.
    pub fn identity() -> Self {
        BiquadCoefficients {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Compute coefficients for a single biquad section. The caller has
    /// already validated the parameters.
    fn compute(kind: FilterKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            // Constant skirt gain, peak gain = Q
            FilterKind::Bandpass => {
                let b0 = sin_w0 / 2.0;
                (b0, 0.0, -b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::Bandstop => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Peaking => {
                let a_lin = 10.0_f64.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a_lin,
                    -2.0 * cos_w0,
                    1.0 - alpha * a_lin,
                    1.0 + alpha / a_lin,
                    -2.0 * cos_w0,
                    1.0 - alpha / a_lin,
                )
            }
            FilterKind::StateVariable(_) => return Self::identity(),
        };

        // Normalize by a0
        BiquadCoefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// A designed filter, ready to run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDesign {
    Single(BiquadCoefficients),
    /// Two sections in series (two-cutoff band-pass).
    Cascade(BiquadCoefficients, BiquadCoefficients),
    /// Two sections in parallel, mixed 50/50 (two-cutoff band-stop).
    Parallel(BiquadCoefficients, BiquadCoefficients),
    StateVariable { f: f64, q: f64, output: SvfOutput },
}

/// Design a filter for `sample_rate`.
pub fn design(spec: &FilterSpec, sample_rate: u32) -> Result<FilterDesign, DspError> {
    spec.validate(sample_rate)?;
    let rate = sample_rate as f64;

    let design = match (spec.kind, spec.high_cutoff_hz) {
        (FilterKind::StateVariable(output), _) => {
            let resonance = spec.q.clamp(0.1, 10.0);
            FilterDesign::StateVariable {
                f: (2.0 * (PI * spec.cutoff_hz / rate).sin()).clamp(0.0, 1.0),
                q: 1.0 / resonance,
                output,
            }
        }
        (FilterKind::Bandpass, Some(high)) => FilterDesign::Cascade(
            BiquadCoefficients::compute(FilterKind::Highpass, spec.cutoff_hz, spec.q, 0.0, rate),
            BiquadCoefficients::compute(FilterKind::Lowpass, high, spec.q, 0.0, rate),
        ),
        (FilterKind::Bandstop, Some(high)) => FilterDesign::Parallel(
            BiquadCoefficients::compute(FilterKind::Lowpass, spec.cutoff_hz, spec.q, 0.0, rate),
            BiquadCoefficients::compute(FilterKind::Highpass, high, spec.q, 0.0, rate),
        ),
        (kind, _) => FilterDesign::Single(BiquadCoefficients::compute(
            kind,
            spec.cutoff_hz,
            spec.q,
            spec.gain_db,
            rate,
        )),
    };
    Ok(design)
}

/// Biquad history for one channel and one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelFilterState {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl ChannelFilterState {
    /// Direct Form I: y = b0·x + b1·x1 + b2·x2 − a1·y1 − a2·y2.
    #[inline]
    pub fn tick(&mut self, c: &BiquadCoefficients, x: f64) -> f64 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// State-variable filter integrators for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SvfState {
    pub low: f64,
    pub band: f64,
    pub high: f64,
}

impl SvfState {
    #[inline]
    pub fn tick(&mut self, f: f64, q: f64, output: SvfOutput, x: f64) -> f64 {
        self.low += f * self.band;
        self.high = x - self.low - q * self.band;
        self.band += f * self.high;

        self.low = self.low.clamp(-SVF_STATE_LIMIT, SVF_STATE_LIMIT);
        self.band = self.band.clamp(-SVF_STATE_LIMIT, SVF_STATE_LIMIT);
        self.high = self.high.clamp(-SVF_STATE_LIMIT, SVF_STATE_LIMIT);

        match output {
            SvfOutput::Low => self.low,
            SvfOutput::Band => self.band,
            SvfOutput::High => self.high,
        }
    }
}

/// Named state slots for multi-stage designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSlot {
    Stage1 = 0,
    Stage2 = 1,
}

const STAGES: usize = 2;

/// A filter instance holding its design and per-channel history.
#[derive(Debug, Clone)]
pub struct StatefulFilter {
    spec: FilterSpec,
    /// Cached design and the rate it was computed for.
    design: Option<(u32, FilterDesign)>,
    biquad: [[ChannelFilterState; STAGES]; MAX_CHANNELS],
    svf: [SvfState; MAX_CHANNELS],
}

impl StatefulFilter {
    pub fn new(spec: FilterSpec) -> Self {
        StatefulFilter {
            spec,
            design: None,
            biquad: [[ChannelFilterState::default(); STAGES]; MAX_CHANNELS],
            svf: [SvfState::default(); MAX_CHANNELS],
        }
    }

    /// Create and design immediately, rejecting invalid specs up front.
    pub fn designed(spec: FilterSpec, sample_rate: u32) -> Result<Self, DspError> {
        let mut f = Self::new(spec);
        f.prepare(sample_rate)?;
        Ok(f)
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// The cached design, if any.
    pub fn design(&self) -> Option<&FilterDesign> {
        self.design.as_ref().map(|(_, d)| d)
    }

    /// Design for `sample_rate` unless a design for that rate is cached.
    pub fn prepare(&mut self, sample_rate: u32) -> Result<FilterDesign, DspError> {
        if let Some((rate, d)) = self.design {
            if rate == sample_rate {
                return Ok(d);
            }
            self.reset();
        }
        let d = design(&self.spec, sample_rate)?;
        self.design = Some((sample_rate, d));
        Ok(d)
    }

    /// Replace the parameters; forces a redesign and clears history.
    pub fn update(&mut self, spec: FilterSpec) {
        self.spec = spec;
        self.invalidate();
    }

    /// Drop the cached design and history.
    pub fn invalidate(&mut self) {
        self.design = None;
        self.reset();
    }

    /// Clear all channel history.
    pub fn reset(&mut self) {
        self.biquad = [[ChannelFilterState::default(); STAGES]; MAX_CHANNELS];
        self.svf = [SvfState::default(); MAX_CHANNELS];
    }

    /// History of a channel's stage, for inspection.
    pub fn channel_state(&self, channel: usize, slot: StageSlot) -> Option<&ChannelFilterState> {
        self.biquad.get(channel).map(|stages| &stages[slot as usize])
    }

    /// Filter one channel of samples (sample units).
    pub fn process_channel(
        &mut self,
        channel: usize,
        samples: &[f64],
        sample_rate: u32,
    ) -> Result<Vec<f64>, DspError> {
        if channel >= MAX_CHANNELS {
            return Err(DspError::ChannelLayout(channel as u16 + 1));
        }
        let design = self.prepare(sample_rate)?;
        let [s1, s2] = &mut self.biquad[channel];

        let out = match design {
            FilterDesign::Single(c) => samples.iter().map(|&x| s1.tick(&c, x)).collect(),
            FilterDesign::Cascade(first, second) => samples
                .iter()
                .map(|&x| s2.tick(&second, s1.tick(&first, x)))
                .collect(),
            FilterDesign::Parallel(low, high) => samples
                .iter()
                .map(|&x| (s1.tick(&low, x) + s2.tick(&high, x)) * 0.5)
                .collect(),
            FilterDesign::StateVariable { f, q, output } => {
                let state = &mut self.svf[channel];
                samples.iter().map(|&x| state.tick(f, q, output, x)).collect()
            }
        };
        Ok(out)
    }
}

impl Processor for StatefulFilter {
    fn name(&self) -> &'static str {
        match self.spec.kind {
            FilterKind::StateVariable(_) => "resonant-filter",
            _ => "filter",
        }
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        let rate = input.sample_rate();
        process_planar(input, |channel, samples| self.process_channel(channel, samples, rate))
    }

    fn reset(&mut self) {
        StatefulFilter::reset(self);
    }
}

/// First-order RC filter with dry/wet mix, for gentle tone shaping.
#[derive(Debug, Clone)]
pub struct SimpleFilter {
    /// Highpass when true (input minus the smoothed signal).
    pub highpass: bool,
    pub cutoff_hz: f64,
    mix: f64,
    state: [f64; MAX_CHANNELS],
}

impl SimpleFilter {
    pub fn new(highpass: bool, cutoff_hz: f64, mix: f64) -> Self {
        SimpleFilter {
            highpass,
            cutoff_hz,
            mix: mix.clamp(0.0, 1.0),
            state: [0.0; MAX_CHANNELS],
        }
    }

    pub fn lowpass(cutoff_hz: f64, mix: f64) -> Self {
        Self::new(false, cutoff_hz, mix)
    }

    pub fn mix(&self) -> f64 {
        self.mix
    }

    fn process_channel(&mut self, channel: usize, samples: &[f64], sample_rate: u32) -> Vec<f64> {
        let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
        let dt = 1.0 / sample_rate as f64;
        let alpha = dt / (rc + dt);
        let mut smoothed = self.state[channel];

        let out = samples
            .iter()
            .map(|&x| {
                smoothed += alpha * (x - smoothed);
                let filtered = if self.highpass { x - smoothed } else { smoothed };
                (1.0 - self.mix) * x + self.mix * filtered
            })
            .collect();
        self.state[channel] = smoothed;
        out
    }
}

impl Processor for SimpleFilter {
    fn name(&self) -> &'static str {
        "simple-filter"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0) || input.sample_rate() == 0 {
            return Err(DspError::InvalidFilter(format!(
                "simple filter cutoff {} Hz",
                self.cutoff_hz
            )));
        }
        let rate = input.sample_rate();
        process_planar(input, |channel, samples| Ok(self.process_channel(channel, samples, rate)))
    }

    fn reset(&mut self) {
        self.state = [0.0; MAX_CHANNELS];
    }
}
