//! Single-band equalizer and named filter presets.

use super::buffer::AudioBuffer;
use super::filter::{FilterSpec, SimpleFilter, StatefulFilter, SvfOutput};
use super::processor::Processor;
use crate::error::DspError;

/// One peaking band.
#[derive(Debug, Clone)]
pub struct Equalizer {
    filter: StatefulFilter,
}

impl Default for Equalizer {
    /// 170 Hz, Q 1.0, flat.
    fn default() -> Self {
        Self::new(170.0, 1.0, 0.0)
    }
}

impl Equalizer {
    pub fn new(center_hz: f64, q: f64, gain_db: f64) -> Self {
        Equalizer {
            filter: StatefulFilter::new(FilterSpec::peaking(center_hz, q, gain_db)),
        }
    }

    pub fn spec(&self) -> &FilterSpec {
        self.filter.spec()
    }

    /// Change the band gain; the next buffer is processed with a fresh design.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        let spec = FilterSpec {
            gain_db,
            ..*self.filter.spec()
        };
        self.filter.update(spec);
    }
}

impl Processor for Equalizer {
    fn name(&self) -> &'static str {
        "equalizer"
    }

    fn process(&mut self, input: &AudioBuffer) -> Result<AudioBuffer, DspError> {
        self.filter.process(input)
    }

    fn reset(&mut self) {
        self.filter.reset();
    }
}

/// Ready-made filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Telephone,
    BassCut,
    TrebleCut,
    Notch60Hz,
    ResonantSweep,
    Warm,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Telephone,
        Preset::BassCut,
        Preset::TrebleCut,
        Preset::Notch60Hz,
        Preset::ResonantSweep,
        Preset::Warm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Telephone => "telephone",
            Preset::BassCut => "bass_cut",
            Preset::TrebleCut => "treble_cut",
            Preset::Notch60Hz => "notch_60hz",
            Preset::ResonantSweep => "resonant_sweep",
            Preset::Warm => "warm",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        Preset::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn build(self) -> Box<dyn Processor> {
        match self {
            Preset::Telephone => Box::new(StatefulFilter::new(FilterSpec::band(300.0, 3000.0, 2.0))),
            Preset::BassCut => Box::new(StatefulFilter::new(FilterSpec::highpass(80.0, 0.707))),
            Preset::TrebleCut => Box::new(StatefulFilter::new(FilterSpec::lowpass(5000.0, 0.707))),
            Preset::Notch60Hz => {
                Box::new(StatefulFilter::new(FilterSpec::band_stop(55.0, 65.0, 10.0)))
            }
            Preset::ResonantSweep => Box::new(StatefulFilter::new(FilterSpec::state_variable(
                1000.0,
                5.0,
                SvfOutput::Low,
            ))),
            Preset::Warm => Box::new(SimpleFilter::lowpass(8000.0, 0.5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_equalizer_is_transparent() {
        let mut eq = Equalizer::default();
        let input = AudioBuffer::mono(44100, vec![1000, -2000, 3000, 0, 500]);
        assert_eq!(eq.process(&input).unwrap(), input);
    }

    #[test]
    fn boost_raises_center_frequency() {
        let mut eq = Equalizer::new(170.0, 1.0, 12.0);
        let samples: Vec<f64> = (0..44100)
            .map(|i| 4000.0 * (2.0 * std::f64::consts::PI * 170.0 * i as f64 / 44100.0).sin())
            .collect();
        let input = AudioBuffer::from_planar(44100, &[samples]).unwrap();
        let out = eq.process(&input).unwrap();
        assert!(out.peak() > input.peak() * 3.0, "{} vs {}", out.peak(), input.peak());

        eq.set_gain_db(0.0);
        assert_eq!(eq.spec().gain_db, 0.0);
    }

    #[test]
    fn preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(Preset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(Preset::from_name("radio"), None);
    }

    #[test]
    fn presets_process_44k_audio() {
        let input = AudioBuffer::mono(44100, (0..2000).map(|i| ((i * 37) % 2000) as i16).collect());
        for preset in Preset::ALL {
            let mut p = preset.build();
            let out = p.process(&input);
            assert!(out.is_ok(), "{} failed: {:?}", preset.name(), out.err());
        }
    }
}
