//! Reference narrative generator.
//!
//! Chords follow a weighted Markov chain over scale degrees with a common
//! progression inserted every fourth bar; melodies use a weighted "organic"
//! rhythm and favour chord tones and stepwise motion.

use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;

use super::keys::MusicalKey;
use super::{BEATS_PER_BAR, Bar, Hit, Narrative};
use crate::error::RadioError;

/// Anything that can compose a narrative in a key.
pub trait NarrativeSource: Send {
    fn generate(&mut self, key: &MusicalKey, bars: usize) -> Result<Narrative, RadioError>;
}

/// Which optional parts to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub drums: bool,
    pub bass: bool,
}

// ── Pattern tables ──────────────────────────────────────────

/// Degree → weighted next degrees (I, ii, IV, V, vi).
const CHORD_TRANSITIONS: [(usize, &[(usize, u32)]); 5] = [
    (0, &[(0, 1), (1, 3), (3, 4), (4, 4), (5, 2)]),
    (1, &[(4, 5)]),
    (3, &[(1, 2), (4, 3)]),
    (4, &[(0, 8), (5, 2)]),
    (5, &[(3, 4), (1, 2)]),
];

/// I-vi-IV-V, I-IV-V-I, I-ii-V-I.
const COMMON_PROGRESSIONS: [[usize; 4]; 3] = [[0, 5, 3, 4], [0, 3, 4, 0], [0, 1, 4, 0]];

const CHORD_RHYTHMS: [&[f64]; 8] = [
    &[0.0],
    &[0.0, 2.0],
    &[0.0, 1.0, 2.0, 3.0],
    &[0.0, 1.5],
    &[0.0, 0.5, 1.0, 1.5, 2.0],
    &[0.0, 0.5, 1.0, 2.0, 3.0],
    &[0.0, 0.5, 1.0, 2.5],
    &[0.0, 1.0, 2.5],
];

/// Note duration in beats → weight.
const NOTE_DURATIONS: [(f64, u32); 5] = [(1.0, 6), (0.5, 8), (2.0, 4), (0.25, 3), (1.5, 2)];

const KICK_PATTERNS: [&[f64]; 4] = [&[0.0], &[0.0, 2.0], &[0.0, 1.5, 3.0], &[0.0, 3.0]];

const HIHAT_PATTERNS: [&[f64]; 4] = [
    &[0.0, 1.0, 2.0, 3.0],
    &[0.5, 1.5, 2.5, 3.5],
    &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5],
    &[0.5, 1.0, 1.5, 2.5, 3.0, 3.5],
];

const BASS_PATTERNS: [&[f64]; 3] = [&[0.0], &[0.0, 2.0], &[0.0, 1.5, 2.0]];

pub const KICK_ID: &str = "Kick";
pub const HIHAT_ID: &str = "HiHat";

const CHORD_TONE_WEIGHT: usize = 5;
const STEPWISE_WEIGHT: usize = 3;

/// Random generator; seedable for reproducible output.
pub struct RandomNarrativeGenerator<R = StdRng> {
    rng: R,
    options: GeneratorOptions,
    previous_degree: usize,
    /// Progression in use and the next position in it.
    progression: Option<([usize; 4], usize)>,
    previous_note: Option<&'static str>,
}

impl RandomNarrativeGenerator<StdRng> {
    pub fn new(options: GeneratorOptions) -> Self {
        Self::with_rng(StdRng::from_os_rng(), options)
    }

    pub fn seeded(seed: u64, options: GeneratorOptions) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), options)
    }
}

impl<R: Rng> RandomNarrativeGenerator<R> {
    pub fn with_rng(rng: R, options: GeneratorOptions) -> Self {
        RandomNarrativeGenerator {
            rng,
            options,
            previous_degree: 0,
            progression: None,
            previous_note: None,
        }
    }

    fn weighted<T: Copy>(&mut self, choices: &[(T, u32)]) -> Result<T, RadioError> {
        let dist = WeightedIndex::new(choices.iter().map(|(_, w)| *w))
            .map_err(|e| RadioError::Generation(e.to_string()))?;
        Ok(choices[dist.sample(&mut self.rng)].0)
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> Result<&'a T, RadioError> {
        items
            .choose(&mut self.rng)
            .ok_or_else(|| RadioError::Generation("nothing to choose from".to_string()))
    }

    fn next_degree(&mut self, bar: usize) -> Result<usize, RadioError> {
        if bar > 0 && bar % 4 == 0 {
            let progression = *self.pick(&COMMON_PROGRESSIONS)?;
            self.progression = Some((progression, 1));
            return Ok(progression[0]);
        }
        if let Some((progression, position)) = self.progression {
            if position < progression.len() {
                self.progression = Some((progression, position + 1));
                return Ok(progression[position]);
            }
        }

        self.progression = None;
        let transitions = CHORD_TRANSITIONS
            .iter()
            .find(|(degree, _)| *degree == self.previous_degree)
            .map_or(&[(0, 1)][..], |(_, t)| *t);
        self.weighted(transitions)
    }

    fn chords(&mut self, key: &MusicalKey, bar: usize) -> Result<Vec<Hit>, RadioError> {
        let degree = self.next_degree(bar)?;
        self.previous_degree = degree;
        let chord = key.chords[degree.min(key.chords.len().saturating_sub(1))];
        let rhythm = *self.pick(&CHORD_RHYTHMS)?;
        Ok(rhythm.iter().map(|&offset| Hit::new(chord, offset)).collect())
    }

    fn organic_rhythm(&mut self) -> Result<Vec<f64>, RadioError> {
        let mut offsets = Vec::new();
        let mut beat = 0.0;
        while beat < BEATS_PER_BAR {
            let remaining = BEATS_PER_BAR - beat;
            let valid: Vec<(f64, u32)> = NOTE_DURATIONS
                .iter()
                .copied()
                .filter(|(d, _)| *d <= remaining)
                .collect();
            if valid.is_empty() {
                break;
            }
            offsets.push(beat);
            beat += self.weighted(&valid)?;
        }
        Ok(offsets)
    }

    fn melody(&mut self, key: &MusicalKey, chord: Option<&str>) -> Result<Vec<Hit>, RadioError> {
        let mut notes = Vec::new();
        for offset in self.organic_rhythm()? {
            let mut pool: Vec<&'static str> = Vec::new();
            if let Some(chord) = chord {
                for tone in key.chord_tones(chord) {
                    pool.extend(std::iter::repeat_n(tone, CHORD_TONE_WEIGHT));
                }
            }
            if let Some(prev) = self.previous_note.and_then(|p| key.notes.iter().position(|n| *n == p)) {
                for (i, note) in key.notes.iter().enumerate() {
                    if i.abs_diff(prev) <= 2 {
                        pool.extend(std::iter::repeat_n(*note, STEPWISE_WEIGHT));
                    }
                }
            }
            pool.extend(key.notes.iter().copied());

            let note = *self.pick(&pool)?;
            self.previous_note = Some(note);
            notes.push(Hit::new(note, offset));
        }
        Ok(notes)
    }

    fn bar(&mut self, key: &MusicalKey, bar: usize) -> Result<Bar, RadioError> {
        let chords = self.chords(key, bar)?;
        let root_chord = chords.first().map(|h| h.id.clone());

        // The opening bar carries chords only.
        let melody = if bar == 0 {
            Vec::new()
        } else {
            self.melody(key, root_chord.as_deref())?
        };
        let mut out = Bar::new(chords, melody);

        if self.options.bass {
            if let Some(chord) = &root_chord {
                let id = MusicalKey::bass_for_chord(chord);
                let pattern = *self.pick(&BASS_PATTERNS)?;
                out.bass = pattern.iter().map(|&o| Hit::new(id.as_str(), o)).collect();
            }
        }
        if self.options.drums {
            let kicks = *self.pick(&KICK_PATTERNS)?;
            let hi_hats = *self.pick(&HIHAT_PATTERNS)?;
            out = out.with_drums(
                kicks.iter().map(|&o| Hit::new(KICK_ID, o)).collect(),
                hi_hats.iter().map(|&o| Hit::new(HIHAT_ID, o)).collect(),
            );
        }
        Ok(out)
    }
}

impl<R: Rng + Send> NarrativeSource for RandomNarrativeGenerator<R> {
    fn generate(&mut self, key: &MusicalKey, bars: usize) -> Result<Narrative, RadioError> {
        if key.chords.is_empty() || key.notes.is_empty() {
            return Err(RadioError::Generation(format!("key {key} has no samples")));
        }
        self.previous_degree = 0;
        self.progression = None;
        self.previous_note = None;

        let bars = (0..bars)
            .map(|i| self.bar(key, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Narrative::new(bars)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::EventKind;
    use crate::narrative::keys::KEYS;
    use crate::narrative::signature;

    fn c_major() -> MusicalKey {
        MusicalKey::by_name("CMajor").unwrap()
    }

    #[test]
    fn generates_requested_bar_count() {
        let mut generator = RandomNarrativeGenerator::seeded(3, GeneratorOptions::default());
        let narrative = generator.generate(&c_major(), 8).unwrap();
        assert_eq!(narrative.bar_count(), 8);
        assert!(!narrative.signature_key().is_empty());
    }

    #[test]
    fn generated_narratives_round_trip_both_encodings() {
        let options = GeneratorOptions { drums: true, bass: true };
        for seed in 0..40 {
            let mut generator = RandomNarrativeGenerator::seeded(seed, options);
            for key in &KEYS {
                let narrative = generator.generate(key, 8).unwrap();
                let bars = narrative.bars();

                let compact = signature::encode(bars).unwrap();
                assert_eq!(signature::try_decode(&compact).unwrap(), bars, "seed {seed} key {}", key.name);

                let json = signature::encode_json(bars).unwrap();
                assert_eq!(signature::try_decode_json(&json).unwrap(), bars, "seed {seed} key {}", key.name);
                assert_eq!(signature::decode_any(&json), signature::decode_any(&compact));
            }
        }
    }

    #[test]
    fn samples_come_from_the_key() {
        let key = c_major();
        let mut generator = RandomNarrativeGenerator::seeded(11, GeneratorOptions::default());
        let narrative = generator.generate(&key, 12).unwrap();
        for event in narrative.events() {
            match event.kind {
                EventKind::Chord => assert!(key.chords.contains(&event.sample_id.as_str())),
                EventKind::Melody => assert!(key.notes.contains(&event.sample_id.as_str())),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn opening_bar_has_no_melody() {
        let mut generator = RandomNarrativeGenerator::seeded(5, GeneratorOptions::default());
        let narrative = generator.generate(&c_major(), 4).unwrap();
        assert!(narrative.bars()[0].melody.is_empty());
        assert!(!narrative.bars()[0].chords.is_empty());
    }

    #[test]
    fn organic_rhythm_fills_the_bar() {
        let mut generator = RandomNarrativeGenerator::seeded(9, GeneratorOptions::default());
        for _ in 0..50 {
            let offsets = generator.organic_rhythm().unwrap();
            assert_eq!(offsets.first(), Some(&0.0));
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
            assert!(offsets.iter().all(|o| *o < BEATS_PER_BAR));
        }
    }

    #[test]
    fn optional_parts_follow_options() {
        let options = GeneratorOptions { drums: true, bass: true };
        let mut generator = RandomNarrativeGenerator::seeded(1, options);
        let narrative = generator.generate(&c_major(), 4).unwrap();
        for bar in narrative.bars() {
            let drums = bar.drums.as_ref().unwrap();
            assert!(drums.kicks.iter().all(|h| h.id == KICK_ID));
            assert!(drums.hi_hats.iter().all(|h| h.id == HIHAT_ID));
            assert!(bar.bass.iter().all(|h| h.id.ends_with("_bass")));
            assert!(!bar.bass.is_empty());
        }
    }

    #[test]
    fn same_seed_same_narrative() {
        let options = GeneratorOptions { drums: true, bass: false };
        let a = RandomNarrativeGenerator::seeded(42, options).generate(&c_major(), 6).unwrap();
        let b = RandomNarrativeGenerator::seeded(42, options).generate(&c_major(), 6).unwrap();
        assert_eq!(a.signature_key(), b.signature_key());
    }

    #[test]
    fn common_progression_every_fourth_bar() {
        let mut generator = RandomNarrativeGenerator::seeded(2, GeneratorOptions::default());
        let key = c_major();
        for bar in 0..8 {
            generator.chords(&key, bar).unwrap();
            if bar == 4 {
                assert_eq!(generator.previous_degree, 0, "progressions start on the tonic");
                assert!(generator.progression.is_some());
            }
        }
    }
}
