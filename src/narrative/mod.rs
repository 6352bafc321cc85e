//! Narratives: bars of placed samples and their flattened event timeline.

pub mod generator;
pub mod keys;
pub mod signature;

use serde::{Deserialize, Serialize};

use crate::error::SignatureError;

/// Beats in one bar.
pub const BEATS_PER_BAR: f64 = 4.0;

// ── Bar content ─────────────────────────────────────────────

/// A sample placed at a beat offset inside a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    /// Beat offset in [0, 4).
    pub offset: f64,
}

impl Hit {
    pub fn new(id: impl Into<String>, offset: f64) -> Self {
        Hit {
            id: id.into(),
            offset,
        }
    }
}

/// Kick and hi-hat hits of one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrumPattern {
    pub kicks: Vec<Hit>,
    pub hi_hats: Vec<Hit>,
}

/// One 4-beat unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub chords: Vec<Hit>,
    pub melody: Vec<Hit>,
    /// Empty when the bar has no bass line.
    #[serde(default)]
    pub bass: Vec<Hit>,
    #[serde(default)]
    pub drums: Option<DrumPattern>,
}

impl Bar {
    pub fn new(chords: Vec<Hit>, melody: Vec<Hit>) -> Self {
        Bar {
            chords,
            melody,
            ..Default::default()
        }
    }

    pub fn with_bass(mut self, bass: Vec<Hit>) -> Self {
        self.bass = bass;
        self
    }

    pub fn with_drums(mut self, kicks: Vec<Hit>, hi_hats: Vec<Hit>) -> Self {
        self.drums = Some(DrumPattern { kicks, hi_hats });
        self
    }

    /// Every hit in this bar with its event kind, in dispatch precedence:
    /// bass, chords, melody, kicks, hi-hats.
    pub fn hits(&self) -> impl Iterator<Item = (EventKind, &Hit)> {
        let drums = self
            .drums
            .iter()
            .flat_map(|d| d.kicks.iter().chain(d.hi_hats.iter()));
        self.bass
            .iter()
            .map(|h| (EventKind::Bass, h))
            .chain(self.chords.iter().map(|h| (EventKind::Chord, h)))
            .chain(self.melody.iter().map(|h| (EventKind::Melody, h)))
            .chain(drums.map(|h| (EventKind::Drum, h)))
    }

    /// Check that every offset lies inside the bar.
    pub fn validate(&self) -> Result<(), SignatureError> {
        for (_, hit) in self.hits() {
            if !(0.0..BEATS_PER_BAR).contains(&hit.offset) {
                return Err(SignatureError::BadOffset(format!("{}@{}", hit.id, hit.offset)));
            }
        }
        Ok(())
    }
}

// ── Event timeline ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Bass,
    Chord,
    Melody,
    Drum,
}

/// A single scheduled sample trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// When this event fires, in beats from the start of the narrative.
    pub time: f64,
    pub kind: EventKind,
    pub sample_id: String,
    /// Index of the bar that produced this event.
    pub bar: usize,
}

/// Flatten bars into one timeline sorted by time.
///
/// The sort is stable over per-bar assembly order, so simultaneous events
/// keep the bass, chord, melody, drum precedence.
pub fn flatten(bars: &[Bar]) -> Vec<Event> {
    let mut events: Vec<Event> = bars
        .iter()
        .enumerate()
        .flat_map(|(index, bar)| {
            let start = index as f64 * BEATS_PER_BAR;
            bar.hits().map(move |(kind, hit)| Event {
                time: start + hit.offset,
                kind,
                sample_id: hit.id.clone(),
                bar: index,
            })
        })
        .collect();
    events.sort_by(|a, b| a.time.total_cmp(&b.time));
    events
}

// ── Narrative ───────────────────────────────────────────────

/// An ordered list of bars plus its signature key.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    bars: Vec<Bar>,
    signature_key: String,
}

impl Narrative {
    /// Build a narrative, validating offsets and deriving its signature key.
    pub fn new(bars: Vec<Bar>) -> Result<Self, SignatureError> {
        for bar in &bars {
            bar.validate()?;
        }
        let signature_key = signature::encode(&bars)?;
        Ok(Narrative {
            bars,
            signature_key,
        })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn signature_key(&self) -> &str {
        &self.signature_key
    }

    /// Total length in beats.
    pub fn total_beats(&self) -> f64 {
        self.bars.len() as f64 * BEATS_PER_BAR
    }

    pub fn events(&self) -> Vec<Event> {
        flatten(&self.bars)
    }
}
