//! Musical keys and the sample ids that belong to them.

use rand::Rng;

use crate::error::RadioError;

/// Circle-of-fifths order used by the `fifths` / `harmonious` key setting.
pub const HARMONIC_KEY_ORDER: [&str; 24] = [
    "C", "Am", "G", "Em", "D", "Bm", "A", "F#m", "E", "C#m", "B", "G#m", "F#", "D#m", "C#", "A#m",
    "G#", "Fm", "Eb", "Cm", "Bb", "Gm", "F", "Dm",
];

/// Chord and note samples for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalKey {
    pub name: &'static str,
    /// Chords by scale degree (I, ii, iii, IV, V, vi, ...).
    pub chords: &'static [&'static str],
    pub notes: &'static [&'static str],
}

const fn key(name: &'static str, chords: &'static [&'static str], notes: &'static [&'static str]) -> MusicalKey {
    MusicalKey { name, chords, notes }
}

pub const KEYS: [MusicalKey; 14] = [
    key(
        "CMajor",
        &["C_maj_chord", "G_maj_chord", "A_min_chord", "F_maj_chord", "D_min_chord", "E_min_chord"],
        &["C_note", "E_note", "G_note", "C5_note", "C_E_slide_note", "E_G_slide_note"],
    ),
    key(
        "GMajor",
        &["G_maj_chord", "D_maj_chord", "E_min_chord", "C_maj_chord", "A_min_chord", "B_min_chord"],
        &["G_note", "B_note", "D_note", "G5_note"],
    ),
    key(
        "AMajor",
        &["A_maj_chord", "E_maj_chord", "FSharp_min_chord", "D_maj_chord", "B_min_chord", "CSharp_min_chord"],
        &["A_note", "CSharp_note", "E_note", "A5_note"],
    ),
    key(
        "EMajor",
        &["E_maj_chord", "B_maj_chord", "CSharp_min_chord", "A_maj_chord", "FSharp_min_chord", "GSharp_min_chord"],
        &["E_note", "GSharp_note", "B_note", "E5_note"],
    ),
    key(
        "DMajor",
        &["D_maj_chord", "A_maj_chord", "B_min_chord", "G_maj_chord", "E_min_chord", "FSharp_min_chord"],
        &["D_note", "FSharp_note", "A_note", "D5_note"],
    ),
    key(
        "FMajor",
        &["F_maj_chord", "C_maj_chord", "D_min_chord", "BFlat_maj_chord", "G_min_chord", "A_min_chord"],
        &["F_note", "A_note", "C_note", "F5_note"],
    ),
    key(
        "AMinor",
        &["A_min_chord", "E_min_chord", "F_maj_chord", "G_maj_chord", "D_min_chord"],
        &["A_note", "C_note", "E_note", "A5_note"],
    ),
    key(
        "EMinor",
        &["E_min_chord", "B_min_chord", "C_maj_chord", "D_maj_chord", "A_min_chord"],
        &["E_note", "G_note", "B_note", "E5_note"],
    ),
    key(
        "BMinor",
        &["B_min_chord", "FSharp_min_chord", "G_maj_chord", "A_maj_chord", "E_min_chord"],
        &["B_note", "D_note", "FSharp_note", "B5_note"],
    ),
    key(
        "FSharpMinor",
        &["FSharp_min_chord", "CSharp_min_chord", "D_maj_chord", "E_maj_chord", "B_min_chord"],
        &["FSharp_note", "A_note", "CSharp_note", "FSharp5_note"],
    ),
    key(
        "CSharpMinor",
        &["CSharp_min_chord", "GSharp_min_chord", "A_maj_chord", "B_maj_chord", "FSharp_min_chord"],
        &["CSharp_note", "E_note", "GSharp_note", "CSharp5_note"],
    ),
    key(
        "GMinor",
        &["G_min_chord", "D_min_chord", "E_flat_maj_chord", "F_maj_chord", "C_min_chord", "A_dim_chord"],
        &["G_note", "B_flat_note", "D_note", "G5_note"],
    ),
    key(
        "FMinor",
        &[
            "F_min_chord",
            "G_dim_chord",
            "A_flat_maj_chord",
            "B_flat_min_chord",
            "C_min_chord",
            "D_flat_maj_chord",
            "E_flat_maj_chord",
        ],
        &["F_note", "A_flat_note", "C_note", "F5_note"],
    ),
    key(
        "DMinor",
        &["D_min_chord", "A_min_chord", "BFlat_maj_chord", "C_maj_chord", "G_min_chord"],
        &["D_note", "F_note", "A_note", "D5_note"],
    ),
];

impl MusicalKey {
    /// Look up a key by its full name, e.g. `"FSharpMinor"`.
    pub fn by_name(name: &str) -> Option<MusicalKey> {
        KEYS.iter().copied().find(|k| k.name == name)
    }

    /// Resolve short notation: `"C"`, `"Am"`, `"F#m"`, `"Bb"`.
    pub fn from_notation(notation: &str) -> Result<MusicalKey, RadioError> {
        let name = full_key_name(notation);
        Self::by_name(&name).ok_or_else(|| RadioError::UnknownKey(notation.trim().to_string()))
    }

    /// Bass sample for a chord: its root with a `_bass` suffix.
    pub fn bass_for_chord(chord: &str) -> String {
        format!("{}_bass", chord_root(chord))
    }

    /// Notes of this key sharing the chord's root.
    pub fn chord_tones(&self, chord: &str) -> Vec<&'static str> {
        let root = chord_root(chord);
        self.notes
            .iter()
            .copied()
            .filter(|n| note_root(n) == root)
            .collect()
    }
}

impl std::fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// `"F#m"` → `"FSharpMinor"`, `"Bb"` → `"BFlatMajor"`.
pub fn full_key_name(notation: &str) -> String {
    let notation = notation.trim();
    let (note, mode) = match notation.strip_suffix('m') {
        Some(note) => (note, "Minor"),
        None => (notation, "Major"),
    };
    let mut chars = note.chars();
    let letter = chars.next().map(|c| c.to_ascii_uppercase().to_string()).unwrap_or_default();
    let accidental: String = chars
        .map(|c| match c {
            '#' => "Sharp".to_string(),
            'b' => "Flat".to_string(),
            other => other.to_string(),
        })
        .collect();
    format!("{letter}{accidental}{mode}")
}

/// Pitch class of a chord id: `"FSharp_min_chord"` → `"FSharp"`, `"E_flat_maj_chord"` → `"E_flat"`.
fn chord_root(chord: &str) -> &str {
    let body = chord.strip_suffix("_chord").unwrap_or(chord);
    match body.rfind('_') {
        Some(i) => &body[..i],
        None => body,
    }
}

/// Pitch class of a note id: `"C5_note"` → `"C"`, `"B_flat_note"` → `"B_flat"`.
fn note_root(note: &str) -> &str {
    let body = note.strip_suffix("_note").unwrap_or(note);
    body.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Parse a key list setting. `"fifths"` or `"harmonious"` gives the circle of
/// fifths starting at a random position; anything else is a comma-separated
/// list of key notations. Unknown keys are skipped with a warning.
pub fn parse_key_list<R: Rng>(setting: &str, rng: &mut R) -> Vec<MusicalKey> {
    let notations: Vec<String> = match setting.trim() {
        "fifths" | "harmonious" => {
            let shift = rng.random_range(1..HARMONIC_KEY_ORDER.len());
            let mut order: Vec<String> = HARMONIC_KEY_ORDER.iter().map(|s| s.to_string()).collect();
            order.rotate_left(shift);
            order
        }
        list => list.split(',').map(str::to_string).collect(),
    };

    notations
        .iter()
        .filter_map(|n| match MusicalKey::from_notation(n) {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("Skipping key: {e}");
                None
            }
        })
        .collect()
}
