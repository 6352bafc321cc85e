//! Signature keys: lossless string encodings of a narrative's bars.
//!
//! Compact form: bars joined by `_^_`; inside a bar, sections joined by `:`
//! in the order chords (`,`), melody (`|`), then optionally bass (`,`) and
//! drums (`kicks;hihats`, each `,`-separated). Every entry is `id@offset`
//! with the offset in shortest round-trip decimal form:
//!
//! ```text
//! C_maj_chord@0.0:C_note@1.0|E_note@2.5
//! ```
//!
//! The JSON form is the serde encoding of the bar list. Both decode to the
//! same bars.

use super::{BEATS_PER_BAR, Bar, DrumPattern, Hit};
use crate::error::SignatureError;

pub const BAR_SEPARATOR: &str = "_^_";
const SECTION_SEPARATOR: char = ':';
const CHORD_SEPARATOR: char = ',';
const MELODY_SEPARATOR: char = '|';
const BASS_SEPARATOR: char = ',';
const DRUM_SEPARATOR: char = ',';
const DRUM_GROUP_SEPARATOR: char = ';';
const OFFSET_MARKER: char = '@';

/// Substrings a sample id may not contain.
pub const RESERVED_TOKENS: [&str; 6] = [BAR_SEPARATOR, ":", ",", "|", ";", "@"];

// ── Compact form ────────────────────────────────────────────

fn encode_hits(hits: &[Hit], separator: char) -> Result<String, SignatureError> {
    let mut parts = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.id.is_empty() {
            return Err(SignatureError::MalformedEntry(format!("@{:?}", hit.offset)));
        }
        if RESERVED_TOKENS.iter().any(|t| hit.id.contains(t)) {
            return Err(SignatureError::ReservedToken(hit.id.clone()));
        }
        parts.push(format!("{}{OFFSET_MARKER}{:?}", hit.id, hit.offset));
    }
    Ok(parts.join(&separator.to_string()))
}

fn encode_bar(bar: &Bar) -> Result<String, SignatureError> {
    let mut sections = vec![
        encode_hits(&bar.chords, CHORD_SEPARATOR)?,
        encode_hits(&bar.melody, MELODY_SEPARATOR)?,
    ];
    if !bar.bass.is_empty() || bar.drums.is_some() {
        sections.push(encode_hits(&bar.bass, BASS_SEPARATOR)?);
    }
    if let Some(drums) = &bar.drums {
        sections.push(format!(
            "{}{DRUM_GROUP_SEPARATOR}{}",
            encode_hits(&drums.kicks, DRUM_SEPARATOR)?,
            encode_hits(&drums.hi_hats, DRUM_SEPARATOR)?
        ));
    }
    Ok(sections.join(&SECTION_SEPARATOR.to_string()))
}

/// Encode bars into the compact form.
pub fn encode(bars: &[Bar]) -> Result<String, SignatureError> {
    let encoded = bars.iter().map(encode_bar).collect::<Result<Vec<_>, _>>()?;
    Ok(encoded.join(BAR_SEPARATOR))
}

fn parse_hit(entry: &str) -> Result<Hit, SignatureError> {
    let (id, offset) = entry
        .rsplit_once(OFFSET_MARKER)
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| SignatureError::MalformedEntry(entry.to_string()))?;
    let offset: f64 = offset
        .parse()
        .map_err(|_| SignatureError::BadOffset(offset.to_string()))?;
    if !(0.0..BEATS_PER_BAR).contains(&offset) {
        return Err(SignatureError::BadOffset(offset.to_string()));
    }
    Ok(Hit::new(id, offset))
}

fn parse_hits(section: &str, separator: char) -> Result<Vec<Hit>, SignatureError> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    section.split(separator).map(parse_hit).collect()
}

fn parse_bar(encoded: &str) -> Result<Bar, SignatureError> {
    let sections: Vec<&str> = encoded.split(SECTION_SEPARATOR).collect();
    if !(2..=4).contains(&sections.len()) {
        return Err(SignatureError::MalformedBar(encoded.to_string()));
    }

    let mut bar = Bar::new(
        parse_hits(sections[0], CHORD_SEPARATOR)?,
        parse_hits(sections[1], MELODY_SEPARATOR)?,
    );
    if let Some(bass) = sections.get(2) {
        bar.bass = parse_hits(bass, BASS_SEPARATOR)?;
    }
    if let Some(drums) = sections.get(3) {
        let (kicks, hi_hats) = drums
            .split_once(DRUM_GROUP_SEPARATOR)
            .ok_or_else(|| SignatureError::MalformedBar(encoded.to_string()))?;
        bar.drums = Some(DrumPattern {
            kicks: parse_hits(kicks, DRUM_SEPARATOR)?,
            hi_hats: parse_hits(hi_hats, DRUM_SEPARATOR)?,
        });
    }
    Ok(bar)
}

/// Decode the compact form, reporting the first problem.
pub fn try_decode(key: &str) -> Result<Vec<Bar>, SignatureError> {
    if key.is_empty() {
        return Ok(Vec::new());
    }
    key.split(BAR_SEPARATOR).map(parse_bar).collect()
}

/// Decode the compact form; a malformed key yields an empty narrative.
pub fn decode(key: &str) -> Vec<Bar> {
    try_decode(key).unwrap_or_else(|e| {
        log::warn!("Unreadable signature key, using an empty narrative: {e}");
        Vec::new()
    })
}

// ── JSON form ───────────────────────────────────────────────

pub fn encode_json(bars: &[Bar]) -> Result<String, SignatureError> {
    Ok(serde_json::to_string(bars)?)
}

pub fn try_decode_json(json: &str) -> Result<Vec<Bar>, SignatureError> {
    let bars: Vec<Bar> = serde_json::from_str(json)?;
    for bar in &bars {
        bar.validate()?;
    }
    Ok(bars)
}

/// Decode the JSON form; malformed input yields an empty narrative.
pub fn decode_json(json: &str) -> Vec<Bar> {
    try_decode_json(json).unwrap_or_else(|e| {
        log::warn!("Unreadable JSON signature, using an empty narrative: {e}");
        Vec::new()
    })
}

/// Decode either form. A key that looks like a JSON array but does not
/// parse as one is read as a compact key, since ids may start with `[`.
pub fn decode_any(key: &str) -> Vec<Bar> {
    if key.trim_start().starts_with('[') {
        match try_decode_json(key) {
            Ok(bars) => return bars,
            Err(e) => log::debug!("Not a JSON signature ({e}), trying the compact form"),
        }
    }
    decode(key)
}
