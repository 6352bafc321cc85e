//! Sample manifest, per-category effect chains and the processed sample cache.
//!
//! Each manifest entry is classified once by its name suffix. The category
//! selects a chain builder from a fixed table, and the chain runs once when
//! the cache is first populated. Playback only ever reads processed buffers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dsp::compressor::Compressor;
use crate::dsp::equalizer::Equalizer;
use crate::dsp::filter::{FilterSpec, StatefulFilter};
use crate::dsp::limiter::Limiter;
use crate::dsp::multiband::MultibandCompressor;
use crate::dsp::{AudioBuffer, EffectChain};
use crate::error::{RadioError, Result};

/// Cutoff of the bass chain's lowpass stage.
pub const BASS_LOWPASS_HZ: f64 = 250.0;

// ── Categories ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleCategory {
    Note,
    SlideNote,
    Chord,
    Bass,
    Percussion,
}

type ChainBuilder = fn() -> EffectChain;

/// Category → chain builder.
const CHAIN_BUILDERS: [(SampleCategory, ChainBuilder); 5] = [
    (SampleCategory::Chord, chord_chain),
    (SampleCategory::Bass, bass_chain),
    (SampleCategory::Note, note_chain),
    (SampleCategory::SlideNote, slide_note_chain),
    (SampleCategory::Percussion, percussion_chain),
];

fn chord_chain() -> EffectChain {
    EffectChain::new()
        .with(Equalizer::default())
        .with(Limiter::new())
        .with(Compressor::new())
}

fn bass_chain() -> EffectChain {
    EffectChain::new()
        .with(Equalizer::default())
        .with(StatefulFilter::new(FilterSpec::lowpass(BASS_LOWPASS_HZ, 0.707)))
        .with(MultibandCompressor::default())
        .with(Limiter::new())
}

fn note_chain() -> EffectChain {
    EffectChain::new().with(Compressor::new().with_makeup(0.8))
}

fn slide_note_chain() -> EffectChain {
    EffectChain::new().with(Compressor::new().with_attack(50.0).with_makeup(0.6))
}

fn percussion_chain() -> EffectChain {
    EffectChain::new().with(Compressor::new())
}

impl SampleCategory {
    /// Classify a sample name by suffix, ignoring a `.wav` extension.
    pub fn classify(name: &str) -> SampleCategory {
        let id = sample_id(name);
        if id.ends_with("_slide_note") {
            SampleCategory::SlideNote
        } else if id.ends_with("_note") {
            SampleCategory::Note
        } else if id.ends_with("_chord") {
            SampleCategory::Chord
        } else if id.ends_with("_bass") {
            SampleCategory::Bass
        } else {
            SampleCategory::Percussion
        }
    }

    /// A fresh effect chain for this category.
    pub fn chain(self) -> EffectChain {
        CHAIN_BUILDERS
            .iter()
            .find(|(category, _)| *category == self)
            .map_or_else(EffectChain::new, |(_, build)| build())
    }
}

/// Strip a `.wav` extension.
pub fn sample_id(name: &str) -> &str {
    name.strip_suffix(".wav").unwrap_or(name)
}

// ── Manifest ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Sample id as used in narratives.
    pub id: String,
    pub path: PathBuf,
    pub category: SampleCategory,
}

/// Sample name → file listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleManifest {
    entries: Vec<ManifestEntry>,
}

impl SampleManifest {
    /// Build from (name, path) pairs.
    pub fn from_entries<I, S, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: Into<PathBuf>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, path)| ManifestEntry {
                id: sample_id(name.as_ref()).to_string(),
                path: path.into(),
                category: SampleCategory::classify(name.as_ref()),
            })
            .collect();
        SampleManifest { entries }
    }

    /// Read a JSON object of name → path. Relative paths resolve against the
    /// manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest_error = |reason: String| RadioError::Manifest {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let listing: BTreeMap<String, PathBuf> =
            serde_json::from_str(&text).map_err(|e| manifest_error(e.to_string()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        let manifest = Self::from_entries(listing.into_iter().map(|(name, file)| {
            let resolved = if file.is_relative() { base.join(file) } else { file };
            (name, resolved)
        }));
        log::info!("Loaded sample manifest {} ({} samples)", path.display(), manifest.len());
        Ok(manifest)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Cache ───────────────────────────────────────────────────

/// A processed sample ready for playback.
#[derive(Debug, Clone)]
pub struct ProcessedSample {
    pub category: SampleCategory,
    pub buffer: Arc<AudioBuffer>,
}

pub type SampleBank = HashMap<String, ProcessedSample>;

/// Reads a sample file.
pub type Decoder = dyn Fn(&Path) -> Result<AudioBuffer> + Send + Sync;

/// Processed samples for one manifest.
///
/// Created empty; the first `bank()` call decodes and processes every entry
/// under a lock, so concurrent first readers wait for one population.
/// `reload()` rebuilds the bank from the manifest. Share with `Arc`.
pub struct SampleCache {
    manifest: SampleManifest,
    decoder: Box<Decoder>,
    /// Samples at any other rate are skipped when set.
    sample_rate: Option<u32>,
    bank: Mutex<Option<Arc<SampleBank>>>,
}

impl SampleCache {
    /// Cache decoding 16-bit WAV files.
    pub fn new(manifest: SampleManifest) -> Self {
        Self::with_decoder(manifest, Box::new(AudioBuffer::load_wav))
    }

    pub fn with_decoder(manifest: SampleManifest, decoder: Box<Decoder>) -> Self {
        SampleCache {
            manifest,
            decoder,
            sample_rate: None,
            bank: Mutex::new(None),
        }
    }

    /// Only keep samples recorded at `rate`.
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Cache whose bank is already populated.
    pub fn preloaded(bank: SampleBank) -> Self {
        SampleCache {
            manifest: SampleManifest::default(),
            decoder: Box::new(|path: &Path| {
                Err(RadioError::Manifest {
                    path: path.to_path_buf(),
                    reason: "preloaded cache has no decoder".to_string(),
                })
            }),
            sample_rate: None,
            bank: Mutex::new(Some(Arc::new(bank))),
        }
    }

    pub fn manifest(&self) -> &SampleManifest {
        &self.manifest
    }

    pub fn is_loaded(&self) -> bool {
        self.bank.lock().is_some()
    }

    /// The processed bank, populating it on first use.
    pub fn bank(&self) -> Arc<SampleBank> {
        let mut guard = self.bank.lock();
        if let Some(bank) = guard.as_ref() {
            return Arc::clone(bank);
        }
        let bank = Arc::new(self.populate());
        *guard = Some(Arc::clone(&bank));
        bank
    }

    /// Rebuild the bank from the manifest.
    pub fn reload(&self) -> Arc<SampleBank> {
        let bank = Arc::new(self.populate());
        *self.bank.lock() = Some(Arc::clone(&bank));
        bank
    }

    /// Processed buffer for a sample id.
    pub fn get(&self, id: &str) -> Option<Arc<AudioBuffer>> {
        self.bank().get(sample_id(id)).map(|s| Arc::clone(&s.buffer))
    }

    fn populate(&self) -> SampleBank {
        let mut bank = HashMap::with_capacity(self.manifest.len());
        for entry in self.manifest.entries() {
            let decoded = match (self.decoder)(&entry.path) {
                Ok(buffer) => buffer,
                Err(e) => {
                    log::error!("Skipping sample {}: {e}", entry.id);
                    continue;
                }
            };
            if let Some(rate) = self.sample_rate.filter(|&rate| rate != decoded.sample_rate()) {
                log::error!(
                    "Skipping sample {}: recorded at {} Hz, expected {rate} Hz",
                    entry.id,
                    decoded.sample_rate()
                );
                continue;
            }
            let mut chain = entry.category.chain();
            let processed = chain.run(&decoded);
            log::debug!(
                "Processed {} as {:?} through [{}]",
                entry.id,
                entry.category,
                chain.names().join(" → ")
            );
            bank.insert(
                entry.id.clone(),
                ProcessedSample {
                    category: entry.category,
                    buffer: Arc::new(processed),
                },
            );
        }
        log::info!("Sample cache ready: {}/{} samples", bank.len(), self.manifest.len());
        bank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tone() -> AudioBuffer {
        AudioBuffer::mono(44100, (0..4410).map(|i| ((i % 100) as i16 - 50) * 400).collect())
    }

    #[test]
    fn classify_by_suffix() {
        assert_eq!(SampleCategory::classify("C_E_slide_note.wav"), SampleCategory::SlideNote);
        assert_eq!(SampleCategory::classify("C_note"), SampleCategory::Note);
        assert_eq!(SampleCategory::classify("C_note.wav"), SampleCategory::Note);
        assert_eq!(SampleCategory::classify("A_min_chord.wav"), SampleCategory::Chord);
        assert_eq!(SampleCategory::classify("G_bass"), SampleCategory::Bass);
        assert_eq!(SampleCategory::classify("Kick"), SampleCategory::Percussion);
        assert_eq!(SampleCategory::classify("notes_pad"), SampleCategory::Percussion);
    }

    #[test]
    fn chains_follow_table() {
        assert_eq!(SampleCategory::Chord.chain().names(), vec!["equalizer", "limiter", "compressor"]);
        assert_eq!(
            SampleCategory::Bass.chain().names(),
            vec!["equalizer", "filter", "multiband-compressor", "limiter"]
        );
        assert_eq!(SampleCategory::Note.chain().names(), vec!["compressor"]);
        assert_eq!(SampleCategory::SlideNote.chain().names(), vec!["compressor"]);
        assert_eq!(SampleCategory::Percussion.chain().names(), vec!["compressor"]);
    }

    #[test]
    fn manifest_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("samples.json");
        fs::write(
            &manifest_path,
            r#"{"C_note.wav": "notes/c.wav", "Kick": "/abs/kick.wav"}"#,
        )
        .unwrap();

        let manifest = SampleManifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.len(), 2);
        let c = manifest.entries().iter().find(|e| e.id == "C_note").unwrap();
        assert_eq!(c.path, dir.path().join("notes/c.wav"));
        assert_eq!(c.category, SampleCategory::Note);
        let kick = manifest.entries().iter().find(|e| e.id == "Kick").unwrap();
        assert_eq!(kick.path, PathBuf::from("/abs/kick.wav"));
    }

    #[test]
    fn manifest_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SampleManifest::load(&dir.path().join("none.json"));
        assert!(matches!(missing, Err(RadioError::Manifest { .. })));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "[1, 2]").unwrap();
        assert!(matches!(SampleManifest::load(&bad), Err(RadioError::Manifest { .. })));
    }

    #[test]
    fn cache_populates_once_and_skips_unreadable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let manifest = SampleManifest::from_entries([
            ("C_note", "c.wav"),
            ("broken_chord", "broken.wav"),
            ("Kick", "kick.wav"),
        ]);
        let cache = SampleCache::with_decoder(
            manifest,
            Box::new(move |path: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                if path.ends_with("broken.wav") {
                    Err(RadioError::SampleFormat {
                        path: path.to_path_buf(),
                        reason: "24-bit".to_string(),
                    })
                } else {
                    Ok(tone())
                }
            }),
        );

        assert!(!cache.is_loaded());
        assert!(cache.get("C_note").is_some());
        assert!(cache.get("C_note.wav").is_some());
        assert!(cache.get("broken_chord").is_none());
        assert_eq!(cache.bank().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "decoded once per entry");

        cache.reload();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn concurrent_first_use_populates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = Arc::new(SampleCache::with_decoder(
            SampleManifest::from_entries([("Kick", "kick.wav")]),
            Box::new(move |_: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(tone())
            }),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get("Kick").is_some())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_skips_samples_at_other_rates() {
        let manifest = SampleManifest::from_entries([("C_note", "c.wav"), ("Kick", "kick.wav")]);
        let cache = SampleCache::with_decoder(
            manifest,
            Box::new(|path: &Path| {
                if path.ends_with("kick.wav") {
                    Ok(AudioBuffer::mono(22050, vec![0; 16]))
                } else {
                    Ok(tone())
                }
            }),
        )
        .with_sample_rate(44100);

        assert_eq!(cache.sample_rate(), Some(44100));
        assert!(cache.get("C_note").is_some());
        assert!(cache.get("Kick").is_none());
    }

    #[test]
    fn note_chain_applies_makeup() {
        let quiet = AudioBuffer::mono(44100, vec![1000; 100]);
        let out = SampleCategory::Note.chain().run(&quiet);
        assert!(out.samples().iter().all(|&s| s == 800));
    }
}
